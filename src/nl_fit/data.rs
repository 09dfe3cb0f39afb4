use crate::types::{Array1f, ArrayView1f};

/// Unweighted sample to fit: model is evaluated at `t` and compared with `m`
#[derive(Clone, Debug, PartialEq)]
pub struct Data {
    pub t: Array1f,
    pub m: Array1f,
}

impl Data {
    pub fn new(t: ArrayView1f, m: ArrayView1f) -> Self {
        assert_eq!(t.len(), m.len(), "t and m should have the same size");
        Self {
            t: t.to_owned(),
            m: m.to_owned(),
        }
    }

    #[inline]
    pub fn lenu(&self) -> usize {
        self.t.len()
    }
}
