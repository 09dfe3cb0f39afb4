/// Project `x` onto the box `[lower, upper]`
pub(super) fn clamp_to_bounds<const NPARAMS: usize>(
    x: &[f64; NPARAMS],
    lower: &[f64; NPARAMS],
    upper: &[f64; NPARAMS],
) -> [f64; NPARAMS] {
    let mut clamped = *x;
    for i in 0..NPARAMS {
        clamped[i] = x[i].clamp(lower[i], upper[i]);
    }
    clamped
}

/// Index of the first parameter sitting on its bound and the bound value
pub(crate) fn active_bound<const NPARAMS: usize>(
    x: &[f64; NPARAMS],
    lower: &[f64; NPARAMS],
    upper: &[f64; NPARAMS],
) -> Option<(usize, f64)> {
    (0..NPARAMS).find_map(|i| {
        if x[i] <= lower[i] {
            Some((i, lower[i]))
        } else if x[i] >= upper[i] {
            Some((i, upper[i]))
        } else {
            None
        }
    })
}
