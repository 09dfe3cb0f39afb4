use crate::error::InputDataError;
use crate::types::{Array1f, ArrayView1f};

use itertools::{Itertools, process_results};
use ndarray::{Array2, ArrayView2, s};
use std::io::BufRead;
use std::str::FromStr;

/// Time-resolved absorbance spectra of one measurement
///
/// Rows of `absorbance` are timestamps, columns are wavelengths. The dataset is validated on
/// construction and immutable afterwards: `time` increases strictly and every spectrum has the
/// length of the wavelength axis.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralDataset {
    metadata: String,
    reference: Array1f,
    wavelengths: Array1f,
    time: Array1f,
    flags: Array1f,
    absorbance: Array2<f64>,
}

impl SpectralDataset {
    pub fn new(
        metadata: impl Into<String>,
        reference: Array1f,
        wavelengths: Array1f,
        time: Array1f,
        flags: Array1f,
        absorbance: Array2<f64>,
    ) -> Result<Self, InputDataError> {
        let n_wavelengths = wavelengths.len();
        if n_wavelengths == 0 {
            return Err(InputDataError::EmptyWavelengthAxis);
        }
        if reference.len() != n_wavelengths {
            return Err(InputDataError::ReferenceLength {
                expected: n_wavelengths,
                actual: reference.len(),
            });
        }
        if absorbance.ncols() != n_wavelengths {
            return Err(InputDataError::ColumnCount {
                line: 0,
                expected: n_wavelengths,
                actual: absorbance.ncols(),
            });
        }
        if absorbance.nrows() != time.len() || flags.len() != time.len() {
            return Err(InputDataError::ColumnCount {
                line: 0,
                expected: time.len(),
                actual: absorbance.nrows(),
            });
        }
        if let Some((index, _)) = time
            .iter()
            .tuple_windows()
            .find_position(|&(a, b)| b <= a)
        {
            return Err(InputDataError::NonIncreasingTime { index: index + 1 });
        }
        Ok(Self {
            metadata: metadata.into(),
            reference,
            wavelengths,
            time,
            flags,
            absorbance,
        })
    }

    /// Parse the whitespace-delimited measurement format
    ///
    /// Line 1 is free-text metadata, line 2 the reference (light) spectrum, line 3 the wavelength
    /// axis. Every following non-empty line is `time flag a(λ₁) a(λ₂) …`.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, InputDataError> {
        let mut lines = reader.lines().enumerate().map(|(i, line)| {
            line.map(|line| (i + 1, line))
                .map_err(|err| InputDataError::Parse {
                    line: i + 1,
                    message: err.to_string(),
                })
        });

        let (_, metadata) = lines.next().ok_or(InputDataError::EmptyFile)??;
        let mut rows = lines.filter_ok(|(_, line)| !line.trim().is_empty());

        let (line, text) = rows
            .next()
            .ok_or(InputDataError::MissingHeader("reference"))??;
        let reference = parse_row(line, &text)?;
        let (line, text) = rows
            .next()
            .ok_or(InputDataError::MissingHeader("wavelength axis"))??;
        let wavelengths = parse_row(line, &text)?;
        if wavelengths.is_empty() {
            return Err(InputDataError::EmptyWavelengthAxis);
        }
        let n_wavelengths = wavelengths.len();

        let data_rows = process_results(rows, |rows| {
            rows.map(|(line, text)| {
                let row = parse_row(line, &text)?;
                if row.len() != n_wavelengths + 2 {
                    return Err(InputDataError::ColumnCount {
                        line,
                        expected: n_wavelengths + 2,
                        actual: row.len(),
                    });
                }
                Ok(row)
            })
            .collect::<Result<Vec<_>, _>>()
        })??;

        let n_times = data_rows.len();
        let time: Array1f = data_rows.iter().map(|row| row[0]).collect();
        let flags: Array1f = data_rows.iter().map(|row| row[1]).collect();
        let flat: Vec<f64> = data_rows
            .iter()
            .flat_map(|row| row[2..].iter().copied())
            .collect();
        let absorbance = Array2::from_shape_vec((n_times, n_wavelengths), flat).map_err(|err| {
            InputDataError::Parse {
                line: 0,
                message: err.to_string(),
            }
        })?;

        Self::new(
            metadata.trim().to_owned(),
            reference.into(),
            wavelengths.into(),
            time,
            flags,
            absorbance,
        )
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn reference(&self) -> ArrayView1f<'_> {
        self.reference.view()
    }

    pub fn wavelengths(&self) -> ArrayView1f<'_> {
        self.wavelengths.view()
    }

    pub fn time(&self) -> ArrayView1f<'_> {
        self.time.view()
    }

    pub fn flags(&self) -> ArrayView1f<'_> {
        self.flags.view()
    }

    pub fn absorbance(&self) -> ArrayView2<'_, f64> {
        self.absorbance.view()
    }

    /// Absorbance time series of a single wavelength column
    pub fn column(&self, index: usize) -> ArrayView1f<'_> {
        self.absorbance.slice(s![.., index])
    }

    /// Number of timestamps
    #[inline]
    pub fn lenu(&self) -> usize {
        self.time.len()
    }

    /// Index of the axis wavelength closest to `wavelength`
    pub fn nearest_wavelength_index(&self, wavelength: f64) -> usize {
        self.wavelengths
            .iter()
            .map(|&w| (w - wavelength).abs())
            .position_min_by(|a, b| a.total_cmp(b))
            .unwrap_or(0)
    }
}

impl FromStr for SpectralDataset {
    type Err = InputDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_reader(s.as_bytes())
    }
}

fn parse_row(line: usize, text: &str) -> Result<Vec<f64>, InputDataError> {
    text.split_whitespace()
        .map(|token| {
            let value = token.parse::<f64>().map_err(|err| InputDataError::Parse {
                line,
                message: format!("{token:?}: {err}"),
            })?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(InputDataError::NonFinite { line })
            }
        })
        .collect()
}
