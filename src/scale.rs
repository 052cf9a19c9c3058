use std::fmt;
use thiserror::Error;

/// Number of boundaries for equal-interval classification (4 buckets)
pub const EQUAL_INTERVAL_BOUNDARIES: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum ScaleError {
    #[error("cannot build a scale for maximum {0}")]
    InvalidMaximum(f64),
    #[error("all values are zero, equal intervals would collapse to a single point")]
    DegenerateMaximum,
    #[error("no municipality has a value for this selection")]
    NoValues,
}

/// Choropleth classification scheme
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Classification {
    #[default]
    EqualIntervals,
    PowersOfTen,
}

impl Classification {
    pub const ALL: [Classification; 2] = [Classification::EqualIntervals, Classification::PowersOfTen];

    pub fn label(self) -> &'static str {
        match self {
            Classification::EqualIntervals => "Gelijke intervallen",
            Classification::PowersOfTen => "Machten van 10",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "equal" | "equal-intervals" => Some(Classification::EqualIntervals),
            "log" | "log10" | "powers-of-ten" => Some(Classification::PowersOfTen),
            _ => None,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ascending bucket boundaries; `n` boundaries define `n - 1` buckets
#[derive(Clone, Debug, PartialEq)]
pub struct Scale {
    boundaries: Vec<f64>,
}

impl Scale {
    /// Build the legend scale for a metric maximum
    pub fn build(max: f64, classification: Classification) -> Result<Self, ScaleError> {
        if !max.is_finite() || max < 0.0 {
            return Err(ScaleError::InvalidMaximum(max));
        }

        let boundaries = match classification {
            Classification::EqualIntervals => {
                if max == 0.0 {
                    return Err(ScaleError::DegenerateMaximum);
                }
                let steps = (EQUAL_INTERVAL_BOUNDARIES - 1) as f64;
                (0..EQUAL_INTERVAL_BOUNDARIES)
                    .map(|i| max * i as f64 / steps)
                    .collect()
            }
            Classification::PowersOfTen => {
                let digits = decimal_digits(max.round_ties_even());
                std::iter::once(0.0)
                    .chain((0..=digits).map(|exp| 10f64.powi(exp as i32)))
                    .collect()
            }
        };

        Ok(Self { boundaries })
    }

    /// Build from an optional maximum (all values missing)
    pub fn for_max(max: Option<f64>, classification: Classification) -> Result<Self, ScaleError> {
        Self::build(max.ok_or(ScaleError::NoValues)?, classification)
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    pub fn bucket_count(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }

    /// Bucket index for a value: `[b_i, b_i+1)`, the last bucket closed.
    /// Values outside the scale have no bucket.
    pub fn bucket(&self, value: f64) -> Option<usize> {
        let (&first, &last) = (self.boundaries.first()?, self.boundaries.last()?);
        if !value.is_finite() || value < first || value > last {
            return None;
        }
        self.boundaries
            .windows(2)
            .position(|w| value < w[1])
            .or(Some(self.bucket_count().saturating_sub(1)))
    }

    /// Legend labels, one per bucket
    pub fn labels(&self) -> Vec<String> {
        self.boundaries
            .windows(2)
            .map(|w| format!("{} – {}", format_value(w[0]), format_value(w[1])))
            .collect()
    }
}

/// Digits in the decimal representation of a non-negative integer value
fn decimal_digits(value: f64) -> u32 {
    format!("{:.0}", value.abs()).len() as u32
}

/// Human readable value for legends and tooltips
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else if value.abs() >= 100.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}
