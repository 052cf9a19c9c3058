use crate::data::{CategoryMapping, Dataset};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Population base for rate normalization
pub const PER_CAPITA_BASE: f64 = 100_000.0;

#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("unknown monument category '{0}'")]
    UnknownCategory(String),
}

/// How raw counts are turned into the displayed value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Function {
    /// Sum of the mapped subcategory counts
    #[default]
    Total,
    /// Sum per 100,000 inhabitants
    PerCapita,
}

impl Function {
    pub const ALL: [Function; 2] = [Function::Total, Function::PerCapita];

    pub fn label(self) -> &'static str {
        match self {
            Function::Total => "Totaal aantal",
            Function::PerCapita => "Aantal per 100.000 inwoners",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "total" => Some(Function::Total),
            "per-capita" | "rate" => Some(Function::PerCapita),
            _ => None,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-municipality value, index-aligned with `Dataset::municipalities`.
/// `None` marks municipalities without a meaningful value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DerivedMetric {
    pub values: Vec<Option<f64>>,
}

impl DerivedMetric {
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    /// Largest present value
    pub fn max(&self) -> Option<f64> {
        self.values.iter().flatten().copied().reduce(f64::max)
    }

    pub fn missing(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

/// Sum the subcategory columns mapped to `category` per municipality, then
/// apply `function`. Municipalities with a non-positive population get `None`
/// in per-capita mode.
pub fn aggregate(
    dataset: &Dataset,
    mapping: &CategoryMapping,
    category: &str,
    function: Function,
) -> Result<DerivedMetric, MetricError> {
    if !mapping.contains(category) {
        return Err(MetricError::UnknownCategory(category.to_string()));
    }
    let columns: Vec<&str> = mapping.columns_for(category).collect();

    let values = dataset
        .municipalities
        .iter()
        .map(|m| {
            let total: f64 = columns.iter().map(|c| m.count(c)).sum();
            match function {
                Function::Total => Some(total),
                Function::PerCapita => {
                    if m.population > 0.0 && m.population.is_finite() {
                        Some(total / m.population * PER_CAPITA_BASE)
                    } else {
                        warn!(municipality = %m.name, population = m.population, "skipping rate for municipality without population");
                        None
                    }
                }
            }
        })
        .collect();

    let metric = DerivedMetric { values };
    debug!(
        category,
        %function,
        columns = columns.len(),
        max = ?metric.max(),
        missing = metric.missing(),
        "aggregated category"
    );
    Ok(metric)
}
