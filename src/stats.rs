use crate::types::{Indicator, RegionRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSummary {
    pub indicator: Indicator,
    /// None when no region has a measured value for this indicator.
    pub mean: Option<f64>,
    pub measured: usize,
}

/// Per-indicator averages over measured values only; coerced zeros with the
/// missing flag stay out of the numerator and the divisor.
pub fn summarize(records: &[RegionRecord]) -> Vec<IndicatorSummary> {
    Indicator::ALL.iter()
        .map(|indicator| {
            let measured: Vec<f64> = records.iter()
                .filter_map(|r| r.rates.get(indicator).filter(|v| !v.missing).map(|v| v.value))
                .collect();
            IndicatorSummary {
                indicator: *indicator,
                mean: if measured.is_empty() {
                    None
                } else {
                    Some(measured.iter().sum::<f64>() / measured.len() as f64)
                },
                measured: measured.len(),
            }
        })
        .collect()
}
