//! Code for timestamp-indexed usage series.
use crate::units::Energy;
use anyhow::{Context, Result, anyhow, ensure};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::path::Path;

/// Accepted timestamp formats for usage records read from CSV
const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// A usage record read from a CSV file
#[derive(PartialEq, Debug, Deserialize)]
struct UsageRecord {
    timestamp: String,
    kwh: f64,
}

/// A timestamp-indexed series of energy readings in kWh.
///
/// Construction does not validate; every calculation entry point calls
/// [`UsageSeries::validate`] before computing anything, so invalid series are rejected
/// whole, with no partial results. Series are read-only inputs to calculations; operations
/// that adjust usage return a fresh series.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct UsageSeries {
    timestamps: Vec<NaiveDateTime>,
    values: Vec<Energy>,
}

impl UsageSeries {
    /// Create a series from (timestamp, kWh) pairs
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDateTime, f64)>,
    {
        let (timestamps, values) = pairs
            .into_iter()
            .map(|(ts, kwh)| (ts, Energy(kwh)))
            .unzip();
        Self { timestamps, values }
    }

    /// Create a series from parallel timestamp and value columns
    pub fn from_parts(timestamps: Vec<NaiveDateTime>, values: Vec<Energy>) -> Result<Self> {
        ensure!(
            timestamps.len() == values.len(),
            "Usage timestamps and values must have the same length"
        );
        Ok(Self { timestamps, values })
    }

    /// Read a series from a CSV file with `timestamp` and `kwh` columns.
    ///
    /// # Arguments
    ///
    /// * `file_path` - Path to the CSV file
    pub fn from_csv_file(file_path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(file_path)
            .with_context(|| format!("Error reading {}", file_path.to_string_lossy()))?;

        let mut pairs = Vec::new();
        for record in reader.deserialize() {
            let record: UsageRecord =
                record.with_context(|| format!("Error reading {}", file_path.to_string_lossy()))?;
            let timestamp = parse_timestamp(&record.timestamp)
                .with_context(|| format!("Error reading {}", file_path.to_string_lossy()))?;
            pairs.push((timestamp, record.kwh));
        }

        Ok(Self::from_pairs(pairs))
    }

    /// The number of readings
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the series has no readings
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// The timestamp column
    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    /// The value column
    pub fn values(&self) -> &[Energy] {
        &self.values
    }

    /// Iterate over (timestamp, value) pairs
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, Energy)> + '_ {
        self.timestamps
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }

    /// Total usage over the whole series
    pub fn total(&self) -> Energy {
        self.values.iter().copied().sum()
    }

    /// Check the invariants every series must satisfy before entering a calculation.
    ///
    /// Rejects NaN, negative and non-finite values and a decreasing timestamp index.
    /// Duplicate timestamps are permitted.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.timestamps.len() == self.values.len(),
            "Usage timestamps and values must have the same length"
        );
        for value in &self.values {
            ensure!(
                !value.value().is_nan(),
                "Usage series contains NaN values"
            );
            ensure!(
                value.value() >= 0.0,
                "Usage values must be non-negative"
            );
            ensure!(
                value.value().is_finite(),
                "Usage series contains non-finite values"
            );
        }
        ensure!(
            self.timestamps.windows(2).all(|pair| pair[0] <= pair[1]),
            "Usage timestamps must be ordered"
        );
        Ok(())
    }
}

/// Parse a timestamp in any of the accepted formats
fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| anyhow!("Invalid timestamp: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, timestamp};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_valid_series() {
        let series = UsageSeries::from_pairs([
            (timestamp(2025, 1, 1, 0, 0), 1.5),
            (timestamp(2025, 1, 1, 1, 0), 2.0),
            (timestamp(2025, 1, 1, 1, 0), 0.0), // duplicate timestamps are fine
        ]);
        series.validate().unwrap();
        assert_approx_eq!(f64, series.total().value(), 3.5);
    }

    #[rstest]
    #[case(f64::NAN, "Usage series contains NaN values")]
    #[case(-1.0, "Usage values must be non-negative")]
    #[case(f64::INFINITY, "Usage series contains non-finite values")]
    fn test_invalid_values(#[case] bad: f64, #[case] error_msg: &str) {
        let series = UsageSeries::from_pairs([
            (timestamp(2025, 1, 1, 0, 0), 1.0),
            (timestamp(2025, 1, 1, 1, 0), bad),
        ]);
        assert_error!(series.validate(), error_msg);
    }

    #[test]
    fn test_unordered_index_rejected() {
        let series = UsageSeries::from_pairs([
            (timestamp(2025, 1, 2, 0, 0), 1.0),
            (timestamp(2025, 1, 1, 0, 0), 1.0),
        ]);
        assert_error!(series.validate(), "Usage timestamps must be ordered");
    }

    #[test]
    fn test_from_parts_length_mismatch() {
        let result = UsageSeries::from_parts(vec![timestamp(2025, 1, 1, 0, 0)], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_csv_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("usage.csv");
        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(
                file,
                "timestamp,kwh
2025-01-01 00:00,1.5
2025-01-01T01:00:00,2.5"
            )
            .unwrap();
        }

        let series = UsageSeries::from_csv_file(&file_path).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.timestamps()[0], timestamp(2025, 1, 1, 0, 0));
        assert_approx_eq!(f64, series.total().value(), 4.0);
    }

    #[test]
    fn test_from_csv_file_bad_timestamp() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("usage.csv");
        {
            let mut file = File::create(&file_path).unwrap();
            writeln!(file, "timestamp,kwh\nnot-a-date,1.0").unwrap();
        }
        assert!(UsageSeries::from_csv_file(&file_path).is_err());
    }
}
