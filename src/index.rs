use crate::types::MeasurementRecord;
use std::collections::BTreeMap;

/// Measurement records grouped by year. Built once after load.
#[derive(Debug, Clone, Default)]
pub struct YearIndex {
    by_year: BTreeMap<i32, Vec<MeasurementRecord>>,
}

impl YearIndex {
    /// Groups records by year, keeping their input order inside each year.
    pub fn from_records(records: Vec<MeasurementRecord>) -> Self {
        let mut by_year: BTreeMap<i32, Vec<MeasurementRecord>> = BTreeMap::new();
        for record in records {
            by_year.entry(record.year).or_default().push(record);
        }
        Self { by_year }
    }

    /// Distinct years, ascending.
    pub fn years(&self) -> Vec<i32> {
        self.by_year.keys().copied().collect()
    }

    pub fn first_year(&self) -> Option<i32> {
        self.by_year.keys().next().copied()
    }

    pub fn get(&self, year: i32) -> Option<&[MeasurementRecord]> {
        self.by_year.get(&year).map(Vec::as_slice)
    }

    pub fn record_count(&self) -> usize {
        self.by_year.values().map(Vec::len).sum()
    }

    /// Value of `region` in `year`. The last matching record wins.
    pub fn value_for(&self, year: i32, region: &str) -> Option<f64> {
        self.get(year)?
            .iter()
            .rev()
            .find(|r| r.region == region)
            .map(|r| r.value)
    }
}
