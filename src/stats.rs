use crate::index::YearIndex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearSummary {
    pub year: i32,
    pub mean: f64,
}

/// Mean value over a year's records. `None` when the year has no records.
pub fn summarize(index: &YearIndex, year: i32) -> Option<YearSummary> {
    let records = index.get(year).filter(|r| !r.is_empty())?;
    let mean = records.iter().map(|r| r.value).sum::<f64>() / records.len() as f64;
    Some(YearSummary { year, mean })
}

/// The mean is rounded only here, from its exact binary value, so 0.15 reads "0.1".
pub fn sentence(label: &str, summary: &YearSummary) -> String {
    format!(
        "In {}, {}'s average Wet-Bulb Temperature is {:.1}°C.",
        summary.year, label, summary.mean
    )
}

/// The text slot under a map that reports the active year's average.
#[derive(Debug, Clone)]
pub struct StatsPanel {
    label: String,
    text: String,
}

impl StatsPanel {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: String::new(),
        }
    }

    /// Rewrites the text for `year`, or leaves it alone if the year is empty.
    pub fn update(&mut self, index: &YearIndex, year: i32) -> bool {
        match summarize(index, year) {
            Some(summary) => {
                self.text = sentence(&self.label, &summary);
                true
            }
            None => false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
