//! Value-to-bucket classification and the colour palette that goes with it.

use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use std::fmt;

/// Bucket a measurement falls into.
///
/// `Level(i)` is the half-open interval below threshold `i` (or the open-ended
/// top bucket when `i == thresholds.len()`). Missing values get their own
/// bucket so they never borrow the coolest colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum Bin {
    NoData,
    Level(usize),
}

/// Index of the first threshold strictly greater than `value`.
///
/// A value equal to a threshold lands in the bucket above it.
pub fn classify(value: Option<f64>, thresholds: &[f64]) -> Bin {
    match value {
        Some(v) if !v.is_nan() => Bin::Level(
            thresholds
                .iter()
                .position(|&b| v < b)
                .unwrap_or(thresholds.len()),
        ),
        _ => Bin::NoData,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(anyhow!("Invalid hex colour: {}", hex));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| anyhow!("Invalid hex colour: {}", hex))
        };
        Ok(Rgb {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: Rgb,
}

/// Thresholds paired 1:1 with a palette of `thresholds.len() + 1` colours.
#[derive(Debug, Clone)]
pub struct BinScale {
    thresholds: Vec<f64>,
    colors: Vec<Rgb>,
    no_data: Rgb,
}

impl BinScale {
    pub fn new(thresholds: Vec<f64>, colors: &[String], no_data: &str) -> Result<Self> {
        if thresholds.is_empty() {
            bail!("At least one bin threshold is required");
        }
        if thresholds.iter().any(|b| !b.is_finite()) {
            bail!("Bin thresholds must be finite numbers");
        }
        if thresholds.windows(2).any(|w| w[0] >= w[1]) {
            bail!("Bin thresholds must be strictly ascending: {:?}", thresholds);
        }
        if colors.len() != thresholds.len() + 1 {
            bail!(
                "Expected {} colours for {} thresholds, found {}",
                thresholds.len() + 1,
                thresholds.len(),
                colors.len()
            );
        }

        let colors = colors
            .iter()
            .map(|c| Rgb::from_hex(c))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            thresholds,
            colors,
            no_data: Rgb::from_hex(no_data)?,
        })
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    pub fn classify(&self, value: Option<f64>) -> Bin {
        classify(value, &self.thresholds)
    }

    pub fn color(&self, bin: Bin) -> Rgb {
        match bin {
            Bin::NoData => self.no_data,
            // Level is bounded by thresholds.len(), which is the last palette slot.
            Bin::Level(i) => self.colors[i.min(self.colors.len() - 1)],
        }
    }

    pub fn legend(&self) -> Vec<LegendEntry> {
        let t = &self.thresholds;
        let mut entries: Vec<LegendEntry> = (0..=t.len())
            .map(|i| {
                let label = if i == 0 {
                    format!("< {}", t[0])
                } else if i == t.len() {
                    format!("≥ {}", t[i - 1])
                } else {
                    format!("{} – {}", t[i - 1], t[i])
                };
                LegendEntry {
                    label,
                    color: self.colors[i],
                }
            })
            .collect();

        entries.push(LegendEntry {
            label: "No data".to_string(),
            color: self.no_data,
        });
        entries
    }
}
