use crate::classify::{Bin, BinScale, Rgb};
use crate::index::YearIndex;
use crate::tooltip::TooltipContent;
use crate::types::{Annotation, RegionFeature};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Styling of one region for one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionStyle {
    pub region: String,
    pub value: Option<f64>,
    pub bin: Bin,
    pub color: Rgb,
    pub tooltip: TooltipContent,
}

/// Everything a drawing surface needs to show one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderResult {
    pub year: i32,
    pub regions: Vec<RegionStyle>,
}

impl RenderResult {
    pub fn region(&self, id: &str) -> Option<&RegionStyle> {
        self.regions.iter().find(|r| r.region == id)
    }
}

/// Joins a year's measurements onto the feature set.
///
/// Returns `None` when the year is not indexed. Every feature gets an entry,
/// with `None` as its value when the year has no record for it. If a region
/// appears twice in the year, the later record wins.
pub fn render_frame(
    index: &YearIndex,
    features: &[RegionFeature],
    scale: &BinScale,
    baseline_year: i32,
    year: i32,
) -> Option<RenderResult> {
    let records = index.get(year)?;

    let values: HashMap<&str, f64> = records
        .iter()
        .map(|r| (r.region.as_str(), r.value))
        .collect();

    let regions = features
        .iter()
        .map(|feature| {
            let value = values.get(feature.id.as_str()).copied();
            let bin = scale.classify(value);
            let baseline = index.value_for(baseline_year, &feature.id);
            RegionStyle {
                region: feature.id.clone(),
                value,
                bin,
                color: scale.color(bin),
                tooltip: TooltipContent::new(&feature.id, year, value, baseline_year, baseline),
            }
        })
        .collect();

    Some(RenderResult { year, regions })
}

/// The feature set of one map together with its last rendered year.
pub struct Choropleth {
    index: Arc<YearIndex>,
    features: Vec<RegionFeature>,
    scale: BinScale,
    baseline_year: i32,
    current: Option<RenderResult>,
}

impl Choropleth {
    pub fn new(index: Arc<YearIndex>, features: Vec<RegionFeature>, scale: BinScale, baseline_year: i32) -> Self {
        Self {
            index,
            features,
            scale,
            baseline_year,
            current: None,
        }
    }

    /// Renders `year` and annotates every feature with the result.
    ///
    /// An unknown year leaves the previous frame and annotations in place and
    /// returns `None`.
    pub fn render(&mut self, year: i32) -> Option<&RenderResult> {
        let Some(frame) = render_frame(&self.index, &self.features, &self.scale, self.baseline_year, year) else {
            debug!(year, "Year not indexed, keeping previous frame");
            return None;
        };

        for (feature, style) in self.features.iter_mut().zip(&frame.regions) {
            feature.annotation = Some(Annotation {
                value: style.value,
                bin: style.bin,
                year,
            });
        }

        self.current = Some(frame);
        self.current.as_ref()
    }

    pub fn current(&self) -> Option<&RenderResult> {
        self.current.as_ref()
    }

    pub fn features(&self) -> &[RegionFeature] {
        &self.features
    }

    pub fn scale(&self) -> &BinScale {
        &self.scale
    }

    pub fn baseline_year(&self) -> i32 {
        self.baseline_year
    }
}
