use crate::classify::Bin;
use geo::MultiPolygon;
use serde::Serialize;

/// One row of a measurement table: a region's wet-bulb temperature for a year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    pub year: i32,
    pub region: String, // county or state name
    pub value: f64,     // wet-bulb temperature, Celsius
}

/// Last rendered state of a feature. Overwritten on every render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Annotation {
    pub value: Option<f64>,
    pub bin: Bin,
    pub year: i32,
}

#[derive(Debug, Clone)]
pub struct RegionFeature {
    pub id: String,
    pub geometry: MultiPolygon<f64>,
    pub annotation: Option<Annotation>,
}

impl RegionFeature {
    pub fn new(id: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            id: id.into(),
            geometry,
            annotation: None,
        }
    }
}
