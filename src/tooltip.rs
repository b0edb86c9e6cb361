//! Hover tooltip: what it says and where it sits.

use serde::Serialize;
use std::fmt;

/// Offset between the pointer and the tooltip's top-left corner, in pixels.
pub const POINTER_OFFSET: f64 = 15.0;

/// Comparison of a region's current value against a fixed baseline year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TooltipContent {
    pub name: String,
    pub year: i32,
    pub value: Option<f64>,
    pub baseline_year: i32,
    pub baseline_value: Option<f64>,
    pub difference: Option<f64>,
}

impl TooltipContent {
    pub fn new(
        name: impl Into<String>,
        year: i32,
        value: Option<f64>,
        baseline_year: i32,
        baseline_value: Option<f64>,
    ) -> Self {
        let difference = match (value, baseline_value) {
            (Some(v), Some(b)) => Some(v - b),
            _ => None,
        };
        Self {
            name: name.into(),
            year,
            value,
            baseline_year,
            baseline_value,
            difference,
        }
    }

    pub fn lines(&self) -> [String; 5] {
        [
            self.name.clone(),
            format!("Year: {}", self.year),
            format!("Wet-Bulb Temp: {}", celsius(self.value)),
            format!("{} Temp: {}", self.baseline_year, celsius(self.baseline_value)),
            format!("Difference: {}", celsius(self.difference)),
        ]
    }
}

impl fmt::Display for TooltipContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines().join("\n"))
    }
}

fn celsius(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}°C", v),
        None => "N/A".to_string(),
    }
}

/// Visibility, content and position of the single tooltip element.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TooltipState {
    pub visible: bool,
    pub content: Option<TooltipContent>,
    pub left: f64,
    pub top: f64,
}

impl TooltipState {
    pub fn pointer_enter(&mut self, content: TooltipContent) {
        self.visible = true;
        self.content = Some(content);
    }

    pub fn pointer_move(&mut self, x: f64, y: f64) {
        self.left = x + POINTER_OFFSET;
        self.top = y + POINTER_OFFSET;
    }

    /// Hides the tooltip. The last content stays around for the next show.
    pub fn pointer_leave(&mut self) {
        self.visible = false;
    }
}
