use crate::classify::BinScale;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub classification: ClassificationConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub scroll: ScrollConfig,
    pub regions: Vec<RegionConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassificationConfig {
    pub thresholds: Vec<f64>,
    pub colors: Vec<String>, // Hex codes, one more than thresholds
    pub no_data_color: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub site_dir: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

/// Page geometry used to place narrative steps along the document.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScrollConfig {
    pub offset: f64, // fraction of the viewport height
    pub viewport_height: f64,
    pub spacer_height: f64,
    pub step_pitch: f64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            offset: 0.5,
            viewport_height: 900.0,
            spacer_height: 200.0,
            step_pitch: 400.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionKind {
    Mercator,
    AlbersUsa,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegionConfig {
    pub key: String,
    pub title_prefix: String,
    pub stats_label: String,
    pub boundaries: PathBuf,
    pub measurements: PathBuf,
    pub name_property: String, // `name` for counties, `NAME` for states
    pub region_field: String,
    pub value_field: String,
    pub baseline_year: i32,
    pub projection: ProjectionKind,
    #[serde(default)]
    pub omit_first_year_step: bool,
    #[serde(default)]
    pub captions: BTreeMap<String, String>, // keyed by year
}

impl RegionConfig {
    pub fn caption(&self, year: i32) -> &str {
        self.captions
            .get(&year.to_string())
            .map(String::as_str)
            .unwrap_or("")
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn bin_scale(&self) -> Result<BinScale> {
        let c = &self.classification;
        BinScale::new(c.thresholds.clone(), &c.colors, &c.no_data_color)
            .context("Invalid classification settings")
    }

    fn validate(&self) -> Result<()> {
        self.bin_scale()?;

        let mut keys = HashSet::new();
        for region in &self.regions {
            if !keys.insert(region.key.as_str()) {
                bail!("Duplicate region key: {}", region.key);
            }
            for year in region.captions.keys() {
                year.parse::<i32>()
                    .with_context(|| format!("Caption key '{}' in region '{}' is not a year", year, region.key))?;
            }
        }

        let s = &self.scroll;
        if !(0.0..=1.0).contains(&s.offset) {
            bail!("Scroll offset must be within 0..=1, found {}", s.offset);
        }
        if s.viewport_height <= 0.0 {
            bail!("Viewport height must be positive");
        }
        if s.step_pitch < 1.0 {
            bail!("Step pitch must be at least 1px, found {}", s.step_pitch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
[classification]
thresholds = [10, 14, 18, 22, 26, 30, 32]
colors = ["#FDFDFD", "#FCF0DA", "#F5CA98", "#E8885A", "#BF3B23", "#801B0A", "#000000", "#000000"]
no_data_color = "#CCCCCC"

[output]
site_dir = "site"
width = 600
height = 700

[server]
port = 3000

[[regions]]
key = "ca"
title_prefix = "California Wet Bulb Temperature In: "
stats_label = "California"
boundaries = "data/california-counties.geojson"
measurements = "data/wetbulb_max_ca.json"
name_property = "name"
region_field = "county"
value_field = "wetbulb_C"
baseline_year = 2020
projection = "mercator"
omit_first_year_step = true

[regions.captions]
"2020" = "Riverside leads."

[[regions]]
key = "us"
title_prefix = "United States Wet Bulb Temperature In: "
stats_label = "the United States"
boundaries = "data/us-states.json"
measurements = "data/wetbulb_max_us.json"
name_property = "NAME"
region_field = "state"
value_field = "wetbulb_C"
baseline_year = 2016
projection = "albers_usa"
"##;

    #[test]
    fn parses_sample_configuration() {
        let config: AppConfig = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.regions.len(), 2);
        assert_eq!(config.scroll.offset, 0.5);
        assert_eq!(config.regions[1].projection, ProjectionKind::AlbersUsa);
        assert!(!config.regions[1].omit_first_year_step);
        assert_eq!(config.regions[0].caption(2020), "Riverside leads.");
        assert_eq!(config.regions[0].caption(2028), "");
    }

    #[test]
    fn rejects_duplicate_region_keys() {
        let doubled = SAMPLE.replace("key = \"us\"", "key = \"ca\"");
        let config: AppConfig = toml::from_str(&doubled).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_short_palette() {
        let short = SAMPLE.replace(", \"#000000\", \"#000000\"]", ", \"#000000\"]");
        let config: AppConfig = toml::from_str(&short).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_sub_pixel_step_pitch() {
        let tight = format!("{}\n[scroll]\nstep_pitch = 0.25\n", SAMPLE);
        let config: AppConfig = toml::from_str(&tight).unwrap();
        assert!(config.validate().is_err());
    }
}
