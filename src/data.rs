use crate::config::RegionConfig;
use crate::types::{MeasurementRecord, RegionFeature};
use anyhow::{anyhow, bail, Context, Result};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use shapefile::Reader;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Both halves of a region's data. Only exists once both loads succeeded.
#[derive(Debug, Clone)]
pub struct RegionData {
    pub features: Vec<RegionFeature>,
    pub records: Vec<MeasurementRecord>,
}

/// Loads the boundary collection and the measurement table concurrently and
/// joins them. Either failure fails the whole region.
pub async fn load_region(region: &RegionConfig) -> Result<RegionData> {
    info!(region = %region.key, "Loading boundaries and measurements");

    let boundaries_path = region.boundaries.clone();
    let name_property = region.name_property.clone();
    let boundaries = tokio::task::spawn_blocking(move || load_boundaries(&boundaries_path, &name_property));

    let table = MeasurementColumns::from(region);
    let measurements_path = region.measurements.clone();
    let measurements = tokio::task::spawn_blocking(move || load_measurements(&measurements_path, &table));

    let (features, records) = tokio::try_join!(finish(boundaries), finish(measurements))
        .with_context(|| format!("Failed to load region '{}'", region.key))?;

    info!(
        region = %region.key,
        features = features.len(),
        records = records.len(),
        "Region data ready"
    );
    Ok(RegionData { features, records })
}

async fn finish<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    handle.await.context("Loader task did not complete")?
}

fn extension_of(path: &Path) -> Result<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input file has no extension: {:?}", path))
}

pub fn load_boundaries(path: &Path, name_property: &str) -> Result<Vec<RegionFeature>> {
    let features = match extension_of(path)?.as_str() {
        "shp" => load_shapefile(path, name_property)?,
        "json" | "geojson" => load_geojson(path, name_property)?,
        other => return Err(anyhow!("Unsupported geometry format: {}", other)),
    };

    if features.is_empty() {
        bail!("No polygon features with a '{}' property in {:?}", name_property, path);
    }

    // shapes are joined to data by name, so a repeated name would hide one outline
    let mut seen = HashSet::with_capacity(features.len());
    for f in &features {
        if !seen.insert(f.id.as_str()) {
            bail!("Duplicate feature '{}' in {:?}", f.id, path);
        }
    }
    Ok(features)
}

fn load_shapefile(path: &Path, name_property: &str) -> Result<Vec<RegionFeature>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut features = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let name = match record.get(name_property) {
            Some(shapefile::dbase::FieldValue::Character(Some(s))) => s.trim().to_string(),
            Some(shapefile::dbase::FieldValue::Character(None)) => continue,
            Some(_) => return Err(anyhow!("Shapefile name column '{}' must be a string", name_property)),
            None => return Err(anyhow!("Name column '{}' not found in Shapefile", name_property)),
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => {
                warn!(%name, "Skipping non-polygon shape");
                continue;
            }
        };

        features.push(RegionFeature::new(name, geometry));
    }

    Ok(features)
}

fn load_geojson(path: &Path, name_property: &str) -> Result<Vec<RegionFeature>> {
    use geojson::GeoJson;

    let file = File::open(path).with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let geojson = GeoJson::from_reader(BufReader::new(file)).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut features = Vec::new();

    for feature in collection.features {
        let name = match feature.properties.as_ref().and_then(|props| props.get(name_property)) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                warn!(property = name_property, "Skipping feature without a name");
                continue;
            }
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let geo_geom: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geometry of '{}': {:?}", name, e))?;

                match geo_geom {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => {
                        warn!(%name, "Skipping non-polygon feature");
                        continue;
                    }
                }
            }
            None => {
                warn!(%name, "Skipping feature without geometry");
                continue;
            }
        };

        features.push(RegionFeature::new(name, geometry));
    }

    Ok(features)
}

/// Column names of a region's measurement table.
#[derive(Debug, Clone)]
pub struct MeasurementColumns {
    pub region: String,
    pub value: String,
}

impl From<&RegionConfig> for MeasurementColumns {
    fn from(region: &RegionConfig) -> Self {
        Self {
            region: region.region_field.clone(),
            value: region.value_field.clone(),
        }
    }
}

pub fn load_measurements(path: &Path, columns: &MeasurementColumns) -> Result<Vec<MeasurementRecord>> {
    let records = match extension_of(path)?.as_str() {
        "json" => load_json_table(path, columns)?,
        "csv" => load_csv_table(path, columns)?,
        other => return Err(anyhow!("Unsupported measurement format: {}", other)),
    };

    reject_duplicates(&records).with_context(|| format!("Invalid measurement table: {:?}", path))?;
    Ok(records)
}

fn load_json_table(path: &Path, columns: &MeasurementColumns) -> Result<Vec<MeasurementRecord>> {
    let file = File::open(path).with_context(|| format!("Failed to open JSON file: {:?}", path))?;
    let rows: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse JSON table: {:?}", path))?;

    let mut records = Vec::with_capacity(rows.len());

    for (line, row) in rows.iter().enumerate() {
        let year = match row.get("year") {
            Some(serde_json::Value::Number(n)) => n.as_i64(),
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
        .and_then(|y| i32::try_from(y).ok())
        .ok_or_else(|| anyhow!("Row {} has no numeric 'year'", line))?;

        let region = match row.get(&columns.region) {
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => return Err(anyhow!("Row {} has no '{}' name", line, columns.region)),
        };

        let value = row
            .get(&columns.value)
            .and_then(serde_json::Value::as_f64)
            .filter(|v| v.is_finite());
        let Some(value) = value else {
            warn!(row = line, %region, year, "Skipping row without a numeric value");
            continue;
        };

        records.push(MeasurementRecord { year, region, value });
    }

    Ok(records)
}

fn load_csv_table(path: &Path, columns: &MeasurementColumns) -> Result<Vec<MeasurementRecord>> {
    let file = File::open(path).with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    let headers = rdr.headers()?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("Column '{}' not found in CSV", name))
    };
    let year_idx = column("year")?;
    let region_idx = column(&columns.region)?;
    let value_idx = column(&columns.value)?;

    let mut records = Vec::new();

    for (line, result) in rdr.records().enumerate() {
        let record = result?;

        let year: i32 = record
            .get(year_idx)
            .unwrap_or("")
            .parse()
            .with_context(|| format!("Row {} has no numeric 'year'", line))?;
        let region = record.get(region_idx).unwrap_or("").to_string();
        if region.is_empty() {
            continue;
        }

        let value = record
            .get(value_idx)
            .unwrap_or("")
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite());
        let Some(value) = value else {
            warn!(row = line, %region, year, "Skipping row without a numeric value");
            continue;
        };

        records.push(MeasurementRecord { year, region, value });
    }

    Ok(records)
}

fn reject_duplicates(records: &[MeasurementRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for r in records {
        if !seen.insert((r.year, r.region.as_str())) {
            bail!("Duplicate record for '{}' in {}", r.region, r.year);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectionKind;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    const COUNTIES: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        { "type": "Feature", "properties": { "name": "Mono" },
          "geometry": { "type": "Polygon", "coordinates": [[[-119.6,37.5],[-118.5,37.5],[-118.5,38.7],[-119.6,38.7],[-119.6,37.5]]] } },
        { "type": "Feature", "properties": { "name": "Riverside" },
          "geometry": { "type": "MultiPolygon", "coordinates": [[[[-117.7,33.4],[-114.4,33.4],[-114.4,34.1],[-117.7,34.1],[-117.7,33.4]]]] } },
        { "type": "Feature", "properties": { "code": 7 },
          "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]] } },
        { "type": "Feature", "properties": { "name": "Pin" },
          "geometry": { "type": "Point", "coordinates": [0, 0] } }
      ]
    }"#;

    fn region(dir: &TempDir, boundaries: &str, measurements: &str) -> RegionConfig {
        RegionConfig {
            key: "ca".to_string(),
            title_prefix: "California Wet Bulb Temperature In: ".to_string(),
            stats_label: "California".to_string(),
            boundaries: dir.path().join(boundaries),
            measurements: dir.path().join(measurements),
            name_property: "name".to_string(),
            region_field: "county".to_string(),
            value_field: "wetbulb_C".to_string(),
            baseline_year: 2020,
            projection: ProjectionKind::Mercator,
            omit_first_year_step: true,
            captions: BTreeMap::new(),
        }
    }

    #[test]
    fn geojson_keeps_named_polygons_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counties.geojson");
        fs::write(&path, COUNTIES).unwrap();

        let features = load_boundaries(&path, "name").unwrap();
        let names: Vec<&str> = features.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(names, ["Mono", "Riverside"]);
        assert!(features.iter().all(|f| f.annotation.is_none()));
    }

    #[test]
    fn json_table_skips_null_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ca.json");
        fs::write(
            &path,
            r#"[{"year": 2020, "county": "Mono", "wetbulb_C": 12.83},
                {"year": 2020, "county": "Riverside", "wetbulb_C": null},
                {"year": "2016", "county": "Mono", "wetbulb_C": 12.1}]"#,
        )
        .unwrap();

        let columns = MeasurementColumns {
            region: "county".to_string(),
            value: "wetbulb_C".to_string(),
        };
        let records = load_measurements(&path, &columns).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].year, 2016);
    }

    #[test]
    fn csv_table_loads_and_rejects_duplicates() {
        let dir = TempDir::new().unwrap();
        let columns = MeasurementColumns {
            region: "state".to_string(),
            value: "wetbulb_C".to_string(),
        };

        let clean = dir.path().join("us.csv");
        fs::write(&clean, "year,state,wetbulb_C\n2016,Texas,25.49\n2016,Alaska,11.97\n2028,Alaska,13.56\n").unwrap();
        let records = load_measurements(&clean, &columns).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].region, "Texas");

        let doubled = dir.path().join("dup.csv");
        fs::write(&doubled, "year,state,wetbulb_C\n2016,Texas,25.49\n2016,Texas,25.5\n").unwrap();
        assert!(load_measurements(&doubled, &columns).is_err());
    }

    #[test]
    fn csv_non_finite_values_count_as_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("us.csv");
        fs::write(&path, "year,state,wetbulb_C\n2016,Texas,25.49\n2016,Alaska,NaN\n2016,Hawaii,inf\n").unwrap();

        let columns = MeasurementColumns {
            region: "state".to_string(),
            value: "wetbulb_C".to_string(),
        };
        let records = load_measurements(&path, &columns).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].region, "Texas");
    }

    #[test]
    fn repeated_feature_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("counties.geojson");
        let doubled = COUNTIES.replace(r#""name": "Riverside""#, r#""name": "Mono""#);
        fs::write(&path, doubled).unwrap();

        let err = load_boundaries(&path, "name").unwrap_err();
        assert!(err.to_string().contains("Duplicate feature 'Mono'"));
    }

    #[test]
    fn missing_shapefile_names_the_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("states.shp");

        let err = load_boundaries(&path, "NAME").unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Failed to open Shapefile"));
        assert!(message.contains("states.shp"));
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let columns = MeasurementColumns {
            region: "state".to_string(),
            value: "v".to_string(),
        };
        assert!(load_measurements(Path::new("table.xlsx"), &columns).is_err());
        assert!(load_boundaries(Path::new("shapes.kml"), "NAME").is_err());
    }

    #[tokio::test]
    async fn region_loads_once_both_halves_arrive() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("counties.geojson"), COUNTIES).unwrap();
        fs::write(
            dir.path().join("ca.json"),
            r#"[{"year": 2020, "county": "Mono", "wetbulb_C": 12.83}]"#,
        )
        .unwrap();

        let data = load_region(&region(&dir, "counties.geojson", "ca.json")).await.unwrap();
        assert_eq!(data.features.len(), 2);
        assert_eq!(data.records.len(), 1);
    }

    #[tokio::test]
    async fn missing_half_surfaces_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("counties.geojson"), COUNTIES).unwrap();

        let err = load_region(&region(&dir, "counties.geojson", "missing.json"))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("missing.json"));
    }
}
