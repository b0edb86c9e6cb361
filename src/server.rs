use crate::classify::BinScale;
use crate::config::{AppConfig, RegionConfig};
use crate::data::RegionData;
use crate::index::YearIndex;
use crate::render::{render_frame, RenderResult};
use crate::stats::{sentence, summarize};
use crate::tooltip::TooltipContent;
use crate::types::RegionFeature;
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use geo::algorithm::contains::Contains;
use geo::bounding_rect::BoundingRect;
use geo::Point;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

// Wrapper for RTree indexing
pub struct FeatureIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for FeatureIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Read-only view of one loaded region.
pub struct RegionContext {
    pub config: RegionConfig,
    pub index: YearIndex,
    pub features: Vec<RegionFeature>,
    pub tree: RTree<FeatureIndex>,
}

impl RegionContext {
    pub fn new(config: RegionConfig, data: RegionData) -> Self {
        let items: Vec<FeatureIndex> = data
            .features
            .iter()
            .enumerate()
            .filter_map(|(i, f)| {
                let rect = f.geometry.bounding_rect()?;
                Some(FeatureIndex {
                    index: i,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        Self {
            config,
            index: YearIndex::from_records(data.records),
            features: data.features,
            tree: RTree::bulk_load(items),
        }
    }

    /// Feature whose outline contains the given coordinate.
    pub fn feature_at(&self, lon: f64, lat: f64) -> Option<&RegionFeature> {
        let point = Point::new(lon, lat);
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([lon, lat]))
            .filter_map(|candidate| self.features.get(candidate.index))
            .find(|feature| feature.geometry.contains(&point))
    }

    pub fn frame(&self, scale: &BinScale, year: i32) -> Option<RenderResult> {
        render_frame(&self.index, &self.features, scale, self.config.baseline_year, year)
    }

    pub fn hover(&self, year: i32, lon: f64, lat: f64) -> Option<TooltipContent> {
        let feature = self.feature_at(lon, lat)?;
        self.index.get(year)?;
        Some(TooltipContent::new(
            &feature.id,
            year,
            self.index.value_for(year, &feature.id),
            self.config.baseline_year,
            self.index.value_for(self.config.baseline_year, &feature.id),
        ))
    }
}

pub struct AppState {
    pub regions: HashMap<String, RegionContext>,
    pub scale: BinScale,
}

#[derive(Serialize)]
pub struct RegionSummary {
    key: String,
    title: String,
    years: Vec<i32>,
}

#[derive(Deserialize)]
pub struct HoverParams {
    year: i32,
    lat: f64,
    lon: f64,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/regions", get(regions_handler))
        .route("/api/regions/:key/frame/:year", get(frame_handler))
        .route("/api/regions/:key/stats/:year", get(stats_handler))
        .route("/api/regions/:key/hover", get(hover_handler))
        .with_state(state)
}

pub async fn start_server(config: AppConfig, regions: Vec<(RegionConfig, RegionData)>) -> Result<()> {
    info!("Building spatial indexes for API...");
    let regions = regions
        .into_iter()
        .map(|(region, data)| (region.key.clone(), RegionContext::new(region, data)))
        .collect();

    let state = Arc::new(AppState {
        regions,
        scale: config.bin_scale()?,
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let app = router(state)
        .fallback_service(ServeDir::new(&config.output.site_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn regions_handler(State(state): State<Arc<AppState>>) -> Json<Vec<RegionSummary>> {
    let mut regions: Vec<RegionSummary> = state
        .regions
        .values()
        .map(|r| RegionSummary {
            key: r.config.key.clone(),
            title: r.config.title_prefix.trim_end().trim_end_matches(':').to_string(),
            years: r.index.years(),
        })
        .collect();
    regions.sort_by(|a, b| a.key.cmp(&b.key));
    Json(regions)
}

async fn frame_handler(
    State(state): State<Arc<AppState>>,
    Path((key, year)): Path<(String, i32)>,
) -> Json<Option<RenderResult>> {
    Json(state.regions.get(&key).and_then(|r| r.frame(&state.scale, year)))
}

async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Path((key, year)): Path<(String, i32)>,
) -> Json<Option<String>> {
    Json(state.regions.get(&key).and_then(|r| {
        summarize(&r.index, year).map(|s| sentence(&r.config.stats_label, &s))
    }))
}

async fn hover_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<HoverParams>,
) -> Json<Option<TooltipContent>> {
    Json(
        state
            .regions
            .get(&key)
            .and_then(|r| r.hover(params.year, params.lon, params.lat)),
    )
}
