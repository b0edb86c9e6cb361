use crate::config::ProjectionKind;
use crate::render::RenderResult;
use crate::types::RegionFeature;
use geo::{CoordsIter, LineString, MultiPolygon};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::f64::consts::{FRAC_PI_4, PI};
use std::fmt::Write;
use tracing::warn;

// Mercator is undefined at the poles
const MAX_MERCATOR_LAT: f64 = 85.0;

/// Conic equal-area projection in screen space (y grows downwards).
#[derive(Debug, Clone, Copy)]
pub struct Conic {
    n: f64,
    c: f64,
    r0: f64,
    rotate: f64, // degrees added to longitude
    cx: f64,
    cy: f64,
    scale: f64,
    tx: f64,
    ty: f64,
}

impl Conic {
    fn new(parallels: (f64, f64), rotate: f64, center: (f64, f64), scale: f64, tx: f64, ty: f64) -> Self {
        let sy0 = parallels.0.to_radians().sin();
        let n = (sy0 + parallels.1.to_radians().sin()) / 2.0;
        let c = 1.0 + sy0 * (2.0 * n - sy0);
        let r0 = c.sqrt() / n;
        let mut conic = Self { n, c, r0, rotate, cx: 0.0, cy: 0.0, scale, tx, ty };
        let (cx, cy) = conic.raw(center.0.to_radians(), center.1.to_radians());
        conic.cx = cx;
        conic.cy = cy;
        conic
    }

    fn raw(&self, lambda: f64, phi: f64) -> (f64, f64) {
        let r = (self.c - 2.0 * self.n * phi.sin()).max(0.0).sqrt() / self.n;
        let theta = lambda * self.n;
        (r * theta.sin(), self.r0 - r * theta.cos())
    }

    fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let mut lambda = (lon + self.rotate).to_radians();
        if lambda > PI {
            lambda -= 2.0 * PI;
        } else if lambda < -PI {
            lambda += 2.0 * PI;
        }
        let (x, y) = self.raw(lambda, lat.to_radians());
        (self.tx + self.scale * (x - self.cx), self.ty - self.scale * (y - self.cy))
    }
}

/// Maps longitude/latitude to surface pixels.
#[derive(Debug, Clone, Copy)]
pub enum Projection {
    /// Mercator fitted to the bounds of a feature set.
    Mercator { scale: f64, dx: f64, dy: f64 },
    /// Lower 48 with Alaska and Hawaii moved into insets.
    AlbersUsa { lower48: Conic, alaska: Conic, hawaii: Conic },
}

fn mercator_raw(lon: f64, lat: f64) -> (f64, f64) {
    let phi = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    (lon.to_radians(), -(FRAC_PI_4 + phi / 2.0).tan().ln())
}

impl Projection {
    pub fn for_features(kind: ProjectionKind, features: &[RegionFeature], width: f64, height: f64) -> Self {
        match kind {
            ProjectionKind::Mercator => Self::mercator_fit(features, width, height),
            ProjectionKind::AlbersUsa => Self::albers_usa(width, height),
        }
    }

    /// Mercator scaled and centred so the features fill `width` x `height`.
    pub fn mercator_fit(features: &[RegionFeature], width: f64, height: f64) -> Self {
        let (mut x0, mut y0, mut x1, mut y1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for coord in features.iter().flat_map(|f| f.geometry.coords_iter()) {
            let (x, y) = mercator_raw(coord.x, coord.y);
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        if x0 > x1 {
            return Projection::Mercator { scale: 1.0, dx: 0.0, dy: 0.0 };
        }

        let (w, h) = ((x1 - x0).max(f64::EPSILON), (y1 - y0).max(f64::EPSILON));
        let scale = (width / w).min(height / h);
        Projection::Mercator {
            scale,
            dx: (width - w * scale) / 2.0 - x0 * scale,
            dy: (height - h * scale) / 2.0 - y0 * scale,
        }
    }

    /// Composite Albers at the standard 1070 scale for a 960x500 surface,
    /// resized to fit the given surface.
    pub fn albers_usa(width: f64, height: f64) -> Self {
        let k = 1070.0 * (width / 960.0).min(height / 500.0);
        let (x, y) = (width / 2.0, height / 2.0);
        Projection::AlbersUsa {
            lower48: Conic::new((29.5, 45.5), 96.0, (-0.6, 38.7), k, x, y),
            alaska: Conic::new((55.0, 65.0), 154.0, (-2.0, 58.5), 0.35 * k, x - 0.307 * k, y + 0.201 * k),
            hawaii: Conic::new((8.0, 18.0), 157.0, (-3.0, 19.9), k, x - 0.205 * k, y + 0.212 * k),
        }
    }

    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Projection::Mercator { scale, dx, dy } => {
                let (x, y) = mercator_raw(lon, lat);
                (x * scale + dx, y * scale + dy)
            }
            Projection::AlbersUsa { lower48, alaska, hawaii } => {
                if lat > 50.0 && (lon < -129.0 || lon > 170.0) {
                    alaska.project(lon, lat)
                } else if lat < 24.0 && lon < -150.0 {
                    hawaii.project(lon, lat)
                } else {
                    lower48.project(lon, lat)
                }
            }
        }
    }
}

/// SVG path data for a multipolygon, one closed subpath per ring.
pub fn path_data(geometry: &MultiPolygon<f64>, projection: &Projection) -> String {
    let mut d = String::new();
    for polygon in geometry {
        push_ring(&mut d, polygon.exterior(), projection);
        for ring in polygon.interiors() {
            push_ring(&mut d, ring, projection);
        }
    }
    d
}

fn push_ring(d: &mut String, ring: &LineString<f64>, projection: &Projection) {
    for (i, coord) in ring.coords().enumerate() {
        let (x, y) = projection.project(coord.x, coord.y);
        let _ = write!(d, "{}{:.2},{:.2}", if i == 0 { "M" } else { "L" }, x, y);
    }
    if !ring.0.is_empty() {
        d.push('Z');
    }
}

pub(crate) fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Counts of shapes added, restyled and removed by one join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JoinSummary {
    pub entered: usize,
    pub updated: usize,
    pub exited: usize,
}

/// Something a rendered frame can be drawn onto.
pub trait DrawingSurface {
    /// Joins the frame's regions against the drawn shapes by region name.
    fn apply(&mut self, frame: &RenderResult) -> JoinSummary;
}

#[derive(Debug, Clone)]
struct Shape {
    fill: String,
    title: String,
}

/// In-memory SVG map. Outlines are projected once, fills change per frame.
#[derive(Debug, Clone)]
pub struct SvgSurface {
    width: u32,
    height: u32,
    outlines: HashMap<String, String>,
    shapes: BTreeMap<String, Shape>,
}

impl SvgSurface {
    pub fn new(features: &[RegionFeature], projection: &Projection, width: u32, height: u32) -> Self {
        let outlines = features
            .par_iter()
            .map(|f| (f.id.clone(), path_data(&f.geometry, projection)))
            .collect();

        Self {
            width,
            height,
            outlines,
            shapes: BTreeMap::new(),
        }
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn fill_of(&self, region: &str) -> Option<&str> {
        self.shapes.get(region).map(|s| s.fill.as_str())
    }

    pub fn to_svg(&self) -> String {
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height
        );
        svg.push('\n');
        for (id, shape) in &self.shapes {
            let d = self.outlines.get(id).map(String::as_str).unwrap_or("");
            let _ = writeln!(
                svg,
                r##"  <path data-region="{}" d="{}" fill="{}" stroke="#999" fill-rule="evenodd"><title>{}</title></path>"##,
                escape_xml(id),
                d,
                shape.fill,
                escape_xml(&shape.title)
            );
        }
        svg.push_str("</svg>\n");
        svg
    }
}

impl DrawingSurface for SvgSurface {
    fn apply(&mut self, frame: &RenderResult) -> JoinSummary {
        let mut summary = JoinSummary::default();

        for style in &frame.regions {
            let fill = style.color.to_string();
            let title = style.tooltip.to_string();
            if let Some(shape) = self.shapes.get_mut(&style.region) {
                shape.fill = fill;
                shape.title = title;
                summary.updated += 1;
            } else if self.outlines.contains_key(&style.region) {
                self.shapes.insert(style.region.clone(), Shape { fill, title });
                summary.entered += 1;
            } else {
                warn!(region = %style.region, "No outline for region, not drawn");
            }
        }

        let incoming: HashSet<&str> = frame.regions.iter().map(|r| r.region.as_str()).collect();
        let before = self.shapes.len();
        self.shapes.retain(|id, _| incoming.contains(id.as_str()));
        summary.exited = before - self.shapes.len();

        summary
    }
}
