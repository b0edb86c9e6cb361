use crate::classify::{BinScale, LegendEntry};
use crate::config::{OutputConfig, RegionConfig, ScrollConfig};
use crate::data::RegionData;
use crate::index::YearIndex;
use crate::render::{render_frame, Choropleth};
use crate::scroll::{build_steps, ScrollController, ScrollStep, StepLayout};
use crate::stats::StatsPanel;
use crate::surface::{DrawingSurface, JoinSummary, Projection, SvgSurface};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// What the page shows after a step change.
#[derive(Debug, Clone, Serialize)]
pub struct StoryFrame {
    pub year: i32,
    pub step: Option<usize>,
    pub title: String,
    pub stats: String,
    pub join: JoinSummary,
    #[serde(skip)]
    pub svg: String,
}

/// A region's map, narrative steps, stats slot and year title, wired together.
/// Built only once both halves of the region's data are loaded.
pub struct RegionStory {
    key: String,
    title_prefix: String,
    index: Arc<YearIndex>,
    map: Choropleth,
    surface: SvgSurface,
    scroller: ScrollController,
    stats: StatsPanel,
    title: String,
}

impl RegionStory {
    pub fn new(
        region: &RegionConfig,
        data: RegionData,
        scale: BinScale,
        output: &OutputConfig,
        scroll: &ScrollConfig,
    ) -> Self {
        let index = Arc::new(YearIndex::from_records(data.records));

        let projection = Projection::for_features(
            region.projection,
            &data.features,
            f64::from(output.width),
            f64::from(output.height),
        );
        let surface = SvgSurface::new(&data.features, &projection, output.width, output.height);

        let steps = build_steps(&index.years(), region.omit_first_year_step, |year| {
            region.caption(year).to_string()
        });
        let layout = StepLayout::uniform(steps.len(), scroll.spacer_height, scroll.step_pitch);
        let scroller = ScrollController::new(steps, layout, scroll.offset, scroll.viewport_height);

        info!(
            region = %region.key,
            years = index.years().len(),
            steps = scroller.steps().len(),
            "Story ready"
        );

        Self {
            key: region.key.clone(),
            title_prefix: region.title_prefix.clone(),
            map: Choropleth::new(index.clone(), data.features, scale, region.baseline_year),
            index,
            surface,
            scroller,
            stats: StatsPanel::new(&region.stats_label),
            title: region.title_prefix.clone(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn steps(&self) -> &[ScrollStep] {
        self.scroller.steps()
    }

    pub fn index(&self) -> &YearIndex {
        &self.index
    }

    pub fn legend(&self) -> Vec<LegendEntry> {
        self.map.scale().legend()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The state before any scrolling: earliest year drawn, title without a year.
    pub fn initial(&mut self) -> Option<StoryFrame> {
        let year = self.index.first_year()?;
        let join = self.draw(year)?;
        self.stats.update(&self.index, year);
        self.title = self.title_prefix.clone();
        Some(self.frame(year, None, join))
    }

    /// Feeds a scroll position; returns the new view when a step was entered.
    pub fn on_scroll(&mut self, scroll_y: f64) -> Option<StoryFrame> {
        let entered = self.scroller.on_scroll(scroll_y)?;
        debug!(region = %self.key, year = entered.year, direction = ?entered.direction, "Step entered");

        let join = self.draw(entered.year)?;
        self.stats.update(&self.index, entered.year);
        self.title = format!("{}{}", self.title_prefix, entered.year);
        Some(self.frame(entered.year, Some(entered.index), join))
    }

    /// Scrolls from where the first step triggers to past the last step and
    /// collects every view change along the way.
    ///
    /// The stride is capped at half the narrowest step so no step is jumped over.
    pub fn replay(&mut self, stride: f64) -> Vec<StoryFrame> {
        let mut frames: Vec<StoryFrame> = self.initial().into_iter().collect();

        let layout = self.scroller.layout();
        let Some(narrowest) = layout.boxes.iter().map(|b| b.height).reduce(f64::min) else {
            return frames;
        };
        let stride = stride.min(narrowest / 2.0).max(0.5);
        let end = layout.end();

        let mut y = self.scroller.scroll_position_for(0).unwrap_or(0.0).min(0.0);
        while y <= end {
            frames.extend(self.on_scroll(y));
            y += stride;
        }
        frames
    }

    /// Standalone SVG for one year, without touching the live map.
    pub fn year_svg(&self, year: i32) -> Option<String> {
        let frame = render_frame(
            &self.index,
            self.map.features(),
            self.map.scale(),
            self.map.baseline_year(),
            year,
        )?;
        let mut surface = self.surface.clone();
        surface.apply(&frame);
        Some(surface.to_svg())
    }

    fn draw(&mut self, year: i32) -> Option<JoinSummary> {
        let frame = self.map.render(year)?;
        Some(self.surface.apply(frame))
    }

    fn frame(&self, year: i32, step: Option<usize>, join: JoinSummary) -> StoryFrame {
        StoryFrame {
            year,
            step,
            title: self.title.clone(),
            stats: self.stats.text().to_string(),
            join,
            svg: self.surface.to_svg(),
        }
    }
}
