//! Scroll-driven step activation.
//!
//! Each narrative step occupies a band of the document. A step becomes active
//! when its top edge crosses the trigger line, which sits `offset` of the way
//! down the viewport. Only changes of the active step are reported.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrollStep {
    pub year: i32,
    pub caption: String,
}

/// One step per indexed year, in year order. With `omit_first_year` the
/// earliest year gets no step and acts as the baseline shown before scrolling.
pub fn build_steps<F>(years: &[i32], omit_first_year: bool, caption: F) -> Vec<ScrollStep>
where
    F: Fn(i32) -> String,
{
    years
        .iter()
        .skip(usize::from(omit_first_year))
        .map(|&year| ScrollStep {
            year,
            caption: caption(year),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepBox {
    pub top: f64,
    pub height: f64,
}

/// Document position of every step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepLayout {
    pub boxes: Vec<StepBox>,
}

impl StepLayout {
    /// Steps stacked at a fixed pitch below a leading spacer.
    pub fn uniform(count: usize, spacer_height: f64, pitch: f64) -> Self {
        let boxes = (0..count)
            .map(|i| StepBox {
                top: spacer_height + i as f64 * pitch,
                height: pitch,
            })
            .collect();
        Self { boxes }
    }

    /// Bottom edge of the last step.
    pub fn end(&self) -> f64 {
        self.boxes.last().map(|b| b.top + b.height).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepEnter {
    pub index: usize,
    pub year: i32,
    pub direction: Direction,
}

pub struct ScrollController {
    steps: Vec<ScrollStep>,
    layout: StepLayout,
    offset: f64,
    viewport_height: f64,
    active: Option<usize>,
    last_scroll: Option<f64>,
}

impl ScrollController {
    pub fn new(steps: Vec<ScrollStep>, layout: StepLayout, offset: f64, viewport_height: f64) -> Self {
        debug_assert_eq!(steps.len(), layout.boxes.len());
        Self {
            steps,
            layout,
            offset,
            viewport_height,
            active: None,
            last_scroll: None,
        }
    }

    pub fn steps(&self) -> &[ScrollStep] {
        &self.steps
    }

    pub fn layout(&self) -> &StepLayout {
        &self.layout
    }

    pub fn trigger_line(&self, scroll_y: f64) -> f64 {
        scroll_y + self.offset * self.viewport_height
    }

    pub fn active(&self) -> Option<&ScrollStep> {
        self.active.map(|i| &self.steps[i])
    }

    /// Scroll position at which step `index` reaches the trigger line.
    pub fn scroll_position_for(&self, index: usize) -> Option<f64> {
        let top = self.layout.boxes.get(index)?.top;
        Some(top - self.offset * self.viewport_height)
    }

    /// Feeds a scroll position. Returns the step that just became active.
    pub fn on_scroll(&mut self, scroll_y: f64) -> Option<StepEnter> {
        let direction = match self.last_scroll {
            Some(previous) if scroll_y < previous => Direction::Up,
            _ => Direction::Down,
        };
        self.last_scroll = Some(scroll_y);

        let trigger = self.trigger_line(scroll_y);
        let next = self.layout.boxes.iter().rposition(|b| b.top <= trigger);
        if next == self.active {
            return None;
        }

        self.active = next;
        next.map(|index| StepEnter {
            index,
            year: self.steps[index].year,
            direction,
        })
    }

    /// New viewport size and step positions. The active step is kept until
    /// the next scroll event.
    pub fn resize(&mut self, viewport_height: f64, layout: StepLayout) {
        debug_assert_eq!(self.steps.len(), layout.boxes.len());
        self.viewport_height = viewport_height;
        self.layout = layout;
    }
}

// Viewport fractions at which the two sticky maps hand over
const HIDE_FIRST_BELOW: f64 = 0.6;
const SHOW_SECOND_BELOW: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MapVisibility {
    pub first: bool,
    pub second: bool,
}

/// Hand-over between two stacked map sections, in document coordinates.
///
/// The first map hides once its section's bottom edge rises above 60% of the
/// viewport. The second map shows once the transition's top edge passes the
/// middle of the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Handover {
    pub first_bottom: f64,
    pub transition_top: f64,
}

impl Handover {
    pub fn visibility(&self, scroll_y: f64, viewport_height: f64) -> MapVisibility {
        MapVisibility {
            first: self.first_bottom - scroll_y >= HIDE_FIRST_BELOW * viewport_height,
            second: self.transition_top - scroll_y < SHOW_SECOND_BELOW * viewport_height,
        }
    }

    /// Scroll position past which the first map is hidden.
    pub fn hide_first_after(&self, viewport_height: f64) -> f64 {
        self.first_bottom - HIDE_FIRST_BELOW * viewport_height
    }

    /// Scroll position past which the second map is shown.
    pub fn show_second_after(&self, viewport_height: f64) -> f64 {
        self.transition_top - SHOW_SECOND_BELOW * viewport_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ScrollController {
        let steps = build_steps(&[2016, 2020, 2028, 2036], true, |y| {
            if y == 2028 {
                "Riverside rises.".to_string()
            } else {
                String::new()
            }
        });
        let layout = StepLayout::uniform(steps.len(), 200.0, 400.0);
        ScrollController::new(steps, layout, 0.5, 800.0)
    }

    #[test]
    fn baseline_year_can_be_left_out() {
        let years = [2016, 2020, 2028];
        let with = build_steps(&years, false, |_| String::new());
        let without = build_steps(&years, true, |_| String::new());
        assert_eq!(with.len(), 3);
        assert_eq!(without.iter().map(|s| s.year).collect::<Vec<_>>(), [2020, 2028]);
    }

    #[test]
    fn steps_activate_as_the_trigger_line_passes() {
        let mut scroller = controller();
        assert_eq!(scroller.steps()[1].caption, "Riverside rises.");
        assert_eq!(scroller.steps()[0].caption, "");

        // trigger line at 400, first step starts at 200
        let first = scroller.on_scroll(0.0).unwrap();
        assert_eq!((first.index, first.year, first.direction), (0, 2020, Direction::Down));

        assert_eq!(scroller.on_scroll(150.0), None);

        let second = scroller.on_scroll(200.0).unwrap();
        assert_eq!(second.year, 2028);

        let back = scroller.on_scroll(100.0).unwrap();
        assert_eq!((back.year, back.direction), (2020, Direction::Up));
    }

    #[test]
    fn nothing_is_active_above_the_first_step() {
        let steps = build_steps(&[2020, 2028], false, |_| String::new());
        let layout = StepLayout::uniform(steps.len(), 1000.0, 400.0);
        let mut scroller = ScrollController::new(steps, layout, 0.5, 800.0);

        assert_eq!(scroller.on_scroll(0.0), None);
        assert!(scroller.active().is_none());
        assert_eq!(scroller.on_scroll(600.0).map(|e| e.year), Some(2020));
    }

    #[test]
    fn resize_keeps_the_active_year() {
        let mut scroller = controller();
        scroller.on_scroll(200.0);
        assert_eq!(scroller.active().map(|s| s.year), Some(2028));

        scroller.resize(400.0, StepLayout::uniform(3, 100.0, 250.0));
        assert_eq!(scroller.active().map(|s| s.year), Some(2028));
        assert_eq!(scroller.trigger_line(200.0), 400.0);
        assert_eq!(scroller.layout().boxes[1].top, 350.0);

        // the next scroll uses the new boundaries
        let entered = scroller.on_scroll(400.0).unwrap();
        assert_eq!(entered.year, 2036);
    }

    #[test]
    fn first_event_counts_as_downward() {
        let mut scroller = controller();
        assert_eq!(scroller.scroll_position_for(0), Some(-200.0));
        assert_eq!(scroller.scroll_position_for(3), None);

        let entered = scroller.on_scroll(-200.0).unwrap();
        assert_eq!((entered.year, entered.direction), (2020, Direction::Down));
    }

    #[test]
    fn maps_hand_over_between_sections() {
        let handover = Handover {
            first_bottom: 1000.0,
            transition_top: 1200.0,
        };
        let vis = |y| handover.visibility(y, 800.0);

        assert_eq!(vis(0.0), MapVisibility { first: true, second: false });
        assert_eq!(vis(600.0), MapVisibility { first: false, second: false });
        assert_eq!(vis(900.0), MapVisibility { first: false, second: true });

        let hide = handover.hide_first_after(800.0);
        assert_eq!(hide, 520.0);
        assert!(vis(hide).first);
        assert!(!vis(hide + 1.0).first);

        let show = handover.show_second_after(800.0);
        assert_eq!(show, 800.0);
        assert!(!vis(show).second);
        assert!(vis(show + 1.0).second);
    }
}
