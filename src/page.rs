use crate::classify::LegendEntry;
use crate::config::{AppConfig, ScrollConfig};
use crate::scroll::{Handover, ScrollStep, StepLayout};
use crate::stats::{sentence, summarize};
use crate::story::{RegionStory, StoryFrame};
use crate::surface::escape_xml;
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;
use tracing::info;

// Mouse scroll granularity used when replaying a story
const REPLAY_STRIDE: f64 = 50.0;

#[derive(Serialize)]
struct StoryFile<'a> {
    key: &'a str,
    years: Vec<i32>,
    steps: &'a [ScrollStep],
    legend: &'a [LegendEntry],
    stats: BTreeMap<i32, String>,
    frames: &'a [StoryFrame],
}

/// One region's block of the page.
pub struct Section<'a> {
    pub key: &'a str,
    pub initial: &'a StoryFrame,
    pub legend: &'a [LegendEntry],
    pub steps: &'a [ScrollStep],
}

/// Writes every region's year maps and story file, then the page tying them together.
pub fn generate_site(config: &AppConfig, stories: &mut [RegionStory]) -> Result<()> {
    let site_dir = &config.output.site_dir;
    fs::create_dir_all(site_dir).with_context(|| format!("Failed to create site directory: {:?}", site_dir))?;

    let mut rendered = Vec::with_capacity(stories.len());

    for (story, region) in stories.iter_mut().zip(&config.regions) {
        info!(region = %story.key(), "Writing region maps");

        let region_dir = site_dir.join(story.key());
        fs::create_dir_all(&region_dir).context("Failed to create region directory")?;

        let years = story.index().years();
        write_year_maps(story, &years, &region_dir)?;

        let frames = story.replay(REPLAY_STRIDE);
        let legend = story.legend();
        let stats = years
            .iter()
            .filter_map(|&y| summarize(story.index(), y))
            .map(|s| (s.year, sentence(&region.stats_label, &s)))
            .collect();

        let file = StoryFile {
            key: story.key(),
            years: years.clone(),
            steps: story.steps(),
            legend: &legend,
            stats,
            frames: &frames,
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize story")?;
        fs::write(region_dir.join("story.json"), json).context("Failed to write story.json")?;

        info!(region = %story.key(), frames = frames.len(), "Story replayed");
        rendered.push((frames, legend));
    }

    let mut sections = Vec::with_capacity(stories.len());
    for (story, (frames, legend)) in stories.iter().zip(&rendered) {
        let initial = frames
            .first()
            .ok_or_else(|| anyhow!("Region '{}' has no measurements to draw", story.key()))?;
        sections.push(Section {
            key: story.key(),
            initial,
            legend,
            steps: story.steps(),
        });
    }

    let html = render_index(&sections, &config.scroll);
    let index_path = site_dir.join("index.html");
    fs::write(&index_path, html).with_context(|| format!("Failed to write {:?}", index_path))?;

    info!("Site written to {:?}", site_dir);
    Ok(())
}

fn write_year_maps(story: &RegionStory, years: &[i32], dir: &Path) -> Result<()> {
    years.par_iter().try_for_each(|&year| {
        let svg = story
            .year_svg(year)
            .ok_or_else(|| anyhow!("Year {} vanished from the index", year))?;
        let path = dir.join(format!("{}.svg", year));
        fs::write(&path, svg).with_context(|| format!("Failed to save map {:?}", path))
    })
}

/// Where the first section ends, with the second section following directly.
fn handover(sections: &[Section<'_>], scroll: &ScrollConfig) -> Option<Handover> {
    if sections.len() < 2 {
        return None;
    }
    let first_bottom = StepLayout::uniform(sections[0].steps.len(), scroll.spacer_height, scroll.step_pitch).end();
    Some(Handover {
        first_bottom,
        transition_top: first_bottom,
    })
}

pub fn render_index(sections: &[Section<'_>], scroll: &ScrollConfig) -> String {
    let (spacer_height, step_pitch) = (scroll.spacer_height, scroll.step_pitch);
    let mut html = String::from(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Wet-Bulb Temperature</title>\n</head>\n",
    );
    match handover(sections, scroll) {
        Some(h) => {
            let _ = writeln!(
                html,
                "<body data-hide-first-after=\"{:.0}\" data-show-second-after=\"{:.0}\">",
                h.hide_first_after(scroll.viewport_height),
                h.show_second_after(scroll.viewport_height)
            );
        }
        None => html.push_str("<body>\n"),
    }

    for section in sections {
        let key = escape_xml(section.key);
        let _ = writeln!(html, "<section id=\"scrolly-{}\" class=\"scrolly\">", key);
        let _ = writeln!(html, "  <h2 class=\"year-title\">{}</h2>", escape_xml(&section.initial.title));
        let _ = writeln!(html, "  <p class=\"stats\">{}</p>", escape_xml(&section.initial.stats));

        html.push_str("  <div class=\"legend\">\n");
        for entry in section.legend {
            let _ = writeln!(
                html,
                "    <div class=\"legend-item\"><div class=\"legend-color\" style=\"background-color: {}\"></div><span class=\"legend-label\">{}</span></div>",
                entry.color,
                escape_xml(&entry.label)
            );
        }
        html.push_str("  </div>\n");

        let _ = writeln!(html, "  <div class=\"map\" data-src=\"{}/\">", key);
        html.push_str(&section.initial.svg);
        html.push_str("  </div>\n");

        html.push_str("  <div class=\"steps\">\n");
        let _ = writeln!(html, "    <div class=\"step spacer\" style=\"height: {}px\"></div>", spacer_height);
        for step in section.steps {
            let _ = writeln!(
                html,
                "    <div class=\"step\" data-year=\"{year}\" style=\"min-height: {pitch}px\"><strong>Year {year}</strong><br/>{caption}</div>",
                year = step.year,
                pitch = step_pitch,
                caption = escape_xml(&step.caption)
            );
        }
        html.push_str("  </div>\n</section>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::tests::{region, story};
    use crate::config::{ClassificationConfig, OutputConfig, ScrollConfig, ServerConfig};
    use tempfile::TempDir;

    #[test]
    fn index_lists_steps_with_escaped_captions() {
        let mut story = story();
        let initial = story.initial().unwrap();
        let legend = story.legend();
        let html = render_index(
            &[Section {
                key: story.key(),
                initial: &initial,
                legend: &legend,
                steps: story.steps(),
            }],
            &ScrollConfig::default(),
        );

        assert!(html.contains("<section id=\"scrolly-ca\""));
        assert!(html.contains("data-year=\"2020\""));
        assert!(html.contains("<strong>Year 2028</strong><br/>Riverside &lt;rises&gt;."));
        assert!(!html.contains("data-year=\"2016\""));
        assert!(html.contains("<span class=\"legend-label\">No data</span>"));
        assert!(html.contains("California Wet Bulb Temperature In: </h2>"));
        assert!(html.contains("<body>\n"));
    }

    #[test]
    fn two_sections_carry_the_map_handover() {
        let mut story = story();
        let initial = story.initial().unwrap();
        let legend = story.legend();
        let section = || Section {
            key: story.key(),
            initial: &initial,
            legend: &legend,
            steps: story.steps(),
        };

        // two steps end at 1000; viewport 900 hides at 1000 - 540, shows at 1000 - 450
        let html = render_index(&[section(), section()], &ScrollConfig::default());
        assert!(html.contains("<body data-hide-first-after=\"460\" data-show-second-after=\"550\">"));
    }

    #[test]
    fn site_contains_maps_story_and_page() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            classification: ClassificationConfig {
                thresholds: vec![10.0, 14.0, 18.0, 22.0, 26.0, 30.0, 32.0],
                colors: vec!["#FFFFFF".to_string(); 8],
                no_data_color: "#CCCCCC".to_string(),
            },
            output: OutputConfig {
                site_dir: dir.path().join("site"),
                width: 600,
                height: 700,
            },
            server: ServerConfig { port: 3000 },
            scroll: ScrollConfig::default(),
            regions: vec![region()],
        };

        let mut stories = vec![story()];
        generate_site(&config, &mut stories).unwrap();

        let site = dir.path().join("site");
        for year in [2016, 2020, 2028] {
            assert!(site.join("ca").join(format!("{}.svg", year)).exists());
        }
        assert!(site.join("index.html").exists());

        let story_json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(site.join("ca/story.json")).unwrap()).unwrap();
        assert_eq!(story_json["years"], serde_json::json!([2016, 2020, 2028]));
        assert_eq!(story_json["frames"].as_array().unwrap().len(), 3);
        assert_eq!(
            story_json["stats"]["2020"],
            "In 2020, California's average Wet-Bulb Temperature is 15.8°C."
        );
        assert!(story_json["frames"][0].get("svg").is_none());
    }
}
