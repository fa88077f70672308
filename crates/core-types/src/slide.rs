use crate::artifact::ArtifactHeader;
use serde::{Deserialize, Serialize};

/// A typed overlay element. Modelled as a tagged variant rather than a
/// dynamic attribute bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverlayElement {
    Text {
        content: String,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        z_index: i32,
    },
    Image {
        url: String,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        z_index: i32,
    },
    Shape {
        shape: String,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        z_index: i32,
    },
    Video {
        url: String,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        z_index: i32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackgroundConfig {
    Color { hex: String },
    Image { url: String },
    Gradient { stops: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Narration {
    pub audio_url: String,
    pub subtitle_track_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slide {
    pub index: u32,
    pub html_content: String,
    pub background_config: BackgroundConfig,
    pub overlay_elements: Vec<OverlayElement>,
    pub narration: Option<Narration>,
}

/// One entry of the deck's regeneration source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub index: u32,
    pub heading: String,
    pub bullet_points: Vec<String>,
    pub speaker_notes: String,
}

/// A slide deck. Invariant: `slides_outline.len() == slides.len()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideDeck {
    pub header: ArtifactHeader,
    pub slides: Vec<Slide>,
    pub slides_outline: Vec<OutlineEntry>,
}

impl SlideDeck {
    pub fn check_outline_invariant(&self) -> bool {
        self.slides_outline.len() == self.slides.len()
    }
}
