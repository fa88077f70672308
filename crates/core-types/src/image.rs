use crate::ArtifactHeader;
use serde::{Deserialize, Serialize};

/// Mirrors the `JobKind::ImageGenerate*` family one-to-one: each kind
/// produces an artifact tagged with the style it was generated under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStyle {
    Photorealistic,
    Stylized,
    Logo,
    Background,
    Mockup,
    Sequential,
}

/// An `ArtifactKind::Image` artifact. Unlike decks/books/tests there is
/// no manual-edit surface — every version is a provider regeneration,
/// so `GeneratedImage` carries the prompt that produced its current
/// `image_url` rather than a separately editable content tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub header: ArtifactHeader,
    pub style: ImageStyle,
    pub prompt: String,
    pub image_url: Option<String>,
    /// For sequential/mockup generations, prior frames in the same series.
    pub sibling_urls: Vec<String>,
}
