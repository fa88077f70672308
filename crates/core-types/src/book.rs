use crate::artifact::ArtifactHeader;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterContentMode {
    Inline,
    PdfPages,
    ImagePages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingDirection {
    Ltr,
    Rtl,
}

/// A4 at 150 DPI.
pub const PDF_PAGE_WIDTH_PX: u32 = 1240;
pub const PDF_PAGE_HEIGHT_PX: u32 = 1754;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageAnnotation {
    pub page_number: u32,
    pub background_image_url: String,
    pub overlay_elements: Vec<crate::slide::OverlayElement>,
    pub width: u32,
    pub height: u32,
}

/// Per-book paywall rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    pub one_time_view_points: Option<i64>,
    pub forever_view_points: Option<i64>,
    pub download_pdf_points: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub chapter_id: Uuid,
    pub book_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub order_index: u32,
    pub title: String,
    pub content_mode: ChapterContentMode,
    /// Used when `content_mode == Inline`.
    pub inline_content: Option<serde_json::Value>,
    /// Used when `content_mode` is `PdfPages`/`ImagePages`; `page_number`
    /// is 1-based, contiguous, and unique.
    pub pages: Vec<PageAnnotation>,
    pub reading_direction: Option<ReadingDirection>,
}

impl Chapter {
    /// For chapters in `pdf_pages` mode, `page_number` must be 1-based,
    /// contiguous, and unique.
    pub fn pages_are_contiguous(&self) -> bool {
        if self.content_mode == ChapterContentMode::Inline {
            return true;
        }
        let mut numbers: Vec<u32> = self.pages.iter().map(|p| p.page_number).collect();
        numbers.sort_unstable();
        numbers
            .iter()
            .enumerate()
            .all(|(i, n)| *n == (i as u32) + 1)
    }
}

/// Tree of chapters, depth <= 3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub header: ArtifactHeader,
    pub chapters: Vec<Chapter>,
    pub access_config: AccessConfig,
}

pub const MAX_CHAPTER_DEPTH: u8 = 3;
