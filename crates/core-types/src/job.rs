use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The async work kinds the platform knows how to run. New kinds are
/// added here and in `core-config`'s pricing map together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    SlideGenerate,
    SlideRegenerate,
    SlideNarrationAudio,
    ChapterTranslate,
    PdfSplit,
    PdfToChapter,
    ImageGeneratePhotorealistic,
    ImageGenerateStylized,
    ImageGenerateLogo,
    ImageGenerateBackground,
    ImageGenerateMockup,
    ImageGenerateSequential,
    TestGenerate,
    TestEvaluate,
    EditorEdit,
    EditorTranslate,
    EditorFormat,
    EditorBilingual,
    VideoExport,
}

/// Transitions are monotone: `Pending -> Processing -> {Completed|Failed|Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether `self -> to` is a legal transition — status transitions
    /// are strictly monotone, never backward.
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// A unit of async work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub user_id: UserId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub points_reserved: i64,
    /// Set once `Ledger::commit`/`refund` has resolved the reservation,
    /// so the worker and the reaper can tell a terminal job apart from
    /// one whose refund itself failed (`refund_pending`).
    pub reservation_resolved: bool,
    pub refund_pending: bool,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
}

impl Job {
    pub fn ttl_days() -> i64 {
        7
    }
}
