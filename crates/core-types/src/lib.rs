//! Shared entity types for the points-metered AI document platform core.
//!
//! Every type here corresponds to an entity in the data model: identity,
//! essential attributes, and the invariants a caller must preserve. The
//! types are plain data — the invariants are enforced by the crates that
//! mutate them (`ledger`, `access`, `artifact-store`, `marketplace`), not
//! here.

pub mod artifact;
pub mod book;
pub mod file;
pub mod image;
pub mod job;
pub mod points;
pub mod purchase;
pub mod question;
pub mod share;
pub mod slide;
pub mod subscription;
pub mod test;
pub mod version;

pub use artifact::{ArtifactHeader, ArtifactId, ArtifactKind, ArtifactStatus, Visibility};
pub use book::{
    AccessConfig, Book, Chapter, ChapterContentMode, PageAnnotation, ReadingDirection,
    MAX_CHAPTER_DEPTH,
};
pub use file::File;
pub use image::{GeneratedImage, ImageStyle};
pub use job::{Job, JobKind, JobStatus};
pub use points::{PointsTransaction, TransactionKind};
pub use purchase::{AccessType, PurchaseGrant};
pub use question::{
    Answer, Blank, LabelPosition, MatchingItem, McqOption, Question, QuestionType, SubQuestion,
};
pub use share::{ShareGrant, ShareStatus};
pub use slide::{BackgroundConfig, Narration, OutlineEntry, OverlayElement, Slide, SlideDeck};
pub use subscription::{Plan, UserSubscription};
pub use test::{MarketplaceConfig, OnlineTest, TestSubmission};
pub use version::{SourceKind, VersionSnapshot};

/// A user identifier. Newtype so the platform never mixes it up with
/// artifact or job identifiers at the type level.
pub type UserId = uuid::Uuid;
