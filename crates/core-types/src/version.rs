use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Initial,
    AiRegenerate,
    ManualEdit,
    OutlineEdit,
}

/// Full content snapshot, stamped with a monotone version. Lives inside
/// its artifact; restoring copies the snapshot into "current" fields
/// without deleting history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub source_kind: SourceKind,
    pub content: serde_json::Value,
}
