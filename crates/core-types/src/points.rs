use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of ledger movement. `debit` transactions start `pending` (a
/// reservation) until `commit` or `refund` resolves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Debit,
    Credit,
    Refund,
    RevenueCredit,
    Withdrawal,
}

/// What a `related_ref` points at. Kept as an enum rather than a bare
/// string so callers can't accidentally compare a job id against a
/// purchase id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RelatedRef {
    Job(Uuid),
    Purchase(Uuid),
    Transfer(Uuid),
    Withdrawal(Uuid),
}

/// Append-only ledger entry. Never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsTransaction {
    pub tx_id: Uuid,
    pub user_id: UserId,
    pub delta: i64,
    pub balance_after: i64,
    pub kind: TransactionKind,
    pub reason_code: String,
    pub related_ref: Option<RelatedRef>,
    pub created_at: DateTime<Utc>,
}
