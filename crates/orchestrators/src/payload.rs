use crate::error::{invalid_payload, OrchestratorResult};
use core_types::Job;
use serde::de::DeserializeOwned;

/// Every executor's payload is `job.payload` deserialized into its own
/// typed shape — the API server is responsible for writing a shape each
/// executor here agrees to read.
pub fn parse<T: DeserializeOwned>(job: &Job) -> OrchestratorResult<T> {
    serde_json::from_value(job.payload.clone()).map_err(|e| invalid_payload("payload", e))
}
