//! JSON bodies written back to webhook callers.

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;

/// Outcome marker in a [`Reply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyResult {
    Ok,
    Error,
}

/// Body of every webhook response: `{"message": ..., "result": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Lowercased HTTP reason phrase, e.g. `"not found"`
    pub message: String,
    /// `error` whenever the status is 400 or above
    pub result: ReplyResult,
}

impl Reply {
    /// Build the reply for a status code.
    pub fn for_status(status: StatusCode) -> Self {
        let message = status
            .canonical_reason()
            .unwrap_or("unknown")
            .to_lowercase();
        let result = if status.as_u16() >= 400 {
            ReplyResult::Error
        } else {
            ReplyResult::Ok
        };

        Self { message, result }
    }

    pub fn is_error(&self) -> bool {
        self.result == ReplyResult::Error
    }
}
