use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("not a profile URL: {0}")]
    InvalidUrl(String),

    /// The wall never went away; the URL stays eligible for a later run.
    #[error("authwall persisted after {attempts} attempts for {url}")]
    AuthwallExceeded { url: String, attempts: u32 },

    #[error("gave up on {url} after {elapsed:?}")]
    DeadlineExceeded { url: String, elapsed: Duration },

    #[error("acquisition of {url} cancelled")]
    Cancelled { url: String },

    /// Browser or transport failure. Fatal to the worker that hit it.
    #[error("browser session failed: {0:#}")]
    Session(#[from] anyhow::Error),
}

impl AccessError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AccessError::Session(_))
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed document {url}: {reason}")]
    Malformed { url: String, reason: &'static str },
}
