use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checking::types::{Category, CheckOutcome};

/// A monitored endpoint. Treated as an immutable value for the duration of
/// one check invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    /// Substring expected in the response body; `None` disables the content
    /// check for this endpoint.
    pub check_string: Option<String>,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(), name: name.into(), url: url.into(), check_string: None }
    }

    pub fn with_check_string(mut self, check_string: impl Into<String>) -> Self {
        self.check_string = Some(check_string.into());
        self
    }
}

/// Last-known check state for one endpoint.
#[derive(Debug, Clone, Default)]
pub struct EndpointStatus {
    pub last_check: Option<SystemTime>,
    /// Advanced only by an `OK` outcome.
    pub last_seen: Option<SystemTime>,
    /// Advanced only by a non-`OK` outcome.
    pub last_failure: Option<SystemTime>,
    pub category: Option<Category>,
    pub detail: Option<String>,
}

impl EndpointStatus {
    /// Fold one outcome into the status. Exactly one of `last_seen` and
    /// `last_failure` advances per call, and neither moves backwards.
    pub fn apply(&mut self, outcome: &CheckOutcome, timestamp: SystemTime) {
        let timestamp = match self.last_check {
            Some(previous) if previous > timestamp => previous,
            _ => timestamp,
        };
        self.last_check = Some(timestamp);
        if outcome.is_ok() {
            self.last_seen = Some(timestamp);
        } else {
            self.last_failure = Some(timestamp);
        }
        self.category = Some(outcome.category);
        self.detail = Some(outcome.detail.clone());
    }
}

/// The most recent non-OK outcome across all endpoints.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub endpoint_id: Uuid,
    pub name: String,
    pub url: String,
    pub category: Category,
    pub detail: String,
    pub timestamp: SystemTime,
}
