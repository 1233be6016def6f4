#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

//! Headless state controller for a radiologist case-review dashboard.
//!
//! The crate owns no rendering and no transport: UI shells subscribe to the
//! observables exposed by [`CaseReviewController`] and its sub-states, and the
//! remote case repository is injected behind [`client::CaseRepository`].

pub mod annotations;
pub mod client;
pub mod controller;
pub mod debounce;
pub mod list;
pub mod model;
pub mod report;
pub mod selection;
pub mod store;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use controller::CaseReviewController;

/// Cases requested per page unless the shell overrides it.
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// Quiet window for free-text search; keystrokes inside it supersede earlier ones.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);
/// Fixed radius, in container-relative units, for click-placed circle annotations.
pub const CIRCLE_ANNOTATION_RADIUS: f64 = 10.0;
/// Default drawing color until the shell picks another.
pub const DEFAULT_ANNOTATION_COLOR: &str = "#ff0000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Remote,
    NoActiveSelection,
    Stale,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Validation => "VALIDATION_FAILED",
            Self::Remote => "REMOTE_FAILURE",
            Self::NoActiveSelection => "NO_ACTIVE_SELECTION",
            Self::Stale => "STALE_RESPONSE",
        }
    }

    /// Stale responses are an internal bookkeeping outcome, never shown to users.
    #[must_use]
    pub const fn is_user_visible(self) -> bool {
        !matches!(self, Self::Stale)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ReviewError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("no active case or image selected")]
    NoActiveSelection,

    #[error("response superseded by a newer selection")]
    Stale,
}

impl ReviewError {
    #[must_use]
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.to_owned(),
            id: id.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Remote(_) => ErrorKind::Remote,
            Self::NoActiveSelection => ErrorKind::NoActiveSelection,
            Self::Stale => ErrorKind::Stale,
        }
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self {
            Self::NotFound { entity, .. } => {
                format!("The requested {entity} could not be found.")
            }
            Self::Validation(msg) => msg.clone(),
            Self::Remote(_) => "Unable to reach the case repository. Please try again.".into(),
            Self::NoActiveSelection => "Select a case or image first.".into(),
            Self::Stale => String::new(),
        }
    }
}

pub type ReviewResult<T> = Result<T, ReviewError>;
