//! Session lifecycle and status snapshots.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Named phase of a scrape session's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Idle,
    Fetching,
    Parsing,
    Processing,
    Downloading,
    Complete,
    Error,
    Cancelled,
}

impl Stage {
    /// Terminal stages end a run; only `reset` or a new run leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Complete | Stage::Error | Stage::Cancelled)
    }

    /// A run is in progress.
    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != Stage::Idle
    }

    fn rank(self) -> u8 {
        match self {
            Stage::Idle => 0,
            Stage::Fetching => 1,
            Stage::Parsing => 2,
            Stage::Processing => 3,
            Stage::Downloading => 4,
            Stage::Complete | Stage::Error | Stage::Cancelled => 5,
        }
    }

    /// Whether moving from `self` to `next` keeps the run monotonic.
    ///
    /// Re-entering the same stage is allowed (progress updates). A terminal
    /// stage may only open a new run: a scrape (`Fetching`) or the
    /// materialization of the results kept so far (`Downloading`).
    pub fn can_advance_to(self, next: Stage) -> bool {
        if self == next {
            return !self.is_terminal();
        }
        if self.is_terminal() {
            return matches!(next, Stage::Idle | Stage::Fetching | Stage::Downloading);
        }
        if next == Stage::Idle {
            return false;
        }
        next.is_terminal() || next.rank() > self.rank()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Fetching => "fetching",
            Stage::Parsing => "parsing",
            Stage::Processing => "processing",
            Stage::Downloading => "downloading",
            Stage::Complete => "complete",
            Stage::Error => "error",
            Stage::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Progress counters attached to a status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_progress: Option<u8>,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Count one unit of work as done, never exceeding `total`.
    pub fn advance(&mut self) {
        self.current = (self.current + 1).min(self.total);
    }
}

/// Snapshot of a session, as published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub stage: Stage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Status {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            progress: None,
            error: None,
        }
    }

    pub fn idle() -> Self {
        Self::new(Stage::Idle, "Ready to start")
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Terminal snapshot for a failed or cancelled run.
    pub fn failed(message: impl Into<String>, error: &AppError) -> Self {
        let stage = if error.is_cancelled() {
            Stage::Cancelled
        } else {
            Stage::Error
        };
        Self {
            stage,
            message: message.into(),
            progress: None,
            error: Some(error.to_string()),
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::idle()
    }
}

/// Whether a run only previews lessons or targets the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMode {
    #[default]
    Preview,
    Download,
}

impl FromStr for ScrapeMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "preview" => Ok(ScrapeMode::Preview),
            "download" => Ok(ScrapeMode::Download),
            other => Err(AppError::validation(format!(
                "Invalid mode '{other}'. Must be \"preview\" or \"download\""
            ))),
        }
    }
}
