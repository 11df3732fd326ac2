// src/error.rs

//! Unified error handling for the scraper.

use std::fmt;

use thiserror::Error;

/// Result type alias for scraper operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Upstream unreachable or answered with a failure status
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// An upstream call exceeded its time budget
    #[error("Timed out after {secs}s fetching {url}")]
    Timeout { url: String, secs: u64 },

    /// Expected markup structure absent
    #[error("Parse error: {0}")]
    Parse(String),

    /// Materialization requested with nothing selected
    #[error("Selection error: {0}")]
    Selection(String),

    /// A single image could not be fetched or transcoded
    #[error("Image error for {name}: {message}")]
    Image { name: String, message: String },

    /// The run was cancelled by the caller
    #[error("Process cancelled by user")]
    Cancelled,

    /// Assembly requested without any image descriptors
    #[error("No images provided")]
    EmptyInput,

    /// PDF building or serialization failed
    #[error("Document error: {0}")]
    Document(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a network error for a URL.
    pub fn network(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Network {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create a selection error.
    pub fn selection(message: impl Into<String>) -> Self {
        Self::Selection(message.into())
    }

    /// Create an image error.
    pub fn image(name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Image {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Create a document error.
    pub fn document(message: impl fmt::Display) -> Self {
        Self::Document(message.to_string())
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error is the cancellation terminal state.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this error originates from the network layer.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Http(_) | Self::Timeout { .. }
        )
    }
}
