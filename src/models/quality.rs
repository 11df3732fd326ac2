//! Named image quality presets for document assembly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Quality tier controlling downscale and JPEG recompression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QualityTier {
    #[serde(rename = "120p")]
    Low,
    #[default]
    #[serde(rename = "320p")]
    Medium,
    #[serde(rename = "480p")]
    High,
}

impl QualityTier {
    /// Longest allowed edge in pixels; larger images are downscaled.
    pub fn max_dimension(self) -> u32 {
        match self {
            QualityTier::Low => 120,
            QualityTier::Medium => 320,
            QualityTier::High => 480,
        }
    }

    /// JPEG quality (1-100).
    pub fn jpeg_quality(self) -> u8 {
        match self {
            QualityTier::Low => 32,
            QualityTier::Medium => 75,
            QualityTier::High => 100,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            QualityTier::Low => "120p",
            QualityTier::Medium => "320p",
            QualityTier::High => "480p",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QualityTier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "120p" => Ok(QualityTier::Low),
            "320p" => Ok(QualityTier::Medium),
            "480p" => Ok(QualityTier::High),
            other => Err(AppError::validation(format!(
                "Unknown quality tier '{other}' (expected 120p, 320p or 480p)"
            ))),
        }
    }
}
