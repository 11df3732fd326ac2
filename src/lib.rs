// src/lib.rs

//! Lesson scraper library
//!
//! Scrapes a course site into groups of lessons, tracks which lessons a user
//! selected, and assembles the selected lessons' images into PDF documents.

pub mod cache;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

pub use error::{AppError, Result};
pub use pipeline::{ItemTarget, ScrapeSession};
