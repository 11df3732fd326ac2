//! Pipeline entry points for scraper operations.
//!
//! - `ScrapeSession::start`: scrape a course page into groups of lessons
//! - `ScrapeSession::materialize`: build documents for the selected lessons
//! - `ScrapeSession::sweep`: scan a list of lesson links for video lessons

pub mod session;

pub use session::{ItemTarget, LessonDocument, ScrapeSession};
