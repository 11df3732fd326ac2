//! Service layer for the scraper.
//!
//! This module contains the business logic for:
//! - Markup extraction (`MarkupExtractor`)
//! - Video URL discovery (`VideoExtractor`)
//! - Bounded lesson fetching (`BoundedFetcher`)
//! - Selection state (`SelectionModel`)
//! - PDF assembly (`DocumentAssembler`)

pub mod assembler;
pub mod extract;
pub mod fetcher;
pub mod selection;
pub mod video;

pub use assembler::{AssembledDocument, DocumentAssembler, document_filename};
pub use extract::{LessonMarkup, MarkupExtractor};
pub use fetcher::{BoundedFetcher, GroupOutcome, GroupRequest};
pub use selection::{GroupSelection, SelectionModel};
pub use video::{PageView, VideoExtractor, VideoStrategy};
