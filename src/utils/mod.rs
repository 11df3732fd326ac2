//! Utility functions and helpers.

pub mod http;
pub mod transcode;
pub mod url;

pub use self::http::{HttpTransport, Transport, with_cancel, with_timeout};
pub use self::url::{resolve, sanitize_file_name};
