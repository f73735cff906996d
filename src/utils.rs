//! Utility functions for string handling, URLs and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - String truncation for logging
//! - File extension and path segment extraction from URLs
//! - File system validation for the data directories

use crate::error::NewsResult;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes, on a character
/// boundary, with an ellipsis and byte count indicator appended.
///
/// # Arguments
///
/// * `s` - The string to potentially truncate
/// * `max` - Maximum number of bytes to keep
///
/// # Returns
///
/// The original string if not longer than `max`, otherwise a truncated
/// version with `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Decoded last segment of a URL path.
///
/// # Returns
///
/// `None` if `url` does not parse or its path ends with `/`.
pub fn last_path_segment(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    Some(decoded)
}

/// Extension of the file a URL points to, lower-cased, without the query.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(file_extension("http://x/a/foto.JPG?v=1").as_deref(), Some("jpg"));
/// ```
pub fn file_extension(url: &str) -> Option<String> {
    let segment = last_path_segment(url)?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a marker file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> NewsResult<()> {
    fs::create_dir_all(path).await?;
    // A small sync write keeps the error surface simple
    let marker_path = path.join("..__write_check__");
    stdfs::File::create(&marker_path)?;
    let _ = stdfs::remove_file(&marker_path);
    info!("Directory is writable");
    Ok(())
}
