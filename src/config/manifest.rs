//! Line manifests listing the files to synchronize.
use std::path::Path;

use crate::error::ConfigError;

/// Read a manifest of paths: one entry per line, blank lines and `#`
/// comments skipped, surrounding whitespace trimmed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read.
pub fn load(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse(&content))
}

/// Parse manifest content.
///
/// # Examples
///
/// ```
/// use homekeeper::config::manifest::parse;
///
/// let entries = parse("# shells\n/bin/sh\n\n  /usr/bin/rsync  \n");
/// assert_eq!(entries, ["/bin/sh", "/usr/bin/rsync"]);
/// ```
#[must_use]
pub fn parse(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}
