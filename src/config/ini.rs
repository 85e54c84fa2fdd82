//! Minimal INI reader: `[section]` headers, `key = value` entries, `#`/`;`
//! comment lines and whitespace-prefixed inline `#` comments.
use crate::error::ConfigError;

/// One `[section]` of an INI document with its entries in file order.
///
/// # Examples
///
/// ```
/// use homekeeper::config::ini::parse_sections;
///
/// let sections = parse_sections(
///     "homekeeper.conf",
///     "[main]\nresource_root = /srv/sftp/$u\nsimulate = yes\n",
/// ).unwrap();
/// assert_eq!(sections[0].header, "main");
/// assert_eq!(sections[0].entries[0].1, "/srv/sftp/$u");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Header without brackets, case preserved.
    pub header: String,
    /// `(key, value)` pairs; values have inline comments removed.
    pub entries: Vec<(String, String)>,
}

/// What a single line of the document holds.
#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Ignored,
    Header(&'a str),
    Entry(&'a str, &'a str),
}

fn classify(line: &str) -> Result<Line<'_>, &'static str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(['#', ';']) {
        return Ok(Line::Ignored);
    }
    if let Some(inner) = line.strip_prefix('[') {
        let header = inner
            .strip_suffix(']')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or("malformed section header")?;
        return Ok(Line::Header(header));
    }
    let (key, value) = line.split_once('=').ok_or("expected key = value")?;
    let key = key.trim();
    if key.is_empty() {
        return Err("empty key");
    }
    Ok(Line::Entry(key, without_comment(value.trim())))
}

/// `"0700 # jail"` becomes `"0700"`; a `#` glued to text is kept.
fn without_comment(value: &str) -> &str {
    value
        .match_indices('#')
        .filter_map(|(at, _)| value.get(..at))
        .find(|before| before.ends_with([' ', '\t']))
        .map_or(value, str::trim_end)
}

/// Split `content` into sections. `source` names the document in errors.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidSyntax`] naming the line for a malformed
/// header, a line without `=`, an empty key, or an entry before the first
/// header.
pub fn parse_sections(source: &str, content: &str) -> Result<Vec<Section>, ConfigError> {
    let mut sections: Vec<Section> = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let invalid = |reason: &str| ConfigError::InvalidSyntax {
            file: source.to_string(),
            message: format!("{reason} at line {}: {}", index + 1, raw.trim()),
        };
        match classify(raw).map_err(invalid)? {
            Line::Ignored => {}
            Line::Header(header) => sections.push(Section {
                header: header.to_string(),
                entries: Vec::new(),
            }),
            Line::Entry(key, value) => sections
                .last_mut()
                .ok_or_else(|| invalid("entry outside of section"))?
                .entries
                .push((key.to_string(), value.to_string())),
        }
    }
    Ok(sections)
}
