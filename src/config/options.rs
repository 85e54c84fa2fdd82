//! Typed access to the options of one configuration section.
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::ConfigError;

const TRUE_STRINGS: &[&str] = &["yes", "true", "1", "on"];
const FALSE_STRINGS: &[&str] = &["no", "false", "0", "off"];

/// Key/value options scoped to one configuration section.
///
/// Every accessor returns a [`ConfigError`] naming the section and key when
/// the key is absent or its value cannot be converted.
///
/// # Examples
///
/// ```
/// use homekeeper::config::Options;
///
/// let options = Options::new("permissions")
///     .with("check", "yes")
///     .with("octal_permissions", "0750");
/// assert!(options.get_bool("check").unwrap());
/// assert_eq!(options.get_octal("octal_permissions").unwrap(), 0o750);
/// assert!(options.get_str("missing").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    section: String,
    values: BTreeMap<String, String>,
}

impl Options {
    /// Create an empty option set for `section`.
    #[must_use]
    pub fn new(section: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            values: BTreeMap::new(),
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Name of the section these options belong to.
    #[must_use]
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Raw string value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingOption`] if the key is absent.
    pub fn get_str(&self, key: &str) -> Result<&str, ConfigError> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingOption {
                section: self.section.clone(),
                key: key.to_string(),
            })
    }

    /// Value parsed as a decimal integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is absent or not an integer.
    pub fn get_int(&self, key: &str) -> Result<i64, ConfigError> {
        let raw = self.get_str(key)?;
        raw.parse()
            .map_err(|_| self.invalid(key, raw, "a decimal integer"))
    }

    /// Value parsed as a non-negative count.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is absent or not a non-negative integer.
    pub fn get_count(&self, key: &str) -> Result<usize, ConfigError> {
        let raw = self.get_str(key)?;
        raw.parse()
            .map_err(|_| self.invalid(key, raw, "a non-negative integer"))
    }

    /// Value parsed as a boolean (`yes/true/1/on`, `no/false/0/off`).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is absent or not a recognised boolean.
    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        let raw = self.get_str(key)?;
        let lowered = raw.to_ascii_lowercase();
        if TRUE_STRINGS.contains(&lowered.as_str()) {
            Ok(true)
        } else if FALSE_STRINGS.contains(&lowered.as_str()) {
            Ok(false)
        } else {
            Err(self.invalid(key, raw, "a boolean (yes/no, true/false, 1/0, on/off)"))
        }
    }

    /// Value parsed as a floating point number.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is absent or not a number.
    pub fn get_float(&self, key: &str) -> Result<f64, ConfigError> {
        let raw = self.get_str(key)?;
        raw.parse().map_err(|_| self.invalid(key, raw, "a number"))
    }

    /// Value parsed as octal permission bits (e.g. `0700`, `750`, `0o640`).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is absent, not octal, or above `7777`.
    pub fn get_octal(&self, key: &str) -> Result<u32, ConfigError> {
        let raw = self.get_str(key)?;
        let digits = raw.strip_prefix("0o").unwrap_or(raw);
        u32::from_str_radix(digits, 8)
            .ok()
            .filter(|mode| *mode <= 0o7777)
            .ok_or_else(|| self.invalid(key, raw, "octal permission bits (0000-7777)"))
    }

    /// Value as a filesystem path.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is absent or empty.
    pub fn get_path(&self, key: &str) -> Result<PathBuf, ConfigError> {
        let raw = self.get_str(key)?;
        if raw.is_empty() {
            return Err(self.invalid(key, raw, "a non-empty path"));
        }
        Ok(PathBuf::from(raw))
    }

    fn invalid(&self, key: &str, value: &str, expected: &'static str) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.section.clone(),
            key: key.to_string(),
            value: value.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn opts() -> Options {
        Options::new("main")
            .with("root", "/srv/sftp/$u")
            .with("count", "42")
            .with("negative", "-3")
            .with("flag_yes", "Yes")
            .with("flag_off", "off")
            .with("flag_bad", "perhaps")
            .with("ratio", "0.5")
            .with("mode", "0750")
            .with("mode_prefixed", "0o640")
            .with("mode_bad", "0789")
            .with("mode_big", "17777")
            .with("empty", "")
    }

    #[test]
    fn get_str_returns_value() {
        assert_eq!(opts().get_str("root").unwrap(), "/srv/sftp/$u");
    }

    #[test]
    fn missing_key_names_section_and_key() {
        let err = opts().get_str("absent").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingOption { ref section, ref key } if section == "main" && key == "absent"
        ));
    }

    #[test]
    fn get_int_parses_signed() {
        assert_eq!(opts().get_int("count").unwrap(), 42);
        assert_eq!(opts().get_int("negative").unwrap(), -3);
        assert!(opts().get_int("root").is_err());
    }

    #[test]
    fn get_count_rejects_negative() {
        assert_eq!(opts().get_count("count").unwrap(), 42);
        assert!(matches!(
            opts().get_count("negative"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn get_bool_accepts_case_insensitive_words() {
        assert!(opts().get_bool("flag_yes").unwrap());
        assert!(!opts().get_bool("flag_off").unwrap());
        assert!(opts().get_bool("flag_bad").is_err());
    }

    #[test]
    fn get_float_parses() {
        assert!((opts().get_float("ratio").unwrap() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn get_octal_parses_modes() {
        assert_eq!(opts().get_octal("mode").unwrap(), 0o750);
        assert_eq!(opts().get_octal("mode_prefixed").unwrap(), 0o640);
        assert!(opts().get_octal("mode_bad").is_err());
        assert!(opts().get_octal("mode_big").is_err());
    }

    #[test]
    fn get_path_rejects_empty() {
        assert_eq!(
            opts().get_path("root").unwrap(),
            PathBuf::from("/srv/sftp/$u")
        );
        assert!(opts().get_path("empty").is_err());
    }

    #[test]
    fn insert_replaces_value() {
        let mut o = Options::new("s");
        o.insert("k", "1");
        o.insert("k", "2");
        assert_eq!(o.get_str("k").unwrap(), "2");
        assert!(o.contains("k"));
        assert_eq!(o.section(), "s");
    }
}
