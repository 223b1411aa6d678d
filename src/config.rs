// src/config.rs

//! Minimal configuration tree for `[file:*]` declarations
//!
//! The surface is an INI-style file: `[section]` headers, `key=value`
//! settings, `!`-prefixed section or setting names marking user-ignored
//! entries, `#` comments, and indented continuation lines for multi-line
//! values (the `schemes` setting relies on these). This is deliberately a
//! small model, not a general configuration system: just enough structure
//! for the file-install surface and `namelist:*` sections.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;

/// Whether a section or setting is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemState {
    #[default]
    Normal,
    /// Marked with a leading `!`; skipped by all processing
    Ignored,
}

/// A single setting value with its state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue {
    pub value: String,
    pub state: ItemState,
}

impl ConfigValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            state: ItemState::Normal,
        }
    }
}

/// A named section of settings
#[derive(Debug, Clone, Default)]
pub struct ConfigSection {
    pub state: ItemState,
    pub settings: BTreeMap<String, ConfigValue>,
}

/// The parsed configuration tree: top-level settings plus named sections
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    pub top: BTreeMap<String, ConfigValue>,
    pub sections: BTreeMap<String, ConfigSection>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an INI-style document
    pub fn parse(text: &str) -> Result<Self, ConfigParseError> {
        let mut tree = Self::new();
        // Name of the section being filled; None while at top level.
        let mut current: Option<String> = None;
        // Key of the last setting, for continuation lines.
        let mut last_key: Option<String> = None;

        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim_end();
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                last_key = None;
                continue;
            }
            // Continuation: an indented line extends the previous value.
            if raw_line.starts_with(char::is_whitespace) {
                let Some(key) = &last_key else {
                    return Err(ConfigParseError {
                        lineno: lineno + 1,
                        line: raw_line.to_string(),
                        reason: "continuation line without a setting".to_string(),
                    });
                };
                let settings = match &current {
                    Some(name) => {
                        &mut tree
                            .sections
                            .get_mut(name)
                            .unwrap_or_else(|| unreachable!("section created on entry"))
                            .settings
                    }
                    None => &mut tree.top,
                };
                if let Some(entry) = settings.get_mut(key) {
                    entry.value.push('\n');
                    entry.value.push_str(line.trim_start());
                }
                continue;
            }
            if let Some(header) = line.strip_prefix('[') {
                let Some(name) = header.strip_suffix(']') else {
                    return Err(ConfigParseError {
                        lineno: lineno + 1,
                        line: raw_line.to_string(),
                        reason: "unterminated section header".to_string(),
                    });
                };
                let (name, state) = strip_ignored(name.trim());
                let section = tree.sections.entry(name.to_string()).or_default();
                section.state = state;
                current = Some(name.to_string());
                last_key = None;
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigParseError {
                    lineno: lineno + 1,
                    line: raw_line.to_string(),
                    reason: "expected key=value".to_string(),
                });
            };
            let (key, state) = strip_ignored(key.trim());
            let entry = ConfigValue {
                value: value.trim().to_string(),
                state,
            };
            let settings = match &current {
                Some(name) => {
                    &mut tree
                        .sections
                        .get_mut(name)
                        .unwrap_or_else(|| unreachable!("section created on entry"))
                        .settings
                }
                None => &mut tree.top,
            };
            settings.insert(key.to_string(), entry);
            last_key = Some(key.to_string());
        }
        Ok(tree)
    }

    /// Value of a top-level setting, skipping ignored entries
    pub fn get_top_value(&self, key: &str) -> Option<&str> {
        self.top
            .get(key)
            .filter(|v| v.state == ItemState::Normal)
            .map(|v| v.value.as_str())
    }

    /// Value of a setting within a section, skipping ignored entries
    ///
    /// Returns `None` if the section or setting is absent or ignored.
    pub fn get_value(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?
            .settings
            .get(key)
            .filter(|v| v.state == ItemState::Normal)
            .map(|v| v.value.as_str())
    }

    /// An active section by name
    pub fn section(&self, name: &str) -> Option<&ConfigSection> {
        self.sections
            .get(name)
            .filter(|s| s.state == ItemState::Normal)
    }

    /// Names of active sections starting with `prefix`, sorted
    pub fn section_names_with_prefix(&self, prefix: &str) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|(name, section)| {
                name.starts_with(prefix) && section.state == ItemState::Normal
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

fn strip_ignored(name: &str) -> (&str, ItemState) {
    match name.strip_prefix('!') {
        Some(rest) => (rest.trim_start_matches('!').trim(), ItemState::Ignored),
        None => (name, ItemState::Normal),
    }
}

/// A line could not be parsed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("line {lineno}: {reason}: {line}")]
pub struct ConfigParseError {
    pub lineno: usize,
    pub line: String,
    pub reason: String,
}

/// An error raised when the processing of a setting fails
///
/// Carries the keys from the root of the configuration to the setting,
/// the offending value, and the triggering error where there is one.
#[derive(Debug, Error)]
pub struct ConfigProcessError {
    pub keys: Vec<String>,
    pub value: Option<String>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConfigProcessError {
    pub fn new(keys: Vec<String>, value: Option<String>) -> Self {
        Self {
            keys,
            value,
            cause: None,
        }
    }

    pub fn with_cause(
        keys: Vec<String>,
        value: Option<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            keys,
            value,
            cause: Some(Box::new(cause)),
        }
    }
}

impl std::fmt::Display for ConfigProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut setting = self.keys.join("=");
        if let Some(value) = &self.value {
            setting.push('=');
            setting.push_str(value);
        }
        match &self.cause {
            Some(cause) => write!(f, "{}: {}", setting, cause),
            None => write!(f, "{}: bad or missing value", setting),
        }
    }
}

/// Order two setting names, by numeric element if possible
///
/// `name(10)` sorts after `name(9)`; everything else is plain string
/// order. Used when expanding `name(:)` namelist patterns.
pub fn sort_settings(a: &str, b: &str) -> Ordering {
    if let (Some((stem_a, elem_a)), Some((stem_b, elem_b))) =
        (split_element(a), split_element(b))
        && stem_a == stem_b
    {
        return match (elem_a.parse::<i64>(), elem_b.parse::<i64>()) {
            (Ok(num_a), Ok(num_b)) => num_a.cmp(&num_b),
            _ => elem_a.cmp(elem_b),
        };
    }
    a.cmp(b)
}

/// Split `name(element)` into `(name, element)`
fn split_element(setting: &str) -> Option<(&str, &str)> {
    let inner = setting.strip_suffix(')')?;
    let open = inner.find('(')?;
    Some((&inner[..open], &inner[open + 1..]))
}
