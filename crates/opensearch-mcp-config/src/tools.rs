// crates/opensearch-mcp-config/src/tools.rs
// ============================================================================
// Module: Tool Visibility Configuration
// Description: Filter rules and per-tool override definitions.
// Purpose: Describe which tools are visible and how they are presented.
// Dependencies: serde, serde_yaml
// ============================================================================

//! ## Overview
//! [`FilterConfig`] and [`OverrideConfig`] are plain data snapshots. They are
//! consumed by the tool filter, which treats every rule as fail-open: a rule
//! that cannot be interpreted is ignored rather than hiding tools. Only the
//! shape of these documents is validated here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::config::ConfigError;
use crate::config::MAX_CONFIG_FILE_SIZE;
use crate::env::ALLOW_WRITE_VAR;
use crate::env::DISABLED_CATEGORIES_VAR;
use crate::env::DISABLED_TOOLS_REGEX_VAR;
use crate::env::DISABLED_TOOLS_VAR;
use crate::env::ENABLED_CATEGORIES_VAR;
use crate::env::ENABLED_TOOLS_REGEX_VAR;
use crate::env::ENABLED_TOOLS_VAR;
use crate::env::EnvSnapshot;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a display name.
pub(crate) const MAX_DISPLAY_NAME_LENGTH: usize = 128;
/// Maximum number of override entries.
pub(crate) const MAX_OVERRIDE_ENTRIES: usize = 1024;

// ============================================================================
// SECTION: Filter Configuration
// ============================================================================

/// Visibility rules applied when computing the effective tool set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Category allow-list. Empty means every category is allowed.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Tool names explicitly included.
    #[serde(default)]
    pub include: Vec<String>,
    /// Tool names explicitly excluded. Exclusion beats inclusion.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Case-insensitive prefix patterns for inclusion.
    #[serde(default)]
    pub include_regex: Vec<String>,
    /// Case-insensitive prefix patterns for exclusion.
    #[serde(default)]
    pub exclude_regex: Vec<String>,
    /// Categories whose non-core tools are removed.
    #[serde(default)]
    pub exclude_categories: Vec<String>,
    /// Whether mutating tools remain visible.
    #[serde(default = "default_allow_write")]
    pub allow_write: bool,
    /// Named tool groups usable wherever a category name is accepted.
    #[serde(default)]
    pub custom_categories: BTreeMap<String, Vec<String>>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            include_regex: Vec::new(),
            exclude_regex: Vec::new(),
            exclude_categories: Vec::new(),
            allow_write: true,
            custom_categories: BTreeMap::new(),
        }
    }
}

impl FilterConfig {
    /// Builds filter rules from environment variables.
    ///
    /// Returns `None` when no filter variable is set.
    #[must_use]
    pub fn from_env(env: &EnvSnapshot) -> Option<Self> {
        let names = [
            ENABLED_TOOLS_VAR,
            DISABLED_TOOLS_VAR,
            ENABLED_CATEGORIES_VAR,
            DISABLED_CATEGORIES_VAR,
            ENABLED_TOOLS_REGEX_VAR,
            DISABLED_TOOLS_REGEX_VAR,
            ALLOW_WRITE_VAR,
        ];
        if !names.iter().any(|name| env.is_set(name)) {
            return None;
        }
        Some(Self {
            categories: env.list(ENABLED_CATEGORIES_VAR),
            include: env.list(ENABLED_TOOLS_VAR),
            exclude: env.list(DISABLED_TOOLS_VAR),
            include_regex: env.list(ENABLED_TOOLS_REGEX_VAR),
            exclude_regex: env.list(DISABLED_TOOLS_REGEX_VAR),
            exclude_categories: env.list(DISABLED_CATEGORIES_VAR),
            allow_write: env.flag(ALLOW_WRITE_VAR).unwrap_or(true),
            custom_categories: BTreeMap::new(),
        })
    }

    /// Returns true when no rule narrows visibility.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.categories.is_empty()
            && self.include.is_empty()
            && self.include_regex.is_empty()
            && self.exclude.is_empty()
            && self.exclude_regex.is_empty()
            && self.exclude_categories.is_empty()
            && self.allow_write
    }

    /// Validates structural constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a custom category is malformed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, members) in &self.custom_categories {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "filter.custom_categories names must be non-empty".to_string(),
                ));
            }
            if members.iter().any(|member| member.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "filter.custom_categories.{name} contains an empty tool name"
                )));
            }
        }
        Ok(())
    }
}

/// Default write posture.
const fn default_allow_write() -> bool {
    true
}

// ============================================================================
// SECTION: Override Configuration
// ============================================================================

/// Presentation overrides for a single tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToolOverride {
    /// Replacement name shown to clients.
    #[serde(default, alias = "name", alias = "displayName", alias = "customName")]
    pub display_name: Option<String>,
    /// Replacement description.
    #[serde(default, alias = "desc", alias = "customDescription")]
    pub description: Option<String>,
    /// Replacement descriptions keyed by argument name.
    #[serde(default, alias = "args")]
    pub arguments: BTreeMap<String, String>,
    /// Hides the tool when set to false.
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl ToolOverride {
    /// Overlays another override on top of this one, field by field.
    fn overlay(&mut self, other: &Self) {
        if other.display_name.is_some() {
            self.display_name.clone_from(&other.display_name);
        }
        if other.description.is_some() {
            self.description.clone_from(&other.description);
        }
        if other.enabled.is_some() {
            self.enabled = other.enabled;
        }
        for (argument, description) in &other.arguments {
            self.arguments.insert(argument.clone(), description.clone());
        }
    }
}

/// Per-tool override document: `{tools: {<name>: {...}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideConfig {
    /// Overrides keyed by the registry tool name.
    #[serde(default)]
    pub tools: BTreeMap<String, ToolOverride>,
}

impl OverrideConfig {
    /// Loads an override document from a YAML or JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|err| {
            ConfigError::Io(format!("override file {}: {err}", path.display()))
        })?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("override file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("override file must be utf-8".to_string()))?;
        let config = Self::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses an override document from YAML or JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document is malformed.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns a copy with `other` layered on top of `self`.
    #[must_use]
    pub fn merged_with(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (name, entry) in &other.tools {
            merged.tools.entry(name.clone()).or_default().overlay(entry);
        }
        merged
    }

    /// Returns the override for a tool, if any.
    #[must_use]
    pub fn get(&self, tool: &str) -> Option<&ToolOverride> {
        self.tools.get(tool)
    }

    /// Validates override entries.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a display name is malformed or the
    /// document is oversized.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tools.len() > MAX_OVERRIDE_ENTRIES {
            return Err(ConfigError::Invalid("too many tool overrides".to_string()));
        }
        for (tool, entry) in &self.tools {
            if let Some(display_name) = &entry.display_name {
                validate_display_name(tool, display_name)?;
            }
        }
        Ok(())
    }
}

/// Display names are restricted to ASCII letters, digits, `_`, and `-`.
fn validate_display_name(tool: &str, display_name: &str) -> Result<(), ConfigError> {
    if display_name.is_empty() || display_name.len() > MAX_DISPLAY_NAME_LENGTH {
        return Err(ConfigError::Invalid(format!(
            "tools.{tool}.display_name must be 1..={MAX_DISPLAY_NAME_LENGTH} characters"
        )));
    }
    if !display_name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') {
        return Err(ConfigError::Invalid(format!(
            "tools.{tool}.display_name may only contain letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}
