// crates/opensearch-mcp/src/filter.rs
// ============================================================================
// Module: Tool Filter
// Description: Effective tool set computation with overrides.
// Purpose: Decide which tools a session sees and how they are described.
// Dependencies: opensearch-mcp-config, regex, serde_json, tracing
// ============================================================================

//! ## Overview
//! The effective tool set is a pure function of the registry snapshot, the
//! resolved cluster version, the filter rules, and the overrides.
//! [`FilterPolicy::compile`] resolves category names and compiles patterns
//! once; [`FilterPolicy::apply`] runs the pipeline for a cluster version:
//!
//! 1. Version gate, applied to every tool including `core`.
//! 2. Override `enabled = false` hides the tool.
//! 3. Allow gate: categories, include names, and include patterns form one
//!    allow set. `core` tools bypass it; an empty allow set admits all.
//! 4. Exclude names and patterns. Exclusion beats inclusion.
//! 5. Excluded categories drop non-core tools.
//! 6. Write protection drops mutating tools.
//! 7. Overrides replace descriptions, argument descriptions, and names.
//!
//! Malformed rules are fail-open: the offending rule is recorded as a
//! [`FilterError`] and treated as a no-op.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use opensearch_mcp_config::FilterConfig;
use opensearch_mcp_config::OverrideConfig;
use regex::Regex;
use regex::RegexBuilder;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::definition::ToolAccess;
use crate::definition::ToolCategory;
use crate::definition::ToolDefinition;
use crate::registry::RegisteredTool;
use crate::registry::ToolRegistry;
use crate::version::ClusterVersion;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Argument added to listed schemas when several clusters are configured.
pub const CLUSTER_SELECTOR_ARGUMENT: &str = "opensearch_cluster_name";
/// Legacy alias for the core category.
const CORE_CATEGORY_ALIAS: &str = "core_tools";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Recovered filter and override faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// A name pattern failed to compile and was ignored.
    #[error("ignoring invalid {rule} pattern {pattern:?}: {message}")]
    InvalidPattern {
        /// Rule list the pattern came from.
        rule: &'static str,
        /// Pattern text.
        pattern: String,
        /// Compiler message.
        message: String,
    },
    /// A category name is neither built-in nor custom.
    #[error("ignoring unknown category {name:?} in {rule}")]
    UnknownCategory {
        /// Rule list the name came from.
        rule: &'static str,
        /// Category name.
        name: String,
    },
    /// An override names a tool that is not registered.
    #[error("override for unknown tool {tool:?} ignored")]
    UnknownOverrideTool {
        /// Tool name.
        tool: String,
    },
    /// An override names an argument the tool does not accept.
    #[error("override for unknown argument {argument:?} of tool {tool:?} ignored")]
    UnknownOverrideArgument {
        /// Tool name.
        tool: String,
        /// Argument name.
        argument: String,
    },
    /// A display name collides with another visible tool.
    #[error("display name {display_name:?} for tool {tool:?} collides with another tool; ignored")]
    NameCollision {
        /// Tool name.
        tool: String,
        /// Requested display name.
        display_name: String,
    },
}

// ============================================================================
// SECTION: Effective Tools
// ============================================================================

/// One visible tool with overrides applied.
#[derive(Debug, Clone)]
pub struct EffectiveTool {
    /// Visible name, possibly overridden.
    pub name: String,
    /// Visible description, possibly overridden.
    pub description: String,
    /// Input schema with overridden argument descriptions.
    pub input_schema: Value,
    /// Registered tool backing this entry.
    pub tool: Arc<RegisteredTool>,
}

impl EffectiveTool {
    /// Definition as registered.
    #[must_use]
    pub fn definition(&self) -> &ToolDefinition {
        &self.tool.definition
    }

    /// Registry name.
    #[must_use]
    pub fn registry_name(&self) -> &str {
        &self.tool.definition.name
    }

    /// Tool category.
    #[must_use]
    pub fn category(&self) -> ToolCategory {
        self.tool.definition.category
    }

    /// Schema advertised to clients. With several clusters configured, an
    /// optional cluster selector argument is added.
    #[must_use]
    pub fn listed_schema(&self, multi_cluster: bool) -> Value {
        let mut schema = self.input_schema.clone();
        if multi_cluster
            && let Some(properties) = schema.get_mut("properties").and_then(Value::as_object_mut)
        {
            properties.entry(CLUSTER_SELECTOR_ARGUMENT).or_insert_with(|| {
                json!({"type": "string", "description": "Name of the cluster profile to run against."})
            });
        }
        schema
    }
}

/// Ordered effective tool set for one cluster version.
#[derive(Debug, Clone, Default)]
pub struct EffectiveToolSet {
    /// Visible tools in registry order.
    tools: Vec<EffectiveTool>,
    /// Visible name to position.
    index: BTreeMap<String, usize>,
    /// Version the set was computed for.
    cluster_version: Option<ClusterVersion>,
    /// Recovered faults encountered while computing.
    warnings: Vec<FilterError>,
}

impl EffectiveToolSet {
    /// Looks up a tool by visible name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EffectiveTool> {
        self.index.get(name).and_then(|position| self.tools.get(*position))
    }

    /// Visible tools in order.
    pub fn iter(&self) -> impl Iterator<Item = &EffectiveTool> {
        self.tools.iter()
    }

    /// Visible names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }

    /// Number of visible tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true when no tool is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Cluster version the set was computed for.
    #[must_use]
    pub const fn cluster_version(&self) -> Option<ClusterVersion> {
        self.cluster_version
    }

    /// Recovered faults.
    #[must_use]
    pub fn warnings(&self) -> &[FilterError] {
        &self.warnings
    }
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// A category reference resolved against built-in and custom categories.
#[derive(Debug, Clone)]
enum CategoryRef {
    /// Built-in category.
    Builtin(ToolCategory),
    /// Custom group members, lower-cased.
    Custom(BTreeSet<String>),
}

impl CategoryRef {
    /// Returns true when the tool belongs to this category.
    fn contains(&self, definition: &ToolDefinition, display_name: &str) -> bool {
        match self {
            Self::Builtin(category) => definition.category == *category,
            Self::Custom(members) => {
                members.contains(&definition.name.to_lowercase())
                    || members.contains(&display_name.to_lowercase())
            }
        }
    }
}

/// Compiled filter rules and overrides.
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    /// Allowed categories.
    categories: Vec<CategoryRef>,
    /// Included names, lower-cased.
    include: BTreeSet<String>,
    /// Excluded names, lower-cased.
    exclude: BTreeSet<String>,
    /// Include patterns.
    include_patterns: Vec<Regex>,
    /// Exclude patterns.
    exclude_patterns: Vec<Regex>,
    /// Excluded categories.
    exclude_categories: Vec<CategoryRef>,
    /// Whether mutating tools stay visible.
    allow_write: bool,
    /// Override snapshot.
    overrides: OverrideConfig,
    /// Faults found while compiling.
    warnings: Vec<FilterError>,
}

impl FilterPolicy {
    /// Compiles filter rules and overrides. Never fails; malformed rules are
    /// recorded and ignored.
    #[must_use]
    pub fn compile(filter: &FilterConfig, overrides: &OverrideConfig) -> Self {
        let mut warnings = Vec::new();
        let categories =
            resolve_categories("categories", &filter.categories, filter, &mut warnings);
        let exclude_categories =
            resolve_categories("exclude_categories", &filter.exclude_categories, filter, &mut warnings);
        let include_patterns = compile_patterns("include_regex", &filter.include_regex, &mut warnings);
        let exclude_patterns = compile_patterns("exclude_regex", &filter.exclude_regex, &mut warnings);
        Self {
            categories,
            include: lower_set(&filter.include),
            exclude: lower_set(&filter.exclude),
            include_patterns,
            exclude_patterns,
            exclude_categories,
            allow_write: filter.allow_write,
            overrides: overrides.clone(),
            warnings,
        }
    }

    /// Whether write operations are permitted.
    #[must_use]
    pub const fn allow_write(&self) -> bool {
        self.allow_write
    }

    /// Faults found while compiling.
    #[must_use]
    pub fn warnings(&self) -> &[FilterError] {
        &self.warnings
    }

    /// Logs compile faults once.
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            warn!(warning = %warning, "tool filter rule ignored");
        }
    }

    /// Computes the effective tool set. `None` disables the version gate.
    #[must_use]
    pub fn apply(
        &self,
        registry: &ToolRegistry,
        cluster_version: Option<ClusterVersion>,
    ) -> EffectiveToolSet {
        let mut warnings = self.warnings.clone();
        for tool in self.overrides.tools.keys() {
            if registry.get(tool).is_none() {
                warnings.push(FilterError::UnknownOverrideTool {
                    tool: tool.clone(),
                });
            }
        }

        let mut admitted = Vec::new();
        for registered in registry.list() {
            let definition = &registered.definition;
            let entry = self.overrides.get(&definition.name);
            let display_name =
                entry.and_then(|entry| entry.display_name.as_deref()).unwrap_or(&definition.name);
            if self.admits(definition, display_name, cluster_version)
                && entry.and_then(|entry| entry.enabled) != Some(false)
            {
                admitted.push(Arc::clone(registered));
            }
        }

        // Unrenamed names are reserved first so a rename can never shadow them.
        let mut taken: BTreeSet<String> = admitted
            .iter()
            .filter(|registered| {
                self.overrides
                    .get(&registered.definition.name)
                    .and_then(|entry| entry.display_name.as_ref())
                    .is_none()
            })
            .map(|registered| registered.definition.name.clone())
            .collect();

        let mut set = EffectiveToolSet {
            cluster_version,
            ..EffectiveToolSet::default()
        };
        for registered in admitted {
            let tool = self.decorate(registered, &mut taken, &mut warnings);
            set.index.insert(tool.name.clone(), set.tools.len());
            set.tools.push(tool);
        }
        set.warnings = warnings;
        set
    }

    /// Runs gates 1 and 3 to 6 for one tool.
    fn admits(
        &self,
        definition: &ToolDefinition,
        display_name: &str,
        cluster_version: Option<ClusterVersion>,
    ) -> bool {
        if let Some(version) = cluster_version
            && !definition.versions.contains(&version)
        {
            return false;
        }
        let is_core = definition.category == ToolCategory::Core;
        let names = [definition.name.to_lowercase(), display_name.to_lowercase()];
        let named_in = |set: &BTreeSet<String>| names.iter().any(|name| set.contains(name));
        let matches_any = |patterns: &[Regex]| {
            patterns.iter().any(|pattern| {
                pattern.is_match(&definition.name) || pattern.is_match(display_name)
            })
        };

        let allow_active = !self.categories.is_empty()
            || !self.include.is_empty()
            || !self.include_patterns.is_empty();
        if allow_active && !is_core {
            let allowed = self
                .categories
                .iter()
                .any(|category| category.contains(definition, display_name))
                || named_in(&self.include)
                || matches_any(&self.include_patterns);
            if !allowed {
                return false;
            }
        }
        if named_in(&self.exclude) || matches_any(&self.exclude_patterns) {
            return false;
        }
        if !is_core
            && self
                .exclude_categories
                .iter()
                .any(|category| category.contains(definition, display_name))
        {
            return false;
        }
        self.allow_write || definition.access == ToolAccess::ReadOnly
    }

    /// Applies step 7 to an admitted tool.
    fn decorate(
        &self,
        registered: Arc<RegisteredTool>,
        taken: &mut BTreeSet<String>,
        warnings: &mut Vec<FilterError>,
    ) -> EffectiveTool {
        let definition = &registered.definition;
        let mut name = definition.name.clone();
        let mut description = definition.description.clone();
        let mut input_schema = definition.input_schema.clone();
        if let Some(entry) = self.overrides.get(&definition.name) {
            if let Some(text) = &entry.description {
                description.clone_from(text);
            }
            for (argument, text) in &entry.arguments {
                let property = input_schema
                    .get_mut("properties")
                    .and_then(|properties| properties.get_mut(argument))
                    .and_then(Value::as_object_mut);
                match property {
                    Some(property) => {
                        property.insert("description".to_string(), Value::String(text.clone()));
                    }
                    None => warnings.push(FilterError::UnknownOverrideArgument {
                        tool: definition.name.clone(),
                        argument: argument.clone(),
                    }),
                }
            }
            if let Some(display_name) = &entry.display_name {
                if taken.contains(display_name) {
                    warnings.push(FilterError::NameCollision {
                        tool: definition.name.clone(),
                        display_name: display_name.clone(),
                    });
                } else {
                    name.clone_from(display_name);
                }
            }
        }
        taken.insert(name.clone());
        EffectiveTool {
            name,
            description,
            input_schema,
            tool: Arc::clone(&registered),
        }
    }
}

/// Computes the effective tool set from raw configuration.
#[must_use]
pub fn compute(
    registry: &ToolRegistry,
    cluster_version: Option<ClusterVersion>,
    filter: &FilterConfig,
    overrides: &OverrideConfig,
) -> EffectiveToolSet {
    FilterPolicy::compile(filter, overrides).apply(registry, cluster_version)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Lower-cases and trims names.
fn lower_set(names: &[String]) -> BTreeSet<String> {
    names
        .iter()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Resolves category names against built-in and custom categories.
fn resolve_categories(
    rule: &'static str,
    names: &[String],
    filter: &FilterConfig,
    warnings: &mut Vec<FilterError>,
) -> Vec<CategoryRef> {
    let mut resolved = Vec::new();
    for name in names.iter().map(|name| name.trim()).filter(|name| !name.is_empty()) {
        if name.eq_ignore_ascii_case(CORE_CATEGORY_ALIAS) {
            resolved.push(CategoryRef::Builtin(ToolCategory::Core));
        } else if let Some(category) = ToolCategory::parse(name) {
            resolved.push(CategoryRef::Builtin(category));
        } else if let Some(members) = filter.custom_categories.get(name) {
            resolved.push(CategoryRef::Custom(lower_set(members)));
        } else {
            warnings.push(FilterError::UnknownCategory {
                rule,
                name: name.to_string(),
            });
        }
    }
    resolved
}

/// Compiles case-insensitive patterns anchored at the start of the name.
fn compile_patterns(
    rule: &'static str,
    patterns: &[String],
    warnings: &mut Vec<FilterError>,
) -> Vec<Regex> {
    let mut compiled = Vec::new();
    for pattern in patterns.iter().filter(|pattern| !pattern.trim().is_empty()) {
        match RegexBuilder::new(&format!("^(?:{pattern})")).case_insensitive(true).build() {
            Ok(regex) => compiled.push(regex),
            Err(err) => warnings.push(FilterError::InvalidPattern {
                rule,
                pattern: pattern.clone(),
                message: err.to_string(),
            }),
        }
    }
    compiled
}

#[cfg(test)]
mod tests;
