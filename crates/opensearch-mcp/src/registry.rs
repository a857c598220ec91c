// crates/opensearch-mcp/src/registry.rs
// ============================================================================
// Module: Tool Registry
// Description: Immutable tool catalog and atomically swapped snapshots.
// Purpose: Key definitions by name and publish rebuilds without tearing.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`ToolRegistry::build`] validates a definition list once: names must be
//! unique and every input schema must compile. The result never changes.
//! Rebuilds produce a new registry that is installed through a
//! [`SnapshotCell`], so readers see the old or the new catalog in full.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use thiserror::Error;

use crate::definition::ToolDefinition;
use crate::validation::ArgumentValidator;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// One registered tool and its compiled argument validator.
#[derive(Debug)]
pub struct RegisteredTool {
    /// Definition as built.
    pub definition: ToolDefinition,
    /// Compiled validator for the definition's input schema.
    pub validator: ArgumentValidator,
}

/// Immutable catalog of tool definitions keyed by name.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    /// Tools keyed by name.
    tools: BTreeMap<String, Arc<RegisteredTool>>,
    /// Names in insertion order.
    order: Vec<String>,
}

impl ToolRegistry {
    /// Builds a registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTool`] when two definitions share a
    /// name and [`RegistryError::InvalidSchema`] when an input schema does not
    /// compile.
    pub fn build(definitions: Vec<ToolDefinition>) -> Result<Self, RegistryError> {
        let mut tools = BTreeMap::new();
        let mut order = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if tools.contains_key(&definition.name) {
                return Err(RegistryError::DuplicateTool(definition.name));
            }
            let validator = ArgumentValidator::compile(&definition.input_schema).map_err(|message| {
                RegistryError::InvalidSchema {
                    tool: definition.name.clone(),
                    message,
                }
            })?;
            order.push(definition.name.clone());
            tools.insert(
                definition.name.clone(),
                Arc::new(RegisteredTool {
                    definition,
                    validator,
                }),
            );
        }
        Ok(Self {
            tools,
            order,
        })
    }

    /// Looks up a tool by registry name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredTool>> {
        self.tools.get(name)
    }

    /// Lists tools in build order.
    pub fn list(&self) -> impl Iterator<Item = &Arc<RegisteredTool>> {
        self.order.iter().filter_map(|name| self.tools.get(name))
    }

    /// Number of tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true when no tool is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Registry build failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two definitions share a name.
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),
    /// An input schema failed to compile.
    #[error("tool {tool} has an invalid input schema: {message}")]
    InvalidSchema {
        /// Tool name.
        tool: String,
        /// Compiler message.
        message: String,
    },
}

// ============================================================================
// SECTION: Snapshot Cell
// ============================================================================

/// Holds an immutable value replaced wholesale by pointer swap.
#[derive(Debug)]
pub struct SnapshotCell<T> {
    /// Current snapshot.
    current: RwLock<Arc<T>>,
}

impl<T> SnapshotCell<T> {
    /// Creates a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    /// Returns the current snapshot. The lock is released before returning.
    pub fn load(&self) -> Arc<T> {
        // A poisoned lock still holds a complete snapshot.
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Installs a new snapshot and returns the previous one.
    pub fn store(&self, value: T) -> Arc<T> {
        let next = Arc::new(value);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions favor direct unwraps for clarity."
    )]

    use std::sync::Arc;
    use std::thread;

    use serde_json::json;

    use super::RegistryError;
    use super::SnapshotCell;
    use super::ToolRegistry;
    use crate::handlers::BuiltinTool;
    use crate::loader::load_builtin;

    #[test]
    fn builtin_catalog_builds() {
        let registry = ToolRegistry::build(load_builtin()).unwrap();
        assert_eq!(registry.len(), BuiltinTool::ALL.len());
        let first = registry.list().next().unwrap();
        assert_eq!(first.definition.name, "ListIndexTool");
        assert!(registry.get("SearchIndexTool").is_some());
        assert!(registry.get("searchindextool").is_none());
    }

    #[test]
    fn duplicate_names_fail() {
        let definitions = vec![BuiltinTool::Count.definition(), BuiltinTool::Count.definition()];
        let err = ToolRegistry::build(definitions).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("CountTool".to_string()));
    }

    #[test]
    fn invalid_schema_fails() {
        let mut definition = BuiltinTool::Count.definition();
        definition.input_schema = json!({"type": 12});
        let err = ToolRegistry::build(vec![definition]).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSchema { .. }));
    }

    #[test]
    fn snapshot_readers_see_whole_values() {
        let cell = Arc::new(SnapshotCell::new(vec![0_u32; 64]));
        let writer = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                for round in 1 ..= 200 {
                    cell.store(vec![round; 64]);
                }
            })
        };
        for _ in 0 .. 200 {
            let snapshot = cell.load();
            assert!(snapshot.iter().all(|value| *value == snapshot[0]));
        }
        writer.join().unwrap();
        assert_eq!(cell.load()[0], 200);
    }
}
