// crates/opensearch-mcp/src/ndjson.rs
// ============================================================================
// Module: Newline-Delimited JSON
// Description: Splitting and merging of single or multi-document JSON text.
// Purpose: Accept both aggregate and newline-delimited payloads uniformly.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Upstream payloads and specification files may hold one JSON document
//! (possibly pretty-printed across many lines) or a sequence of documents,
//! one per line. Text that parses as a whole is a single document; anything
//! else is split on line boundaries and each line is parsed independently so
//! one bad line never poisons its neighbours.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One parsed document and the 1-based line it started on.
#[derive(Debug)]
pub struct Document {
    /// Line number of the document within the source text.
    pub line: usize,
    /// Parse outcome.
    pub result: Result<Value, serde_json::Error>,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Splits text into independently parsed documents.
#[must_use]
pub fn split_documents(text: &str) -> Vec<Document> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return vec![Document {
            line: 1,
            result: Ok(value),
        }];
    }
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| Document {
            line: index + 1,
            result: serde_json::from_str(line),
        })
        .collect()
}

/// Merges a payload into one structured value.
///
/// A single document is returned as-is; several documents become an array in
/// source order. Blank text yields `null`.
///
/// # Errors
///
/// Returns the first parse error when any document is malformed.
pub fn merge_documents(text: &str) -> Result<Value, serde_json::Error> {
    let mut documents = split_documents(text);
    if documents.len() == 1 {
        return documents.remove(0).result;
    }
    if documents.is_empty() {
        return Ok(Value::Null);
    }
    documents
        .into_iter()
        .map(|document| document.result)
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
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

    use serde_json::json;

    use super::merge_documents;
    use super::split_documents;

    #[test]
    fn pretty_printed_document_is_single() {
        let text = "{\n  \"a\": 1,\n  \"b\": [1, 2]\n}\n";
        let documents = split_documents(text);
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].result.as_ref().unwrap(), &json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn bad_line_does_not_poison_neighbours() {
        let text = "{\"a\":1}\n{not json}\n\n{\"c\":3}\n";
        let documents = split_documents(text);
        assert_eq!(documents.len(), 3);
        assert!(documents[0].result.is_ok());
        assert!(documents[1].result.is_err());
        assert_eq!(documents[1].line, 2);
        assert_eq!(documents[2].line, 4);
    }

    #[test]
    fn merge_builds_ordered_array() {
        let merged = merge_documents("{\"took\":1}\n{\"took\":2}\n").unwrap();
        assert_eq!(merged, json!([{"took": 1}, {"took": 2}]));
        assert_eq!(merge_documents("{\"x\":true}").unwrap(), json!({"x": true}));
        assert_eq!(merge_documents("  ").unwrap(), serde_json::Value::Null);
        assert!(merge_documents("{\"a\":1}\nbroken\n").is_err());
    }
}
