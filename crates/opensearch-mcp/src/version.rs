// crates/opensearch-mcp/src/version.rs
// ============================================================================
// Module: Cluster Versions
// Description: Semantic version value type and inclusive version ranges.
// Purpose: Compare tool version bounds against cluster versions uniformly.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! [`ClusterVersion`] is a totally ordered `major.minor.patch` triple. Parsing
//! accepts partial versions (`2.5` and `3` fill missing components with zero)
//! and strips pre-release or build suffixes (`2.11.0-SNAPSHOT`). Ordering is
//! numeric per component, never lexical.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

// ============================================================================
// SECTION: Version
// ============================================================================

/// A semantic cluster version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterVersion {
    /// Major component.
    major: u64,
    /// Minor component.
    minor: u64,
    /// Patch component.
    patch: u64,
}

impl ClusterVersion {
    /// Creates a version from its components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses a version string.
    ///
    /// # Errors
    ///
    /// Returns [`VersionParseError`] when the input is not a version.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        input.parse()
    }

    /// Major component.
    #[must_use]
    pub const fn major(&self) -> u64 {
        self.major
    }

    /// Minor component.
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.minor
    }

    /// Patch component.
    #[must_use]
    pub const fn patch(&self) -> u64 {
        self.patch
    }
}

impl FromStr for ClusterVersion {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        let core = trimmed.split(['-', '+']).next().unwrap_or_default();
        if core.is_empty() {
            return Err(VersionParseError::Empty);
        }
        let mut components = [0_u64; 3];
        let mut count = 0;
        for part in core.split('.') {
            if count == components.len() {
                return Err(VersionParseError::TooManyComponents(input.to_string()));
            }
            components[count] = part
                .parse()
                .map_err(|_| VersionParseError::InvalidComponent(input.to_string()))?;
            count += 1;
        }
        Ok(Self::new(components[0], components[1], components[2]))
    }
}

impl fmt::Display for ClusterVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for ClusterVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// SECTION: Range
// ============================================================================

/// Inclusive version bounds. An absent bound is unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionRange {
    /// Lowest supported version.
    pub min: Option<ClusterVersion>,
    /// Highest supported version.
    pub max: Option<ClusterVersion>,
}

impl VersionRange {
    /// Returns true when `version` lies within the bounds.
    #[must_use]
    pub fn contains(&self, version: &ClusterVersion) -> bool {
        self.min.is_none_or(|min| min <= *version) && self.max.is_none_or(|max| *version <= max)
    }

    /// Returns true when both bounds are absent.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(f, "{min} to {max}"),
            (Some(min), None) => write!(f, "{min} or later"),
            (None, Some(max)) => write!(f, "up to {max}"),
            (None, None) => f.write_str("any version"),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Version parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    /// Input was blank.
    #[error("empty version string")]
    Empty,
    /// A component was not a non-negative integer.
    #[error("invalid version component in {0:?}")]
    InvalidComponent(String),
    /// More than three numeric components.
    #[error("too many version components in {0:?}")]
    TooManyComponents(String),
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

    use proptest::prelude::*;

    use super::ClusterVersion;
    use super::VersionParseError;
    use super::VersionRange;

    #[test]
    fn partial_versions_fill_zeroes() {
        assert_eq!(ClusterVersion::parse("2.5").unwrap(), ClusterVersion::new(2, 5, 0));
        assert_eq!(ClusterVersion::parse("3").unwrap(), ClusterVersion::new(3, 0, 0));
        assert_eq!(ClusterVersion::parse(" v1.2.3 ").unwrap(), ClusterVersion::new(1, 2, 3));
    }

    #[test]
    fn suffixes_are_stripped() {
        assert_eq!(
            ClusterVersion::parse("2.11.0-SNAPSHOT").unwrap(),
            ClusterVersion::new(2, 11, 0)
        );
        assert_eq!(ClusterVersion::parse("2.9.0+build.7").unwrap(), ClusterVersion::new(2, 9, 0));
    }

    #[test]
    fn malformed_versions_rejected() {
        assert_eq!(ClusterVersion::parse(""), Err(VersionParseError::Empty));
        assert!(matches!(
            ClusterVersion::parse("two.one"),
            Err(VersionParseError::InvalidComponent(_))
        ));
        assert!(matches!(
            ClusterVersion::parse("1.2.3.4"),
            Err(VersionParseError::TooManyComponents(_))
        ));
        assert!(ClusterVersion::parse("1..2").is_err());
    }

    #[test]
    fn numeric_not_lexical_ordering() {
        assert!(ClusterVersion::parse("2.10.0").unwrap() > ClusterVersion::parse("2.9.9").unwrap());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = VersionRange {
            min: Some(ClusterVersion::new(2, 0, 0)),
            max: Some(ClusterVersion::new(2, 12, 0)),
        };
        assert!(range.contains(&ClusterVersion::new(2, 0, 0)));
        assert!(range.contains(&ClusterVersion::new(2, 12, 0)));
        assert!(!range.contains(&ClusterVersion::new(1, 9, 9)));
        assert!(!range.contains(&ClusterVersion::new(2, 12, 1)));
        assert!(VersionRange::default().contains(&ClusterVersion::new(0, 0, 0)));
    }

    proptest! {
        #[test]
        fn ordering_matches_component_tuples(
            a in (0_u64..50, 0_u64..50, 0_u64..50),
            b in (0_u64..50, 0_u64..50, 0_u64..50),
        ) {
            let left = ClusterVersion::new(a.0, a.1, a.2);
            let right = ClusterVersion::new(b.0, b.1, b.2);
            prop_assert_eq!(left.cmp(&right), a.cmp(&b));
        }

        #[test]
        fn display_round_trips(major in 0_u64..1000, minor in 0_u64..1000, patch in 0_u64..1000) {
            let version = ClusterVersion::new(major, minor, patch);
            prop_assert_eq!(ClusterVersion::parse(&version.to_string()).unwrap(), version);
        }
    }
}
