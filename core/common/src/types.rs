//! Identifier types used throughout Lagoon.

use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Date stamp layout of a snapshot directory name.
pub const SNAPSHOT_FORMAT: &str = "%Y%m%d";

// Matches a date in YYYYMMDD format from 19000101 through 20991231
static SNAPSHOT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(19|20)\d\d(0[1-9]|1[012])(0[1-9]|[12][0-9]|3[01])$")
        .expect("snapshot pattern is valid")
});

/// Unique identifier for a mirrored repository.
///
/// Restricted to lowercase ASCII letters, digits, `-` and `_` so that it can
/// be used verbatim as a directory name and a metrics label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId(String);

impl RepoId {
    /// Create a new RepoId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty or contains a disallowed character
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if !Self::is_valid(&id) {
            return Err(crate::Error::InvalidInput(format!(
                "repository id '{}' must be non-empty and only contain a-z, 0-9, '-' or '_'",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Check whether a string is an acceptable repository id.
    pub fn is_valid(id: &str) -> bool {
        !id.is_empty()
            && id
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepoId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.0
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A snapshot identifier: the `YYYYMMDD` stamp of the day it was taken.
///
/// Ordering is lexicographic, which for this layout is also chronological.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Build the stamp for a calendar date.
    ///
    /// # Errors
    /// - Returns error if the year falls outside 1900 through 2099
    pub fn from_date(date: NaiveDate) -> crate::Result<Self> {
        if !(1900..=2099).contains(&date.year()) {
            return Err(crate::Error::InvalidInput(format!(
                "snapshot date {} is out of range",
                date
            )));
        }
        Ok(Self(date.format(SNAPSHOT_FORMAT).to_string()))
    }

    /// Stamp for the current local calendar day.
    pub fn today() -> crate::Result<Self> {
        Self::from_date(Local::now().date_naive())
    }

    /// Parse a directory name into a snapshot id.
    pub fn parse(name: &str) -> crate::Result<Self> {
        if !Self::is_valid(name) {
            return Err(crate::Error::InvalidInput(format!(
                "'{}' is not a snapshot name",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Check whether a name has the snapshot stamp layout.
    pub fn is_valid(name: &str) -> bool {
        SNAPSHOT_PATTERN.is_match(name)
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SnapshotId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_repo_id_creation() {
        let id = RepoId::new("centos-7_base").unwrap();
        assert_eq!(id.as_str(), "centos-7_base");
    }

    #[test]
    fn test_repo_id_rejects_invalid() {
        assert!(RepoId::new("").is_err());
        assert!(RepoId::new("CentOS").is_err());
        assert!(RepoId::new("repo id").is_err());
        assert!(RepoId::new("repo.id").is_err());
        assert!(RepoId::new("repo/id").is_err());
    }

    #[test]
    fn test_snapshot_from_date() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let id = SnapshotId::from_date(date).unwrap();
        assert_eq!(id.as_str(), "20230102");
    }

    #[test]
    fn test_snapshot_date_out_of_range() {
        let date = NaiveDate::from_ymd_opt(2100, 1, 1).unwrap();
        assert!(SnapshotId::from_date(date).is_err());
    }

    #[test]
    fn test_snapshot_pattern() {
        assert!(SnapshotId::is_valid("19000101"));
        assert!(SnapshotId::is_valid("20991231"));
        assert!(!SnapshotId::is_valid("21000101"));
        assert!(!SnapshotId::is_valid("20231301"));
        assert!(!SnapshotId::is_valid("20230100"));
        assert!(!SnapshotId::is_valid("20230132"));
        assert!(!SnapshotId::is_valid("latest"));
        assert!(!SnapshotId::is_valid("20230101.old"));
        assert!(!SnapshotId::is_valid(""));
    }

    #[test]
    fn test_snapshot_ordering_is_chronological() {
        let mut ids: Vec<SnapshotId> = ["20230201", "20221231", "20230115"]
            .iter()
            .map(|s| SnapshotId::parse(s).unwrap())
            .collect();
        ids.sort();
        let names: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["20221231", "20230115", "20230201"]);
    }

    proptest! {
        #[test]
        fn prop_valid_repo_ids_accepted(id in "[a-z0-9_-]{1,32}") {
            prop_assert!(RepoId::new(id).is_ok());
        }

        #[test]
        fn prop_foreign_character_rejected(
            prefix in "[a-z0-9_-]{0,8}",
            bad in "[^a-z0-9_-]",
            suffix in "[a-z0-9_-]{0,8}",
        ) {
            let id = format!("{}{}{}", prefix, bad, suffix);
            prop_assert!(RepoId::new(id).is_err());
        }

        #[test]
        fn prop_stamp_matches_date(days in 0i64..73000) {
            let date = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap() + chrono::Duration::days(days);
            let id = SnapshotId::from_date(date).unwrap();
            prop_assert!(SnapshotId::is_valid(id.as_str()));
        }
    }
}
