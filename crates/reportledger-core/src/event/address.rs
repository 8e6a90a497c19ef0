//! Normalization of recipient lists and artifact paths.
//!
//! Recipient lists arrive from hand-edited spreadsheets with mixed separators,
//! stray whitespace and inconsistent casing. Both recipients and paths are
//! stored in a readable canonical form plus a lowercase comparison key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator used when joining a canonical recipient list.
pub const RECIPIENT_SEPARATOR: &str = ", ";

/// Separator used when joining several attachment paths into one field.
pub const PATH_LIST_SEPARATOR: &str = ";";

/// An order-independent set of recipient addresses.
///
/// Addresses keep their original casing. Two sets are the same logical
/// recipient set iff their [`key`](Self::key) values are equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipientSet {
    addresses: Vec<String>,
}

impl RecipientSet {
    /// Parses a raw address list separated by `;` and/or `,`.
    ///
    /// Parts are trimmed and empty parts dropped. Duplicates are kept.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut addresses: Vec<String> = raw
            .split([';', ','])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(ToString::to_string)
            .collect();
        addresses.sort_by_cached_key(|addr| addr.to_lowercase());
        Self { addresses }
    }

    /// Returns true if the set holds no addresses.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Number of addresses in the set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Individual addresses in canonical order.
    #[must_use]
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// Canonical storage form: sorted addresses joined with `", "`.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.addresses.join(RECIPIENT_SEPARATOR)
    }

    /// Case-folded comparison key.
    #[must_use]
    pub fn key(&self) -> String {
        self.canonical().to_lowercase()
    }
}

impl PartialEq for RecipientSet {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for RecipientSet {}

impl fmt::Display for RecipientSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Comparison key for an artifact path: lowercase with `\` turned into `/`.
#[must_use]
pub fn path_key(path: &str) -> String {
    path.trim().replace('\\', "/").to_lowercase()
}

/// Comparison key for a subject line: trimmed and lowercased, Unicode aware.
#[must_use]
pub fn subject_key(subject: &str) -> String {
    subject.trim().to_lowercase()
}

/// Joins attachment paths into the single field stored on Email events.
#[must_use]
pub fn join_paths<S: AsRef<str>>(paths: &[S]) -> String {
    paths
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(PATH_LIST_SEPARATOR)
}

/// Splits a `;`-separated attachment field into trimmed, non-empty paths.
#[must_use]
pub fn split_paths(raw: &str) -> Vec<String> {
    raw.split(PATH_LIST_SEPARATOR)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mixed_separators_and_case() {
        let a = RecipientSet::parse("a@x.com, b@y.com");
        let b = RecipientSet::parse("b@Y.com;a@X.com");
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_storage_keeps_case() {
        let set = RecipientSet::parse(" Ops@Co.com ;; finance@co.com ");
        assert_eq!(set.canonical(), "finance@co.com, Ops@Co.com");
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_duplicates_are_not_removed() {
        let set = RecipientSet::parse("a@x.com; A@X.com");
        assert_eq!(set.len(), 2);
        assert_ne!(set, RecipientSet::parse("a@x.com"));
    }

    #[test]
    fn test_empty_input() {
        assert!(RecipientSet::parse("  ; , ").is_empty());
        assert_eq!(RecipientSet::parse("").canonical(), "");
    }

    #[test]
    fn test_path_key_normalizes_separators() {
        assert_eq!(path_key(r"C:\Reports\A.csv"), "c:/reports/a.csv");
        assert_eq!(path_key("c:/reports/a.csv"), path_key(r"C:\REPORTS\a.CSV"));
    }

    #[test]
    fn test_subject_key_folds_non_ascii_case() {
        assert_eq!(subject_key("  ÜMSATZ Daily "), "ümsatz daily");
        assert_eq!(subject_key("Ümsatz daily"), subject_key("üMSATZ DAILY"));
    }

    #[test]
    fn test_split_and_join_paths() {
        let paths = split_paths(" /r/a.csv ; ;/r/b.csv");
        assert_eq!(paths, vec!["/r/a.csv", "/r/b.csv"]);
        assert_eq!(join_paths(&paths), "/r/a.csv;/r/b.csv");
    }

    proptest! {
        #[test]
        fn prop_order_and_case_do_not_matter(
            addrs in proptest::collection::vec("[a-z]{1,8}@[a-z]{1,6}\\.com", 1..6)
        ) {
            let forward = addrs.join(", ");
            let reversed: Vec<String> = addrs.iter().rev().map(|a| a.to_uppercase()).collect();
            let backward = reversed.join(";");
            prop_assert_eq!(RecipientSet::parse(&forward), RecipientSet::parse(&backward));
        }
    }
}
