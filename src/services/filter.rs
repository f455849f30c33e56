//! Case-insensitive substring search over an object's identifying text.

use crate::models::object::ObjectRecord;

/// A search term lowered once so it can be tested against many records.
///
/// An absent or blank term matches everything.
#[derive(Clone, Debug, Default)]
pub struct SearchTerm {
    needle: Option<String>,
}

impl SearchTerm {
    pub fn new(raw: Option<&str>) -> Self {
        Self {
            needle: raw.filter(|s| !s.trim().is_empty()).map(str::to_lowercase),
        }
    }

    /// Matches against `key` and, when known, `description`.
    pub fn matches(&self, record: &ObjectRecord) -> bool {
        let Some(needle) = self.needle.as_deref() else {
            return true;
        };
        contains_folded(&record.key, needle)
            || record
                .description
                .as_deref()
                .is_some_and(|description| contains_folded(description, needle))
    }
}

fn contains_folded(haystack: &str, lowered_needle: &str) -> bool {
    haystack.to_lowercase().contains(lowered_needle)
}
