//! Mapping tables: raw answer text to a number or a declared non-response.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Outcome of looking a raw answer up in a [`MappingTable`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup {
    /// The answer maps to a number (ordinal rank or range midpoint).
    Mapped(f64),
    /// The answer is a declared non-response ("No Response", "Not applicable").
    NonResponse,
    /// The answer is not a key of the table.
    Unmapped,
}

impl Lookup {
    /// Numeric value, if any. Both null outcomes yield `None`.
    pub fn value(self) -> Option<f64> {
        match self {
            Lookup::Mapped(n) => Some(n),
            Lookup::NonResponse | Lookup::Unmapped => None,
        }
    }
}

/// A named conversion table.
///
/// In JSON a `null` entry is the non-response sentinel:
///
/// ```json
/// { "key": "response_time",
///   "entries": { "30–60 minutes": 45, "Not applicable": null } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingTable {
    /// Stable identifier referenced by scalar fields.
    pub key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Match answers ignoring case.
    #[serde(default)]
    pub case_insensitive: bool,

    /// Expected raw answers, in declaration order.
    pub entries: IndexMap<String, Option<f64>>,
}

impl MappingTable {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            case_insensitive: false,
            entries: IndexMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add an answer mapped to a number.
    pub fn value(mut self, answer: impl Into<String>, value: f64) -> Self {
        self.entries.insert(answer.into(), Some(value));
        self
    }

    /// Add an answer that denotes a valid non-response.
    pub fn non_response(mut self, answer: impl Into<String>) -> Self {
        self.entries.insert(answer.into(), None);
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Look up a raw answer. Surrounding whitespace is ignored.
    pub fn lookup(&self, raw: &str) -> Lookup {
        let key = raw.trim();

        let found = if self.case_insensitive {
            let lowered = key.to_lowercase();
            self.entries
                .iter()
                .find(|(k, _)| k.trim().to_lowercase() == lowered)
                .map(|(_, v)| v)
        } else {
            self.entries.get(key)
        };

        match found {
            Some(Some(n)) => Lookup::Mapped(*n),
            Some(None) => Lookup::NonResponse,
            None => Lookup::Unmapped,
        }
    }

    /// Answers that map to a number, in declaration order.
    pub fn scored_answers(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.map(|n| (k.as_str(), n)))
    }

    /// Answers declared as non-response.
    pub fn non_response_answers(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k.as_str())
    }

    /// One-line rendering used in the variable dictionary.
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| match v {
                Some(n) => format!("{}={}", k, crate::models::format_number(*n)),
                None => format!("{}=null", k),
            })
            .collect();
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn satisfaction() -> MappingTable {
        MappingTable::new("satisfaction")
            .value("Very dissatisfied", 1.0)
            .value("Somewhat satisfied", 4.0)
            .non_response("No Response")
    }

    #[test]
    fn test_three_outcomes() {
        let table = satisfaction();
        assert_eq!(table.lookup("Somewhat satisfied"), Lookup::Mapped(4.0));
        assert_eq!(table.lookup("No Response"), Lookup::NonResponse);
        assert_eq!(table.lookup("Totally thrilled"), Lookup::Unmapped);
    }

    #[test]
    fn test_lookup_trims() {
        assert_eq!(satisfaction().lookup("  Very dissatisfied "), Lookup::Mapped(1.0));
    }

    #[test]
    fn test_case_sensitivity() {
        assert_eq!(satisfaction().lookup("somewhat satisfied"), Lookup::Unmapped);
        let table = satisfaction().case_insensitive();
        assert_eq!(table.lookup("somewhat SATISFIED"), Lookup::Mapped(4.0));
    }

    #[test]
    fn test_null_entries_deserialize_as_non_response() {
        let table: MappingTable = serde_json::from_str(
            r#"{"key": "t", "entries": {"A": 1, "N/A": null}}"#,
        )
        .unwrap();
        assert_eq!(table.lookup("A"), Lookup::Mapped(1.0));
        assert_eq!(table.lookup("N/A"), Lookup::NonResponse);
        assert_eq!(table.non_response_answers().collect::<Vec<_>>(), vec!["N/A"]);
    }

    #[test]
    fn test_summary() {
        assert_eq!(
            satisfaction().summary(),
            "Very dissatisfied=1, Somewhat satisfied=4, No Response=null"
        );
    }
}
