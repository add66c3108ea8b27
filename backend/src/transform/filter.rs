//! Record filter: decides which respondent rows enter transformation.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::RawRecord;

/// Eligibility predicate over a single raw record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterPolicy {
    /// Every record is eligible.
    #[default]
    All,

    /// Column equals a token, e.g. `Finished == "True"`.
    Equals {
        column: String,
        value: String,
        #[serde(default)]
        case_insensitive: bool,
    },

    /// Column equals one of several tokens.
    InSet { column: String, values: Vec<String> },

    /// Column matches a regular expression.
    Matches { column: String, pattern: String },

    /// Column has any non-empty value.
    NonEmpty { column: String },
}

impl FilterPolicy {
    /// The completion gate used by most survey exports.
    pub fn completed(column: impl Into<String>, value: impl Into<String>) -> Self {
        FilterPolicy::Equals {
            column: column.into(),
            value: value.into(),
            case_insensitive: true,
        }
    }

    /// Column the policy inspects, if any.
    pub fn column(&self) -> Option<&str> {
        match self {
            FilterPolicy::All => None,
            FilterPolicy::Equals { column, .. }
            | FilterPolicy::InSet { column, .. }
            | FilterPolicy::Matches { column, .. }
            | FilterPolicy::NonEmpty { column } => Some(column),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FilterPolicy::All => "all records".to_string(),
            FilterPolicy::Equals { column, value, .. } => format!("{} == \"{}\"", column, value),
            FilterPolicy::InSet { column, values } => {
                format!("{} in [{}]", column, values.join(", "))
            }
            FilterPolicy::Matches { column, pattern } => format!("{} =~ /{}/", column, pattern),
            FilterPolicy::NonEmpty { column } => format!("{} is not empty", column),
        }
    }
}

/// A compiled [`FilterPolicy`].
///
/// Built once per run; evaluation is pure and keeps no cross-record state.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    policy: FilterPolicy,
    pattern: Option<Regex>,
}

impl RecordFilter {
    pub fn new(policy: FilterPolicy) -> Result<Self, ConfigError> {
        let pattern = match &policy {
            FilterPolicy::Matches { pattern, .. } => {
                Some(Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?)
            }
            _ => None,
        };
        Ok(Self { policy, pattern })
    }

    /// Filter that admits every record.
    pub fn all() -> Self {
        Self {
            policy: FilterPolicy::All,
            pattern: None,
        }
    }

    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }

    /// Whether a record enters transformation. A missing column is ineligible.
    pub fn is_eligible(&self, record: &RawRecord) -> bool {
        let Some(column) = self.policy.column() else {
            return true;
        };
        let Some(text) = record.get(column).and_then(|v| v.as_text()) else {
            return false;
        };

        match &self.policy {
            FilterPolicy::All => true,
            FilterPolicy::Equals { value, case_insensitive, .. } => {
                if *case_insensitive {
                    text.eq_ignore_ascii_case(value.trim())
                } else {
                    text == value.trim()
                }
            }
            FilterPolicy::InSet { values, .. } => values.iter().any(|v| v.trim() == text),
            FilterPolicy::Matches { .. } => {
                self.pattern.as_ref().is_some_and(|re| re.is_match(&text))
            }
            FilterPolicy::NonEmpty { .. } => true,
        }
    }

    /// Split row indices into (eligible, excluded), preserving order.
    pub fn partition(&self, records: &[RawRecord]) -> (Vec<usize>, Vec<usize>) {
        (0..records.len()).partition(|&i| self.is_eligible(&records[i]))
    }

    /// Fail when the inspected column appears in none of the given header sets.
    pub fn check_columns<'a, I>(&self, mut headers: I) -> Result<(), ConfigError>
    where
        I: Iterator<Item = &'a str>,
    {
        match self.policy.column() {
            None => Ok(()),
            Some(column) if headers.any(|h| h == column) => Ok(()),
            Some(column) => Err(ConfigError::UnknownFilterColumn(column.to_string())),
        }
    }
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self::all()
    }
}
