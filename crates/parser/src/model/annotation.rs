use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timeline hint produced when a line matches an annotation rule.
///
/// Annotations are never deduplicated; `pattern_id` namespaces them as
/// `{algo}/{dialect}:{rule_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(with = "crate::time::iso_z")]
    pub timestamp: DateTime<Utc>,
    /// Regex source of the matching rule.
    pub pattern: String,
    pub pattern_id: String,
    /// 1-based absolute line number within the source.
    #[serde(deserialize_with = "super::serde_utils::u64_lenient")]
    pub line: u64,
    pub text: String,
    #[serde(default)]
    pub matched: String,
}
