use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::AnnotationProfile;
use crate::conf::DialectKind;
use crate::model::Annotation;

/// Matches lines against a profile and builds namespaced annotations.
#[derive(Debug)]
pub struct Annotator {
    profile: Arc<AnnotationProfile>,
    namespace: String,
}

impl Annotator {
    pub fn new(profile: Arc<AnnotationProfile>, dialect: DialectKind) -> Self {
        Self {
            profile,
            namespace: format!("{}/{}", dialect.algo(), dialect),
        }
    }

    pub fn profile_name(&self) -> &str {
        self.profile.name()
    }

    /// One annotation per matching rule, stamped with `ts`.
    pub fn annotate(&self, line: &str, line_no: u64, ts: DateTime<Utc>) -> Vec<Annotation> {
        if self.profile.is_empty() {
            return Vec::new();
        }

        let text = line.trim_end_matches(['\r', '\n']);
        self.profile
            .rules()
            .iter()
            .filter_map(|rule| {
                rule.find(text).map(|matched| Annotation {
                    timestamp: ts,
                    pattern: rule.pattern().to_string(),
                    pattern_id: format!("{}:{}", self.namespace, rule.rule_id()),
                    line: line_no,
                    text: text.to_string(),
                    matched: matched.to_string(),
                })
            })
            .collect()
    }
}
