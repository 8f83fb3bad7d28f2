use grep_matcher::Matcher;
use grep_regex::{RegexMatcher, RegexMatcherBuilder};

use crate::conf::ConfigError;

/// One compiled rule of an annotation profile.
pub struct AnnotationRule {
    rule_id: String,
    pattern: String,
    matcher: RegexMatcher,
}

impl AnnotationRule {
    pub fn new(rule_id: &str, pattern: &str) -> Result<Self, ConfigError> {
        let matcher = RegexMatcherBuilder::new()
            .multi_line(false)
            .build(pattern)
            .map_err(|e| ConfigError::InvalidRegex {
                rule: rule_id.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            rule_id: rule_id.to_string(),
            pattern: pattern.to_string(),
            matcher,
        })
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Text of the first match in `line`, if any.
    #[inline]
    pub fn find<'a>(&self, line: &'a str) -> Option<&'a str> {
        let m = self.matcher.find(line.as_bytes()).ok().flatten()?;
        line.get(m.start()..m.end())
    }
}

impl std::fmt::Debug for AnnotationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationRule")
            .field("rule_id", &self.rule_id)
            .field("pattern", &self.pattern)
            .finish()
    }
}

/// Named, pre-compiled set of rules. An empty profile yields no annotations.
#[derive(Debug)]
pub struct AnnotationProfile {
    name: String,
    rules: Vec<AnnotationRule>,
}

impl AnnotationProfile {
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rules: Vec::new(),
        }
    }

    /// Compile `(rule_id, regex)` pairs. Any invalid regex fails the whole profile.
    pub fn from_patterns<I, K, V>(name: &str, patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .map(|(id, pat)| AnnotationRule::new(id.as_ref(), pat.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.to_string(),
            rules,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[AnnotationRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
