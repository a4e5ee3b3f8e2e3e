//! Exclude-pattern evaluation over `/`-delimited paths.
//!
//! Single (`*`) and double (`**`) wildcards only split a pattern into a
//! required prefix and suffix; nothing constrains the text in between.

use std::collections::BTreeSet;

const WILDCARD: char = '*';
const DOUBLE_WILDCARD: &str = "**";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternShape {
    SuffixOnly(String),
    PrefixOnly(String),
    PrefixSuffix { prefix: String, suffix: String },
    Full(String),
}

impl PatternShape {
    pub fn classify(pattern: &str) -> Self {
        let pattern = pattern.trim();
        if let Some(rest) = pattern.strip_prefix(DOUBLE_WILDCARD) {
            let suffix = rest.rsplit(WILDCARD).next().unwrap_or(rest);
            if suffix.is_empty() {
                // `**/dir/**`: the last literal segment is the only usable anchor.
                let inner = rest.trim_matches(WILDCARD);
                let inner = inner.rsplit(WILDCARD).next().unwrap_or(inner);
                return Self::SuffixOnly(inner.to_owned());
            }
            return Self::SuffixOnly(suffix.to_owned());
        }
        if pattern.ends_with(WILDCARD) {
            let prefix = pattern.split(WILDCARD).next().unwrap_or_default();
            return Self::PrefixOnly(prefix.to_owned());
        }
        if pattern.contains(WILDCARD) {
            let prefix = pattern.split(WILDCARD).next().unwrap_or_default();
            let suffix = pattern.rsplit(WILDCARD).next().unwrap_or_default();
            return Self::PrefixSuffix {
                prefix: prefix.to_owned(),
                suffix: suffix.to_owned(),
            };
        }
        Self::Full(pattern.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    RootExclude(String),
    PrefixOnly(String),
    SuffixOnly(String),
    Full(String),
    PrefixSuffix { prefix: String, suffix: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternMatcher {
    root_excludes: Vec<String>,
    prefix_only: Vec<String>,
    suffix_only: Vec<String>,
    full: BTreeSet<String>,
    prefix_suffix: Vec<(String, String)>,
}

impl PatternMatcher {
    pub fn new<P, R>(patterns: P, root_excludes: R) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        let mut matcher = Self {
            root_excludes: root_excludes
                .into_iter()
                .map(|root| root.as_ref().trim().to_owned())
                .filter(|root| !root.is_empty())
                .collect(),
            ..Self::default()
        };

        for pattern in patterns {
            let pattern = pattern.as_ref();
            if pattern.trim().is_empty() {
                continue;
            }
            match PatternShape::classify(pattern) {
                PatternShape::SuffixOnly(suffix) => matcher.suffix_only.push(suffix),
                PatternShape::PrefixOnly(prefix) => matcher.prefix_only.push(prefix),
                PatternShape::PrefixSuffix { prefix, suffix } => {
                    matcher.prefix_suffix.push((prefix, suffix))
                }
                PatternShape::Full(full) => {
                    matcher.full.insert(full);
                }
            }
        }

        matcher
    }

    pub fn is_empty(&self) -> bool {
        self.root_excludes.is_empty()
            && self.prefix_only.is_empty()
            && self.suffix_only.is_empty()
            && self.full.is_empty()
            && self.prefix_suffix.is_empty()
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclusion_reason(path).is_some()
    }

    /// First matching rule, evaluated as root exclude, prefix-only,
    /// suffix-only, full match, then prefix/suffix pairs.
    pub fn exclusion_reason(&self, path: &str) -> Option<ExclusionReason> {
        if let Some(root) = self.root_excludes.iter().find(|root| path.starts_with(root.as_str())) {
            return Some(ExclusionReason::RootExclude(root.clone()));
        }
        if let Some(prefix) = self
            .prefix_only
            .iter()
            .find(|prefix| path.starts_with(prefix.as_str()))
        {
            return Some(ExclusionReason::PrefixOnly(prefix.clone()));
        }
        if let Some(suffix) = self
            .suffix_only
            .iter()
            .find(|suffix| suffix_matches(path, suffix))
        {
            return Some(ExclusionReason::SuffixOnly(suffix.clone()));
        }
        if self.full.contains(path) {
            return Some(ExclusionReason::Full(path.to_owned()));
        }
        self.prefix_suffix
            .iter()
            .find(|(prefix, suffix)| path.starts_with(prefix.as_str()) && path.ends_with(suffix.as_str()))
            .map(|(prefix, suffix)| ExclusionReason::PrefixSuffix {
                prefix: prefix.clone(),
                suffix: suffix.clone(),
            })
    }

    pub fn retain<'a, I>(&self, paths: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        paths
            .into_iter()
            .filter(|path| !self.is_excluded(path))
            .collect()
    }
}

// A leading `/` in a suffix may also stand for the start of the path, so
// `**/Foo.java` matches a top-level `Foo.java`.
fn suffix_matches(path: &str, suffix: &str) -> bool {
    if path.ends_with(suffix) {
        return true;
    }
    suffix
        .strip_prefix('/')
        .is_some_and(|rest| !rest.is_empty() && path == rest)
}
