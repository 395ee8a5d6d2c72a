//! Classification rule data.
//!
//! Rules are plain data so the host-specific special cases (which preconnects
//! are allowed, which endpoints are blocked) live in configuration rather
//! than in code. A rule set is loaded once and never mutated afterwards.

use crate::models::{Classification, ElementKind, LinkRel, FONT_FACE_ATTR};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleSetError {
    #[error("rule {index} has an empty pattern")]
    EmptyPattern { index: usize },
    #[error("rewrite mapping must map an absolute remote prefix to a root-relative path")]
    InvalidMapping,
    #[error("rule set is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which observation contexts a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RuleScope {
    /// Image-bearing references: img/source src+srcset, icon links,
    /// og/twitter meta images and URLs embedded in style text.
    Images,
    Script,
    Link { rels: Vec<LinkRel> },
    /// The text of an `@font-face` rule.
    FontFace,
    /// Request dispatch and the legacy request object.
    NetworkCall,
    Any,
}

impl RuleScope {
    pub fn matches(&self, kind: ElementKind, attr: &str) -> bool {
        let font_face = attr.eq_ignore_ascii_case(FONT_FACE_ATTR);
        match self {
            RuleScope::Images => match kind {
                ElementKind::Image | ElementKind::Source | ElementKind::Meta => true,
                ElementKind::Link(LinkRel::Icon | LinkRel::AppleTouchIcon) => true,
                ElementKind::StyleText => !font_face,
                _ => false,
            },
            RuleScope::Script => kind == ElementKind::Script,
            RuleScope::Link { rels } => match kind {
                ElementKind::Link(rel) => rels.contains(&rel),
                _ => false,
            },
            RuleScope::FontFace => kind == ElementKind::StyleText && font_face,
            RuleScope::NetworkCall => kind.is_network_call(),
            RuleScope::Any => true,
        }
    }
}

/// How a rule recognises a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UrlPattern {
    /// Exact, case-sensitive prefix.
    Prefix { value: String },
    /// Substring anywhere in the candidate text.
    Contains { value: String },
    /// Parsed URL whose host equals `host` and whose path contains `path_contains`.
    HostPath { host: String, path_contains: String },
}

impl UrlPattern {
    pub fn prefix(value: &str) -> Self {
        UrlPattern::Prefix {
            value: value.to_string(),
        }
    }

    pub fn contains(value: &str) -> Self {
        UrlPattern::Contains {
            value: value.to_string(),
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            UrlPattern::Prefix { value } => candidate.starts_with(value.as_str()),
            UrlPattern::Contains { value } => candidate.contains(value.as_str()),
            UrlPattern::HostPath {
                host,
                path_contains,
            } => match url::Url::parse(candidate) {
                Ok(parsed) => {
                    parsed.host_str() == Some(host.as_str())
                        && parsed.path().contains(path_contains.as_str())
                }
                Err(_) => false,
            },
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            UrlPattern::Prefix { value } | UrlPattern::Contains { value } => value.is_empty(),
            UrlPattern::HostPath { host, .. } => host.is_empty(),
        }
    }
}

/// One `(pattern, target classification)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub scope: RuleScope,
    pub pattern: UrlPattern,
    pub action: Classification,
}

impl ClassificationRule {
    pub fn new(scope: RuleScope, pattern: UrlPattern, action: Classification) -> Self {
        Self {
            scope,
            pattern,
            action,
        }
    }
}

/// Remote image prefix → local path. Scheme and host are dropped, the path
/// is kept and the query string is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteMapping {
    pub remote_prefix: String,
    pub local_prefix: String,
}

impl RewriteMapping {
    /// Build the mapping for `https://<host>/images/` → `/<host>/images/`.
    pub fn for_host(host: &str) -> Self {
        Self {
            remote_prefix: format!("https://{host}/images/"),
            local_prefix: format!("/{host}/images/"),
        }
    }

    /// Local equivalent of `url`, or `None` when it is not under the remote prefix.
    pub fn to_local(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(self.remote_prefix.as_str())?;
        let file = rest.split(['?', '#']).next().unwrap_or("");
        if file.is_empty() {
            return None;
        }
        Some(format!("{}{}", self.local_prefix, file))
    }
}

/// Ordered, first-match-wins rule list plus the image rewrite mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<ClassificationRule>,
    pub mapping: RewriteMapping,
}

const IMAGE_HOST: &str = "framerusercontent.com";
const EVENTS_PREFIX: &str = "https://events.framer.com/";
const COMPONENT_PREFIX: &str = "https://framer.com/m/";
const EDITOR_PREFIX: &str = "https://edit.framer.com/";

impl Default for RuleSet {
    fn default() -> Self {
        let mapping = RewriteMapping::for_host(IMAGE_HOST);
        let preloads = RuleScope::Link {
            rels: vec![LinkRel::Prefetch, LinkRel::Preload, LinkRel::ModulePreload],
        };
        let rules = vec![
            ClassificationRule::new(
                RuleScope::Images,
                UrlPattern::prefix(&mapping.remote_prefix),
                Classification::RewriteToLocal,
            ),
            ClassificationRule::new(
                RuleScope::Script,
                UrlPattern::prefix(EVENTS_PREFIX),
                Classification::Block,
            ),
            ClassificationRule::new(
                RuleScope::Script,
                UrlPattern::prefix(COMPONENT_PREFIX),
                Classification::Block,
            ),
            ClassificationRule::new(
                RuleScope::Script,
                UrlPattern::prefix(EDITOR_PREFIX),
                Classification::Block,
            ),
            ClassificationRule::new(
                preloads.clone(),
                UrlPattern::prefix(COMPONENT_PREFIX),
                Classification::Block,
            ),
            ClassificationRule::new(
                preloads,
                UrlPattern::prefix(EDITOR_PREFIX),
                Classification::Block,
            ),
            // modulepreload of CMS modules is left alone; only data prefetches go.
            ClassificationRule::new(
                RuleScope::Link {
                    rels: vec![LinkRel::Prefetch, LinkRel::Preload],
                },
                UrlPattern::prefix("https://framerusercontent.com/cms/"),
                Classification::Block,
            ),
            ClassificationRule::new(
                RuleScope::NetworkCall,
                UrlPattern::HostPath {
                    host: IMAGE_HOST.to_string(),
                    path_contains: "/cms/".to_string(),
                },
                Classification::StubNetworkCall,
            ),
            ClassificationRule::new(
                RuleScope::Link {
                    rels: vec![LinkRel::Preconnect],
                },
                UrlPattern::prefix("https://fonts.gstatic.com"),
                Classification::Block,
            ),
            ClassificationRule::new(
                RuleScope::FontFace,
                UrlPattern::contains("fonts.gstatic.com"),
                Classification::Block,
            ),
            ClassificationRule::new(
                RuleScope::FontFace,
                UrlPattern::contains("framerusercontent.com/assets"),
                Classification::Block,
            ),
        ];
        Self { rules, mapping }
    }
}

impl RuleSet {
    pub fn from_json_str(raw: &str) -> Result<Self, RuleSetError> {
        let rules: RuleSet = serde_json::from_str(raw)?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading rule set {:?}", path))?;
        Self::from_json_str(&raw).with_context(|| format!("loading rule set {:?}", path))
    }

    pub fn validate(&self) -> Result<(), RuleSetError> {
        if let Some(index) = self.rules.iter().position(|rule| rule.pattern.is_empty()) {
            return Err(RuleSetError::EmptyPattern { index });
        }
        let mapping = &self.mapping;
        if !mapping.remote_prefix.contains("://") || !mapping.local_prefix.starts_with('/') {
            return Err(RuleSetError::InvalidMapping);
        }
        Ok(())
    }

    /// First matching rule's action, or pass-through.
    pub fn classify(&self, url: &str, kind: ElementKind, attr: &str) -> Classification {
        if url.is_empty() {
            return Classification::PassThrough;
        }
        self.rules
            .iter()
            .find(|rule| rule.scope.matches(kind, attr) && rule.pattern.matches(url))
            .map(|rule| rule.action)
            .unwrap_or(Classification::PassThrough)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_drops_query_and_fragment() {
        let mapping = RewriteMapping::for_host("framerusercontent.com");
        assert_eq!(
            mapping
                .to_local("https://framerusercontent.com/images/foo.png?v=2")
                .as_deref(),
            Some("/framerusercontent.com/images/foo.png")
        );
        assert_eq!(
            mapping
                .to_local("https://framerusercontent.com/images/a/b.webp#x")
                .as_deref(),
            Some("/framerusercontent.com/images/a/b.webp")
        );
        assert_eq!(mapping.to_local("/framerusercontent.com/images/foo.png"), None);
        assert_eq!(mapping.to_local("https://framerusercontent.com/images/"), None);
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = RuleSet {
            rules: vec![
                ClassificationRule::new(
                    RuleScope::Link {
                        rels: vec![LinkRel::Preconnect],
                    },
                    UrlPattern::prefix("https://fonts.gstatic.com/keep"),
                    Classification::PassThrough,
                ),
                ClassificationRule::new(
                    RuleScope::Any,
                    UrlPattern::prefix("https://fonts.gstatic.com"),
                    Classification::Block,
                ),
            ],
            mapping: RewriteMapping::for_host("example.com"),
        };
        let preconnect = ElementKind::Link(LinkRel::Preconnect);
        assert_eq!(
            rules.classify("https://fonts.gstatic.com/keep", preconnect, "href"),
            Classification::PassThrough
        );
        assert_eq!(
            rules.classify("https://fonts.gstatic.com", preconnect, "href"),
            Classification::Block
        );
    }

    #[test]
    fn host_path_pattern_ignores_malformed_urls() {
        let pattern = UrlPattern::HostPath {
            host: "framerusercontent.com".into(),
            path_contains: "/cms/".into(),
        };
        assert!(pattern.matches("https://framerusercontent.com/cms/list?x=1"));
        assert!(!pattern.matches("https://framerusercontent.com/images/cms.png"));
        assert!(!pattern.matches("not a url /cms/"));
    }

    #[test]
    fn rule_set_round_trips_through_json_and_validates() {
        let raw = serde_json::to_string(&RuleSet::default()).unwrap();
        let parsed = RuleSet::from_json_str(&raw).expect("default rules are valid");
        assert_eq!(parsed, RuleSet::default());

        let mut broken = RuleSet::default();
        broken.rules[1].pattern = UrlPattern::prefix("");
        let raw = serde_json::to_string(&broken).unwrap();
        assert!(matches!(
            RuleSet::from_json_str(&raw),
            Err(RuleSetError::EmptyPattern { index: 1 })
        ));
    }
}
