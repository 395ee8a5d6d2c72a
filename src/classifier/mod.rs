//! URL classifier
//!
//! Pure mapping from a candidate URL (plus element/attribute context) to a
//! [`Classification`]. The process-wide rule set is fixed the first time it
//! is read or installed and lives for the rest of the process; there is
//! deliberately no reset.

use crate::dom::DomError;
use crate::models::{Classification, ElementKind, RuleSet};
use once_cell::sync::OnceCell;

static RULES: OnceCell<RuleSet> = OnceCell::new();

/// Install the process-wide rule set. Returns `Ok(false)` when an equal set
/// is already in place, and the rejected set when a different one is. The
/// first call to [`rules`] fixes the defaults, so hooks and the rewriter
/// can never observe two different sets.
pub fn install_rules(rules: RuleSet) -> Result<bool, RuleSet> {
    match RULES.try_insert(rules) {
        Ok(_) => Ok(true),
        Err((current, rejected)) if *current == rejected => Ok(false),
        Err((_, rejected)) => Err(rejected),
    }
}

/// The installed rule set, or the built-in defaults.
pub fn rules() -> &'static RuleSet {
    RULES.get_or_init(RuleSet::default)
}

pub fn classify(url: &str, kind: ElementKind, attr: &str) -> Classification {
    rules().classify(url, kind, attr)
}

/// Value to hand to the underlying implementation in place of `url`:
/// the local path for rewrites, an empty string for blocks, the input
/// otherwise.
pub fn substitute_with(
    rules: &RuleSet,
    url: &str,
    kind: ElementKind,
    attr: &str,
) -> Result<String, DomError> {
    match rules.classify(url, kind, attr) {
        Classification::RewriteToLocal => rules
            .mapping
            .to_local(url)
            .ok_or_else(|| DomError::MalformedUrl(url.to_string())),
        Classification::Block => Ok(String::new()),
        Classification::StubNetworkCall | Classification::PassThrough => Ok(url.to_string()),
    }
}

pub fn substitute(url: &str, kind: ElementKind, attr: &str) -> Result<String, DomError> {
    substitute_with(rules(), url, kind, attr)
}

/// Rewrite every URL token of a `srcset` value. Candidate count and the
/// descriptor text after each URL are preserved. A candidate that cannot
/// be substituted keeps its original URL; the rest are still rewritten.
pub fn rewrite_srcset_with(
    rules: &RuleSet,
    srcset: &str,
    kind: ElementKind,
) -> String {
    let mut candidates = Vec::new();
    for part in srcset.split(',') {
        let trimmed = part.trim();
        let split_at = trimmed
            .find(char::is_whitespace)
            .unwrap_or(trimmed.len());
        let (url, descriptor) = trimmed.split_at(split_at);
        let url = match substitute_with(rules, url, kind, "srcset") {
            Ok(url) => url,
            Err(err) => {
                tracing::trace!("srcset candidate left as is: {}", err);
                url.to_string()
            }
        };
        candidates.push(format!("{url}{descriptor}"));
    }
    candidates.join(", ")
}

pub fn rewrite_srcset(srcset: &str, kind: ElementKind) -> String {
    rewrite_srcset_with(rules(), srcset, kind)
}
