//! Stylesheet and markup rewriter
//!
//! One [`Rewriter`] carries the rule set and the compiled text patterns.
//! Its passes are split by what they operate on:
//!
//! - [`markup`]: raw HTML text, before the page is parsed
//! - [`nodes`]: elements already in the document (purge, images, backgrounds)
//! - [`stylesheet`]: parsed CSS rule lists
//!
//! Every pass is idempotent and can be re-run over the same input.

pub mod markup;
pub mod nodes;
pub mod stylesheet;

pub use stylesheet::StylesheetReport;

use crate::classifier;
use crate::models::RuleSet;
use once_cell::sync::OnceCell;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::Arc;

static GLOBAL: OnceCell<Arc<Rewriter>> = OnceCell::new();

pub struct Rewriter {
    rules: RuleSet,
    image_url: Regex,
    meta_csp: Regex,
    style_block: Regex,
    font_face: Regex,
    link_tag: Regex,
    script_tag: Regex,
    tag_attr: Regex,
    head_open: Regex,
}

impl Rewriter {
    pub fn new(rules: RuleSet) -> Result<Self, regex::Error> {
        let image_url = Regex::new(&format!(
            r#"{}([^)"'\s?#]+)(?:[?#][^)"'\s]*)?"#,
            regex::escape(&rules.mapping.remote_prefix)
        ))?;
        Ok(Self {
            rules,
            image_url,
            meta_csp: Regex::new(
                r#"(?i)<meta[^>]+http-equiv\s*=\s*["']?content-security-policy["']?[^>]*>"#,
            )?,
            style_block: Regex::new(r"(?is)(<style[^>]*>)(.*?)(</style>)")?,
            font_face: Regex::new(r"(?is)@font-face\s*\{[^}]*\}")?,
            link_tag: Regex::new(r"(?is)<link\b[^>]*>")?,
            script_tag: Regex::new(
                r#"(?is)<script\b[^>]*\bsrc\s*=\s*["']([^"']*)["'][^>]*>\s*</script>"#,
            )?,
            tag_attr: Regex::new(r#"(?is)\b([a-z-]+)\s*=\s*["']([^"']*)["']"#)?,
            head_open: Regex::new(r"(?i)<head(\s[^>]*)?>")?,
        })
    }

    /// Rewriter over the process-wide rule set.
    pub fn global() -> Option<Arc<Rewriter>> {
        GLOBAL
            .get_or_try_init(|| Rewriter::new(classifier::rules().clone()).map(Arc::new))
            .map_err(|err| {
                tracing::trace!("rewriter unavailable: {}", err);
            })
            .ok()
            .cloned()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Replace every embedded remote image URL in `text` with its local path.
    pub fn rewrite_image_urls<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let local = self.rules.mapping.local_prefix.as_str();
        self.image_url
            .replace_all(text, |caps: &Captures| format!("{}{}", local, &caps[1]))
    }

    /// Whether `text` mentions the remote image prefix at all.
    pub fn mentions_remote_images(&self, text: &str) -> bool {
        text.contains(self.rules.mapping.remote_prefix.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_urls_lose_host_and_query() {
        let rewriter = Rewriter::new(RuleSet::default()).unwrap();
        let css = r#"background: url("https://framerusercontent.com/images/bg.jpg?scale-down-to=1024"); x: url(https://framerusercontent.com/images/a/b.png)"#;
        let out = rewriter.rewrite_image_urls(css);
        assert_eq!(
            out,
            r#"background: url("/framerusercontent.com/images/bg.jpg"); x: url(/framerusercontent.com/images/a/b.png)"#
        );
        assert_eq!(rewriter.rewrite_image_urls(&out), out);
    }

    #[test]
    fn text_without_remote_images_is_borrowed() {
        let rewriter = Rewriter::new(RuleSet::default()).unwrap();
        assert!(matches!(
            rewriter.rewrite_image_urls("color: red"),
            Cow::Borrowed(_)
        ));
    }
}
