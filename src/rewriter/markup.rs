//! Text pass over raw HTML.

use super::Rewriter;
use crate::models::{Classification, ElementKind, LinkRel, FONT_FACE_ATTR};
use regex::Captures;
use std::borrow::Cow;

impl Rewriter {
    /// Remove `<meta http-equiv="Content-Security-Policy">` tags so the
    /// server-sent policy is the only one in effect.
    pub fn strip_meta_csp<'t>(&self, html: &'t str) -> Cow<'t, str> {
        self.meta_csp.replace_all(html, "")
    }

    /// Drop `@font-face` blocks whose text classifies as blocked.
    pub fn strip_font_faces<'t>(&self, css: &'t str) -> Cow<'t, str> {
        self.font_face.replace_all(css, |caps: &Captures| {
            let block = &caps[0];
            match self
                .rules
                .classify(block, ElementKind::StyleText, FONT_FACE_ATTR)
            {
                Classification::Block => String::new(),
                _ => block.to_string(),
            }
        })
    }

    /// Apply [`Rewriter::strip_font_faces`] inside every `<style>` block.
    pub fn strip_style_font_faces<'t>(&self, html: &'t str) -> Cow<'t, str> {
        self.style_block.replace_all(html, |caps: &Captures| {
            format!(
                "{}{}{}",
                &caps[1],
                self.strip_font_faces(&caps[2]),
                &caps[3]
            )
        })
    }

    fn tag_attribute<'t>(&self, tag: &'t str, name: &str) -> Option<&'t str> {
        self.tag_attr
            .captures_iter(tag)
            .find(|caps| caps[1].eq_ignore_ascii_case(name))
            .and_then(|caps| caps.get(2))
            .map(|m| m.as_str())
    }

    /// Remove `<link>` tags whose `href` is blocked for their `rel`.
    pub fn remove_blocked_links<'t>(&self, html: &'t str) -> Cow<'t, str> {
        self.link_tag.replace_all(html, |caps: &Captures| {
            let tag = &caps[0];
            let rel = LinkRel::parse(self.tag_attribute(tag, "rel").unwrap_or(""));
            let href = self.tag_attribute(tag, "href").unwrap_or("");
            match self.rules.classify(href, ElementKind::Link(rel), "href") {
                Classification::Block => String::new(),
                _ => tag.to_string(),
            }
        })
    }

    /// Remove `<script src>…</script>` tags whose source is blocked.
    pub fn remove_blocked_scripts<'t>(&self, html: &'t str) -> Cow<'t, str> {
        self.script_tag.replace_all(html, |caps: &Captures| {
            match self.rules.classify(&caps[1], ElementKind::Script, "src") {
                Classification::Block => String::new(),
                _ => caps[0].to_string(),
            }
        })
    }

    /// The full markup-level pass.
    pub fn rewrite_html(&self, html: &str) -> String {
        let html = self.strip_meta_csp(html);
        let html = self.rewrite_image_urls(&html);
        let html = self.remove_blocked_links(&html);
        let html = self.remove_blocked_scripts(&html);
        self.strip_style_font_faces(&html).into_owned()
    }

    /// Insert `<script src>` tags right after the opening `<head>` unless
    /// `marker` already appears in the document.
    pub fn inject_bootstrap(&self, html: &str, scripts: &[String], marker: &str) -> String {
        if scripts.is_empty() || (!marker.is_empty() && html.contains(marker)) {
            return html.to_string();
        }
        let injected: String = scripts
            .iter()
            .map(|src| format!("\n<script src=\"{}\"></script>", src))
            .collect();
        self.head_open
            .replacen(html, 1, |caps: &Captures| {
                format!("{}{}\n", &caps[0], injected)
            })
            .into_owned()
    }
}
