//! Element-level passes: purge blocked tags, rewrite image references and
//! inline backgrounds. Each pass is scoped to a subtree so the mutation
//! watcher can run it on inserted nodes only.

use super::Rewriter;
use crate::classifier;
use crate::dom::{Document, DomError, NodeId};
use crate::guard::swallow;
use crate::models::{Classification, ElementKind, LinkRel};

impl Rewriter {
    /// Whether `node` is a script or link whose URL classifies as blocked.
    pub fn is_blocked_element(&self, doc: &Document, node: NodeId) -> bool {
        let (kind, attr) = match doc.element_kind(node) {
            ElementKind::Script => (ElementKind::Script, "src"),
            kind @ ElementKind::Link(_) => (kind, "href"),
            _ => return false,
        };
        match doc.attribute(node, attr) {
            Some(url) => self.rules.classify(url, kind, attr) == Classification::Block,
            None => false,
        }
    }

    /// Remove blocked scripts and links in the inclusive subtree of `scope`.
    /// Returns how many were removed.
    pub fn purge_blocked(&self, doc: &mut Document, scope: NodeId) -> usize {
        let candidates: Vec<NodeId> = doc
            .elements_by_tag(scope, &["script", "link"])
            .into_iter()
            .filter(|node| self.is_blocked_element(doc, *node))
            .collect();
        candidates
            .into_iter()
            .filter(|node| swallow("rewriter.purge", || doc.remove(*node)))
            .count()
    }

    /// Rewrite image-bearing attributes in the subtree: `img` src/srcset,
    /// `source` src/srcset, icon links and og/twitter image meta tags.
    pub fn rewrite_images(&self, doc: &mut Document, scope: NodeId) -> usize {
        let mut changed = 0;
        for node in doc.elements_by_tag(scope, &["img", "source", "link", "meta"]) {
            let kind = doc.element_kind(node);
            let attrs: &[&str] = match kind {
                ElementKind::Image | ElementKind::Source => &["src", "srcset"],
                ElementKind::Link(LinkRel::Icon | LinkRel::AppleTouchIcon) => &["href"],
                ElementKind::Meta if is_image_meta(doc, node) => &["content"],
                _ => continue,
            };
            for attr in attrs {
                let ok = swallow("rewriter.images", || {
                    self.rewrite_attribute(doc, node, kind, attr)
                        .map(|updated| changed += updated as usize)
                });
                if !ok {
                    tracing::trace!(?node, attr, "image attribute left unmodified");
                }
            }
        }
        changed
    }

    fn rewrite_attribute(
        &self,
        doc: &mut Document,
        node: NodeId,
        kind: ElementKind,
        attr: &str,
    ) -> Result<bool, DomError> {
        let current = match doc.attribute(node, attr) {
            Some(value) if self.mentions_remote_images(value) => value.to_string(),
            _ => return Ok(false),
        };
        let updated = if attr == "srcset" {
            classifier::rewrite_srcset_with(&self.rules, &current, kind)
        } else {
            classifier::substitute_with(&self.rules, &current, kind, attr)?
        };
        if updated == current {
            return Ok(false);
        }
        doc.set_attribute(node, attr, &updated)?;
        Ok(true)
    }

    /// Rewrite remote image URLs inside `style="…"` attributes in the subtree.
    pub fn rewrite_backgrounds(&self, doc: &mut Document, scope: NodeId) -> usize {
        let styled: Vec<(NodeId, String)> = doc
            .subtree(scope)
            .into_iter()
            .filter_map(|node| {
                let style = doc.attribute(node, "style")?;
                self.mentions_remote_images(style)
                    .then(|| (node, style.to_string()))
            })
            .collect();

        let mut changed = 0;
        for (node, style) in styled {
            let rewritten = self.rewrite_image_urls(&style);
            if rewritten != style
                && swallow("rewriter.backgrounds", || {
                    doc.set_attribute(node, "style", &rewritten)
                })
            {
                changed += 1;
            }
        }
        changed
    }

    /// Whether the subtree holds anything the image/background passes act on.
    pub fn needs_image_pass(&self, doc: &Document, scope: NodeId) -> bool {
        doc.subtree(scope).into_iter().any(|node| {
            matches!(doc.tag(node), Some("img") | Some("source"))
                || doc
                    .attribute(node, "style")
                    .map(|style| self.mentions_remote_images(style))
                    .unwrap_or(false)
        })
    }
}

fn is_image_meta(doc: &Document, node: NodeId) -> bool {
    doc.attribute(node, "property")
        .map(|p| p.eq_ignore_ascii_case("og:image"))
        .unwrap_or(false)
        || doc
            .attribute(node, "name")
            .map(|n| n.eq_ignore_ascii_case("twitter:image"))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RuleSet;

    fn element(doc: &mut Document, parent: NodeId, tag: &str, attrs: &[(&str, &str)]) -> NodeId {
        let node = doc.create_element(tag);
        for (name, value) in attrs {
            doc.set_attribute(node, name, value).unwrap();
        }
        doc.append_child(parent, node).unwrap();
        node
    }

    #[test]
    fn purge_removes_only_blocked_tags() {
        let rewriter = Rewriter::new(RuleSet::default()).unwrap();
        let mut doc = Document::new();
        let head = doc.head();
        let fonts = element(
            &mut doc,
            head,
            "link",
            &[("rel", "preconnect"), ("href", "https://fonts.gstatic.com")],
        );
        let images = element(
            &mut doc,
            head,
            "link",
            &[("rel", "preconnect"), ("href", "https://framerusercontent.com")],
        );
        let cms = element(
            &mut doc,
            head,
            "link",
            &[("rel", "prefetch"), ("href", "https://framerusercontent.com/cms/items")],
        );
        let tracker = element(
            &mut doc,
            head,
            "script",
            &[("src", "https://events.framer.com/script")],
        );
        let inline = element(&mut doc, head, "script", &[]);

        let root = doc.root();
        assert_eq!(rewriter.purge_blocked(&mut doc, root), 3);
        assert!(!doc.is_connected(fonts));
        assert!(!doc.is_connected(cms));
        assert!(!doc.is_connected(tracker));
        assert!(doc.is_connected(images));
        assert!(doc.is_connected(inline));
    }

    #[test]
    fn images_icons_and_meta_are_rewritten() {
        let rewriter = Rewriter::new(RuleSet::default()).unwrap();
        let mut doc = Document::new();
        let (head, body) = (doc.head(), doc.body());
        let icon = element(
            &mut doc,
            head,
            "link",
            &[("rel", "icon"), ("href", "https://framerusercontent.com/images/fav.png?x=1")],
        );
        let og = element(
            &mut doc,
            head,
            "meta",
            &[("property", "og:image"), ("content", "https://framerusercontent.com/images/og.png")],
        );
        let desc = element(
            &mut doc,
            head,
            "meta",
            &[("name", "description"), ("content", "https://framerusercontent.com/images/og.png")],
        );
        let img = element(
            &mut doc,
            body,
            "img",
            &[
                ("src", "https://framerusercontent.com/images/foo.png?v=2"),
                ("srcset", "https://framerusercontent.com/images/foo.png?w=1 1x, /x.png 2x"),
            ],
        );

        let root = doc.root();
        assert_eq!(rewriter.rewrite_images(&mut doc, root), 4);
        assert_eq!(doc.attribute(icon, "href"), Some("/framerusercontent.com/images/fav.png"));
        assert_eq!(doc.attribute(og, "content"), Some("/framerusercontent.com/images/og.png"));
        assert_eq!(
            doc.attribute(desc, "content"),
            Some("https://framerusercontent.com/images/og.png")
        );
        assert_eq!(doc.attribute(img, "src"), Some("/framerusercontent.com/images/foo.png"));
        assert_eq!(
            doc.attribute(img, "srcset"),
            Some("/framerusercontent.com/images/foo.png 1x, /x.png 2x")
        );
        assert_eq!(rewriter.rewrite_images(&mut doc, root), 0);
    }

    #[test]
    fn bad_srcset_candidate_does_not_stop_the_others() {
        let rewriter = Rewriter::new(RuleSet::default()).unwrap();
        let mut doc = Document::new();
        let body = doc.body();
        let img = element(
            &mut doc,
            body,
            "img",
            &[(
                "srcset",
                "https://framerusercontent.com/images/ 1x, https://framerusercontent.com/images/b.png 2x",
            )],
        );

        let root = doc.root();
        assert_eq!(rewriter.rewrite_images(&mut doc, root), 1);
        assert_eq!(
            doc.attribute(img, "srcset"),
            Some("https://framerusercontent.com/images/ 1x, /framerusercontent.com/images/b.png 2x")
        );
        assert_eq!(rewriter.rewrite_images(&mut doc, root), 0);
    }

    #[test]
    fn backgrounds_are_rewritten_within_scope() {
        let rewriter = Rewriter::new(RuleSet::default()).unwrap();
        let mut doc = Document::new();
        let body = doc.body();
        let section = element(&mut doc, body, "section", &[]);
        let inside = element(
            &mut doc,
            section,
            "div",
            &[("style", "background-image: url(\"https://framerusercontent.com/images/bg.jpg?a=b\")")],
        );
        let outside = element(
            &mut doc,
            body,
            "div",
            &[("style", "background-image: url(https://framerusercontent.com/images/other.jpg)")],
        );

        assert!(rewriter.needs_image_pass(&doc, section));
        assert_eq!(rewriter.rewrite_backgrounds(&mut doc, section), 1);
        assert_eq!(
            doc.attribute(inside, "style"),
            Some("background-image: url(\"/framerusercontent.com/images/bg.jpg\")")
        );
        assert!(doc.attribute(outside, "style").unwrap().starts_with("background-image: url(https://"));
        assert!(!rewriter.needs_image_pass(&doc, section));
    }
}
