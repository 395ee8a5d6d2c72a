//! Property/attribute interceptor
//!
//! Wraps the URL-carrying accessors, the `setAttribute` entry points and the
//! insertion primitives so classification happens before the underlying
//! implementation ever sees a URL. Every wrapper fails open: if
//! classification errors or panics, the original value is delegated as is.

use crate::classifier;
use crate::dom::{
    AttributeSetter, Bindings, Document, DomError, InsertionPrimitive, NodeId, PropertyAccessor,
};
use crate::guard::{fail_open, swallow};
use crate::models::{Classification, ElementKind};
use std::sync::Arc;

/// Accessors replaced at install time.
const HOOKED_PROPERTIES: &[(&str, &str)] = &[("img", "src"), ("img", "srcset"), ("script", "src")];

/// Element kinds whose `setAttribute` is replaced.
const HOOKED_SETTERS: &[&str] = &["img", "source", "script"];

/// Which hooks went in and which were skipped because the binding was absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub skipped: Vec<String>,
}

impl InstallReport {
    pub(crate) fn record(&mut self, name: String, ok: bool) {
        if ok {
            self.installed.push(name);
        } else {
            self.skipped.push(name);
        }
    }

    pub fn merge(&mut self, other: InstallReport) {
        self.installed.extend(other.installed);
        self.skipped.extend(other.skipped);
    }
}

fn is_url_attribute(name: &str) -> bool {
    ["src", "srcset", "href"]
        .iter()
        .any(|attr| name.eq_ignore_ascii_case(attr))
}

/// The value to hand to the original implementation.
fn substituted(kind: ElementKind, attr: &str, value: &str) -> String {
    fail_open(
        "interceptor.substitute",
        || {
            if attr.eq_ignore_ascii_case("srcset") {
                Ok(classifier::rewrite_srcset(value, kind))
            } else {
                classifier::substitute(value, kind, attr)
            }
        },
        || value.to_string(),
    )
}

/// Replacement accessor for a URL-carrying property.
pub struct ClassifyingAccessor {
    property: &'static str,
    original: Arc<dyn PropertyAccessor>,
}

impl ClassifyingAccessor {
    pub fn new(property: &'static str, original: Arc<dyn PropertyAccessor>) -> Self {
        Self { property, original }
    }
}

impl PropertyAccessor for ClassifyingAccessor {
    fn get(&self, doc: &Document, node: NodeId) -> Result<String, DomError> {
        self.original.get(doc, node)
    }

    fn set(&self, doc: &mut Document, node: NodeId, value: &str) -> Result<(), DomError> {
        let value = substituted(doc.element_kind(node), self.property, value);
        self.original.set(doc, node, &value)
    }
}

/// Replacement `setAttribute` for elements that carry `src`/`srcset`.
pub struct ClassifyingAttributeSetter {
    original: Arc<dyn AttributeSetter>,
}

impl ClassifyingAttributeSetter {
    pub fn new(original: Arc<dyn AttributeSetter>) -> Self {
        Self { original }
    }
}

impl AttributeSetter for ClassifyingAttributeSetter {
    fn set_attribute(
        &self,
        doc: &mut Document,
        node: NodeId,
        name: &str,
        value: &str,
    ) -> Result<(), DomError> {
        if !is_url_attribute(name) {
            return self.original.set_attribute(doc, node, name, value);
        }
        let attr = name.to_ascii_lowercase();
        let value = substituted(doc.element_kind(node), &attr, value);
        self.original.set_attribute(doc, node, name, &value)
    }
}

/// Insertion wrapper that empties the `src` of blocked scripts in the
/// inserted subtree right before attachment.
pub struct NeutralizingInsertion {
    original: Arc<dyn InsertionPrimitive>,
}

impl NeutralizingInsertion {
    pub fn new(original: Arc<dyn InsertionPrimitive>) -> Self {
        Self { original }
    }

    fn neutralize(doc: &mut Document, child: NodeId) {
        for script in doc.elements_by_tag(child, &["script"]) {
            swallow("interceptor.neutralize", || {
                let blocked = doc
                    .attribute(script, "src")
                    .map(|src| {
                        classifier::classify(src, ElementKind::Script, "src")
                            == Classification::Block
                    })
                    .unwrap_or(false);
                if blocked {
                    doc.set_attribute(script, "src", "")?;
                }
                Ok::<(), DomError>(())
            });
        }
    }
}

impl InsertionPrimitive for NeutralizingInsertion {
    fn append_child(
        &self,
        doc: &mut Document,
        parent: NodeId,
        child: NodeId,
    ) -> Result<NodeId, DomError> {
        Self::neutralize(doc, child);
        self.original.append_child(doc, parent, child)
    }

    fn insert_before(
        &self,
        doc: &mut Document,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<NodeId, DomError> {
        Self::neutralize(doc, child);
        self.original.insert_before(doc, parent, child, reference)
    }
}

/// Install every interceptor hook into `bindings`. A binding the platform
/// does not expose is skipped; the rest still install.
pub fn install(bindings: &mut Bindings) -> InstallReport {
    let mut report = InstallReport::default();

    for &(tag, property) in HOOKED_PROPERTIES {
        let ok = swallow("interceptor.install.property", || {
            bindings.replace_property(tag, property, |original| -> Arc<dyn PropertyAccessor> {
                Arc::new(ClassifyingAccessor::new(property, original))
            })
        });
        report.record(format!("{tag}.{property}"), ok);
    }

    for &tag in HOOKED_SETTERS {
        let ok = swallow("interceptor.install.setter", || {
            bindings.replace_attribute_setter(tag, |original| -> Arc<dyn AttributeSetter> {
                Arc::new(ClassifyingAttributeSetter::new(original))
            })
        });
        report.record(format!("{tag}.setAttribute"), ok);
    }

    bindings.replace_insertion(|original| -> Arc<dyn InsertionPrimitive> {
        Arc::new(NeutralizingInsertion::new(original))
    });
    report.record("insertion".to_string(), true);

    tracing::trace!(
        installed = report.installed.len(),
        skipped = report.skipped.len(),
        "interceptor hooks installed"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Page;

    fn hooked_page() -> Page {
        let mut page = Page::new();
        install(page.bindings_mut());
        page
    }

    #[test]
    fn property_write_is_rewritten_before_delegation() {
        let mut page = hooked_page();
        let img = page.create_element("img");
        page.set_property(img, "src", "https://framerusercontent.com/images/foo.png?v=2")
            .unwrap();
        assert_eq!(
            page.get_property(img, "src").unwrap(),
            "/framerusercontent.com/images/foo.png"
        );
    }

    #[test]
    fn blocked_script_src_is_emptied() {
        let mut page = hooked_page();
        let script = page.create_element("script");
        page.set_property(script, "src", "https://events.framer.com/track.js")
            .unwrap();
        assert_eq!(page.document().attribute(script, "src"), Some(""));
    }

    #[test]
    fn set_attribute_rewrites_srcset_candidates() {
        let mut page = hooked_page();
        let source = page.create_element("source");
        page.set_attribute(
            source,
            "srcset",
            "https://framerusercontent.com/images/a.png?w=1 1x, https://framerusercontent.com/images/b.png 2x",
        )
        .unwrap();
        assert_eq!(
            page.document().attribute(source, "srcset"),
            Some("/framerusercontent.com/images/a.png 1x, /framerusercontent.com/images/b.png 2x")
        );
        page.set_attribute(source, "media", "(min-width: 1px)").unwrap();
        assert_eq!(page.document().attribute(source, "media"), Some("(min-width: 1px)"));
    }

    #[test]
    fn insertion_neutralizes_nested_blocked_scripts() {
        let mut page = hooked_page();
        let wrapper = page.create_element("div");
        let script = page.create_element("script");
        // Built natively, bypassing the property and attribute hooks.
        page.document_mut()
            .set_attribute(script, "src", "https://framer.com/m/Widget.js")
            .unwrap();
        page.document_mut().append_child(wrapper, script).unwrap();

        let body = page.document().body();
        page.append_child(body, wrapper).unwrap();
        assert_eq!(page.document().attribute(script, "src"), Some(""));
    }

    #[test]
    fn missing_bindings_are_skipped() {
        let mut bindings = Bindings::default();
        bindings.remove_property("img", "srcset");
        let report = install(&mut bindings);
        assert_eq!(report.skipped, vec!["img.srcset".to_string()]);
        assert!(report.installed.contains(&"img.src".to_string()));
    }
}
