//! Bootstrap sequencer
//!
//! Install order on a page:
//!
//! 1. interceptor and network stub hooks
//! 2. purge pass plus image/background rewrite over the present document
//! 3. rule-level stylesheet pass
//! 4. mutation watcher activation
//!
//! Each step runs under its own guard; a failing step does not stop the
//! next one.

use crate::dom::{DomError, Page};
use crate::guard::swallow;
use crate::interceptor::{self, InstallReport};
use crate::network;
use crate::rewriter::{Rewriter, StylesheetReport};
use crate::watcher::MutationWatcher;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub hooks: InstallReport,
    pub purged: usize,
    pub images_rewritten: usize,
    pub stylesheets: StylesheetReport,
    pub watcher_active: bool,
    /// Steps that failed and were skipped.
    pub failed_steps: Vec<&'static str>,
}

/// Bootstrap `page` with the process-wide rule set. Running it twice on the
/// same page is a no-op.
pub fn bootstrap(page: &mut Page) -> BootstrapReport {
    match Rewriter::global() {
        Some(rewriter) => bootstrap_with(page, rewriter),
        None => {
            // Hooks still go in; they only need the classifier.
            let mut report = BootstrapReport::default();
            if !page.is_bootstrapped() {
                report.hooks = install_hooks(page);
                page.mark_bootstrapped();
            }
            report.failed_steps.push("rewriter");
            report
        }
    }
}

fn install_hooks(page: &mut Page) -> InstallReport {
    let mut hooks = interceptor::install(page.bindings_mut());
    hooks.merge(network::install(page.bindings_mut()));
    hooks
}

pub fn bootstrap_with(page: &mut Page, rewriter: Arc<Rewriter>) -> BootstrapReport {
    let mut report = BootstrapReport::default();
    if page.is_bootstrapped() {
        return report;
    }
    page.mark_bootstrapped();

    fn step(name: &'static str, ok: bool, report: &mut BootstrapReport) {
        if !ok {
            report.failed_steps.push(name);
        }
    }

    let ok = swallow("bootstrap.hooks", || {
        report.hooks = install_hooks(page);
        Ok::<(), DomError>(())
    });
    step("hooks", ok, &mut report);

    let ok = swallow("bootstrap.purge", || {
        let doc = page.document_mut();
        let root = doc.root();
        report.purged = rewriter.purge_blocked(doc, root);
        report.images_rewritten =
            rewriter.rewrite_images(doc, root) + rewriter.rewrite_backgrounds(doc, root);
        Ok::<(), DomError>(())
    });
    step("purge", ok, &mut report);

    let ok = swallow("bootstrap.stylesheets", || {
        report.stylesheets = rewriter.rewrite_stylesheets(page.document_mut());
        Ok::<(), DomError>(())
    });
    step("stylesheets", ok, &mut report);

    let ok = swallow("bootstrap.watcher", || {
        report.watcher_active = MutationWatcher::new(rewriter.clone()).activate(page);
        Ok::<(), DomError>(())
    });
    step("watcher", ok, &mut report);

    tracing::trace!(
        purged = report.purged,
        images = report.images_rewritten,
        failed = report.failed_steps.len(),
        "page bootstrapped"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RuleSet;

    fn rewriter() -> Arc<Rewriter> {
        Arc::new(Rewriter::new(RuleSet::default()).unwrap())
    }

    #[test]
    fn purges_existing_nodes_and_activates_watcher() {
        let mut page = Page::new();
        let head = page.document().head();
        let link = page.create_element("link");
        page.document_mut().set_attribute(link, "rel", "preconnect").unwrap();
        page.document_mut()
            .set_attribute(link, "href", "https://fonts.gstatic.com")
            .unwrap();
        page.parser_append(head, link).unwrap();

        let report = bootstrap_with(&mut page, rewriter());
        assert_eq!(report.purged, 1);
        assert!(report.watcher_active);
        assert!(report.failed_steps.is_empty());
        assert!(!page.document().is_connected(link));
        assert_eq!(page.observer_count(), 1);
    }

    #[test]
    fn second_bootstrap_is_a_no_op() {
        let mut page = Page::new();
        bootstrap_with(&mut page, rewriter());
        let again = bootstrap_with(&mut page, rewriter());
        assert_eq!(again, BootstrapReport::default());
        assert_eq!(page.observer_count(), 1);
    }

    #[test]
    fn missing_surfaces_do_not_stop_later_steps() {
        let mut page = Page::with_bindings(crate::dom::Bindings::without_network());
        let report = bootstrap_with(&mut page, rewriter());
        assert_eq!(
            report.hooks.skipped,
            vec!["fetch".to_string(), "XMLHttpRequest".to_string()]
        );
        assert!(report.watcher_active);
    }
}
