//! DOM mutation watcher
//!
//! Subscribes to subtree-wide insertion batches and re-applies the purge,
//! image and stylesheet passes to whatever was inserted. Once observing it
//! never goes back to idle; there is no teardown.

use crate::dom::{Document, DomError, MutationObserver, MutationRecord, NodeId, Page};
use crate::guard::swallow;
use crate::rewriter::Rewriter;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Observing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub batches: usize,
    pub nodes: usize,
    pub removed: usize,
    pub rewritten: usize,
}

pub struct MutationWatcher {
    rewriter: Arc<Rewriter>,
    observing: AtomicBool,
    batches: AtomicUsize,
    nodes: AtomicUsize,
    removed: AtomicUsize,
    rewritten: AtomicUsize,
}

impl MutationWatcher {
    pub fn new(rewriter: Arc<Rewriter>) -> Arc<Self> {
        Arc::new(Self {
            rewriter,
            observing: AtomicBool::new(false),
            batches: AtomicUsize::new(0),
            nodes: AtomicUsize::new(0),
            removed: AtomicUsize::new(0),
            rewritten: AtomicUsize::new(0),
        })
    }

    pub fn state(&self) -> WatcherState {
        if self.observing.load(Ordering::SeqCst) {
            WatcherState::Observing
        } else {
            WatcherState::Idle
        }
    }

    /// Start observing `page`. Returns `false` if this watcher is already
    /// observing.
    pub fn activate(self: &Arc<Self>, page: &mut Page) -> bool {
        if self.observing.swap(true, Ordering::SeqCst) {
            return false;
        }
        page.observe(self.clone());
        tracing::trace!("mutation watcher observing");
        true
    }

    pub fn stats(&self) -> WatcherStats {
        WatcherStats {
            batches: self.batches.load(Ordering::Relaxed),
            nodes: self.nodes.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            rewritten: self.rewritten.load(Ordering::Relaxed),
        }
    }

    fn process_node(&self, doc: &mut Document, node: NodeId) -> Result<(), DomError> {
        // Removed by an earlier record in this batch, or moved out again.
        if !doc.is_connected(node) {
            return Ok(());
        }
        self.nodes.fetch_add(1, Ordering::Relaxed);

        if !doc.is_element(node) {
            // New text inside a <style> re-parsed that sheet.
            if let Some(parent) = doc.parent(node) {
                if doc.tag(parent) == Some("style") {
                    self.rewrite_sheets(doc);
                }
            }
            return Ok(());
        }

        if self.rewriter.is_blocked_element(doc, node) {
            doc.remove(node)?;
            self.removed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let purged = self.rewriter.purge_blocked(doc, node);
        self.removed.fetch_add(purged, Ordering::Relaxed);

        if self.rewriter.needs_image_pass(doc, node) {
            let images = self.rewriter.rewrite_images(doc, node);
            let backgrounds = self.rewriter.rewrite_backgrounds(doc, node);
            self.rewritten
                .fetch_add(images + backgrounds, Ordering::Relaxed);
        }

        if !doc.elements_by_tag(node, &["style"]).is_empty() {
            self.rewrite_sheets(doc);
        }
        Ok(())
    }

    fn rewrite_sheets(&self, doc: &mut Document) {
        let report = self.rewriter.rewrite_stylesheets(doc);
        self.rewritten
            .fetch_add(report.rewritten + report.removed, Ordering::Relaxed);
    }
}

impl MutationObserver for MutationWatcher {
    fn on_mutations(&self, doc: &mut Document, records: &[MutationRecord]) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        for record in records {
            for &node in &record.added {
                swallow("watcher.node", || self.process_node(doc, node));
            }
        }
    }
}
