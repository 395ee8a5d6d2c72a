//! Document arena and native DOM operations.
//!
//! Native operations never consult the bindings table; they are what the
//! installed hooks eventually delegate to.

use crate::dom::{DomError, StyleSheet};
use crate::models::ElementKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text {
        content: String,
    },
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// One child-list insertion, as delivered to mutation observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
}

pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    html: NodeId,
    head: NodeId,
    body: NodeId,
    sheets: Vec<StyleSheet>,
    observed: bool,
    pending: Vec<MutationRecord>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty `<html><head></head><body></body></html>` document.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
            html: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            sheets: Vec::new(),
            observed: false,
            pending: Vec::new(),
        };
        doc.html = doc.create_element("html");
        doc.head = doc.create_element("head");
        doc.body = doc.create_element("body");
        doc.link(doc.root, doc.html, None);
        doc.link(doc.html, doc.head, None);
        doc.link(doc.html, doc.body, None);
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn document_element(&self) -> NodeId {
        self.html
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.push_node(NodeData::Text {
            content: content.to_string(),
        })
    }

    fn push_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.nodes.get(id.0).ok_or(DomError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DomError> {
        self.nodes.get_mut(id.0).ok_or(DomError::UnknownNode(id))
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0).map(|node| &node.data)
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Element { tag, .. }) => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.tag(id).is_some()
    }

    /// Classification context for an element.
    pub fn element_kind(&self, id: NodeId) -> ElementKind {
        match self.tag(id) {
            Some(tag) => ElementKind::from_tag(tag, self.attribute(id, "rel")),
            None => ElementKind::Other,
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.data(id) {
            Some(NodeData::Element { attributes, .. }) => attributes
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        match self.data(id) {
            Some(NodeData::Element { attributes, .. }) => attributes,
            _ => &[],
        }
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let key = name.to_ascii_lowercase();
        match &mut self.node_mut(id)?.data {
            NodeData::Element { attributes, .. } => {
                match attributes.iter_mut().find(|(k, _)| *k == key) {
                    Some(slot) => slot.1 = value.to_string(),
                    None => attributes.push((key, value.to_string())),
                }
                Ok(())
            }
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        match &mut self.node_mut(id)?.data {
            NodeData::Element { attributes, .. } => {
                attributes.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
                Ok(())
            }
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|c| *c == id)?;
        siblings.get(index + 1).copied()
    }

    /// Whether `id` is attached to the document tree.
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.root {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Descendants of `id` in tree order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        out
    }

    /// `id` followed by its descendants.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        out.extend(self.descendants(id));
        out
    }

    /// Elements in the inclusive subtree of `scope` whose tag is in `tags`.
    pub fn elements_by_tag(&self, scope: NodeId, tags: &[&str]) -> Vec<NodeId> {
        self.subtree(scope)
            .into_iter()
            .filter(|id| self.tag(*id).map(|t| tags.contains(&t)).unwrap_or(false))
            .collect()
    }

    pub fn text_content(&self, id: NodeId) -> String {
        self.subtree(id)
            .into_iter()
            .filter_map(|node| match self.data(node) {
                Some(NodeData::Text { content }) => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<NodeId, DomError> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference` (or at the end). Moves the child
    /// out of any previous parent.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<NodeId, DomError> {
        self.node(parent)?;
        self.node(child)?;
        if child == self.root || self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        if matches!(self.node(parent)?.data, NodeData::Text { .. }) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        if let Some(reference) = reference {
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotFound(reference));
            }
        }
        // Inserting a node before itself keeps its position.
        let reference = match reference {
            Some(r) if r == child => self.next_sibling(child),
            other => other,
        };
        self.detach(child)?;
        self.link(parent, child, reference);

        if self.is_connected(parent) {
            self.refresh_sheets_after_insert(parent, child);
            if self.observed {
                self.pending.push(MutationRecord {
                    target: parent,
                    added: vec![child],
                });
            }
        }
        Ok(child)
    }

    fn link(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        let position = reference.and_then(|r| self.children(parent).iter().position(|c| *c == r));
        if let Some(node) = self.nodes.get_mut(parent.0) {
            match position {
                Some(index) => node.children.insert(index, child),
                None => node.children.push(child),
            }
        }
        if let Some(node) = self.nodes.get_mut(child.0) {
            node.parent = Some(parent);
        }
    }

    fn detach(&mut self, id: NodeId) -> Result<(), DomError> {
        let was_connected = self.is_connected(id);
        if let Some(parent) = self.node(id)?.parent {
            self.node_mut(parent)?.children.retain(|c| *c != id);
            self.node_mut(id)?.parent = None;
        }
        if was_connected {
            let removed = self.subtree(id);
            self.sheets
                .retain(|sheet| sheet.owner.map(|o| !removed.contains(&o)).unwrap_or(true));
        }
        Ok(())
    }

    /// Remove `id` from its parent. Its stylesheets go with it.
    pub fn remove(&mut self, id: NodeId) -> Result<(), DomError> {
        self.detach(id)
    }

    fn refresh_sheets_after_insert(&mut self, parent: NodeId, child: NodeId) {
        // Text appended into a connected <style> re-parses that sheet.
        if self.tag(parent) == Some("style") {
            self.rebuild_sheet(parent);
        }
        for style in self.elements_by_tag(child, &["style"]) {
            self.rebuild_sheet(style);
        }
    }

    fn rebuild_sheet(&mut self, style: NodeId) {
        let text = self.text_content(style);
        let sheet = StyleSheet::from_text(Some(style), &text);
        match self.sheets.iter().position(|s| s.owner == Some(style)) {
            Some(index) => self.sheets[index] = sheet,
            None => self.sheets.push(sheet),
        }
    }

    /// Attach a linked (non-element-owned) stylesheet.
    pub fn add_style_sheet(&mut self, sheet: StyleSheet) {
        self.sheets.push(sheet);
    }

    pub fn style_sheets(&self) -> &[StyleSheet] {
        &self.sheets
    }

    pub fn style_sheets_mut(&mut self) -> &mut [StyleSheet] {
        &mut self.sheets
    }

    pub fn style_sheet_for(&self, owner: NodeId) -> Option<&StyleSheet> {
        self.sheets.iter().find(|sheet| sheet.owner == Some(owner))
    }

    /// Start queueing insertion records for observers.
    pub fn set_observed(&mut self, observed: bool) {
        self.observed = observed;
    }

    /// Drain queued insertion records in insertion order.
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_has_head_and_body() {
        let doc = Document::new();
        assert_eq!(doc.children(doc.document_element()), &[doc.head(), doc.body()]);
        assert!(doc.is_connected(doc.body()));
    }

    #[test]
    fn attributes_are_case_insensitive() {
        let mut doc = Document::new();
        let img = doc.create_element("IMG");
        doc.set_attribute(img, "SRC", "/a.png").unwrap();
        assert_eq!(doc.tag(img), Some("img"));
        assert_eq!(doc.attribute(img, "src"), Some("/a.png"));
        doc.remove_attribute(img, "Src").unwrap();
        assert_eq!(doc.attribute(img, "src"), None);
    }

    #[test]
    fn inserting_a_node_before_itself_keeps_its_place() {
        let mut doc = Document::new();
        let body = doc.body();
        let a = doc.create_element("p");
        let b = doc.create_element("p");
        let c = doc.create_element("p");
        for node in [a, b, c] {
            doc.append_child(body, node).unwrap();
        }
        doc.insert_before(body, b, Some(b)).unwrap();
        assert_eq!(doc.children(body), &[a, b, c]);
        doc.insert_before(body, c, Some(c)).unwrap();
        assert_eq!(doc.children(body), &[a, b, c]);
    }

    #[test]
    fn insertion_records_only_when_observed_and_connected() {
        let mut doc = Document::new();
        let detached = doc.create_element("div");
        let inner = doc.create_element("span");
        doc.append_child(detached, inner).unwrap();
        let body = doc.body();
        doc.append_child(body, detached).unwrap();
        assert!(doc.take_records().is_empty());

        doc.set_observed(true);
        let first = doc.create_element("p");
        let second = doc.create_element("p");
        doc.append_child(body, first).unwrap();
        doc.insert_before(body, second, Some(first)).unwrap();
        let records = doc.take_records();
        assert_eq!(
            records,
            vec![
                MutationRecord { target: body, added: vec![first] },
                MutationRecord { target: body, added: vec![second] },
            ]
        );
        assert_eq!(doc.children(body), &[detached, second, first]);
    }

    #[test]
    fn cycles_are_rejected() {
        let mut doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(outer, inner).unwrap();
        assert!(matches!(
            doc.append_child(inner, outer),
            Err(DomError::HierarchyRequest { .. })
        ));
    }

    #[test]
    fn style_elements_own_sheets_while_connected() {
        let mut doc = Document::new();
        let style = doc.create_element("style");
        let text = doc.create_text(".a { color: red } .b { color: blue }");
        doc.append_child(style, text).unwrap();
        assert!(doc.style_sheets().is_empty());

        let head = doc.head();
        doc.append_child(head, style).unwrap();
        let sheet = doc.style_sheet_for(style).expect("sheet created on connect");
        assert_eq!(sheet.css_rules().unwrap().len(), 2);

        doc.remove(style).unwrap();
        assert!(doc.style_sheets().is_empty());
    }
}
