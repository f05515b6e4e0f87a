//! Host page abstraction.
//!
//! The core never owns page nodes. It refers to them by [`NodeId`] and asks
//! the host whether a node is still attached before acting on it, since the
//! host page replaces nodes at will.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::gate::parse_role_selector;

/// Identity of a page node. Carries no ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// What the gate needs from the document.
pub trait Page {
    /// Attached nodes matching any of the selectors, in document order.
    fn query_all(&self, selectors: &[String]) -> Vec<NodeId>;

    /// The node's role marker (`data-testid`), if any.
    fn role_marker(&self, node: NodeId) -> Option<String>;

    /// Whether the node is still part of the document.
    fn is_attached(&self, node: NodeId) -> bool;

    /// Dataset-style flag on the node.
    fn has_marker(&self, node: NodeId, name: &str) -> bool;
    fn set_marker(&mut self, node: NodeId, name: &str);

    fn add_class(&mut self, node: NodeId, class: &str);
    fn remove_class(&mut self, node: NodeId, class: &str);
    fn nodes_with_class(&self, class: &str) -> Vec<NodeId>;

    /// Attach the capture-phase click listener that forwards to the gate.
    fn add_capture_listener(&mut self, node: NodeId);

    /// Dispatch a bubbling, cancelable synthetic click on the node. The host
    /// must route it back through the gate's click handler.
    fn dispatch_click(&mut self, node: NodeId);

    /// Synthetic clicks queued by [`Page::dispatch_click`] that the host wants
    /// the session to deliver itself. Hosts that re-enter synchronously keep
    /// the default.
    fn take_dispatched_clicks(&mut self) -> Vec<NodeId> {
        Vec::new()
    }

    /// Let the node's native click behavior run. Only called for clicks the
    /// session delivered on the host's behalf.
    fn activate(&mut self, _node: NodeId) {}
}

#[derive(Debug, Clone, Default)]
struct VirtualNode {
    marker: Option<String>,
    attached: bool,
    classes: BTreeSet<String>,
    dataset: BTreeSet<String>,
    listeners: usize,
}

/// In-memory document used by tests and the simulator.
///
/// Synthetic clicks are queued rather than re-entered, and every node whose
/// native action ran is recorded in [`VirtualPage::activations`].
#[derive(Debug, Default)]
pub struct VirtualPage {
    nodes: BTreeMap<NodeId, VirtualNode>,
    next_id: u64,
    dispatched: VecDeque<NodeId>,
    activations: Vec<NodeId>,
}

impl VirtualPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attached node carrying a role marker.
    pub fn insert(&mut self, marker: &str) -> NodeId {
        self.insert_node(Some(marker.to_string()))
    }

    /// Append an attached node with no role marker.
    pub fn insert_plain(&mut self) -> NodeId {
        self.insert_node(None)
    }

    fn insert_node(&mut self, marker: Option<String>) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(
            id,
            VirtualNode {
                marker,
                attached: true,
                ..VirtualNode::default()
            },
        );
        id
    }

    /// Remove a node from the document. Its id stays dangling.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.attached = false;
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|n| n.classes.contains(class))
    }

    pub fn listener_count(&self, node: NodeId) -> usize {
        self.nodes.get(&node).map_or(0, |n| n.listeners)
    }

    pub fn activations(&self) -> &[NodeId] {
        &self.activations
    }

    pub fn pending_dispatches(&self) -> usize {
        self.dispatched.len()
    }
}

impl Page for VirtualPage {
    fn query_all(&self, selectors: &[String]) -> Vec<NodeId> {
        let wanted: BTreeSet<&str> = selectors
            .iter()
            .filter_map(|s| parse_role_selector(s))
            .collect();
        self.nodes
            .iter()
            .filter(|(_, n)| n.attached)
            .filter(|(_, n)| n.marker.as_deref().is_some_and(|m| wanted.contains(m)))
            .map(|(id, _)| *id)
            .collect()
    }

    fn role_marker(&self, node: NodeId) -> Option<String> {
        self.nodes.get(&node).and_then(|n| n.marker.clone())
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.nodes.get(&node).is_some_and(|n| n.attached)
    }

    fn has_marker(&self, node: NodeId, name: &str) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|n| n.dataset.contains(name))
    }

    fn set_marker(&mut self, node: NodeId, name: &str) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.dataset.insert(name.to_string());
        }
    }

    fn add_class(&mut self, node: NodeId, class: &str) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.classes.insert(class.to_string());
        }
    }

    fn remove_class(&mut self, node: NodeId, class: &str) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.classes.remove(class);
        }
    }

    fn nodes_with_class(&self, class: &str) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.attached && n.classes.contains(class))
            .map(|(id, _)| *id)
            .collect()
    }

    fn add_capture_listener(&mut self, node: NodeId) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.listeners += 1;
        }
    }

    fn dispatch_click(&mut self, node: NodeId) {
        self.dispatched.push_back(node);
    }

    fn take_dispatched_clicks(&mut self) -> Vec<NodeId> {
        self.dispatched.drain(..).collect()
    }

    fn activate(&mut self, node: NodeId) {
        self.activations.push(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_matches_role_selectors_only_when_attached() {
        let mut page = VirtualPage::new();
        let like = page.insert("like");
        let _other = page.insert("caret");
        let bookmark = page.insert("bookmark");
        let selectors = vec![
            r#"[data-testid="like"]"#.to_string(),
            r#"[data-testid="bookmark"]"#.to_string(),
        ];
        assert_eq!(page.query_all(&selectors), vec![like, bookmark]);

        page.detach(like);
        assert_eq!(page.query_all(&selectors), vec![bookmark]);
        assert!(!page.is_attached(like));
    }

    #[test]
    fn dispatched_clicks_are_queued_until_taken() {
        let mut page = VirtualPage::new();
        let node = page.insert("like");
        page.dispatch_click(node);
        assert_eq!(page.pending_dispatches(), 1);
        assert_eq!(page.take_dispatched_clicks(), vec![node]);
        assert!(page.take_dispatched_clicks().is_empty());
    }
}
