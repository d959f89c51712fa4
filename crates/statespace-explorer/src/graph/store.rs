use statespace_core::{Edge, EdgeId, Node, NodeId, NodeKind};
use std::collections::{HashMap, HashSet};

use crate::graph::DisplayMode;

/// Ids newly inserted by one [`GraphStore::add`] call, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }

    pub fn extend(&mut self, other: Delta) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
    }
}

pub enum Element<'a> {
    Node(&'a Node),
    Edge(&'a Edge),
}

/// Per-pane deduplicating cache of nodes and edges.
///
/// Elements are only ever added; iteration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    nodes: HashMap<NodeId, Node>,
    node_order: Vec<NodeId>,
    edges: HashMap<EdgeId, Edge>,
    edge_order: Vec<EdgeId>,
    outgoing: HashMap<NodeId, Vec<EdgeId>>,
    incoming: HashMap<NodeId, Vec<EdgeId>>,
    /// Ids whose neighbourhood has been fetched, successors or not.
    expanded: HashSet<NodeId>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unions `nodes` and `edges` into the store and reports what was new.
    ///
    /// Duplicates inside the input are fine. Edges whose endpoints are not
    /// present after the node pass are skipped.
    pub fn add<N, E>(&mut self, nodes: N, edges: E) -> Delta
    where
        N: IntoIterator<Item = Node>,
        E: IntoIterator<Item = Edge>,
    {
        let mut delta = Delta::default();

        for node in nodes {
            if self.nodes.contains_key(&node.id) {
                continue;
            }
            delta.nodes.push(node.id.clone());
            self.node_order.push(node.id.clone());
            self.nodes.insert(node.id.clone(), node);
        }

        for edge in edges {
            let edge = edge.normalized();
            if self.edges.contains_key(&edge.id) {
                continue;
            }
            if !self.nodes.contains_key(&edge.source) || !self.nodes.contains_key(&edge.target) {
                tracing::debug!(edge = %edge.id, "skipping edge with unknown endpoint");
                continue;
            }
            self.outgoing
                .entry(edge.source.clone())
                .or_default()
                .push(edge.id.clone());
            self.incoming
                .entry(edge.target.clone())
                .or_default()
                .push(edge.id.clone());
            delta.edges.push(edge.id.clone());
            self.edge_order.push(edge.id.clone());
            self.edges.insert(edge.id.clone(), edge);
        }

        delta
    }

    /// Copies every element of `other` into this store.
    pub fn absorb(&mut self, other: &GraphStore) -> Delta {
        self.add(other.nodes().cloned(), other.edges().cloned())
    }

    pub fn has(&self, id: &str) -> bool {
        let key = id.to_string();
        self.nodes.contains_key(&NodeId(key.clone())) || self.edges.contains_key(&EdgeId(key))
    }

    pub fn has_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Element<'_>> {
        let key = id.to_string();
        if let Some(node) = self.nodes.get(&NodeId(key.clone())) {
            return Some(Element::Node(node));
        }
        self.edges.get(&EdgeId(key)).map(Element::Edge)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.node_order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edge_order.iter().filter_map(|id| self.edges.get(id))
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.node_order.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn count(&self, mode: DisplayMode) -> usize {
        self.nodes.values().filter(|n| mode.admits(n.kind)).count()
    }

    pub fn outgoing(&self, id: &NodeId) -> impl Iterator<Item = &Edge> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|e| self.edges.get(e))
    }

    pub fn incoming(&self, id: &NodeId) -> impl Iterator<Item = &Edge> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|e| self.edges.get(e))
    }

    /// Targets of `id`'s outgoing edges with the given kind, first-seen order.
    pub fn successors(&self, id: &NodeId, kind: NodeKind) -> Vec<&Node> {
        let mut seen = HashSet::new();
        self.outgoing(id)
            .filter_map(|e| self.nodes.get(&e.target))
            .filter(|n| n.kind == kind && seen.insert(n.id.clone()))
            .collect()
    }

    pub fn predecessors(&self, id: &NodeId, kind: NodeKind) -> Vec<&Node> {
        let mut seen = HashSet::new();
        self.incoming(id)
            .filter_map(|e| self.nodes.get(&e.source))
            .filter(|n| n.kind == kind && seen.insert(n.id.clone()))
            .collect()
    }

    /// Neither fetched nor holding any outgoing edge yet. A state fetched
    /// without successors (a deadlock) stays expanded.
    pub fn is_collapsed(&self, id: &NodeId) -> bool {
        !self.expanded.contains(id) && self.outgoing.get(id).map_or(true, Vec::is_empty)
    }

    /// Records that the neighbourhood of `ids` has been merged. Unknown ids
    /// are ignored.
    pub fn mark_expanded<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a NodeId>,
    {
        for id in ids {
            if self.nodes.contains_key(id) {
                self.expanded.insert(id.clone());
            }
        }
    }

    /// Replaces attribute bags and scheduler weights of known nodes.
    /// Topology is untouched; unknown ids are ignored.
    pub fn refresh_attributes<I>(&mut self, nodes: I) -> usize
    where
        I: IntoIterator<Item = Node>,
    {
        let mut updated = 0;
        for fresh in nodes {
            let Some(node) = self.nodes.get_mut(&fresh.id) else {
                tracing::warn!(node = %fresh.id, "refresh returned a node this pane does not hold");
                continue;
            };
            if !fresh.attributes.is_empty() {
                node.attributes = fresh.attributes;
            }
            if !fresh.scheduler_weights.is_empty() {
                node.scheduler_weights = fresh.scheduler_weights;
            }
            updated += 1;
        }
        updated
    }

    /// State ids split into (expanded, collapsed).
    pub fn open_and_closed_states(&self) -> (Vec<NodeId>, Vec<NodeId>) {
        self.nodes()
            .filter(|n| n.is_state())
            .map(|n| n.id.clone())
            .partition(|id| !self.is_collapsed(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statespace_core::{AttrValue, Edge, Node};

    fn sample() -> (Vec<Node>, Vec<Edge>) {
        (
            vec![Node::state("s0"), Node::action("t1"), Node::state("s1")],
            vec![Edge::new("s0", "a", "t1"), Edge::new("t1", "a", "s1")],
        )
    }

    #[test]
    fn add_is_idempotent() {
        let (nodes, edges) = sample();
        let mut store = GraphStore::new();
        let first = store.add(nodes.clone(), edges.clone());
        assert_eq!(first.nodes.len(), 3);
        assert_eq!(first.edges.len(), 2);

        let second = store.add(nodes, edges);
        assert!(second.is_empty());
        assert_eq!(store.node_count(), 3);
        assert_eq!(store.edge_count(), 2);
    }

    #[test]
    fn add_tolerates_duplicates_in_one_call() {
        let mut store = GraphStore::new();
        let delta = store.add(
            vec![Node::state("s0"), Node::state("s0")],
            vec![Edge::new("s0", "x", "s0"), Edge::new("s0", "x", "s0")],
        );
        assert_eq!(delta.nodes, vec![NodeId::from("s0")]);
        assert_eq!(delta.edges.len(), 1);
    }

    #[test]
    fn dangling_edges_are_skipped() {
        let mut store = GraphStore::new();
        let delta = store.add(vec![Node::state("s0")], vec![Edge::new("s0", "a", "t9")]);
        assert!(delta.edges.is_empty());
        assert!(store.is_collapsed(&NodeId::from("s0")));
    }

    #[test]
    fn adjacency_and_collapse() {
        let (nodes, edges) = sample();
        let mut store = GraphStore::new();
        store.add(nodes, edges);

        let s0 = NodeId::from("s0");
        let s1 = NodeId::from("s1");
        assert!(!store.is_collapsed(&s0));
        assert!(store.is_collapsed(&s1));
        assert_eq!(store.successors(&s0, NodeKind::Action)[0].id.0, "t1");
        assert_eq!(store.predecessors(&s1, NodeKind::Action)[0].id.0, "t1");
        assert_eq!(store.count(DisplayMode::States), 2);
        assert_eq!(store.count(DisplayMode::Both), 3);

        let (open, closed) = store.open_and_closed_states();
        assert_eq!(open, vec![s0]);
        assert_eq!(closed, vec![s1]);
    }

    #[test]
    fn fetched_deadlocks_stay_expanded() {
        let mut store = GraphStore::new();
        store.add(vec![Node::state("dead"), Node::state("open")], Vec::new());
        let dead = NodeId::from("dead");
        store.mark_expanded([&dead, &NodeId::from("zz")]);

        assert!(!store.is_collapsed(&dead));
        assert!(store.is_collapsed(&NodeId::from("open")));
        let (open, closed) = store.open_and_closed_states();
        assert_eq!(open, vec![dead]);
        assert_eq!(closed, vec![NodeId::from("open")]);
    }

    #[test]
    fn get_resolves_nodes_and_edges() {
        let (nodes, edges) = sample();
        let mut store = GraphStore::new();
        store.add(nodes, edges);
        assert!(matches!(store.get("s0"), Some(Element::Node(_))));
        assert!(matches!(store.get("s0-a->t1"), Some(Element::Edge(_))));
        assert!(store.get("nope").is_none());
        assert!(store.has("t1"));
    }

    #[test]
    fn refresh_replaces_bags_only_for_known_ids() {
        let mut store = GraphStore::new();
        store.add(vec![Node::state("s0")], Vec::new());
        let fresh = Node::state("s0").with_attr("Rewards", "r", AttrValue::Number(2.0));
        let unknown = Node::state("zz").with_attr("Rewards", "r", AttrValue::Number(1.0));

        assert_eq!(store.refresh_attributes(vec![fresh, unknown]), 1);
        let node = store.node(&NodeId::from("s0")).expect("s0 present");
        assert_eq!(node.attribute("Rewards", "r"), Some(&AttrValue::Number(2.0)));
        assert!(!store.has("zz"));
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut store = GraphStore::new();
        store.add(vec![Node::state("b"), Node::state("a")], Vec::new());
        store.add(vec![Node::state("c"), Node::state("a")], Vec::new());
        let ids: Vec<_> = store.node_ids().map(|id| id.0.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
