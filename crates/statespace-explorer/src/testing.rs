//! In-memory backend double shared by the unit tests.

use async_trait::async_trait;
use statespace_core::{Edge, GraphPayload, Node, NodeId, NodeKind, ProjectInfo};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::ExploreError;
use crate::graph::Backend;

pub struct MemoryBackend {
    graph: GraphPayload,
    initial: Vec<NodeId>,
    info: ProjectInfo,
    fail: AtomicBool,
    stall: AtomicBool,
    calls: AtomicUsize,
    resets: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(graph: GraphPayload) -> Self {
        let initial = graph
            .nodes
            .iter()
            .find(|n| n.is_state())
            .map(|n| vec![n.id.clone()])
            .unwrap_or_default();
        Self {
            graph,
            initial,
            info: ProjectInfo::default(),
            fail: AtomicBool::new(false),
            stall: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
        }
    }

    pub fn with_info(mut self, info: ProjectInfo) -> Self {
        self.info = info;
        self
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// The next `outgoing` request never completes.
    pub fn stall_next(&self) {
        self.stall.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    fn node(&self, id: &NodeId) -> Option<&Node> {
        self.graph.nodes.iter().find(|n| &n.id == id)
    }

    fn check_failure(&self) -> Result<(), ExploreError> {
        if self.fail.swap(false, Ordering::SeqCst) {
            return Err(ExploreError::network("connection refused"));
        }
        Ok(())
    }

    // state -> actions -> states, the shape `/outgoing` answers with
    fn neighbourhood(&self, ids: &[NodeId]) -> GraphPayload {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |n: &Node, nodes: &mut Vec<Node>| {
            if seen.insert(n.id.clone()) {
                nodes.push(n.clone());
            }
        };

        for id in ids {
            let Some(node) = self.node(id) else { continue };
            push(node, &mut nodes);
            for edge in self.graph.edges.iter().filter(|e| &e.source == id) {
                edges.push(edge.clone());
                let Some(child) = self.node(&edge.target) else { continue };
                push(child, &mut nodes);
                if child.kind != NodeKind::Action {
                    continue;
                }
                for next in self.graph.edges.iter().filter(|e| e.source == child.id) {
                    edges.push(next.clone());
                    if let Some(state) = self.node(&next.target) {
                        push(state, &mut nodes);
                    }
                }
            }
        }
        GraphPayload::new(nodes, edges)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn initial(&self) -> Result<GraphPayload, ExploreError> {
        self.check_failure()?;
        let nodes = self
            .initial
            .iter()
            .filter_map(|id| self.node(id).cloned())
            .collect();
        Ok(GraphPayload::new(nodes, Vec::new()))
    }

    async fn status(&self) -> Result<ProjectInfo, ExploreError> {
        Ok(self.info.clone())
    }

    async fn outgoing(&self, ids: &[NodeId]) -> Result<GraphPayload, ExploreError> {
        self.check_failure()?;
        if self.stall.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.neighbourhood(ids))
    }

    async fn reset(&self, open: &[NodeId], closed: &[NodeId]) -> Result<GraphPayload, ExploreError> {
        self.check_failure()?;
        self.resets.fetch_add(1, Ordering::SeqCst);
        let nodes = open
            .iter()
            .chain(closed)
            .filter_map(|id| self.node(id).cloned())
            .collect();
        Ok(GraphPayload::new(nodes, Vec::new()))
    }
}

/// States `"0".."n-1"` linked through actions `"t<i>"`; the last state is `finished`.
pub fn chain_graph(n: usize) -> GraphPayload {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for i in 0..n {
        let mut state = Node::state(&i.to_string());
        if i + 1 == n {
            state = state.with_attr(
                statespace_core::names::ATOMIC_PROPOSITIONS,
                statespace_core::names::AP_END,
                statespace_core::AttrValue::Bool(true),
            );
        }
        nodes.push(state);
        if i + 1 < n {
            let action = format!("t{i}");
            nodes.push(Node::action(&action));
            edges.push(Edge::new(&i.to_string(), "step", &action));
            edges.push(Edge::new(&action, "step", &(i + 1).to_string()));
        }
    }
    GraphPayload::new(nodes, edges)
}

/// One state `"0"` with two actions; `"ta"` (weight 0.2) leads to `"a"`,
/// `"tb"` (weight 0.8) leads to `"b"`. Both successors chain on once more.
pub fn branching_graph() -> GraphPayload {
    GraphPayload::new(
        vec![
            Node::state("0"),
            Node::action("ta").with_weight("Pmax", 0.2),
            Node::action("tb").with_weight("Pmax", 0.8),
            Node::state("a"),
            Node::state("b"),
            Node::action("tb1").with_weight("Pmax", 1.0),
            Node::state("b1"),
        ],
        vec![
            Edge::new("0", "l", "ta"),
            Edge::new("0", "r", "tb"),
            Edge::new("ta", "l", "a"),
            Edge::new("tb", "r", "b"),
            Edge::new("b", "n", "tb1"),
            Edge::new("tb1", "n", "b1"),
        ],
    )
}
