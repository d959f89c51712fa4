use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod names;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(transparent)]
pub struct EdgeId(pub String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PaneId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for PaneId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl EdgeId {
    /// Identity of an edge, independent of what the backend sent as `id`.
    pub fn derive(source: &NodeId, label: &str, target: &NodeId) -> Self {
        Self(format!("{}-{}->{}", source.0, label, target.0))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeKind {
    #[serde(rename = "s")]
    State,
    #[serde(rename = "t")]
    Action,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::State => "s",
            Self::Action => "t",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl AttrValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Other(_) => None,
        }
    }

    /// Truthiness as the backend encodes it: plain bools, non-zero numbers,
    /// or an object carrying a boolean `value`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::Text(s) => s == "true",
            Self::Other(v) => v
                .get("value")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format!("{n}"),
            Self::Text(s) => s.clone(),
            Self::Other(v) => v.to_string(),
        }
    }
}

/// category -> attribute name -> value
pub type Attributes = BTreeMap<String, BTreeMap<String, AttrValue>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "details")]
    pub attributes: Attributes,
    #[serde(
        default,
        rename = "scheduler",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub scheduler_weights: BTreeMap<String, f64>,
}

impl Node {
    pub fn state(id: &str) -> Self {
        Self {
            id: NodeId(id.to_string()),
            kind: NodeKind::State,
            name: None,
            attributes: Attributes::new(),
            scheduler_weights: BTreeMap::new(),
        }
    }

    pub fn action(id: &str) -> Self {
        Self {
            kind: NodeKind::Action,
            ..Self::state(id)
        }
    }

    pub fn with_attr(mut self, category: &str, name: &str, value: AttrValue) -> Self {
        self.attributes
            .entry(category.to_string())
            .or_default()
            .insert(name.to_string(), value);
        self
    }

    pub fn with_weight(mut self, policy: &str, weight: f64) -> Self {
        self.scheduler_weights.insert(policy.to_string(), weight);
        self
    }

    pub fn is_state(&self) -> bool {
        self.kind == NodeKind::State
    }

    pub fn attribute(&self, category: &str, name: &str) -> Option<&AttrValue> {
        self.attributes.get(category).and_then(|c| c.get(name))
    }

    pub fn has_proposition(&self, ap: &str) -> bool {
        self.attribute(names::ATOMIC_PROPOSITIONS, ap)
            .map(AttrValue::is_truthy)
            .unwrap_or(false)
    }

    pub fn weight(&self, policy: &str) -> Option<f64> {
        self.scheduler_weights.get(policy).copied()
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            id: self.id.clone(),
            kind: self.kind,
            attributes: self.attributes.clone(),
        }
    }
}

/// Attribute bag shape handed to the inspector and editor collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: NodeId,
    pub kind: NodeKind,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub label: String,
}

impl Edge {
    pub fn new(source: &str, label: &str, target: &str) -> Self {
        let source = NodeId(source.to_string());
        let target = NodeId(target.to_string());
        Self {
            id: EdgeId::derive(&source, label, &target),
            source,
            target,
            label: label.to_string(),
        }
    }

    pub fn key(&self) -> EdgeId {
        EdgeId::derive(&self.source, &self.label, &self.target)
    }

    /// Replaces whatever id the backend sent with the derived one.
    pub fn normalized(mut self) -> Self {
        self.id = self.key();
        self
    }
}

/// Body of `/outgoing` and `/reset`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphPayload {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphPayload {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn state_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_state())
            .map(|n| n.id.clone())
            .collect()
    }
}

/// Per-attribute metadata from the model-file collaborator (`/status`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeMeta {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl AttributeMeta {
    pub fn finite_min(&self) -> Option<f64> {
        finite(self.min.as_ref())
    }

    pub fn finite_max(&self) -> Option<f64> {
        finite(self.max.as_ref())
    }

    pub fn is_ready(&self) -> bool {
        self.status.as_deref().map_or(true, |s| s == names::STATUS_READY)
    }
}

// bounds arrive as numbers or as strings such as "Infinity"
fn finite(v: Option<&serde_json::Value>) -> Option<f64> {
    let n = match v? {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// category -> attribute -> metadata
pub type AttributeSchema = BTreeMap<String, BTreeMap<String, AttributeMeta>>;

/// Project description returned by `/status`, split by node kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "s")]
    pub states: AttributeSchema,
    #[serde(rename = "t")]
    pub actions: AttributeSchema,
}

impl ProjectInfo {
    /// Union of the state and action schemas; state entries win on overlap.
    pub fn schema(&self) -> AttributeSchema {
        let mut out = self.actions.clone();
        for (category, attrs) in &self.states {
            out.entry(category.clone())
                .or_default()
                .extend(attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        out
    }
}

/// Envelope of the `/status` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub info: ProjectInfo,
}

/// Pane-registry notifications consumed by the overview collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum RegistryMsg {
    PaneAdded {
        id: PaneId,
        color: String,
        node_ids: Vec<NodeId>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        spawner_ids: Vec<PaneId>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        spawner_node_ids: Vec<NodeId>,
    },
    PaneRemoved {
        id: PaneId,
    },
    ActivePane {
        id: PaneId,
    },
    DuplicatePaneIds {
        ids: Vec<PaneId>,
    },
    ResetPaneNodeMarkings,
}
