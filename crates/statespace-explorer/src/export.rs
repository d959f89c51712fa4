//! Pane documents, multi-pane archives and the strategy export.

use serde::{Deserialize, Serialize};
use statespace_core::{Edge, GraphPayload, Node, NodeId, NodeKind, PaneId};
use std::collections::HashSet;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::brush::BrushState;
use crate::error::ExportError;
use crate::graph::GraphStore;
use crate::pane::{Pane, ViewState};
use crate::sync::MarkSet;

pub const FORMAT_VERSION: u32 = 1;

/// One pane's graph plus its clonable view state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaneDocument {
    pub version: u32,
    pub pane: PaneId,
    #[serde(default)]
    pub spawners: Vec<PaneId>,
    #[serde(default)]
    pub spawner_nodes: Vec<NodeId>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub view: ViewState,
    #[serde(default)]
    pub brush: BrushState,
}

impl PaneDocument {
    /// Snapshot of `pane`. With a selection, only selected nodes of the pane's
    /// display mode are kept (other kinds stay) and edges need both ends kept.
    pub fn from_pane(pane: &Pane, selection: Option<&[NodeId]>) -> Self {
        let chosen: Option<HashSet<&NodeId>> = selection.map(|ids| ids.iter().collect());
        let keep = |n: &Node| match &chosen {
            None => true,
            Some(ids) => !pane.view.mode.admits(n.kind) || ids.contains(&n.id),
        };
        let nodes: Vec<Node> = pane.store.nodes().filter(|n| keep(*n)).cloned().collect();
        let kept: HashSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();
        let edges = pane
            .store
            .edges()
            .filter(|e| kept.contains(&e.source) && kept.contains(&e.target))
            .cloned()
            .collect();

        Self {
            version: FORMAT_VERSION,
            pane: pane.id.clone(),
            spawners: pane.spawners.to_vec(),
            spawner_nodes: pane.spawner_nodes.clone(),
            nodes,
            edges,
            view: pane.view.clone(),
            brush: pane.brush.state().clone(),
        }
    }

    pub fn payload(&self) -> GraphPayload {
        GraphPayload::new(self.nodes.clone(), self.edges.clone())
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ExportError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ExportError> {
        let doc: Self = serde_json::from_slice(bytes)?;
        if doc.version != FORMAT_VERSION {
            return Err(ExportError::Version {
                found: doc.version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(doc)
    }

    /// Brushes and enabled details naming attributes no node carries.
    pub fn schema_mismatches(&self) -> Vec<String> {
        let mut present: HashSet<(&str, &str)> = HashSet::new();
        let mut names: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            for (category, attrs) in &node.attributes {
                for name in attrs.keys() {
                    present.insert((category.as_str(), name.as_str()));
                    names.insert(name.as_str());
                }
            }
        }

        let mut out: Vec<String> = self
            .brush
            .constraints
            .keys()
            .filter(|key| {
                let qualified = key
                    .split_once('/')
                    .is_some_and(|(category, name)| present.contains(&(category, name)));
                !qualified && !names.contains(key.as_str())
            })
            .cloned()
            .collect();
        out.extend(
            self.view
                .details
                .enabled()
                .filter(|pair| !present.contains(pair))
                .map(|(category, name)| format!("{category}/{name}")),
        );
        out
    }
}

/// Zip with one `graph<i>.json` entry per document.
pub fn write_archive(docs: &[PaneDocument]) -> Result<Vec<u8>, ExportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (i, doc) in docs.iter().enumerate() {
        zip.start_file(format!("graph{i}.json"), options)?;
        zip.write_all(&doc.to_json()?)?;
    }
    Ok(zip.finish()?.into_inner())
}

pub fn read_archive(bytes: &[u8]) -> Result<Vec<PaneDocument>, ExportError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut docs = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if !file.name().ends_with(".json") {
            continue;
        }
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        docs.push(PaneDocument::from_json(&data)?);
    }
    Ok(docs)
}

/// A single document is written as JSON, several as an archive.
pub fn write_file(path: &Path, docs: &[PaneDocument]) -> Result<(), ExportError> {
    let data = match docs {
        [single] => single.to_json()?,
        _ => write_archive(docs)?,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)?;
    tracing::info!(path = %path.display(), documents = docs.len(), "exported panes");
    Ok(())
}

pub fn read_file(path: &Path) -> Result<Vec<PaneDocument>, ExportError> {
    let data = fs::read(path)?;
    if data.starts_with(b"PK") {
        read_archive(&data)
    } else {
        Ok(vec![PaneDocument::from_json(&data)?])
    }
}

/// Marked nodes across `panes`, plus the actions linking two marked states
/// and the edges between kept nodes.
pub fn strategy<'a, I>(panes: I, marks: &MarkSet) -> GraphPayload
where
    I: IntoIterator<Item = &'a Pane>,
{
    let mut out = GraphStore::new();
    for pane in panes {
        let store = &pane.store;
        let mut nodes: Vec<Node> = Vec::new();
        for node in store.nodes() {
            let keep = if node.kind == NodeKind::Action {
                let from_marked = store
                    .predecessors(&node.id, NodeKind::State)
                    .iter()
                    .any(|s| marks.contains(&s.id));
                let to_marked = store
                    .successors(&node.id, NodeKind::State)
                    .iter()
                    .any(|s| marks.contains(&s.id));
                from_marked && to_marked
            } else {
                marks.contains(&node.id)
            };
            if keep {
                nodes.push(node.clone());
            }
        }
        let kept: HashSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();
        let edges: Vec<Edge> = store
            .edges()
            .filter(|e| kept.contains(&e.source) && kept.contains(&e.target))
            .cloned()
            .collect();
        out.add(nodes, edges);
    }
    GraphPayload::new(out.nodes().cloned().collect(), out.edges().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::Constraint;
    use crate::pane::{PaneManager, SpawnRequest};
    use crate::sync::SyncBus;
    use crate::testing::chain_graph;
    use statespace_core::AttrValue;
    use std::time::Duration;
    use tempfile::tempdir;

    fn manager_with(graph: GraphPayload) -> (PaneManager, PaneId) {
        let mut m = PaneManager::new(4, Duration::ZERO, SyncBus::new());
        let id = m
            .spawn(SpawnRequest::seeded(graph, ViewState::default()))
            .expect("spawn");
        (m, id)
    }

    #[test]
    fn selection_keeps_other_kinds_and_closed_edges() {
        let (m, id) = manager_with(chain_graph(3));
        let pane = m.get(&id).expect("pane");
        let doc = PaneDocument::from_pane(pane, Some(&[NodeId::from("0"), NodeId::from("1")]));

        let ids: Vec<&str> = doc.nodes.iter().map(|n| n.id.0.as_str()).collect();
        assert_eq!(ids, vec!["0", "t0", "1", "t1"]);
        assert_eq!(doc.edges.len(), 3);
        assert!(doc.edges.iter().all(|e| e.target.0 != "2"));
    }

    #[test]
    fn archive_holds_every_document() {
        let (m, id) = manager_with(chain_graph(2));
        let doc = PaneDocument::from_pane(m.get(&id).expect("pane"), None);
        let mut other = doc.clone();
        other.pane = PaneId::from("pane-9");

        let bytes = write_archive(&[doc.clone(), other.clone()]).expect("zip");
        assert_eq!(read_archive(&bytes).expect("unzip"), vec![doc, other]);
    }

    #[test]
    fn files_pick_json_or_zip() {
        let dir = tempdir().expect("tempdir");
        let (m, id) = manager_with(chain_graph(2));
        let doc = PaneDocument::from_pane(m.get(&id).expect("pane"), None);

        let single = dir.path().join("pane.json");
        write_file(&single, std::slice::from_ref(&doc)).expect("write");
        assert!(fs::read(&single).expect("read").starts_with(b"{"));
        assert_eq!(read_file(&single).expect("load"), vec![doc.clone()]);

        let many = dir.path().join("panes.zip");
        write_file(&many, &[doc.clone(), doc.clone()]).expect("write");
        assert_eq!(read_file(&many).expect("load").len(), 2);
    }

    #[test]
    fn unknown_versions_are_rejected() {
        let (m, id) = manager_with(chain_graph(1));
        let mut doc = PaneDocument::from_pane(m.get(&id).expect("pane"), None);
        doc.version = 7;
        let bytes = serde_json::to_vec(&doc).expect("encode");
        assert!(matches!(
            PaneDocument::from_json(&bytes),
            Err(ExportError::Version { found: 7, expected: FORMAT_VERSION })
        ));
    }

    #[test]
    fn mismatches_name_absent_attributes() {
        let graph = GraphPayload::new(
            vec![Node::state("0").with_attr("Variable Values", "x", AttrValue::Number(1.0))],
            Vec::new(),
        );
        let (m, id) = manager_with(graph);
        let mut doc = PaneDocument::from_pane(m.get(&id).expect("pane"), None);
        doc.brush
            .constraints
            .insert("reward".to_string(), Constraint::range(0.0, 1.0));
        doc.brush.constraints.insert("x".to_string(), Constraint::range(0.0, 1.0));
        doc.brush
            .constraints
            .insert("Variable Values/x".to_string(), Constraint::range(0.0, 1.0));
        doc.brush
            .constraints
            .insert("Rewards/x".to_string(), Constraint::range(0.0, 1.0));
        doc.view.details.set_attribute("Variable Values", "y", true);
        doc.view.details.set_attribute("Variable Values", "x", true);

        assert_eq!(
            doc.schema_mismatches(),
            vec!["Rewards/x".to_string(), "reward".to_string(), "Variable Values/y".to_string()]
        );
    }

    #[test]
    fn strategy_keeps_actions_between_marked_states() {
        let (m, _) = manager_with(chain_graph(4));
        let mut marks = MarkSet::default();
        marks.mark(vec![NodeId::from("0"), NodeId::from("1"), NodeId::from("3")]);

        let out = strategy(m.iter(), &marks);
        let ids: Vec<&str> = out.nodes.iter().map(|n| n.id.0.as_str()).collect();
        assert_eq!(ids, vec!["0", "t0", "1", "3"]);
        assert_eq!(out.edges.len(), 2);
    }
}
