//! Scene graph collaborator.
//!
//! The loader only ever attaches a freshly loaded asset and flips its
//! visibility; geometry and materials belong to the host renderer.

use crate::catalog::{PartSpec, Placement};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier of a node attached to the scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u64);

/// Scene graph operations the loader needs.
///
/// Both methods are called while the loader holds its state lock, so an
/// implementation must not call back into the [`CompositeLoader`] that owns
/// it (`is_visible`, `snapshot` and friends would deadlock). Queue such work
/// and run it after returning instead.
///
/// [`CompositeLoader`]: crate::loader::CompositeLoader
pub trait SceneGraph<A>: Send + Sync + 'static {
    /// Add a loaded asset to the scene using the part's placement.
    fn attach(&self, part: &PartSpec, asset: &Arc<A>) -> NodeId;

    /// Show or hide an attached node.
    fn set_visible(&self, node: NodeId, visible: bool);
}

/// Node recorded by [`MemorySceneGraph`].
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub part: String,
    pub placement: Placement,
    pub visible: bool,
}

/// One `set_visible` call, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityChange {
    pub part: String,
    pub visible: bool,
}

/// Scene graph that records nodes and visibility changes.
///
/// Used by tests and by the headless CLI.
#[derive(Debug, Default)]
pub struct MemorySceneGraph {
    next_id: AtomicU64,
    nodes: DashMap<NodeId, SceneNode>,
    history: Mutex<Vec<VisibilityChange>>,
}

impl MemorySceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node attached for `part`, if any
    pub fn node(&self, part: &str) -> Option<SceneNode> {
        self.nodes
            .iter()
            .find(|entry| entry.value().part == part)
            .map(|entry| entry.value().clone())
    }

    pub fn is_visible(&self, part: &str) -> bool {
        self.node(part).map(|n| n.visible).unwrap_or(false)
    }

    /// Visible parts, sorted
    pub fn visible_parts(&self) -> Vec<String> {
        let mut parts: Vec<String> = self
            .nodes
            .iter()
            .filter(|entry| entry.value().visible)
            .map(|entry| entry.value().part.clone())
            .collect();
        parts.sort();
        parts
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Every visibility change so far
    pub fn history(&self) -> Vec<VisibilityChange> {
        self.history.lock().clone()
    }
}

impl<A: Send + Sync + 'static> SceneGraph<A> for MemorySceneGraph {
    fn attach(&self, part: &PartSpec, _asset: &Arc<A>) -> NodeId {
        let id = NodeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.nodes.insert(id, SceneNode {
            part: part.id.clone(),
            placement: part.placement,
            // Freshly attached nodes are visible until told otherwise
            visible: true,
        });
        id
    }

    fn set_visible(&self, node: NodeId, visible: bool) {
        if let Some(mut entry) = self.nodes.get_mut(&node) {
            entry.visible = visible;
            self.history.lock().push(VisibilityChange {
                part: entry.part.clone(),
                visible,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_and_toggle() {
        let scene = MemorySceneGraph::new();
        let spec = PartSpec::independent("humans", "humans.glb").with_placement(Placement::at([0.0, -0.45, 0.0]));

        let node = SceneGraph::<()>::attach(&scene, &spec, &Arc::new(()));
        assert!(scene.is_visible("humans"));
        assert_eq!(scene.node("humans").unwrap().placement.position, [0.0, -0.45, 0.0]);

        SceneGraph::<()>::set_visible(&scene, node, false);
        assert!(!scene.is_visible("humans"));
        assert!(scene.visible_parts().is_empty());
        assert_eq!(
            scene.history(),
            vec![VisibilityChange { part: "humans".into(), visible: false }]
        );
    }

    #[test]
    fn test_unknown_node_ignored() {
        let scene = MemorySceneGraph::new();
        SceneGraph::<()>::set_visible(&scene, NodeId(42), true);
        assert!(scene.history().is_empty());
        assert_eq!(scene.node_count(), 0);
    }
}
