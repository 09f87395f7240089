//! Internal arena storage for one construct tree.
//!
//! Nodes live in a single `Vec` and refer to each other by [`NodeIndex`], so
//! parent back-references cannot form ownership cycles and every hop is an
//! O(1) slot access. Handles share the arena through `Rc<RefCell<Tree>>`;
//! the tree is single-threaded by contract.

use crate::deps::{Dependable, NodeAnchor};
use crate::error::TreeError;
use crate::metadata::MetadataEntry;
use crate::validation::Validate;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Separator between ids in a node path.
pub const PATH_SEP: &str = "/";

/// Replacement for `PATH_SEP` occurrences inside an id.
const ID_SEP_SUBSTITUTE: &str = "--";

/// Order of subtree traversal for [`find_all`](crate::Node::find_all).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Each node before its children, children left to right.
    PreOrder,
    /// Children left to right, then the node itself.
    PostOrder,
}

/// Slot handle into a [`Tree`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeIndex(u32);

impl NodeIndex {
    fn slot(self) -> usize {
        self.0 as usize
    }
}

/// Per-node state. Everything mutable lives here, behind the tree's
/// `RefCell`.
pub(crate) struct NodeData {
    pub(crate) id: String,
    pub(crate) parent: Option<NodeIndex>,
    pub(crate) children: Vec<NodeIndex>,
    pub(crate) context: HashMap<String, Value>,
    pub(crate) metadata: Vec<MetadataEntry>,
    pub(crate) validations: Vec<Rc<dyn Validate>>,
    pub(crate) dependencies: Vec<Rc<dyn Dependable>>,
    pub(crate) legacy_hooks: Vec<String>,
    /// Explicit default-child override. Stored as an anchor rather than an
    /// arena index so the override may designate any construct, even one
    /// from another tree, without tying the trees' lifetimes together.
    pub(crate) default_child: Option<Rc<NodeAnchor>>,
    pub(crate) locked: bool,
    /// Canonical dependable identity of this node. Holds only a weak tree
    /// reference, so registries and dependency declarations never extend the
    /// tree's lifetime.
    pub(crate) anchor: Rc<NodeAnchor>,
}

impl NodeData {
    fn new(id: String, parent: Option<NodeIndex>, anchor: Rc<NodeAnchor>) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            context: HashMap::new(),
            metadata: Vec::new(),
            validations: Vec::new(),
            dependencies: Vec::new(),
            legacy_hooks: Vec::new(),
            default_child: None,
            locked: false,
            anchor,
        }
    }
}

/// Arena of one tree's nodes. Slot 0 is always the root.
pub(crate) struct Tree {
    nodes: Vec<NodeData>,
}

impl Tree {
    pub(crate) fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub(crate) fn node(&self, index: NodeIndex) -> &NodeData {
        &self.nodes[index.slot()]
    }

    pub(crate) fn node_mut(&mut self, index: NodeIndex) -> &mut NodeData {
        &mut self.nodes[index.slot()]
    }

    /// Insert the root node. Must be the first insertion into the arena.
    pub(crate) fn insert_root(&mut self, tree_ref: Weak<RefCell<Tree>>) -> NodeIndex {
        debug_assert!(self.nodes.is_empty(), "root must be the first node");
        let index = NodeIndex(0);
        let anchor = NodeAnchor::new(tree_ref, index);
        self.nodes.push(NodeData::new(String::new(), None, anchor));
        index
    }

    /// Attach a child under `parent`, enforcing the lock, id, and sibling
    /// uniqueness rules.
    pub(crate) fn insert_child(
        &mut self,
        tree_ref: Weak<RefCell<Tree>>,
        parent: NodeIndex,
        id: &str,
    ) -> Result<NodeIndex, TreeError> {
        if let Some(locked) = self.nearest_locked(parent) {
            return Err(TreeError::SynthesisGuard {
                path: self.path_of(locked),
            });
        }

        let id = sanitize_id(id);
        if id.is_empty() {
            return Err(TreeError::InvalidRootId);
        }
        if self.child_by_id(parent, &id).is_some() {
            return Err(TreeError::DuplicateSibling {
                id,
                parent: self.parent_label(parent),
            });
        }

        let index = NodeIndex(self.nodes.len() as u32);
        let anchor = NodeAnchor::new(tree_ref, index);
        self.nodes.push(NodeData::new(id, Some(parent), anchor));
        self.nodes[parent.slot()].children.push(index);
        Ok(index)
    }

    /// Detach the child named `id` from `parent`. The slot stays allocated
    /// (outstanding handles remain usable) but the child no longer appears
    /// in any traversal of the parent.
    pub(crate) fn remove_child(&mut self, parent: NodeIndex, id: &str) -> bool {
        let Some(child) = self.child_by_id(parent, id) else {
            return false;
        };
        self.nodes[parent.slot()].children.retain(|c| *c != child);
        true
    }

    pub(crate) fn child_by_id(&self, parent: NodeIndex, id: &str) -> Option<NodeIndex> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|c| self.node(*c).id == id)
    }

    /// Ids from the root (inclusive; the root contributes its empty id) down
    /// to `index`. This is the address hasher's input.
    pub(crate) fn components_of(&self, index: NodeIndex) -> Vec<String> {
        let mut components: Vec<String> = self
            .ancestry(index)
            .into_iter()
            .map(|i| self.node(i).id.clone())
            .collect();
        components.reverse();
        components
    }

    /// `/`-joined ids from the root (exclusive) to `index`. Empty for the
    /// root itself.
    pub(crate) fn path_of(&self, index: NodeIndex) -> String {
        let components = self.components_of(index);
        components
            .iter()
            .filter(|c| !c.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(PATH_SEP)
    }

    /// Chain from `index` up to the root, self first.
    pub(crate) fn ancestry(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut chain = vec![index];
        let mut current = index;
        while let Some(parent) = self.node(current).parent {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    pub(crate) fn root_of(&self, index: NodeIndex) -> NodeIndex {
        *self.ancestry(index).last().expect("ancestry includes self")
    }

    /// Deepest locked node on the chain from `index` to the root, if any.
    pub(crate) fn nearest_locked(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.ancestry(index)
            .into_iter()
            .find(|i| self.node(*i).locked)
    }

    /// All nodes of the subtree rooted at `index`, including `index` itself.
    pub(crate) fn subtree(&self, index: NodeIndex, order: TraversalOrder) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        self.visit(index, order, &mut out);
        out
    }

    fn visit(&self, index: NodeIndex, order: TraversalOrder, out: &mut Vec<NodeIndex>) {
        if order == TraversalOrder::PreOrder {
            out.push(index);
        }
        for &child in &self.node(index).children {
            self.visit(child, order, out);
        }
        if order == TraversalOrder::PostOrder {
            out.push(index);
        }
    }

    /// Upward context lookup: nearest definition of `key` on the chain from
    /// `index` to the root.
    pub(crate) fn lookup_context(&self, index: NodeIndex, key: &str) -> Option<Value> {
        self.ancestry(index)
            .into_iter()
            .find_map(|i| self.node(i).context.get(key).cloned())
    }

    fn parent_label(&self, parent: NodeIndex) -> String {
        let path = self.path_of(parent);
        if path.is_empty() {
            "App".to_string()
        } else {
            path
        }
    }
}

/// Replace path separators inside an id so paths stay unambiguous. Any other
/// content, including whitespace, is accepted as-is.
fn sanitize_id(id: &str) -> String {
    id.replace(PATH_SEP, ID_SEP_SUBSTITUTE)
}
