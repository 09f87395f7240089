//! The per-construct node API.
//!
//! A [`Node`] is a cheap handle onto one slot of a tree arena. All state
//! lives in the arena; handles can be cloned freely and two handles compare
//! equal when they designate the same slot of the same tree.

use crate::addr::address_of;
use crate::construct::Construct;
use crate::deps::{Dependable, NodeAnchor};
use crate::error::TreeError;
use crate::metadata::{capture_stack_trace, MetadataEntry, MetadataOptions};
use crate::tree::{NodeIndex, TraversalOrder, Tree};
use crate::validation::{is_reserved_hook, Validate};
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// Child id conventionally used for a singleton wrapped in a grouping node.
const DEFAULT_CHILD_ID: &str = "Default";

/// Child id conventionally used for the primary resource of a wrapper.
const RESOURCE_CHILD_ID: &str = "Resource";

/// Handle to one node of a construct tree.
pub struct Node {
    tree: Rc<RefCell<Tree>>,
    index: NodeIndex,
}

impl Node {
    pub(crate) fn from_parts(tree: Rc<RefCell<Tree>>, index: NodeIndex) -> Self {
        Self { tree, index }
    }

    pub(crate) fn anchor(&self) -> Rc<NodeAnchor> {
        Rc::clone(&self.tree.borrow().node(self.index).anchor)
    }

    /// Attach a new child under this node, enforcing the lock, id, and
    /// sibling-uniqueness rules.
    pub(crate) fn attach_child(&self, id: &str) -> Result<Node, TreeError> {
        let tree_ref = Rc::downgrade(&self.tree);
        let index = self
            .tree
            .borrow_mut()
            .insert_child(tree_ref, self.index, id)?;
        let child = Node::from_parts(Rc::clone(&self.tree), index);
        debug!(path = %child.path(), "construct attached");
        Ok(child)
    }

    // ── identity ────────────────────────────────────────────────────

    /// This node's id. Empty only for the root. Never contains `/`.
    pub fn id(&self) -> String {
        self.tree.borrow().node(self.index).id.clone()
    }

    /// `/`-joined ids from the root (exclusive) to this node. The root's
    /// path is the empty string.
    pub fn path(&self) -> String {
        self.tree.borrow().path_of(self.index)
    }

    /// Stable address of this node: `c8` plus 40 hex characters, a pure
    /// function of the id chain from the root with `Default` grouping
    /// levels hidden.
    pub fn addr(&self) -> String {
        address_of(&self.tree.borrow().components_of(self.index))
    }

    // ── tree shape ──────────────────────────────────────────────────

    /// The parent construct, or `None` for the root.
    pub fn scope(&self) -> Option<Construct> {
        let parent = self.tree.borrow().node(self.index).parent?;
        Some(self.construct_at(parent))
    }

    /// All scopes from the root (first) to this node (last), inclusive.
    pub fn scopes(&self) -> Vec<Construct> {
        let mut chain = self.tree.borrow().ancestry(self.index);
        chain.reverse();
        chain.into_iter().map(|i| self.construct_at(i)).collect()
    }

    /// The topmost ancestor (self, for the root).
    pub fn root(&self) -> Construct {
        let root = self.tree.borrow().root_of(self.index);
        self.construct_at(root)
    }

    /// Direct children in insertion order.
    pub fn children(&self) -> Vec<Construct> {
        self.tree
            .borrow()
            .node(self.index)
            .children
            .iter()
            .map(|&i| self.construct_at(i))
            .collect()
    }

    /// The direct child with the given id, if any.
    pub fn try_find_child(&self, id: &str) -> Option<Construct> {
        let child = self.tree.borrow().child_by_id(self.index, id)?;
        Some(self.construct_at(child))
    }

    /// The direct child with the given id, or [`TreeError::ChildNotFound`].
    pub fn find_child(&self, id: &str) -> Result<Construct, TreeError> {
        self.try_find_child(id).ok_or_else(|| TreeError::ChildNotFound {
            id: id.to_string(),
            path: self.display_label(),
        })
    }

    /// Every node of this subtree, self included, in the given order.
    pub fn find_all(&self, order: TraversalOrder) -> Vec<Construct> {
        self.tree
            .borrow()
            .subtree(self.index, order)
            .into_iter()
            .map(|i| self.construct_at(i))
            .collect()
    }

    /// Detach the direct child with the given id. Returns whether a child
    /// was removed. Outstanding handles onto the detached subtree stay
    /// usable; the subtree simply stops being reachable from here.
    pub fn try_remove_child(&self, id: &str) -> bool {
        let removed = self.tree.borrow_mut().remove_child(self.index, id);
        if removed {
            debug!(parent = %self.display_label(), id, "child removed");
        }
        removed
    }

    /// The conventional "default" child.
    ///
    /// An explicit [`set_default_child`](Self::set_default_child) override
    /// wins unconditionally. Otherwise a single child named `Resource` or
    /// `Default` qualifies; both present is ambiguous, neither yields
    /// `None`.
    pub fn default_child(&self) -> Result<Option<Construct>, TreeError> {
        let tree = self.tree.borrow();
        if let Some(anchor) = &tree.node(self.index).default_child {
            return Ok(anchor.construct());
        }
        let resource = tree.child_by_id(self.index, RESOURCE_CHILD_ID);
        let default = tree.child_by_id(self.index, DEFAULT_CHILD_ID);
        match (resource, default) {
            (Some(_), Some(_)) => Err(TreeError::AmbiguousDefaultChild {
                path: self.display_label(),
            }),
            (Some(index), None) | (None, Some(index)) => Ok(Some(self.construct_at(index))),
            (None, None) => Ok(None),
        }
    }

    /// Override (or clear) the default child returned by
    /// [`default_child`](Self::default_child). The override wins
    /// unconditionally over the conventional child lookup; any construct is
    /// accepted, including one from another tree.
    pub fn set_default_child(&self, child: Option<&Construct>) {
        let anchor = child.map(|c| c.node().anchor());
        self.tree.borrow_mut().node_mut(self.index).default_child = anchor;
    }

    // ── context ─────────────────────────────────────────────────────

    /// Set a context value on this node. Context may only be written while
    /// the node has no children; afterwards the map is frozen.
    pub fn set_context(&self, key: &str, value: Value) -> Result<(), TreeError> {
        {
            let mut tree = self.tree.borrow_mut();
            if let Some(&first) = tree.node(self.index).children.first() {
                return Err(TreeError::ContextFrozen {
                    child: tree.node(first).id.clone(),
                });
            }
            tree.node_mut(self.index)
                .context
                .insert(key.to_string(), value);
        }
        trace!(path = %self.display_label(), key, "context value set");
        Ok(())
    }

    /// Read a context value, walking from this node up to the root and
    /// returning the nearest definition.
    pub fn try_get_context(&self, key: &str) -> Option<Value> {
        self.tree.borrow().lookup_context(self.index, key)
    }

    // ── metadata ────────────────────────────────────────────────────

    /// Append a metadata entry. `Value::Null` payloads are dropped
    /// silently; every other payload — including `false`, `0`, and the
    /// empty string — is retained.
    pub fn add_metadata(&self, kind: &str, data: Value, options: MetadataOptions) {
        if data.is_null() {
            return;
        }
        let trace = options.stack_trace.then(capture_stack_trace);
        self.tree
            .borrow_mut()
            .node_mut(self.index)
            .metadata
            .push(MetadataEntry {
                kind: kind.to_string(),
                data,
                trace,
            });
    }

    /// All metadata entries, in append order.
    pub fn metadata(&self) -> Vec<MetadataEntry> {
        self.tree.borrow().node(self.index).metadata.clone()
    }

    // ── locking ─────────────────────────────────────────────────────

    /// Freeze this subtree against further child attachment.
    pub fn lock(&self) {
        self.tree.borrow_mut().node_mut(self.index).locked = true;
        debug!(path = %self.display_label(), "subtree locked");
    }

    /// Clear this node's lock bit. Ancestor locks still apply.
    pub fn unlock(&self) {
        self.tree.borrow_mut().node_mut(self.index).locked = false;
        debug!(path = %self.display_label(), "subtree unlocked");
    }

    /// Whether child attachment is currently refused here, i.e. this node
    /// or any ancestor is locked.
    pub fn locked(&self) -> bool {
        self.tree.borrow().nearest_locked(self.index).is_some()
    }

    // ── validation ──────────────────────────────────────────────────

    /// Register a validation to run when this node is validated.
    pub fn add_validation(&self, validation: Rc<dyn Validate>) {
        self.tree
            .borrow_mut()
            .node_mut(self.index)
            .validations
            .push(validation);
    }

    /// Record that a wrapper type ported from the pre-1.x API still defines
    /// the named lifecycle method. Reserved names make
    /// [`validate`](Self::validate) fail; any other name is inert.
    pub fn register_legacy_hook(&self, name: &str) {
        self.tree
            .borrow_mut()
            .node_mut(self.index)
            .legacy_hooks
            .push(name.to_string());
    }

    /// Run every validation registered on this node and concatenate their
    /// messages. Not recursive — callers traverse the tree themselves.
    pub fn validate(&self) -> Result<Vec<String>, TreeError> {
        let (hooks, validations) = {
            let tree = self.tree.borrow();
            let data = tree.node(self.index);
            (data.legacy_hooks.clone(), data.validations.clone())
        };
        if let Some(hook) = hooks.iter().find(|h| is_reserved_hook(h)) {
            return Err(TreeError::LegacyHookForbidden { hook: hook.clone() });
        }
        let mut errors = Vec::new();
        for validation in validations {
            errors.extend(validation.validate());
        }
        Ok(errors)
    }

    // ── dependencies ────────────────────────────────────────────────

    /// Declare a dependency of this node. Declarations are deduplicated by
    /// implementer identity; resolution to concrete nodes happens lazily in
    /// [`dependencies`](Self::dependencies).
    pub fn add_dependency(&self, dep: Rc<dyn Dependable>) {
        let mut tree = self.tree.borrow_mut();
        let declared = &mut tree.node_mut(self.index).dependencies;
        if !declared.iter().any(|existing| Rc::ptr_eq(existing, &dep)) {
            declared.push(dep);
        }
    }

    /// Resolve every declared dependency to concrete producer nodes,
    /// deduplicated by node identity in first-seen order.
    pub fn dependencies(&self) -> Vec<Construct> {
        let declared: Vec<Rc<dyn Dependable>> =
            self.tree.borrow().node(self.index).dependencies.clone();
        let mut producers: Vec<Construct> = Vec::new();
        for dep in declared {
            for producer in dep.dependency_roots() {
                if !producers.iter().any(|seen| seen == &producer) {
                    producers.push(producer);
                }
            }
        }
        producers
    }

    // ── helpers ─────────────────────────────────────────────────────

    fn construct_at(&self, index: NodeIndex) -> Construct {
        Construct::from_node(Node::from_parts(Rc::clone(&self.tree), index))
    }

    fn display_label(&self) -> String {
        let path = self.path();
        if path.is_empty() {
            "<root>".to_string()
        } else {
            path
        }
    }
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Self {
            tree: Rc::clone(&self.tree),
            index: self.index,
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree) && self.index == other.index
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.display_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::DependencyGroup;
    use serde_json::json;

    struct StaticValidation(Vec<&'static str>);

    impl Validate for StaticValidation {
        fn validate(&self) -> Vec<String> {
            self.0.iter().map(|m| m.to_string()).collect()
        }
    }

    fn child(scope: &Construct, id: &str) -> Construct {
        Construct::new(scope, id).unwrap()
    }

    #[test]
    fn scope_and_root_queries() {
        let root = Construct::root();
        let a = child(&root, "a");
        let b = child(&a, "b");

        assert_eq!(b.node().scope(), Some(a.clone()));
        assert_eq!(root.node().scope(), None);
        assert_eq!(b.node().root(), root);
        assert_eq!(root.node().root(), root);
        assert_eq!(b.node().scopes(), vec![root, a, b.clone()]);
    }

    #[test]
    fn children_keep_insertion_order() {
        let root = Construct::root();
        let ids = ["z", "a", "m"];
        for id in ids {
            child(&root, id);
        }
        let observed: Vec<String> =
            root.node().children().iter().map(|c| c.node().id()).collect();
        assert_eq!(observed, ids);
    }

    #[test]
    fn find_child_variants() {
        let root = Construct::root();
        let a = child(&root, "a");
        assert_eq!(root.node().try_find_child("a"), Some(a.clone()));
        assert_eq!(root.node().try_find_child("missing"), None);
        assert_eq!(root.node().find_child("a").unwrap(), a);
        assert!(matches!(
            root.node().find_child("missing"),
            Err(TreeError::ChildNotFound { .. })
        ));
    }

    #[test]
    fn find_all_pre_and_post_order() {
        let root = Construct::root();
        let a = child(&root, "a");
        child(&a, "a1");
        child(&root, "b");

        let pre: Vec<String> = root
            .node()
            .find_all(TraversalOrder::PreOrder)
            .iter()
            .map(|c| c.node().path())
            .collect();
        assert_eq!(pre, ["", "a", "a/a1", "b"]);

        let post: Vec<String> = root
            .node()
            .find_all(TraversalOrder::PostOrder)
            .iter()
            .map(|c| c.node().path())
            .collect();
        assert_eq!(post, ["a/a1", "a", "b", ""]);
    }

    #[test]
    fn remove_child_then_reattach() {
        let root = Construct::root();
        child(&root, "tmp");
        assert!(root.node().try_remove_child("tmp"));
        assert!(!root.node().try_remove_child("tmp"));
        // The id is free again after removal.
        child(&root, "tmp");
        assert_eq!(root.node().children().len(), 1);
    }

    #[test]
    fn context_inherits_and_shadows() {
        let root = Construct::root();
        root.node().set_context("region", json!("eu-1")).unwrap();
        let a = child(&root, "a");
        a.node().set_context("region", json!("us-2")).unwrap();
        let b = child(&a, "b");

        assert_eq!(b.node().try_get_context("region"), Some(json!("us-2")));
        assert_eq!(root.node().try_get_context("region"), Some(json!("eu-1")));
        assert_eq!(b.node().try_get_context("absent"), None);
    }

    #[test]
    fn context_freezes_after_first_child() {
        let root = Construct::root();
        let a = child(&root, "a");
        let err = root.node().set_context("k", json!(1)).unwrap_err();
        match err {
            TreeError::ContextFrozen { child } => assert_eq!(child, "a"),
            other => panic!("unexpected error: {other}"),
        }
        // Leaves are still writable.
        a.node().set_context("k", json!(1)).unwrap();
    }

    #[test]
    fn null_context_values_are_real_values() {
        let root = Construct::root();
        root.node().set_context("flag", json!(null)).unwrap();
        assert_eq!(root.node().try_get_context("flag"), Some(json!(null)));
    }

    #[test]
    fn metadata_drops_null_payloads_only() {
        let root = Construct::root();
        let node = root.node();
        node.add_metadata("Null", json!(null), MetadataOptions::default());
        node.add_metadata("False", json!(false), MetadataOptions::default());
        node.add_metadata("Zero", json!(0), MetadataOptions::default());
        node.add_metadata("Empty", json!(""), MetadataOptions::default());

        let kinds: Vec<String> = node.metadata().iter().map(|m| m.kind.clone()).collect();
        assert_eq!(kinds, ["False", "Zero", "Empty"]);
    }

    #[test]
    fn metadata_trace_captured_on_request() {
        let root = Construct::root();
        let node = root.node();
        node.add_metadata("plain", json!(1), MetadataOptions::default());
        node.add_metadata(
            "traced",
            json!(2),
            MetadataOptions { stack_trace: true },
        );

        let entries = node.metadata();
        assert!(entries[0].trace.is_none());
        let trace = entries[1].trace.as_ref().expect("trace requested");
        assert!(!trace.is_empty());
    }

    #[test]
    fn lock_refuses_children_transitively() {
        let root = Construct::root();
        let a = child(&root, "a");
        let b = child(&a, "b");
        a.node().lock();

        assert!(b.node().locked());
        let err = Construct::new(&b, "blocked").unwrap_err();
        match err {
            TreeError::SynthesisGuard { path } => assert_eq!(path, "a"),
            other => panic!("unexpected error: {other}"),
        }

        a.node().unlock();
        assert!(!b.node().locked());
        Construct::new(&b, "allowed").unwrap();
    }

    #[test]
    fn locking_the_root_uses_the_synthesis_wording() {
        let root = Construct::root();
        root.node().lock();
        let err = Construct::new(&root, "late").unwrap_err();
        assert_eq!(err.to_string(), "Cannot add children during synthesis");
    }

    #[test]
    fn default_child_resolution() {
        let root = Construct::root();
        assert_eq!(root.node().default_child().unwrap(), None);

        let resource = child(&root, "Resource");
        assert_eq!(root.node().default_child().unwrap(), Some(resource));

        child(&root, "Default");
        assert!(matches!(
            root.node().default_child(),
            Err(TreeError::AmbiguousDefaultChild { .. })
        ));
    }

    #[test]
    fn default_child_override_wins() {
        let root = Construct::root();
        child(&root, "Resource");
        child(&root, "Default");
        let chosen = child(&root, "chosen");

        root.node().set_default_child(Some(&chosen));
        assert_eq!(root.node().default_child().unwrap(), Some(chosen));

        root.node().set_default_child(None);
        assert!(root.node().default_child().is_err());
    }

    #[test]
    fn default_child_override_may_cross_trees() {
        let root = Construct::root();
        let other_root = Construct::root();
        let foreign = child(&other_root, "foreign");

        root.node().set_default_child(Some(&foreign));
        assert_eq!(root.node().default_child().unwrap(), Some(foreign));
    }

    #[test]
    fn validate_concatenates_messages() {
        let root = Construct::root();
        assert!(root.node().validate().unwrap().is_empty());

        root.node()
            .add_validation(Rc::new(StaticValidation(vec!["e1", "e2"])));
        root.node()
            .add_validation(Rc::new(StaticValidation(vec!["e3"])));
        assert_eq!(root.node().validate().unwrap(), ["e1", "e2", "e3"]);
    }

    #[test]
    fn reserved_legacy_hook_blocks_validation() {
        let root = Construct::root();
        root.node().register_legacy_hook("synthesize");
        let err = root.node().validate().unwrap_err();
        match err {
            TreeError::LegacyHookForbidden { hook } => assert_eq!(hook, "synthesize"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unreserved_hook_names_are_inert() {
        let root = Construct::root();
        root.node().register_legacy_hook("render");
        assert!(root.node().validate().unwrap().is_empty());
    }

    #[test]
    fn dependencies_deduplicate_by_node() {
        let root = Construct::root();
        let consumer = child(&root, "consumer");
        let producer = child(&root, "producer");

        for _ in 0..3 {
            consumer.node().add_dependency(producer.as_dependable());
        }
        assert_eq!(consumer.node().dependencies(), vec![producer]);
    }

    #[test]
    fn dependencies_resolve_groups_lazily() {
        let root = Construct::root();
        let consumer = child(&root, "consumer");
        let a = child(&root, "a");
        let b = child(&root, "b");

        let group = Rc::new(DependencyGroup::new());
        group.add(a.as_dependable());
        consumer.node().add_dependency(group.clone());
        assert_eq!(consumer.node().dependencies(), vec![a.clone()]);

        // Members added after attachment are visible on the next read.
        group.add(b.as_dependable());
        assert_eq!(consumer.node().dependencies(), vec![a, b]);
    }

    #[test]
    fn dependency_order_is_first_seen() {
        let root = Construct::root();
        let consumer = child(&root, "consumer");
        let a = child(&root, "a");
        let b = child(&root, "b");

        let group = Rc::new(DependencyGroup::new());
        group.add(b.as_dependable());
        group.add(a.as_dependable());

        consumer.node().add_dependency(a.as_dependable());
        consumer.node().add_dependency(group);
        assert_eq!(consumer.node().dependencies(), vec![a, b]);
    }
}
