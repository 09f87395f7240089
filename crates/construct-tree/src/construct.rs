//! The public construct handle.

use crate::deps::Dependable;
use crate::error::TreeError;
use crate::node::Node;
use crate::tree::Tree;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A position in a construct tree.
///
/// `Construct` is a thin handle carrying exactly one [`Node`]; wrapper types
/// hold one by composition and implement [`Scope`] so they can act as
/// parents for further constructs.
#[derive(Clone, PartialEq, Eq)]
pub struct Construct {
    node: Node,
}

impl Construct {
    /// Create the root of a new tree. The root is the only construct with
    /// an empty id; its path is the empty string.
    pub fn root() -> Self {
        let tree = Rc::new(RefCell::new(Tree::new()));
        let tree_ref = Rc::downgrade(&tree);
        let index = tree.borrow_mut().insert_root(tree_ref);
        Self {
            node: Node::from_parts(tree, index),
        }
    }

    /// Attach a new construct under `scope`.
    ///
    /// Ids are free-form except for the path separator: every `/` in `id`
    /// is replaced with `--`. An empty id is reserved for roots and fails
    /// here with [`TreeError::InvalidRootId`]; attaching under a locked
    /// scope fails with [`TreeError::SynthesisGuard`]; a sibling id
    /// collision fails with [`TreeError::DuplicateSibling`].
    pub fn new(scope: &dyn Scope, id: &str) -> Result<Self, TreeError> {
        let node = scope.as_construct().node.attach_child(id)?;
        Ok(Self { node })
    }

    pub(crate) fn from_node(node: Node) -> Self {
        Self { node }
    }

    /// The node backing this handle.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// This construct's canonical [`Dependable`] identity: every call
    /// returns the same shared implementer, which resolves to this
    /// construct itself.
    pub fn as_dependable(&self) -> Rc<dyn Dependable> {
        self.node.anchor()
    }

    /// Whether `value` is a construct handle.
    pub fn is_construct(value: &dyn Any) -> bool {
        value.downcast_ref::<Construct>().is_some()
    }
}

impl fmt::Display for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.node.path();
        if path.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{path}")
        }
    }
}

impl fmt::Debug for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Construct({self})")
    }
}

/// Implemented by anything that can parent a construct.
///
/// This is the extension seam for domain wrapper types: hold a `Construct`
/// by composition, return it here, and the wrapper can be passed wherever a
/// scope is expected.
pub trait Scope {
    fn as_construct(&self) -> &Construct;
}

impl Scope for Construct {
    fn as_construct(&self) -> &Construct {
        self
    }
}
