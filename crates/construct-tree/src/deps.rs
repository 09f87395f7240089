//! Dependency indirection.
//!
//! A dependency declaration names a [`Dependable`], not a node: the concrete
//! producer nodes are resolved when the consumer's dependencies are read.
//! This lets composites such as [`DependencyGroup`] grow after they have
//! been attached, and lets objects the tree never created stand in for the
//! nodes that produce them via a side-table registry
//! ([`implement`] / [`of`]).

use crate::construct::Construct;
use crate::error::TreeError;
use crate::node::Node;
use crate::tree::{NodeIndex, Tree};
use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Resolves to the construct nodes a dependency declaration stands for.
pub trait Dependable {
    /// Concrete producer nodes, unique, in first-visit order.
    fn dependency_roots(&self) -> Vec<Construct>;
}

/// Canonical dependable identity of one construct node.
///
/// Created once per node at attachment time; every declaration of that node
/// as a dependency shares this allocation, so identity-based deduplication
/// works across call sites. Holds the tree weakly: an anchor kept alive by a
/// registry or a foreign composite never keeps the tree itself alive.
pub struct NodeAnchor {
    tree: Weak<RefCell<Tree>>,
    index: NodeIndex,
}

impl NodeAnchor {
    pub(crate) fn new(tree: Weak<RefCell<Tree>>, index: NodeIndex) -> Rc<Self> {
        Rc::new(Self { tree, index })
    }

    /// The construct this anchor designates, or `None` once its tree has
    /// been dropped.
    pub(crate) fn construct(&self) -> Option<Construct> {
        let tree = self.tree.upgrade()?;
        Some(Construct::from_node(Node::from_parts(tree, self.index)))
    }
}

impl Dependable for NodeAnchor {
    fn dependency_roots(&self) -> Vec<Construct> {
        self.construct().into_iter().collect()
    }
}

struct RegistryEntry {
    referent: Weak<dyn Any>,
    source: Rc<dyn Dependable>,
}

thread_local! {
    /// Side table mapping foreign objects (by allocation identity) to their
    /// dependable implementers. Referents are held weakly and dead entries
    /// are pruned on the next registration.
    static REGISTRY: RefCell<Vec<RegistryEntry>> = const { RefCell::new(Vec::new()) };
}

fn same_allocation(live: &Rc<dyn Any>, target: &Rc<dyn Any>) -> bool {
    std::ptr::eq(
        Rc::as_ptr(live) as *const (),
        Rc::as_ptr(target) as *const (),
    )
}

/// Register `source` as the dependable implementer for `target`.
///
/// A later registration for the same object replaces the earlier one. The
/// table does not keep `target` alive; once the object is dropped its entry
/// is garbage and will be pruned.
pub fn implement(target: &Rc<dyn Any>, source: Rc<dyn Dependable>) {
    REGISTRY.with(|registry| {
        let mut entries = registry.borrow_mut();
        entries.retain(|entry| entry.referent.strong_count() > 0);

        let existing = entries.iter_mut().find(|entry| {
            entry
                .referent
                .upgrade()
                .is_some_and(|live| same_allocation(&live, target))
        });
        match existing {
            Some(entry) => entry.source = source,
            None => entries.push(RegistryEntry {
                referent: Rc::downgrade(target),
                source,
            }),
        }
    });
}

/// Resolve the dependable implementer for `target`.
///
/// Explicit registrations take precedence; construct node anchors resolve to
/// themselves without registration. Fails with [`TreeError::NotDependable`]
/// for anything else.
pub fn of(target: &Rc<dyn Any>) -> Result<Rc<dyn Dependable>, TreeError> {
    let registered = REGISTRY.with(|registry| {
        registry.borrow().iter().find_map(|entry| {
            let live = entry.referent.upgrade()?;
            same_allocation(&live, target).then(|| Rc::clone(&entry.source))
        })
    });
    if let Some(source) = registered {
        return Ok(source);
    }
    if let Ok(anchor) = Rc::clone(target).downcast::<NodeAnchor>() {
        return Ok(anchor);
    }
    Err(TreeError::NotDependable)
}

/// A mutable composite of dependables.
///
/// The group stores references, not snapshots: members added after the group
/// has been attached to a consumer are observed on the consumer's next
/// dependency read.
#[derive(Default)]
pub struct DependencyGroup {
    members: RefCell<Vec<Rc<dyn Dependable>>>,
}

impl DependencyGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append members to the group.
    pub fn add(&self, member: Rc<dyn Dependable>) {
        self.members.borrow_mut().push(member);
    }
}

impl FromIterator<Rc<dyn Dependable>> for DependencyGroup {
    fn from_iter<I: IntoIterator<Item = Rc<dyn Dependable>>>(members: I) -> Self {
        Self {
            members: RefCell::new(members.into_iter().collect()),
        }
    }
}

impl Dependable for DependencyGroup {
    fn dependency_roots(&self) -> Vec<Construct> {
        // Snapshot the member list first: resolving a member may re-enter
        // the tree or this group's cell.
        let members: Vec<Rc<dyn Dependable>> = self.members.borrow().clone();
        let mut roots: Vec<Construct> = Vec::new();
        for member in members {
            for root in member.dependency_roots() {
                if !roots.iter().any(|seen| seen == &root) {
                    roots.push(root);
                }
            }
        }
        roots
    }
}
