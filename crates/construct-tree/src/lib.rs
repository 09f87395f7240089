#![deny(unsafe_code)]
//! # construct-tree
//!
//! A generic, hierarchical composition model: the construct tree is an
//! in-memory scene graph for system definitions, built declaratively by
//! attaching constructs under parent scopes.
//!
//! ## Architecture
//!
//! ```text
//! Construct (public handle)
//!     └── Node (per-construct API)
//!           └── Tree arena (Rc<RefCell<…>>, index handles)
//!
//! deps::Dependable ──> concrete producer nodes (resolved lazily)
//! ```
//!
//! Every node carries:
//!
//! - a stable **identity**: an id, the `/`-joined **path** from the root,
//!   and a path-derived **address** (`c8` + SHA-1) that stays stable when
//!   conventional `Default` grouping levels are introduced or removed
//! - **context**: key/value configuration read through upward lookup and
//!   frozen once the node has children
//! - **metadata**: an append-only log of typed entries, optionally carrying
//!   a captured stack trace
//! - **validations**: local checks aggregated by caller-driven traversal
//! - **dependencies**: declared against [`deps::Dependable`] indirections
//!   and resolved to producer nodes at read time
//!
//! Trees are single-threaded: construction, mutation, traversal, and
//! validation all happen on one execution context.
//!
//! ## Key Types
//!
//! - [`Construct`] — public handle and subclassing anchor (via [`Scope`])
//! - [`Node`] — the per-construct state and API
//! - [`deps::DependencyGroup`] — mutable composite of dependables
//! - [`Validate`] — local validation hook
//! - [`TreeError`] — everything that can go wrong

mod addr;
pub mod construct;
pub mod deps;
pub mod error;
pub mod metadata;
pub mod node;
mod tree;
pub mod validation;

pub use construct::{Construct, Scope};
pub use deps::{Dependable, DependencyGroup};
pub use error::TreeError;
pub use metadata::{MetadataEntry, MetadataOptions};
pub use node::Node;
pub use tree::{TraversalOrder, PATH_SEP};
pub use validation::Validate;
