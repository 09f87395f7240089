/// Errors raised by tree mutation and queries.
///
/// Every failure is reported at the point of offense; nothing is retried or
/// swallowed. Validators are the one exception to the error channel: they
/// report through their returned message lists and never raise.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A non-root construct was given an empty id.
    #[error("Only root constructs may have an empty id")]
    InvalidRootId,

    /// A sibling with the same id already exists under the parent.
    #[error("There is already a Construct with name '{id}' in {parent}")]
    DuplicateSibling { id: String, parent: String },

    /// `set_context` was called after the node already had children.
    #[error("Cannot set context after children have been added: {child}")]
    ContextFrozen { child: String },

    /// A child was attached under a locked node. `path` is the deepest
    /// locked ancestor; empty when the root itself is locked.
    #[error("{}", synthesis_guard_message(.path))]
    SynthesisGuard { path: String },

    /// `find_child` found no child with the requested id.
    #[error("No child with id '{id}' in {path}")]
    ChildNotFound { id: String, path: String },

    /// Both a `Resource` and a `Default` child exist.
    #[error("Cannot determine default child for {path}: there is both a child with id 'Resource' and a child with id 'Default'")]
    AmbiguousDefaultChild { path: String },

    /// `deps::of` was called on an object with no registered implementer.
    #[error("Object does not implement Dependable; register an implementer with deps::implement()")]
    NotDependable,

    /// A wrapper type still carries a reserved pre-1.x lifecycle hook.
    #[error("The lifecycle hook '{hook}' is no longer supported; register validations with add_validation() instead")]
    LegacyHookForbidden { hook: String },
}

fn synthesis_guard_message(path: &str) -> String {
    if path.is_empty() {
        "Cannot add children during synthesis".to_string()
    } else {
        format!("Cannot add children to \"{path}\" during synthesis")
    }
}
