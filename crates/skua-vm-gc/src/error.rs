//! GC errors

use thiserror::Error;

use crate::object::GcRef;

/// Errors reported by heap operations that take caller supplied handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GcError {
    /// The handle's slot was freed or reused
    #[error("dangling handle {0:?}")]
    DanglingHandle(GcRef),

    /// `unroot` was called for a handle that has no persistent root
    #[error("handle {0:?} is not rooted")]
    NotRooted(GcRef),
}
