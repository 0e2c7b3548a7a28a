//! Error taxonomy for attribute access.
//!
//! Recoverable failures are reported through [`IvarError`]. Shape/storage
//! inconsistencies are not errors: they abort through a panic at the
//! detecting call site, because continuing would risk silent corruption.
//! Running out of shape ids is not an error either; affected objects quietly
//! switch to a private name→index map.

use crate::name::Name;
use thiserror::Error;

/// Result alias for attribute operations.
pub type IvarResult<T> = Result<T, IvarError>;

/// A reported, non-retried attribute access failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IvarError {
    /// Write or delete on a frozen object.
    #[error("can't modify frozen object: attribute `{name}`")]
    Frozen {
        /// Attribute the caller tried to modify.
        name: Name,
    },

    /// Access across isolation contexts.
    #[error(transparent)]
    Isolation(#[from] IsolationViolation),
}

/// The isolation rule an access broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IsolationViolation {
    /// Class/module attribute written from a non-main context.
    #[error("can not set instance variables of classes/modules from non-main contexts")]
    ClassWrite,

    /// Unshareable class/module attribute read from a non-main context.
    #[error(
        "can not get unshareable values from instance variables of classes/modules from non-main contexts"
    )]
    ClassUnshareableRead,

    /// Attribute of a shareable, unfrozen object touched from a non-main context.
    #[error("can not access instance variables of shareable objects from non-main contexts")]
    SharedObject,

    /// Object owned by another context.
    #[error("can not access instance variables of an object owned by another context")]
    ForeignObject,
}

impl IvarError {
    /// Check if this is a frozen-object error.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        matches!(self, IvarError::Frozen { .. })
    }

    /// Check if this is an isolation error.
    #[inline]
    pub fn is_isolation(&self) -> bool {
        matches!(self, IvarError::Isolation(_))
    }
}
