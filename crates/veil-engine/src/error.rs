//! Error types for engine operations.
//!
//! Every kind is locally recoverable by the caller; none is a fatal
//! engine condition. The one true invariant violation — two concurrent
//! consumptions both succeeding past a view limit — is made structurally
//! impossible by the store's atomic primitives and is logged as a bug if
//! a store ever reports it.

use thiserror::Error;

use veil_core::{CoreError, GrantId, GrantState, RequestId, Username};
use veil_store::StoreError;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The referenced request or grant does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller is not the owner of the object they tried to act on.
    #[error("{caller} is not the owner of this {what}")]
    NotOwner {
        caller: Username,
        what: &'static str,
    },

    /// The reader is not the grantee of the grant they presented.
    #[error("reader is not the grantee of grant {grant_id}")]
    WrongGrantee { grant_id: GrantId },

    /// Owners do not request access to their own data.
    #[error("owner and counterparty are the same user: {0}")]
    SelfRequest(Username),

    /// A pending request already exists for the same triple.
    #[error("a pending request already exists: {existing}")]
    DuplicatePendingRequest { existing: RequestId },

    /// The request already left the pending state.
    #[error("request {0} is already resolved")]
    AlreadyResolved(RequestId),

    /// An active grant already exists for the same resource tuple.
    #[error("an active grant already exists: {existing}")]
    AlreadyGranted { existing: GrantId },

    /// The grant is in a terminal state.
    #[error("grant is {}", state.as_str())]
    GrantTerminated { state: GrantState },

    /// The grant's time or view budget is exhausted.
    #[error("grant has expired")]
    Expired,

    /// A visibility policy failed validation.
    #[error(transparent)]
    InvalidPolicy(#[from] CoreError),

    /// Storage error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
