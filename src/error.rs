use crate::booking::BookingStatus;
use crate::money::Money;

/// Error taxonomy for the booking lifecycle.
///
/// Validation variants are surfaced to the caller verbatim and must not be
/// retried. `AlreadySettled` and `DuplicateReview` are idempotency guards a
/// caller may treat as success. `Store` is the transient class that is safe
/// to retry, since every mutating operation runs as a single transaction.
#[derive(thiserror::Error, Debug)]
pub enum SettlementError {
    #[error("insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance { needed: Money, available: Money },
    #[error("cannot {action} a booking in state {from:?}")]
    InvalidTransition {
        from: BookingStatus,
        action: &'static str,
    },
    #[error("booking has already been settled")]
    AlreadySettled,
    #[error("reviewer has already reviewed this booking")]
    DuplicateReview,
    #[error("a conflicting session outcome was already recorded")]
    ConflictingOutcome,
    #[error("no such user: {0}")]
    UnknownUser(String),
    #[error("no such booking: {0}")]
    UnknownBooking(String),
    #[error("tutor does not offer course '{0}'")]
    CourseNotOffered(String),
    #[error("session window must end after it starts")]
    InvalidWindow,
    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),
    #[error("user {user} may not {action} this booking")]
    Unauthorized { user: String, action: &'static str },
    #[error("store unavailable: {0}")]
    Store(#[from] sled::Error),
    #[error("malformed document: {0}")]
    Codec(String),
}
