//! Booking lifecycle and escrow settlement engine for a tutoring
//! marketplace.
//!
//! The library owns the money-correct part of the product: the booking
//! state machine, the escrow that holds a session's cost between request
//! and mutual acknowledgment, the append-only payment log, and the review
//! aggregation. Screens, auth and messaging are the caller's problem; the
//! caller hands in authenticated user ids and gets typed results back.

pub mod booking;
pub mod error;
pub(crate) mod escrow;
pub(crate) mod ledger;
pub mod money;
pub mod payment;
pub mod rating;
pub mod service;
pub mod store;
pub mod timestamp;
pub mod user;
pub mod utils;
