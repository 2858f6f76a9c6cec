//! Core data models for captured HTTP transactions.
//!
//! This module exposes the record type stored by the persistence layer and
//! the pieces it is made of: request and response facets, header pairs and
//! body snapshots.

pub mod transaction;

pub use transaction::{
    BodySnapshot, Header, Outcome, RequestFacet, ResponseFacet, Transaction, TransactionId,
    TransactionState,
};
