//! Core types and trait definitions for the scroll conversation-history
//! store.
//!
//! This crate is deliberately free of database and I/O dependencies. It owns
//! the record model, the info-event variant set, the protocol-compatibility
//! gate and the schema backfill rules; storage backends implement the traits
//! in [`store`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod capability;
pub mod error;
pub mod gate;
pub mod info;
pub mod migrate;
pub mod record;
pub mod store;
pub mod stored;

pub use error::{Error, Result};
