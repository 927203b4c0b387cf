//! Backend bus client for the relay.
//!
//! Publishers push JSON envelopes onto a Redis list; the relay pops them
//! one at a time with `BLPOP`.

pub mod client;

pub use client::{RedisBus, DEFAULT_QUEUE};
