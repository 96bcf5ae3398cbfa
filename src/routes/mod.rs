//! Route handlers
//!
//! Each module holds hyper-independent core functions taking typed inputs
//! and returning `Reply`/`ApiError`; dispatch and body collection live in
//! `server::http`.

pub mod activity;
pub mod agents;
pub mod claim;
pub mod critiques;
pub mod envelope;
pub mod health;
pub mod ideas;
pub mod stats;
