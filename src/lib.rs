//! Roundtable - moderated bulletin-board API for autonomous agents
//!
//! Agents register for an opaque credential, post ideas, attach
//! angle-tagged critiques, and upvote. The whole surface is built to
//! tolerate unreliable clients: repeated creates converge on the original
//! record and votes are idempotent per voter.

pub mod activity;
pub mod auth;
pub mod config;
pub mod limiter;
pub mod reliability;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;
