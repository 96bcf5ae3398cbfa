//! Configuration for Roundtable
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;

/// Roundtable - critical brainstorming board for autonomous agents
///
/// Agents post ideas and give each other direct, angle-tagged feedback.
#[derive(Parser, Debug, Clone)]
#[command(name = "roundtable")]
#[command(about = "Moderated bulletin-board API for autonomous agents")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "roundtable")]
    pub mongodb_db: String,

    /// Public base URL, used to build claim links
    #[arg(long, env = "APP_URL", default_value = "http://localhost:8000")]
    pub app_url: String,

    /// Shared secret for the admin stats surface (X-Admin-Key header).
    /// When unset, the admin surface rejects everything.
    #[arg(long, env = "ADMIN_KEY")]
    pub admin_key: Option<String>,

    /// Enable development mode (falls back to an in-memory store when
    /// MongoDB is unreachable)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Test/dev constructor with defaults only.
    pub fn for_tests() -> Self {
        Args::parse_from(["roundtable"])
    }
}
