//! Host-wide constants
//!
//! Environment variables, flags and defaults the binary reads at startup.

/// Environment variables
pub mod env {
    /// Path of the JSON configuration file
    pub const CONFIG: &str = "PADFLOW_CONFIG";
    /// Variables with this prefix are exposed to nodes as secrets
    pub const SECRET_PREFIX: &str = "PADFLOW_SECRET_";
}

/// Command-line flags
pub mod flags {
    /// Serve the editor protocol on stdin/stdout instead of running the graph
    pub const EDITOR: &str = "--editor";
    pub const HELP: &str = "--help";
}

/// Default values
pub mod defaults {
    /// Log filter used when `RUST_LOG` is unset
    pub const LOG_FILTER: &str = "info";
    /// Identity announced on the in-process transport
    pub const TRANSPORT_IDENTITY: &str = "padflow-host";
}

pub const USAGE: &str = "usage: padflow [--editor] [SNAPSHOT.json]";
