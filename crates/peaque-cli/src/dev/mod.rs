//! The development server.
//!
//! One HTTP listener serves transformed source modules, bundles
//! dependencies on first request, proxies API requests through
//! discovered middleware chains, dispatches server-action RPC calls,
//! watches the source tree and pushes HMR frames over a WebSocket.

pub mod pipeline;
pub mod resolve;
pub mod rpc;
pub mod server;
pub mod state;
pub mod watcher;

pub use resolve::{resolve_source, Resolution};
pub use server::DevServer;
pub use state::{DevState, SharedDevState};
pub use watcher::{classify_change, ChangeAction, FileChange, FileWatcher};

use serde::{Deserialize, Serialize};

/// One HMR notification as the browser receives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmrFrame {
    pub data: HmrEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmrEvent {
    pub event: String,
    pub path: String,
}

impl HmrFrame {
    pub fn change(path: impl Into<String>) -> Self {
        HmrFrame { data: HmrEvent { event: "change".to_string(), path: path.into() } }
    }

    /// The frame that tells the client to re-import the route table.
    pub fn router_changed() -> Self {
        Self::change("/peaque.js")
    }
}
