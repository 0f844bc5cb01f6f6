//! Hub server wiring: configuration, the in-process caller, and the RPC
//! handler set.

pub mod caller;
pub mod config;
pub mod server;

pub use caller::LocalCaller;
pub use config::{HubConfig, DEFAULT_SOCKET_PATH};
pub use server::{HubServer, HubState};
