//! Local multi-agent orchestration hub: registers CLI-driven code
//! assistants as peers, exposes JSON-RPC over a unix socket and HTTP,
//! and brokers `message/send` requests to the chosen agent.

pub mod a2a;
pub mod cli;
pub mod hub;
pub mod transport;
