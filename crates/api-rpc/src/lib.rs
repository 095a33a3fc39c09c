//! JSON-RPC API Layer
//!
//! Exposes the Notiq queue engine as versioned JSON-RPC 2.0 methods.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
