//! REST API Module
//!
//! HTTP interface for operators and tools to drive the node.

mod methods;
mod server;

pub use methods::*;
pub use server::*;
