//! P2P networking module - Wire protocol, peer set and chain reconciliation

mod peer;
mod protocol;
mod sync;
mod transport;

pub use peer::*;
pub use protocol::*;
pub use sync::*;
pub use transport::*;
