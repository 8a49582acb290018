//! Server connection: wire protocol, outbound queue and the event loop

pub mod link;
pub mod outbound;
pub mod protocol;

pub use link::Link;
