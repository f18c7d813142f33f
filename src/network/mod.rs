//! Transport layer: websocket gateway and per-connection event loop.

mod connection;
mod gateway;

pub use gateway::{build_router, GatewayState};
