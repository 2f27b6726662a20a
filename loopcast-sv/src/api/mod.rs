//! HTTP/SSE control surface for the stream supervisor

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, AppContext};
