//! # wikid-engine
//!
//! Runtime for the wikid page server, used by the `wikid` binary.
//!
//! This crate provides:
//! - **Handler dispatcher**: [`handler::make_handler`] wraps a page operation
//!   so the title is validated before the operation runs
//! - **Page operations**: view, edit and save over any `PageStore`
//! - **Router**: an axum router mapping `/view/`, `/edit/` and `/save/` to
//!   the guarded operations
//! - **Server loop**: command-driven listener control over `axum::serve`,
//!   and an event bus for the launcher

pub mod handler;
pub mod ops;
pub mod router;
pub mod server;
pub mod state;

#[cfg(test)]
mod testing;
