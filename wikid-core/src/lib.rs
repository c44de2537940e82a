//! # wikid-core
//!
//! Shared building blocks for the wikid page server, used by
//! [`wikid-engine`] and the `wikid` binary.
//!
//! ## Responsibilities
//!
//! - **Pages & storage**: the [`page::Page`] model and the
//!   [`page::PageStore`] trait with a one-file-per-title implementation.
//!
//! - **Title validation**: the route grammar that extracts an alphanumeric
//!   title from a request path and rejects everything else.
//!
//! - **Rendering**: named HTML templates filled from a page, with escaping.
//!
//! - **Errors**: the store, render and request error taxonomy, each error
//!   answering with its own HTTP status through axum's `IntoResponse`.

pub mod error;
pub mod page;
pub mod render;
pub mod title;
