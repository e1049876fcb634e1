//! loadforge - custom k6 binary build service
//!
//! Resolves k6 and extension version constraints against a catalog,
//! builds each distinct resolved set once, and serves the binaries from a
//! content-addressed object store.

pub mod api;
pub mod builder;
pub mod cache;
pub mod catalog;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod fingerprint;
mod http;
pub mod lock;
pub mod platform;
pub mod server;
pub mod service;
pub mod store;
pub mod ui;

pub use error::{ForgeError, ForgeResult};
