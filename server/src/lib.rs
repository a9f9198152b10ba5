//! Docent API server
//!
//! Serves the persisted chat API (cold-load history reconstruction with
//! batched joins, message write path), relays live answer streams through
//! the assembly engine, and issues time-bounded document preview URLs.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod history;
pub mod retrieval;
pub mod signed_url;
pub mod store;
