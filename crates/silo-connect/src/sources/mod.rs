//! Built-in source connector implementations and shared fetch helpers
//!
//! Each connector resolves its own config (defaults, env prefix, required
//! keys) through the shared loader, talks to its source through the engine
//! or session caches, and returns data in the standardized ingestion format.

pub mod ftp;
pub mod http;
pub mod incremental;
pub mod postgres;
pub mod sqlite;
pub mod stream;
