//! Shared infrastructure for Silo components
//!
//! This crate holds the pieces every Silo binary and library crate needs:
//! currently the centralized logging configuration and initialization.

pub mod logging;
