//! Foundation module - Core utilities and types
//!
//! - Math types and helpers
//! - Logging setup

pub mod logging;
pub mod math;
