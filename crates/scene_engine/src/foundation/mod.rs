//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the display core:
//! - Math types for transform cores
//! - Handle maps and recycled id allocation
//! - Logging utilities

pub mod math;
pub mod collections;
pub mod logging;
