//! Utility functions and helpers
//!
//! - [`retry`] - Retry logic for transient storage errors
//! - [`util`] - Stage timing helpers

pub mod retry;
pub mod util;
