//!
//! Utility module for wallet amounts.
//!
//! Re-exports formatting helpers and other utility functions for use throughout the codebase.
/// Utility functions for formatting and parsing amounts
pub mod index;

pub use index::{format_token_amount, parse_token_amount};
