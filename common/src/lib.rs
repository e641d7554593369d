//! Common Utilities and Types Library
//!
//! This crate provides the frame clock model, LTE cell types and shared
//! utilities used across the overshadow workspace.

pub mod clock;
pub mod shutdown;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use clock::*;
pub use shutdown::ShutdownToken;
pub use types::*;
pub use utils::*;
