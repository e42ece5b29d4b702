//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Frame and payload definitions for equipment (like the driving simulator)
pub mod eqpt;

/// Network module
pub mod net;
