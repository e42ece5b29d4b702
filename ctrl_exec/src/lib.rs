//! # Control library.
//!
//! This library allows other crates in the workspace, and the benchmarks, to access items defined
//! inside the control crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// PID controller - limited output with anti-windup
pub mod pid;

/// Twiddle - online coordinate ascent tuning of PID gains
pub mod twiddle;

/// Drive control module - steering and throttle loops driven by the simulator telemetry
pub mod drive_ctrl;

/// Simulator server - receives frames from the simulator bridge and replies with demands
pub mod sim_server;
