//! # Equipment Interface
//!
//! This module defines the interface structures which are exchanged with equipment 
//! servers/clients.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod sim;
