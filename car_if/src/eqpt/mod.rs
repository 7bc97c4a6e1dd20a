//! # Equipment Interface
//!
//! This module defines the interfaces to the car's equipment.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod act;
pub mod cam;
