//! # Car interface crate.
//!
//! Provides the contracts between the car's control core and its collaborators: the camera, the
//! perception models, the actuators and the operator.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Operator commands
pub mod tc;

/// Command and data definitions for equipment (camera, actuators)
pub mod eqpt;

/// Perception model contracts
pub mod model;
