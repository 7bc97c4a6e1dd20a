//! # Actuator equipment interface
//!
//! The steering servo, the drive motor and the indicator light strip.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Number of cells in the indicator light strip.
pub const NUM_INDICATOR_CELLS: usize = 4;

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// Colour of a single indicator cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// Actuator demands issued by the control core.
///
/// Steering and speed demands are fire-and-forget. Indicator demands may fail if the light strip
/// is not fitted, in which case the caller is expected to carry on without the lighting effect.
pub trait Actuator {
    /// Turn the front wheels to the given angle, 90 is straight ahead.
    fn turn_front_wheels(&mut self, angle_deg: i32);

    /// Set the drive motor's target speed.
    fn set_speed(&mut self, speed: u32);

    /// Set the colour of one indicator cell.
    fn set_indicator(&mut self, cell: usize, color: IndicatorColor) -> Result<(), ActuatorError>;
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ActuatorError {
    #[error("No indicator light strip was found")]
    IndicatorUnavailable,

    #[error("Indicator cell {0} does not exist")]
    InvalidCell(usize),
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl IndicatorColor {
    pub const OFF: IndicatorColor = IndicatorColor::rgb(0, 0, 0);
    pub const WHITE: IndicatorColor = IndicatorColor::rgb(255, 255, 255);
    pub const AMBER: IndicatorColor = IndicatorColor::rgb(255, 41, 0);

    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}
