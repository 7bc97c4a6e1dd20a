//! # Logging actuator
//!
//! Stands in for the servo, motor and light strip drivers when the executable replays a recorded
//! drive. Every demand is logged, and the latest demands are kept for inspection.

use car_if::eqpt::act::{Actuator, ActuatorError, IndicatorColor, NUM_INDICATOR_CELLS};
use log::{debug, info};

/// Actuator logging the demands it receives.
#[derive(Debug)]
pub struct LogMech {
    indicators_fitted: bool,

    angle_deg: Option<i32>,
    speed: Option<u32>,
    cells: [IndicatorColor; NUM_INDICATOR_CELLS],
}

impl LogMech {
    /// Create the actuator. If `indicators_fitted` is false every indicator demand fails as it
    /// would on a car with no light strip.
    pub fn new(indicators_fitted: bool) -> Self {
        if !indicators_fitted {
            info!("No indicator light strip fitted");
        }

        Self {
            indicators_fitted,
            angle_deg: None,
            speed: None,
            cells: [IndicatorColor::OFF; NUM_INDICATOR_CELLS],
        }
    }

    /// Latest steering demand.
    pub fn angle_deg(&self) -> Option<i32> {
        self.angle_deg
    }

    /// Latest speed demand.
    pub fn speed(&self) -> Option<u32> {
        self.speed
    }

    pub fn cells(&self) -> &[IndicatorColor; NUM_INDICATOR_CELLS] {
        &self.cells
    }
}

impl Actuator for LogMech {
    fn turn_front_wheels(&mut self, angle_deg: i32) {
        // Lane following steers every frame, only log changes at debug
        if self.angle_deg != Some(angle_deg) {
            debug!("Front wheels -> {} deg", angle_deg);
        }
        self.angle_deg = Some(angle_deg);
    }

    fn set_speed(&mut self, speed: u32) {
        if self.speed != Some(speed) {
            info!("Speed -> {}", speed);
        }
        self.speed = Some(speed);
    }

    fn set_indicator(&mut self, cell: usize, color: IndicatorColor) -> Result<(), ActuatorError> {
        if !self.indicators_fitted {
            return Err(ActuatorError::IndicatorUnavailable)
        }

        let c = self.cells.get_mut(cell).ok_or(ActuatorError::InvalidCell(cell))?;
        if *c != color {
            debug!(
                "Indicator {} -> ({}, {}, {})", 
                cell, color.red, color.green, color.blue
            );
        }
        *c = color;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_log_mech() {
        let mut m = LogMech::new(true);
        m.turn_front_wheels(93);
        m.set_speed(30);
        m.set_indicator(2, IndicatorColor::AMBER).unwrap();

        assert_eq!(m.angle_deg(), Some(93));
        assert_eq!(m.speed(), Some(30));
        assert_eq!(m.cells()[2], IndicatorColor::AMBER);
        assert_eq!(m.set_indicator(4, IndicatorColor::AMBER), Err(ActuatorError::InvalidCell(4)));

        let mut m = LogMech::new(false);
        assert_eq!(
            m.set_indicator(0, IndicatorColor::WHITE), 
            Err(ActuatorError::IndicatorUnavailable)
        );
    }
}
