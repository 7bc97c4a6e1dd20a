//! Indicator strip patterns

use std::time::Duration;

use car_if::eqpt::act::{IndicatorColor, NUM_INDICATOR_CELLS};
use serde::Serialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Colours of every cell of the strip.
pub type StripColors = [IndicatorColor; NUM_INDICATOR_CELLS];

/// Side of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnSide {
    Left,
    Right,
}

/// One frame of an indicator animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkFrame {
    pub colors: StripColors,
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const A: IndicatorColor = IndicatorColor::AMBER;
const O: IndicatorColor = IndicatorColor::OFF;

/// Frames of one left blink cycle. Cell 3 is the left edge of the strip.
const LEFT_CYCLE: [BlinkFrame; 5] = [
    BlinkFrame { colors: [O, O, O, A], duration: Duration::from_millis(200) },
    BlinkFrame { colors: [O, O, A, A], duration: Duration::from_millis(200) },
    BlinkFrame { colors: [O, A, A, A], duration: Duration::from_millis(200) },
    BlinkFrame { colors: [A, A, A, A], duration: Duration::from_millis(300) },
    BlinkFrame { colors: [O, O, O, O], duration: Duration::from_millis(200) },
];

/// Frames of one right blink cycle. Cell 0 is the right edge of the strip.
const RIGHT_CYCLE: [BlinkFrame; 5] = [
    BlinkFrame { colors: [A, O, O, O], duration: Duration::from_millis(200) },
    BlinkFrame { colors: [A, A, O, O], duration: Duration::from_millis(200) },
    BlinkFrame { colors: [A, A, A, O], duration: Duration::from_millis(200) },
    BlinkFrame { colors: [A, A, A, A], duration: Duration::from_millis(300) },
    BlinkFrame { colors: [O, O, O, O], duration: Duration::from_millis(200) },
];

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

impl TurnSide {
    /// Frames of one blink cycle for this side, ending with the strip off.
    pub fn blink_cycle(&self) -> &'static [BlinkFrame] {
        match self {
            TurnSide::Left => &LEFT_CYCLE,
            TurnSide::Right => &RIGHT_CYCLE,
        }
    }
}

/// Every cell set to the same colour.
pub fn uniform(color: IndicatorColor) -> StripColors {
    [color; NUM_INDICATOR_CELLS]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cycles_mirror() {
        let left = TurnSide::Left.blink_cycle();
        let right = TurnSide::Right.blink_cycle();

        assert_eq!(left.len(), right.len());
        for (l, r) in left.iter().zip(right.iter()) {
            let mut mirrored = l.colors;
            mirrored.reverse();
            assert_eq!(mirrored, r.colors);
            assert_eq!(l.duration, r.duration);
        }

        let total: Duration = left.iter().map(|f| f.duration).sum();
        assert_eq!(total, Duration::from_millis(1100));
        assert_eq!(left.last().map(|f| f.colors), Some(uniform(IndicatorColor::OFF)));
    }
}
