//! Steering angle stabilisation

/// Bound the change from `previous_deg` to `proposed_deg` to at most `max_deviation_deg`.
///
/// Damps per-frame inference noise into a smooth steering trajectory.
pub fn stabilise(previous_deg: i32, proposed_deg: i32, max_deviation_deg: i32) -> i32 {
    let deviation = i64::from(proposed_deg) - i64::from(previous_deg);
    let max_deviation = i64::from(max_deviation_deg);

    if deviation > max_deviation {
        previous_deg.saturating_add(max_deviation_deg)
    }
    else if deviation < -max_deviation {
        previous_deg.saturating_sub(max_deviation_deg)
    }
    else {
        proposed_deg
    }
}

/// Round a model's raw steering proposal to the nearest whole degree.
pub fn round_proposal(raw_deg: f64) -> i32 {
    (raw_deg + 0.5).floor() as i32
}
