//! Automatic roast event detection (CHARGE/DROP break points, turning point).
//!
//! Analyzes bean-temperature gradients to detect when a BT curve reverses
//! direction: falling to rising (the turning point after `CHARGE`) or rising
//! to falling (`DROP`).

/// Check whether the last 6 BT samples indicate a gradient reversal.
///
/// `samples` must contain exactly 6 consecutive readings, oldest first;
/// any other length returns `false`. `d` is the gradient threshold, `offset`
/// is added to both sides of the comparison, and `dpre_dpost_diff` is the
/// minimum required difference between the pre- and post-break gradients.
#[must_use]
pub fn check_bt_break(samples: &[f64], d: f64, offset: f64, dpre_dpost_diff: f64) -> bool {
    if samples.len() != 6 {
        return false;
    }
    let (s0, s1, s2, s3, s4, s5) = (
        samples[0], samples[1], samples[2], samples[3], samples[4], samples[5],
    );

    let dpre = ((s1 - s0) + (s2 - s1)) / 2.0;
    let dpost = ((s4 - s3) + (s5 - s4)) / 2.0;

    if (dpre - dpost).abs() < dpre_dpost_diff {
        return false;
    }

    (dpre - d - offset > 0.0 && 0.0 > dpost + d + offset)
        || (dpre + d + offset < 0.0 && 0.0 < dpost - d - offset)
}

/// Find the turning point (minimum BT) after a `CHARGE` event.
///
/// Returns the index within `bt_values` of the lowest reading at or after
/// `charge_index`, or `None` if `charge_index` is out of range.
#[must_use]
pub fn find_turning_point(bt_values: &[f64], charge_index: usize) -> Option<usize> {
    let search = bt_values.get(charge_index..)?;
    if search.is_empty() {
        return None;
    }
    let mut min_idx = 0;
    let mut min_val = search[0];
    for (i, &v) in search.iter().enumerate().skip(1) {
        if v < min_val {
            min_val = v;
            min_idx = i;
        }
    }
    Some(charge_index + min_idx)
}
