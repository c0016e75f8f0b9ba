//! Ring-interval membership with wraparound. Every placement decision in the
//! ring (lookup, notify, stabilization, finger selection) goes through this
//! one predicate.

/// Decides whether `value` lies in the ring interval from `low` to `up`,
/// walking clockwise, with per-bound inclusivity.
///
/// `low == up` denotes the whole ring except the single point `low`; marking
/// either bound inclusive turns it into the whole ring. An interval that
/// crosses the ring's zero point is reduced to a non-wrapping one by swapping
/// the bounds, negating both inclusivity flags, and negating the result.
pub fn in_ring_interval(
    value: u64,
    low: u64,
    up: u64,
    inclusive_low: bool,
    inclusive_up: bool,
) -> bool {
    if low == up {
        return value != low || inclusive_low || inclusive_up;
    }

    if low > up {
        return !in_ring_interval(value, up, low, !inclusive_up, !inclusive_low);
    }

    let above = if inclusive_low {
        value >= low
    } else {
        value > low
    };
    let below = if inclusive_up {
        value <= up
    } else {
        value < up
    };

    above && below
}
