use ring_node::interval::in_ring_interval;

const CAPACITY: u32 = 4;
const RING: u64 = 1 << CAPACITY;

/// Brute-force reference: walk the ring clockwise from `low` to `up` and
/// collect the interval's members.
fn reference_contains(
    value: u64,
    low: u64,
    up: u64,
    inclusive_low: bool,
    inclusive_up: bool,
) -> bool {
    if low == up {
        return value != low || inclusive_low || inclusive_up;
    }

    let mut members = Vec::new();
    if inclusive_low {
        members.push(low);
    }
    let mut point = (low + 1) % RING;
    while point != up {
        members.push(point);
        point = (point + 1) % RING;
    }
    if inclusive_up {
        members.push(up);
    }

    members.contains(&value)
}

#[test]
fn matches_brute_force_enumeration() {
    for low in 0..RING {
        for up in 0..RING {
            for value in 0..RING {
                for flags in 0..4u8 {
                    let inclusive_low = flags & 1 != 0;
                    let inclusive_up = flags & 2 != 0;
                    assert_eq!(
                        in_ring_interval(value, low, up, inclusive_low, inclusive_up),
                        reference_contains(value, low, up, inclusive_low, inclusive_up),
                        "value={value} low={low} up={up} incl=({inclusive_low},{inclusive_up})"
                    );
                }
            }
        }
    }
}

#[test]
fn degenerate_interval_is_the_whole_ring_minus_the_point() {
    assert!(!in_ring_interval(5, 5, 5, false, false));
    assert!(in_ring_interval(6, 5, 5, false, false));
    assert!(in_ring_interval(0, 5, 5, false, false));

    // An inclusive bound forces even the excluded point in.
    assert!(in_ring_interval(5, 5, 5, true, false));
    assert!(in_ring_interval(5, 5, 5, false, true));
}

#[test]
fn wrapping_interval_crosses_zero() {
    // (14, 2) on a 16-point ring covers 15, 0, 1.
    assert!(in_ring_interval(15, 14, 2, false, false));
    assert!(in_ring_interval(0, 14, 2, false, false));
    assert!(in_ring_interval(1, 14, 2, false, false));
    assert!(!in_ring_interval(14, 14, 2, false, false));
    assert!(!in_ring_interval(2, 14, 2, false, false));
    assert!(!in_ring_interval(8, 14, 2, false, false));

    assert!(in_ring_interval(14, 14, 2, true, false));
    assert!(in_ring_interval(2, 14, 2, false, true));
}

#[test]
fn plain_interval_respects_bounds() {
    assert!(in_ring_interval(5, 3, 9, false, false));
    assert!(!in_ring_interval(3, 3, 9, false, false));
    assert!(!in_ring_interval(9, 3, 9, false, false));
    assert!(in_ring_interval(3, 3, 9, true, false));
    assert!(in_ring_interval(9, 3, 9, false, true));
    assert!(!in_ring_interval(12, 3, 9, true, true));
}
