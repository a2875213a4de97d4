use chrono::TimeZone;

use super::*;

#[test]
fn trace_output_path_matches_the_documented_shape() {
    let now = Utc.with_ymd_and_hms(2026, 7, 26, 13, 5, 9).unwrap();
    assert_eq!(trace_output_path("a", 42, now), "a-42-20260726-130509/");
}

#[test]
fn fixed_clock_always_returns_the_same_instant() {
    let now = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let clock = FixedClock(now);
    assert_eq!(clock.now(), now);
    assert_eq!(clock.now(), now);
}
