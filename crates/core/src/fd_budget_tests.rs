use super::*;

#[test]
fn reserve_succeeds_within_ceiling() {
    let budget = FdBudget::new(10);
    assert!(budget.reserve(FdClass::Apps, 4));
    assert_eq!(budget.in_use(FdClass::Apps), 4);
}

#[test]
fn reserve_fails_once_exhausted() {
    let budget = FdBudget::new(4);
    assert!(budget.reserve(FdClass::Apps, 4));
    assert!(!budget.reserve(FdClass::Apps, 1));
    assert_eq!(budget.in_use(FdClass::Apps), 4);
}

#[test]
fn release_frees_capacity_for_later_reservation() {
    let budget = FdBudget::new(4);
    assert!(budget.reserve(FdClass::Apps, 4));
    budget.release(FdClass::Apps, 4);
    assert_eq!(budget.in_use(FdClass::Apps), 0);
    assert!(budget.reserve(FdClass::Apps, 4));
}

#[test]
fn release_never_underflows_below_zero() {
    let budget = FdBudget::new(4);
    budget.release(FdClass::Apps, 100);
    assert_eq!(budget.in_use(FdClass::Apps), 0);
}

#[test]
fn channel_teardown_releases_two_per_stream_plus_two() {
    let budget = FdBudget::new(20);
    let expected_stream_count = 3u64;
    let nb_fd = 2 * expected_stream_count;
    assert!(budget.reserve(FdClass::Apps, nb_fd));
    // On teardown: 2 per stream plus 2 for the channel object itself.
    budget.release(FdClass::Apps, 2 * expected_stream_count + 2);
    assert_eq!(budget.in_use(FdClass::Apps), 0);
}
