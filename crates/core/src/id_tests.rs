use super::*;

define_id! {
    pub struct TestId;
}

#[test]
fn id_equality_and_display() {
    let a = TestId::new("abc");
    assert_eq!(a, "abc");
    assert_eq!(a.to_string(), "abc");
    assert_eq!(a.as_str(), "abc");
}

#[test]
fn sequential_id_gen_is_monotonic_and_prefixed() {
    let gen = SequentialIdGen::new("sess");
    assert_eq!(gen.next(), "sess-1");
    assert_eq!(gen.next(), "sess-2");
}

#[test]
fn uuid_id_gen_produces_distinct_values() {
    let gen = UuidIdGen;
    assert_ne!(gen.next(), gen.next());
}

#[test]
fn channel_key_gen_never_repeats() {
    let gen = ChannelKeyGen::new();
    let a = gen.next();
    let b = gen.next();
    assert_ne!(a, b);
    assert!(b > a);
}
