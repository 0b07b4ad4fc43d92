use httptap_common::{Classification, classify, looks_like_http};
use proptest::prelude::*;

const PREFIXES: [&[u8; 4]; 7] = [
    b"GET ", b"PUT ", b"HEAD", b"POST", b"DELE", b"PATC", b"OPTI",
];

fn prefix_strategy() -> impl Strategy<Value = &'static [u8; 4]> {
    proptest::sample::select(PREFIXES.to_vec())
}

// ---------------------------------------------------------------------------
// Property: anything shorter than four bytes is rejected
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn short_inputs_are_rejected(
        data in proptest::collection::vec(any::<u8>(), 0..4),
    ) {
        prop_assert!(!looks_like_http(&data, data.len()));
    }

    #[test]
    fn never_panics(
        data in proptest::collection::vec(any::<u8>(), 0..64),
        len in 0usize..128,
    ) {
        let _ = classify(&data, len);
    }
}

// ---------------------------------------------------------------------------
// Property: a method prefix is accepted whatever follows it
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn method_prefix_is_accepted(
        prefix in prefix_strategy(),
        tail in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut data = prefix.to_vec();
        data.extend_from_slice(&tail);
        prop_assert_eq!(classify(&data, data.len()), Some(Classification::Request));
    }
}

// ---------------------------------------------------------------------------
// Property: HTTP/?.? status shape is accepted regardless of byte 5 and the tail
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn status_shape_is_accepted(
        major in any::<u8>(),
        minor in any::<u8>(),
        tail in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut data = b"HTTP/".to_vec();
        data.extend_from_slice(&[major, b'.', minor]);
        data.extend_from_slice(&tail);
        prop_assert_eq!(classify(&data, data.len()), Some(Classification::Response));
    }

    #[test]
    fn broken_status_shape_is_rejected(
        sep in any::<u8>().prop_filter("not a slash", |b| *b != b'/'),
        tail in proptest::collection::vec(any::<u8>(), 3..64),
    ) {
        let mut data = b"HTTP".to_vec();
        data.push(sep);
        data.extend_from_slice(&tail);
        prop_assert!(!looks_like_http(&data, data.len()));
    }
}

// ---------------------------------------------------------------------------
// Property: inputs matching neither shape are rejected
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn other_inputs_are_rejected(
        data in proptest::collection::vec(any::<u8>(), 4..128),
    ) {
        let head: [u8; 4] = [data[0], data[1], data[2], data[3]];
        let is_request = PREFIXES.iter().any(|p| **p == head);
        let is_response =
            data.len() >= 8 && &head == b"HTTP" && data[4] == b'/' && data[6] == b'.';
        prop_assert_eq!(looks_like_http(&data, data.len()), is_request || is_response);
    }
}

#[test]
fn documented_rejections() {
    assert!(!looks_like_http(b"abcd", 4));
    assert!(!looks_like_http(b"HTTX/1.1", 8));
    assert!(!looks_like_http(b"GET", 3));
}
