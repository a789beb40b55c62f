//! Fuzz target for timestamp ordering used by both feeds.
//!
//! Tests that comparison never panics on arbitrary input and stays
//! antisymmetric.

#![no_main]

use libfuzzer_sys::fuzz_target;
use message_mirror::message::compare_timestamps;

fuzz_target!(|data: (&str, &str)| {
    let (a, b) = data;

    let ab = compare_timestamps(a, b);
    let ba = compare_timestamps(b, a);
    assert_eq!(ab, ba.reverse());

    assert_eq!(compare_timestamps(a, a), std::cmp::Ordering::Equal);
});
