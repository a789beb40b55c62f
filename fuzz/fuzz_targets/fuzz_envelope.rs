//! Fuzz target for parsing message files fetched from repositories.
//!
//! Remote files are untrusted: anyone with push access can put anything in
//! the storage directory. Parsing must never panic, and anything that does
//! parse must survive being written back out.

#![no_main]

use libfuzzer_sys::fuzz_target;
use message_mirror::message::MessageEnvelope;

fuzz_target!(|data: &[u8]| {
    if let Ok(envelope) = MessageEnvelope::from_slice(data) {
        let json = envelope.to_json().expect("parsed envelope serializes");
        let again = MessageEnvelope::from_slice(json.as_bytes()).expect("re-parse");
        assert_eq!(envelope, again);
    }
});
