#![no_main]
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes off the wire must never panic the deserializer, whether
// they're malformed JSON, valid JSON with the wrong shape, or a
// well-formed record with a forged signature.
fuzz_target!(|data: &[u8]| {
    let _ = rird::core::record::deserialize(data);
});
