#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use harness_core::transport::{OverrideFormat, TransportConfig};

/// Override file content plus the syntax it is parsed as
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    toml: bool,
    content: String,
}

fuzz_target!(|input: FuzzInput| {
    let format = if input.toml {
        OverrideFormat::Toml
    } else {
        OverrideFormat::Json
    };
    if let Ok(transport) = TransportConfig::parse_override(&input.content, format) {
        // Anything accepted must survive a JSON round trip unchanged.
        let json = serde_json_roundtrip(&transport);
        assert_eq!(json, transport);
    }
});

fn serde_json_roundtrip(transport: &TransportConfig) -> TransportConfig {
    let text = match serde_json::to_string(transport) {
        Ok(text) => text,
        Err(e) => panic!("serialize {transport:?} failed: {e}"),
    };
    match TransportConfig::parse_override(&text, OverrideFormat::Json) {
        Ok(parsed) => parsed,
        Err(e) => panic!("re-parse of {text} failed: {e}"),
    }
}
