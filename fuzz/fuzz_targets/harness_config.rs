#![no_main]

use libfuzzer_sys::fuzz_target;

use harness_core::config::HarnessConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        if let Ok(config) = HarnessConfig::parse(content) {
            let _ = config.validate();
            let _ = config.consistency_strategy();
        }
    }
});
