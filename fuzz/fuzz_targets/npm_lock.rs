#![no_main]

use layerscan_inspector::analyzer::npm::parse_package_lock;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        let _ = parse_package_lock(content, "fuzz/package-lock.json");
    }
});
