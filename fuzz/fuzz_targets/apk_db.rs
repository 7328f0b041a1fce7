#![no_main]

use layerscan_inspector::analyzer::apk::parse_installed;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        for pkg in parse_installed(content) {
            assert!(!pkg.name.is_empty());
            assert!(!pkg.version.is_empty());
        }
    }
});
