#![no_main]

use layerscan_inspector::analyzer::pnpm::parse_pnpm_lock;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        let _ = parse_pnpm_lock(content, "fuzz/pnpm-lock.yaml");
    }
});
