#![no_main]

use layerscan_inspector::artifact::sbom::decode_cyclonedx;
use libfuzzer_sys::fuzz_target;

// 디코딩에 성공한 블롭은 항상 OS 하나 이하, OS 패키지 DB 하나 이하여야 합니다.
fuzz_target!(|data: &[u8]| {
    if let Ok(blob) = decode_cyclonedx(data) {
        assert!(blob.package_infos.len() <= 1);
        if !blob.package_infos.is_empty() {
            assert!(blob.os.is_some());
        }
    }
});
