//! OS 릴리스 파일 분석기
//!
//! - [`AlpineReleaseAnalyzer`]: `etc/alpine-release`
//! - [`DebianVersionAnalyzer`]: `etc/debian_version`
//!
//! 두 파일 모두 첫 줄이 릴리스 이름입니다. 첫 줄이 비어 있으면 `Skipped`를 반환합니다.

use layerscan_core::types::Os;

use crate::analyzer::{
    AnalysisInput, AnalysisResult, Analyzer, AnalyzerOutcome, AnalyzerType, read_text,
};
use crate::walker::FileInfo;

const ALPINE_RELEASE: &str = "etc/alpine-release";
const DEBIAN_VERSION: &str = "etc/debian_version";

/// Alpine 릴리스 분석기
pub struct AlpineReleaseAnalyzer;

impl Analyzer for AlpineReleaseAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Alpine
    }

    fn version(&self) -> u32 {
        1
    }

    fn required(&self, file_path: &str, _info: &FileInfo) -> bool {
        file_path == ALPINE_RELEASE
    }

    fn analyze(&self, input: AnalysisInput<'_>) -> AnalyzerOutcome {
        first_line_os(AnalyzerType::Alpine, "alpine", input)
    }
}

/// Debian 버전 분석기
pub struct DebianVersionAnalyzer;

impl Analyzer for DebianVersionAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Debian
    }

    fn version(&self) -> u32 {
        1
    }

    fn required(&self, file_path: &str, _info: &FileInfo) -> bool {
        file_path == DEBIAN_VERSION
    }

    fn analyze(&self, input: AnalysisInput<'_>) -> AnalyzerOutcome {
        first_line_os(AnalyzerType::Debian, "debian", input)
    }
}

fn first_line_os(
    analyzer: AnalyzerType,
    family: &str,
    mut input: AnalysisInput<'_>,
) -> AnalyzerOutcome {
    let text = match read_text(analyzer, &mut input) {
        Ok(text) => text,
        Err(e) => return AnalyzerOutcome::Failed(e),
    };

    let name = text.lines().next().unwrap_or_default().trim();
    if name.is_empty() {
        return AnalyzerOutcome::Skipped;
    }

    AnalyzerOutcome::Applicable(AnalysisResult {
        os: Some(Os {
            family: family.to_owned(),
            name: name.to_owned(),
        }),
        ..Default::default()
    })
}
