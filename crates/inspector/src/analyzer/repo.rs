//! apk 저장소 설정 분석기 (`etc/apk/repositories`)
//!
//! 각 줄의 미러 URL에서 `alpine/v3.11` 형식의 릴리스를 추출합니다.
//! 여러 릴리스가 있으면 가장 높은 버전을 쓰고, `edge`가 하나라도 있으면 `edge`입니다.

use std::sync::LazyLock;

use regex::Regex;

use layerscan_core::types::Repository;

use crate::analyzer::{
    AnalysisInput, AnalysisResult, Analyzer, AnalyzerOutcome, AnalyzerType, read_text,
};
use crate::walker::FileInfo;

const APK_REPOSITORIES: &str = "etc/apk/repositories";

static RELEASE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\s*https?://[^\s#]+/alpine/v?([0-9]+(?:\.[0-9]+)*|edge)/").ok()
});

/// apk 저장소 분석기
pub struct ApkRepoAnalyzer;

impl Analyzer for ApkRepoAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::ApkRepo
    }

    fn version(&self) -> u32 {
        1
    }

    fn required(&self, file_path: &str, _info: &FileInfo) -> bool {
        file_path == APK_REPOSITORIES
    }

    fn analyze(&self, mut input: AnalysisInput<'_>) -> AnalyzerOutcome {
        let text = match read_text(AnalyzerType::ApkRepo, &mut input) {
            Ok(text) => text,
            Err(e) => return AnalyzerOutcome::Failed(e),
        };

        match newest_release(&text) {
            Some(release) => AnalyzerOutcome::Applicable(AnalysisResult {
                repository: Some(Repository {
                    family: "alpine".to_owned(),
                    release,
                }),
                ..Default::default()
            }),
            None => AnalyzerOutcome::Skipped,
        }
    }
}

/// 저장소 목록에서 가장 새로운 릴리스를 고릅니다.
pub fn newest_release(text: &str) -> Option<String> {
    let re = RELEASE_RE.as_ref()?;
    let mut newest: Option<Vec<u64>> = None;
    let mut newest_raw = None;

    for line in text.lines() {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let release = &caps[1];
        if release == "edge" {
            return Some("edge".to_owned());
        }

        let parsed: Vec<u64> = release
            .split('.')
            .map(|part| part.parse().unwrap_or(0))
            .collect();
        if newest.as_ref().is_none_or(|n| parsed > *n) {
            newest = Some(parsed);
            newest_raw = Some(release.to_owned());
        }
    }

    newest_raw
}
