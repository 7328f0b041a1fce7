//! SPDX 라이선스 헤더 분석기 (best-effort)
//!
//! 소스 파일 앞부분의 `SPDX-License-Identifier: <expr>` 주석을 찾습니다.

use std::io::{BufRead, BufReader};

use layerscan_core::types::{LicenseFile, LicenseFinding};

use crate::analyzer::{
    AnalysisInput, AnalysisResult, Analyzer, AnalyzerOutcome, AnalyzerType, analyzer_error,
};
use crate::walker::FileInfo;

/// 헤더를 찾는 최대 줄 수
const HEADER_LINES: usize = 20;

const SPDX_TAG: &str = "SPDX-License-Identifier:";

const SOURCE_EXTENSIONS: &[&str] = &[
    "c", "cc", "cpp", "go", "h", "hpp", "java", "js", "jsx", "kt", "mjs", "py", "rb", "rs", "sh",
    "swift", "ts", "tsx",
];

/// 라이선스 헤더 분석기
pub struct LicenseHeaderAnalyzer;

impl Analyzer for LicenseHeaderAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::LicenseHeader
    }

    fn version(&self) -> u32 {
        1
    }

    fn required(&self, file_path: &str, info: &FileInfo) -> bool {
        if info.size == 0 || file_path.contains("node_modules/") {
            return false;
        }
        file_path
            .rsplit_once('.')
            .is_some_and(|(_, ext)| SOURCE_EXTENSIONS.contains(&ext))
    }

    fn analyze(&self, input: AnalysisInput<'_>) -> AnalyzerOutcome {
        let reader = BufReader::new(input.content);
        let mut names = Vec::new();

        for line in reader.lines().take(HEADER_LINES) {
            let line = match line {
                Ok(line) => line,
                // 바이너리이거나 UTF-8이 아님
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    return AnalyzerOutcome::Skipped;
                }
                Err(e) => {
                    return AnalyzerOutcome::Failed(analyzer_error(
                        AnalyzerType::LicenseHeader,
                        input.file_path,
                        e,
                    ));
                }
            };
            if let Some(expr) = parse_spdx_line(&line) {
                names.extend(split_expression(expr));
            }
        }

        if names.is_empty() {
            return AnalyzerOutcome::Skipped;
        }
        names.dedup();

        AnalyzerOutcome::Applicable(AnalysisResult {
            licenses: vec![LicenseFile {
                license_type: "header".to_owned(),
                file_path: input.file_path.to_owned(),
                findings: names
                    .into_iter()
                    .map(|name| LicenseFinding {
                        name,
                        confidence: 1.0,
                    })
                    .collect(),
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    fn is_best_effort(&self) -> bool {
        true
    }
}

/// 주석 줄에서 SPDX 표현식을 꺼냅니다.
fn parse_spdx_line(line: &str) -> Option<&str> {
    let pos = line.find(SPDX_TAG)?;
    let expr = line[pos + SPDX_TAG.len()..]
        .trim()
        .trim_end_matches("*/")
        .trim_end_matches("-->")
        .trim();
    (!expr.is_empty()).then_some(expr)
}

/// `MIT OR Apache-2.0` 같은 표현식을 개별 식별자로 나눕니다.
fn split_expression(expr: &str) -> Vec<String> {
    expr.split_whitespace()
        .map(|t| t.trim_matches(|c| c == '(' || c == ')'))
        .filter(|t| !t.is_empty() && !matches!(*t, "AND" | "OR" | "WITH"))
        .map(str::to_owned)
        .collect()
}
