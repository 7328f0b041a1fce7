//! 시크릿 탐지 분석기 (best-effort)
//!
//! 고신뢰 정규식 규칙으로 텍스트 파일에서 자격 증명을 찾습니다.
//! 일치한 문자열은 앞 4글자만 남기고 마스킹하여 저장합니다.
//!
//! UTF-8이 아닌 파일(바이너리)은 `Skipped`로 처리합니다.

use regex::Regex;

use layerscan_core::types::{Secret, SecretFinding};

use crate::analyzer::{
    AnalysisInput, AnalysisResult, Analyzer, AnalyzerOutcome, AnalyzerType, analyzer_error,
};
use crate::walker::FileInfo;

/// 분석하지 않는 확장자 (바이너리, 압축 파일 등)
const SKIP_EXTENSIONS: &[&str] = &[
    "7z", "bin", "bz2", "class", "dll", "exe", "gif", "gz", "ico", "jar", "jpeg", "jpg", "mp3",
    "mp4", "o", "pdf", "png", "pyc", "so", "svg", "tar", "tgz", "wasm", "webp", "woff", "woff2",
    "xz", "zip", "zst",
];

const MASK_VISIBLE: usize = 4;

/// 규칙 정의 (id, category, severity, title, pattern)
const RULES: &[(&str, &str, &str, &str, &str)] = &[
    (
        "aws-access-key-id",
        "AWS",
        "CRITICAL",
        "AWS Access Key ID",
        r"\b(?:A3T[A-Z0-9]|AKIA|ASIA|ABIA|ACCA)[A-Z0-9]{16}\b",
    ),
    (
        "github-pat",
        "GitHub",
        "CRITICAL",
        "GitHub Personal Access Token",
        r"\bgh[oprsu]_[A-Za-z0-9_]{36,255}\b",
    ),
    (
        "slack-token",
        "Slack",
        "HIGH",
        "Slack token",
        r"\bxox[baprs]-[A-Za-z0-9-]{10,48}\b",
    ),
    (
        "stripe-secret-key",
        "Stripe",
        "CRITICAL",
        "Stripe Secret Key",
        r"\bsk_(?:live|test)_[A-Za-z0-9]{20,99}\b",
    ),
    (
        "private-key",
        "AsymmetricPrivateKey",
        "HIGH",
        "Asymmetric Private Key",
        r"-----BEGIN[ A-Z0-9_-]{0,100}PRIVATE KEY(?: BLOCK)?-----",
    ),
];

struct SecretRule {
    id: &'static str,
    category: &'static str,
    severity: &'static str,
    title: &'static str,
    regex: Regex,
}

/// 시크릿 분석기
pub struct SecretAnalyzer {
    rules: Vec<SecretRule>,
}

impl SecretAnalyzer {
    /// 내장 규칙으로 분석기를 만듭니다.
    pub fn new() -> Self {
        let rules = RULES
            .iter()
            .filter_map(|&(id, category, severity, title, pattern)| {
                Regex::new(pattern).ok().map(|regex| SecretRule {
                    id,
                    category,
                    severity,
                    title,
                    regex,
                })
            })
            .collect();
        Self { rules }
    }

    /// 텍스트에서 시크릿을 찾습니다. 없으면 `None`입니다.
    pub fn scan_text(&self, file_path: &str, text: &str) -> Option<Secret> {
        let mut findings = Vec::new();

        for rule in &self.rules {
            for m in rule.regex.find_iter(text) {
                findings.push(SecretFinding {
                    rule_id: rule.id.to_owned(),
                    category: rule.category.to_owned(),
                    severity: rule.severity.to_owned(),
                    title: rule.title.to_owned(),
                    start_line: line_of(text, m.start()),
                    end_line: line_of(text, m.end().saturating_sub(1).max(m.start())),
                    matched: mask(m.as_str()),
                });
            }
        }

        if findings.is_empty() {
            return None;
        }
        findings.sort_by(|a, b| {
            (a.start_line, &a.rule_id).cmp(&(b.start_line, &b.rule_id))
        });

        Some(Secret {
            file_path: file_path.to_owned(),
            findings,
            ..Default::default()
        })
    }
}

impl Default for SecretAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for SecretAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Secret
    }

    fn version(&self) -> u32 {
        1
    }

    fn required(&self, file_path: &str, info: &FileInfo) -> bool {
        if info.size == 0 {
            return false;
        }
        let ext = file_path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        !SKIP_EXTENSIONS.contains(&ext.as_str())
    }

    fn analyze(&self, input: AnalysisInput<'_>) -> AnalyzerOutcome {
        let mut bytes = Vec::new();
        if let Err(e) = input.content.read_to_end(&mut bytes) {
            return AnalyzerOutcome::Failed(analyzer_error(
                AnalyzerType::Secret,
                input.file_path,
                e,
            ));
        }
        let Ok(text) = std::str::from_utf8(&bytes) else {
            return AnalyzerOutcome::Skipped;
        };

        match self.scan_text(input.file_path, text) {
            Some(secret) => AnalyzerOutcome::Applicable(AnalysisResult {
                secrets: vec![secret],
                ..Default::default()
            }),
            None => AnalyzerOutcome::Skipped,
        }
    }

    fn is_best_effort(&self) -> bool {
        true
    }
}

/// 바이트 오프셋이 속한 줄 번호 (1부터)
fn line_of(text: &str, offset: usize) -> usize {
    text.as_bytes()[..offset.min(text.len())]
        .iter()
        .filter(|b| **b == b'\n')
        .count()
        + 1
}

/// 앞 몇 글자만 남기고 `*`로 가립니다.
fn mask(matched: &str) -> String {
    matched
        .chars()
        .enumerate()
        .map(|(i, c)| if i < MASK_VISIBLE { c } else { '*' })
        .collect()
}
