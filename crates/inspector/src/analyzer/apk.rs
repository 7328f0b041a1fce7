//! apk 설치 DB 분석기 (`lib/apk/db/installed`)
//!
//! 빈 줄로 구분된 레코드마다 `X:value` 형식의 필드가 있습니다.
//!
//! ```text
//! P:musl
//! V:1.1.24-r2
//! A:x86_64
//! L:MIT
//! o:musl
//! D:so:libc.musl-x86_64.so.1
//! p:so:libc.musl-x86_64.so.1=1
//! ```
//!
//! `D`(의존성)는 다른 패키지의 이름 또는 `p`(provides) 항목을 가리키며,
//! 분석 후 패키지 ID(`name@version`)로 해석됩니다.

use std::collections::{BTreeSet, HashMap};

use layerscan_core::types::{Package, PackageInfo};

use crate::analyzer::{
    AnalysisInput, AnalysisResult, Analyzer, AnalyzerOutcome, AnalyzerType, read_text,
};
use crate::walker::FileInfo;

const APK_INSTALLED: &str = "lib/apk/db/installed";

/// apk DB 분석기
pub struct ApkDbAnalyzer;

impl Analyzer for ApkDbAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Apk
    }

    fn version(&self) -> u32 {
        1
    }

    fn required(&self, file_path: &str, _info: &FileInfo) -> bool {
        file_path == APK_INSTALLED
    }

    fn analyze(&self, mut input: AnalysisInput<'_>) -> AnalyzerOutcome {
        let text = match read_text(AnalyzerType::Apk, &mut input) {
            Ok(text) => text,
            Err(e) => return AnalyzerOutcome::Failed(e),
        };

        let packages = parse_installed(&text);
        if packages.is_empty() {
            return AnalyzerOutcome::Skipped;
        }

        AnalyzerOutcome::Applicable(AnalysisResult {
            package_infos: vec![PackageInfo {
                file_path: input.file_path.to_owned(),
                packages,
            }],
            ..Default::default()
        })
    }
}

#[derive(Default)]
struct Record {
    pkg: Package,
    depends: Vec<String>,
    provides: Vec<String>,
}

impl Record {
    fn is_complete(&self) -> bool {
        !self.pkg.name.is_empty() && !self.pkg.version.is_empty()
    }
}

/// 설치 DB 내용을 파싱합니다.
///
/// 이름이나 버전이 없는 레코드는 버리고, 같은 ID가 여러 번 나오면 처음 것만 남깁니다.
pub fn parse_installed(content: &str) -> Vec<Package> {
    let mut records = Vec::new();
    let mut current = Record::default();

    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if current.is_complete() {
                records.push(std::mem::take(&mut current));
            } else {
                current = Record::default();
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key {
            "P" => current.pkg.name = value.to_owned(),
            "V" => current.pkg.version = value.to_owned(),
            "A" => current.pkg.arch = value.to_owned(),
            "o" => current.pkg.src_name = value.to_owned(),
            "L" => current.pkg.licenses = split_licenses(value),
            "D" => current
                .depends
                .extend(value.split_whitespace().map(str::to_owned)),
            "p" => current
                .provides
                .extend(value.split_whitespace().map(str::to_owned)),
            _ => {}
        }
    }
    if current.is_complete() {
        records.push(current);
    }

    // 이름 / provides -> 패키지 ID
    let mut provided_by: HashMap<String, String> = HashMap::new();
    let mut seen = BTreeSet::new();
    records.retain_mut(|r| {
        r.pkg.id = Package::make_id(&r.pkg.name, &r.pkg.version);
        if r.pkg.src_name.is_empty() {
            r.pkg.src_name = r.pkg.name.clone();
        }
        r.pkg.src_version = r.pkg.version.clone();
        seen.insert(r.pkg.id.clone())
    });
    for record in &records {
        provided_by
            .entry(record.pkg.name.clone())
            .or_insert_with(|| record.pkg.id.clone());
        for provide in &record.provides {
            provided_by
                .entry(strip_constraint(provide).to_owned())
                .or_insert_with(|| record.pkg.id.clone());
        }
    }

    records
        .into_iter()
        .map(|record| {
            let mut pkg = record.pkg;
            let depends: BTreeSet<String> = record
                .depends
                .iter()
                .filter(|d| !d.starts_with('!'))
                .filter_map(|d| provided_by.get(strip_constraint(d)))
                .filter(|id| **id != pkg.id)
                .cloned()
                .collect();
            pkg.depends_on = depends.into_iter().collect();
            pkg
        })
        .collect()
}

/// `so:libc.so=1`, `busybox>=1.31` 같은 항목에서 이름만 남깁니다.
fn strip_constraint(entry: &str) -> &str {
    let end = entry.find(['=', '<', '>', '~']).unwrap_or(entry.len());
    &entry[..end]
}

/// `MIT AND (BSD-2-Clause OR GPL-2.0)` 같은 표현식을 개별 라이선스로 나눕니다.
fn split_licenses(value: &str) -> Vec<String> {
    value
        .split_whitespace()
        .map(|token| token.trim_matches(|c| c == '(' || c == ')'))
        .filter(|token| !token.is_empty() && *token != "AND" && *token != "OR")
        .map(str::to_owned)
        .collect()
}
