//! 검사기 설정
//!
//! [`InspectorConfig`]는 core의 [`ScanConfig`](layerscan_core::config::ScanConfig)를
//! 검사기에서 바로 쓸 수 있는 형태(분석기 유형 파싱, 워커 수 계산)로 바꾼 설정입니다.
//!
//! # 사용 예시
//!
//! ```
//! use layerscan_inspector::InspectorConfig;
//!
//! // 기본값으로 생성
//! let config = InspectorConfig::default();
//! config.validate().unwrap();
//!
//! // 빌더로 생성
//! use layerscan_inspector::InspectorConfigBuilder;
//!
//! let config = InspectorConfigBuilder::new()
//!     .parallel(4)
//!     .skip_dirs(vec!["node_modules".to_owned()])
//!     .build()
//!     .unwrap();
//! assert_eq!(config.effective_parallel(), 4);
//! ```

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use layerscan_core::config::{MAX_FILE_SIZE_LIMIT, MAX_PARALLEL, ScanConfig};

use crate::analyzer::AnalyzerType;
use crate::error::InspectorError;

const MAX_PATH_LEN: usize = 4096;

/// 검사기 설정
///
/// # 필드
///
/// - **parallel**: 파일 분석 워커 수
/// - **slow**: 느린 소스 여부 (켜면 워커 1개)
/// - **disabled_analyzers**: 비활성화할 분석기
/// - **skip_files** / **skip_dirs**: 순회에서 제외할 상대 경로
/// - **max_file_size**: 분석 대상 파일 최대 크기 (바이트)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectorConfig {
    /// 파일 분석 워커 수
    pub parallel: usize,
    /// 느린 소스 여부
    pub slow: bool,
    /// 비활성화할 분석기
    pub disabled_analyzers: Vec<AnalyzerType>,
    /// 건너뛸 파일 (루트 기준 상대 경로)
    pub skip_files: Vec<String>,
    /// 건너뛸 디렉토리 (루트 기준 상대 경로)
    pub skip_dirs: Vec<String>,
    /// 분석 대상 파일 최대 크기 (바이트)
    pub max_file_size: u64,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            parallel: 10,
            slow: false,
            disabled_analyzers: Vec::new(),
            skip_files: Vec::new(),
            skip_dirs: Vec::new(),
            max_file_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}

impl InspectorConfig {
    /// core의 `ScanConfig`에서 검사기 설정을 생성합니다.
    ///
    /// 알 수 없는 분석기 이름은 조용히 무시하지 않고 에러로 반환합니다.
    /// 비활성화 목록은 아티팩트 ID에 영향을 주므로 오타가 캐시 키를 바꾸면 안 됩니다.
    pub fn from_core(core: &ScanConfig) -> Result<Self, InspectorError> {
        let mut disabled = Vec::with_capacity(core.disabled_analyzers.len());
        for name in &core.disabled_analyzers {
            let Some(analyzer) = AnalyzerType::from_str_loose(name) else {
                return Err(InspectorError::Config {
                    field: "disabled_analyzers".to_owned(),
                    reason: format!("unknown analyzer '{name}'"),
                });
            };
            if !disabled.contains(&analyzer) {
                disabled.push(analyzer);
            }
        }
        disabled.sort();

        Ok(Self {
            parallel: core.parallel,
            slow: core.slow,
            disabled_analyzers: disabled,
            skip_files: normalize_entries(&core.skip_files),
            skip_dirs: normalize_entries(&core.skip_dirs),
            max_file_size: core.max_file_size,
        })
    }

    /// 실제로 사용할 워커 수. 느린 소스이면 1입니다.
    pub fn effective_parallel(&self) -> usize {
        if self.slow { 1 } else { self.parallel.max(1) }
    }

    /// 설정 값의 유효성을 검증합니다.
    ///
    /// # 검증 규칙
    ///
    /// - `parallel`: 1-256
    /// - `max_file_size`: 1-536870912 (512MB)
    /// - `skip_files`, `skip_dirs`: 비어있지 않고 `..`를 포함하지 않는 상대 경로
    pub fn validate(&self) -> Result<(), InspectorError> {
        if self.parallel == 0 || self.parallel > MAX_PARALLEL {
            return Err(InspectorError::Config {
                field: "parallel".to_owned(),
                reason: format!("must be 1-{MAX_PARALLEL}"),
            });
        }

        if self.max_file_size == 0 || self.max_file_size > MAX_FILE_SIZE_LIMIT {
            return Err(InspectorError::Config {
                field: "max_file_size".to_owned(),
                reason: format!("must be 1-{MAX_FILE_SIZE_LIMIT}"),
            });
        }

        for (field, entries) in [("skip_files", &self.skip_files), ("skip_dirs", &self.skip_dirs)]
        {
            for entry in entries {
                if entry.is_empty() {
                    return Err(InspectorError::Config {
                        field: field.to_owned(),
                        reason: "path must not be empty".to_owned(),
                    });
                }
                if Path::new(entry)
                    .components()
                    .any(|c| c == Component::ParentDir)
                {
                    return Err(InspectorError::Config {
                        field: field.to_owned(),
                        reason: format!("'{entry}' contains path traversal pattern '..'"),
                    });
                }
                if entry.len() > MAX_PATH_LEN {
                    return Err(InspectorError::Config {
                        field: field.to_owned(),
                        reason: format!("'{entry}' exceeds maximum length {MAX_PATH_LEN}"),
                    });
                }
            }
        }

        Ok(())
    }
}

/// 상대 경로 목록을 `/` 구분, 앞뒤 `/` 없는 형태로 정규화하고 정렬합니다.
fn normalize_entries(entries: &[String]) -> Vec<String> {
    let mut out: Vec<String> = entries
        .iter()
        .map(|e| normalize_rel_path(e))
        .filter(|e| !e.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// `./a/b/` 또는 `/a/b` 같은 입력을 `a/b`로 정규화합니다.
pub(crate) fn normalize_rel_path(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let trimmed = replaced.trim_start_matches("./").trim_matches('/');
    trimmed.to_owned()
}

/// [`InspectorConfig`] 빌더
///
/// 유연한 설정 구성 및 빌드 시 유효성 검증을 제공합니다.
#[derive(Default)]
pub struct InspectorConfigBuilder {
    config: InspectorConfig,
}

impl InspectorConfigBuilder {
    /// 기본값을 가진 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 워커 수를 설정합니다.
    pub fn parallel(mut self, parallel: usize) -> Self {
        self.config.parallel = parallel;
        self
    }

    /// 느린 소스 여부를 설정합니다.
    pub fn slow(mut self, slow: bool) -> Self {
        self.config.slow = slow;
        self
    }

    /// 비활성화할 분석기를 설정합니다.
    pub fn disabled_analyzers(mut self, mut disabled: Vec<AnalyzerType>) -> Self {
        disabled.sort();
        disabled.dedup();
        self.config.disabled_analyzers = disabled;
        self
    }

    /// 건너뛸 파일을 설정합니다.
    pub fn skip_files(mut self, files: Vec<String>) -> Self {
        self.config.skip_files = normalize_entries(&files);
        self
    }

    /// 건너뛸 디렉토리를 설정합니다.
    pub fn skip_dirs(mut self, dirs: Vec<String>) -> Self {
        self.config.skip_dirs = normalize_entries(&dirs);
        self
    }

    /// 최대 파일 크기(바이트)를 설정합니다.
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.config.max_file_size = size;
        self
    }

    /// 설정을 검증하고 빌드합니다.
    ///
    /// # Errors
    ///
    /// 유효성 검증 실패 시 `InspectorError::Config` 반환
    pub fn build(self) -> Result<InspectorConfig, InspectorError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
