//! 설정 관리: layerscan.toml 파싱 및 런타임 설정
//!
//! [`LayerscanConfig`]는 로깅, 캐시, 스캔 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LAYERSCAN_SCAN_PARALLEL=4` 형식)
//! 3. 설정 파일 (`layerscan.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), layerscan_core::error::LayerscanError> {
//! use layerscan_core::config::LayerscanConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LayerscanConfig::load("layerscan.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LayerscanConfig::parse("[scan]\nparallel = 4")?;
//! # Ok(())
//! # }
//! ```

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LayerscanError};

/// 병렬 워커 수 상한
pub const MAX_PARALLEL: usize = 256;
/// 분석 대상 파일 크기 상한 (512 MiB)
pub const MAX_FILE_SIZE_LIMIT: u64 = 512 * 1024 * 1024;
/// 원격 캐시 요청 타임아웃 상한 (초)
pub const MAX_REMOTE_TIMEOUT_SECS: u64 = 600;

const MAX_PATH_LEN: usize = 4096;

/// layerscan 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerscanConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 캐시 백엔드 설정
    #[serde(default)]
    pub cache: CacheConfig,
    /// 스캔 설정
    #[serde(default)]
    pub scan: ScanConfig,
}

impl LayerscanConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LayerscanError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일이 없으면 기본값에 환경변수만 적용해 로드합니다.
    ///
    /// CLI가 기본 경로(`layerscan.toml`)를 쓸 때 파일 없이도 동작하도록 합니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, LayerscanError> {
        match Self::load(path.as_ref()).await {
            Err(LayerscanError::Config(ConfigError::FileNotFound { path })) => {
                tracing::debug!(path = %path, "config file not found, using defaults");
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
            other => other,
        }
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LayerscanError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LayerscanError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LayerscanError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LayerscanError> {
        toml::from_str(toml_str).map_err(|e| {
            LayerscanError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LAYERSCAN_{SECTION}_{FIELD}`
    /// 예: `LAYERSCAN_CACHE_BACKEND=memory`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LAYERSCAN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LAYERSCAN_GENERAL_LOG_FORMAT");

        // Cache
        override_string(&mut self.cache.backend, "LAYERSCAN_CACHE_BACKEND");
        override_string(&mut self.cache.dir, "LAYERSCAN_CACHE_DIR");
        override_string(&mut self.cache.remote_url, "LAYERSCAN_CACHE_REMOTE_URL");
        override_u64(
            &mut self.cache.remote_timeout_secs,
            "LAYERSCAN_CACHE_REMOTE_TIMEOUT_SECS",
        );

        // Scan
        override_usize(&mut self.scan.parallel, "LAYERSCAN_SCAN_PARALLEL");
        override_bool(&mut self.scan.slow, "LAYERSCAN_SCAN_SLOW");
        override_csv(
            &mut self.scan.disabled_analyzers,
            "LAYERSCAN_SCAN_DISABLED_ANALYZERS",
        );
        override_csv(&mut self.scan.skip_files, "LAYERSCAN_SCAN_SKIP_FILES");
        override_csv(&mut self.scan.skip_dirs, "LAYERSCAN_SCAN_SKIP_DIRS");
        override_u64(&mut self.scan.max_file_size, "LAYERSCAN_SCAN_MAX_FILE_SIZE");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LayerscanError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        self.cache.validate()?;
        self.scan.validate()?;
        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 캐시 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    /// 프로세스 내 메모리
    Memory,
    /// 로컬 디렉토리
    Fs,
    /// 원격 캐시 서버
    Remote,
}

impl CacheBackend {
    /// 문자열에서 백엔드를 파싱합니다 (대소문자 무시).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "fs" | "filesystem" => Some(Self::Fs),
            "remote" => Some(Self::Remote),
            _ => None,
        }
    }
}

/// 캐시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 백엔드 (fs, memory, remote)
    pub backend: String,
    /// 로컬 캐시 디렉토리
    pub dir: String,
    /// 원격 캐시 서버 주소
    pub remote_url: String,
    /// 원격 요청 타임아웃 (초)
    pub remote_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: "fs".to_owned(),
            dir: default_cache_dir().display().to_string(),
            remote_url: String::new(),
            remote_timeout_secs: 30,
        }
    }
}

impl CacheConfig {
    /// 파싱된 백엔드 종류를 반환합니다.
    pub fn backend_kind(&self) -> Option<CacheBackend> {
        CacheBackend::from_str_loose(&self.backend)
    }

    fn validate(&self) -> Result<(), LayerscanError> {
        let Some(backend) = self.backend_kind() else {
            return Err(ConfigError::InvalidValue {
                field: "cache.backend".to_owned(),
                reason: "must be one of: fs, memory, remote".to_owned(),
            }
            .into());
        };

        match backend {
            CacheBackend::Fs => {
                if self.dir.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "cache.dir".to_owned(),
                        reason: "cache dir must not be empty for the fs backend".to_owned(),
                    }
                    .into());
                }
                if self.dir.len() > MAX_PATH_LEN {
                    return Err(ConfigError::InvalidValue {
                        field: "cache.dir".to_owned(),
                        reason: format!("exceeds maximum length {MAX_PATH_LEN}"),
                    }
                    .into());
                }
            }
            CacheBackend::Remote => {
                if self.remote_url.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "cache.remote_url".to_owned(),
                        reason: "remote_url is required for the remote backend".to_owned(),
                    }
                    .into());
                }
                if !(self.remote_url.starts_with("http://")
                    || self.remote_url.starts_with("https://"))
                {
                    return Err(ConfigError::InvalidValue {
                        field: "cache.remote_url".to_owned(),
                        reason: "must start with http:// or https://".to_owned(),
                    }
                    .into());
                }
            }
            CacheBackend::Memory => {}
        }

        if self.remote_timeout_secs == 0 || self.remote_timeout_secs > MAX_REMOTE_TIMEOUT_SECS {
            return Err(ConfigError::InvalidValue {
                field: "cache.remote_timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_REMOTE_TIMEOUT_SECS}"),
            }
            .into());
        }

        Ok(())
    }
}

/// 스캔 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// 파일 분석 워커 수
    pub parallel: usize,
    /// 느린 소스 (네트워크 파일 시스템 등). 켜면 워커 1개로 동작
    pub slow: bool,
    /// 비활성화할 분석기 유형
    pub disabled_analyzers: Vec<String>,
    /// 건너뛸 파일 (루트 기준 상대 경로)
    pub skip_files: Vec<String>,
    /// 건너뛸 디렉토리 (루트 기준 상대 경로)
    pub skip_dirs: Vec<String>,
    /// 분석 대상 파일 최대 크기 (바이트)
    pub max_file_size: u64,
}

impl Default for ScanConfig {
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

impl ScanConfig {
    fn validate(&self) -> Result<(), LayerscanError> {
        if self.parallel == 0 || self.parallel > MAX_PARALLEL {
            return Err(ConfigError::InvalidValue {
                field: "scan.parallel".to_owned(),
                reason: format!("must be 1-{MAX_PARALLEL}"),
            }
            .into());
        }

        if self.max_file_size == 0 || self.max_file_size > MAX_FILE_SIZE_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "scan.max_file_size".to_owned(),
                reason: format!("must be 1-{MAX_FILE_SIZE_LIMIT}"),
            }
            .into());
        }

        for (field, entries) in [
            ("scan.skip_files", &self.skip_files),
            ("scan.skip_dirs", &self.skip_dirs),
        ] {
            for entry in entries {
                validate_relative_path(field, entry)?;
            }
        }

        Ok(())
    }
}

fn validate_relative_path(field: &str, entry: &str) -> Result<(), LayerscanError> {
    if entry.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_owned(),
            reason: "path must not be empty".to_owned(),
        }
        .into());
    }

    // Path traversal 체크: Path::components()로 ParentDir 컴포넌트 검출
    if Path::new(entry)
        .components()
        .any(|c| c == Component::ParentDir)
    {
        return Err(ConfigError::InvalidValue {
            field: field.to_owned(),
            reason: format!("'{entry}' contains path traversal pattern '..'"),
        }
        .into());
    }

    if entry.len() > MAX_PATH_LEN {
        return Err(ConfigError::InvalidValue {
            field: field.to_owned(),
            reason: format!("'{entry}' exceeds maximum length {MAX_PATH_LEN}"),
        }
        .into());
    }

    Ok(())
}

/// 기본 캐시 디렉토리
///
/// `$XDG_CACHE_HOME/layerscan`, 없으면 `$HOME/.cache/layerscan`,
/// 둘 다 없으면 임시 디렉토리 아래를 사용합니다.
pub fn default_cache_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_CACHE_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(dir).join("layerscan");
    }
    if let Some(home) = std::env::var_os("HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join(".cache").join("layerscan");
    }
    std::env::temp_dir().join("layerscan")
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
