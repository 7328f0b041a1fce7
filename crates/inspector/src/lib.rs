#![doc = include_str!("../README.md")]
//!
//! # 모듈 구조
//!
//! - [`error`]: 검사 에러 (`InspectorError`, `CacheError`)
//! - [`config`]: 검사 설정 (`InspectorConfig`, 빌더)
//! - [`walker`]: 병렬 디렉토리 순회 (`walk_dir`)
//! - [`analyzer`]: 분석기 레지스트리와 파일 분배 (`AnalyzerRegistry`, `AnalyzerGroup`)
//! - [`cache`]: 콘텐츠 주소 캐시 (`ArtifactCache`, 메모리/파일/원격 백엔드, `calc_key`)
//! - [`artifact`]: 아티팩트 소스와 검사 오케스트레이터 (`Inspector`)
//! - [`applier`]: 레이어 병합 (`Applier`, `merge_layers`)
//!
//! # 구조
//!
//! ```text
//! ArtifactSource --plan--> Inspector --missing_blobs--> ArtifactCache
//!                              |                              ^
//!                         walk_dir + AnalyzerGroup            |
//!                              |                              |
//!                          BlobInfo ----------put_blob--------+
//!                                                             |
//!              ArtifactReference --> Applier --get_blob-------+
//!                                       |
//!                                 ArtifactDetail
//! ```

pub mod analyzer;
pub mod applier;
pub mod artifact;
pub mod cache;
pub mod config;
pub mod error;
pub mod walker;

// --- Public API Re-exports ---

// 오케스트레이터와 소스
pub use artifact::{ArtifactPlan, ArtifactSource, ImageSource, Inspector, LocalSource, SbomSource};

// 병합
pub use applier::{Applier, ApplyOutcome, ApplyWarning, merge_layers};

// 설정
pub use config::{InspectorConfig, InspectorConfigBuilder};

// 에러
pub use error::{CacheError, InspectorError};

// 분석기
pub use analyzer::{AnalyzerGroup, AnalyzerRegistry, AnalyzerType};

// 캐시
pub use cache::{ArtifactCache, DynArtifactCache, FsCache, MemoryCache, MissingBlobs, RemoteCache};
