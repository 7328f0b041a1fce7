//! 캐시 키 계산
//!
//! 블롭 ID는 원본 식별자(diff ID, 트리 다이제스트, 문서 해시)에
//! 분석기 버전, 스킵 옵션, 파일 크기 상한을 섞어 만듭니다. 분석기를 끄거나 버전을 올리면
//! 같은 레이어라도 다른 키가 나오므로 오래된 분석 결과를 재사용하지 않습니다.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::config::normalize_rel_path;
use crate::error::InspectorError;

/// 다이제스트 접두사
pub const SHA256_PREFIX: &str = "sha256:";

#[derive(Serialize)]
struct KeyMaterial<'a> {
    id: &'a str,
    analyzer_versions: &'a BTreeMap<String, u32>,
    skip_files: Vec<&'a str>,
    skip_dirs: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_file_size: Option<u64>,
}

/// 캐시 키를 계산합니다.
///
/// `"sha256:" + hex(SHA-256(JSON{id, analyzer_versions, skip_files, skip_dirs, max_file_size}))`.
/// 맵은 `BTreeMap`이고 스킵 목록은 정렬하므로 입력 순서와 무관하게 같은 키가 나옵니다.
/// 파일을 순회하지 않는 소스는 `max_file_size`로 `None`을 넘기며, 이때 필드는 생략됩니다.
pub fn calc_key(
    id: &str,
    analyzer_versions: &BTreeMap<String, u32>,
    skip_files: &[String],
    skip_dirs: &[String],
    max_file_size: Option<u64>,
) -> Result<String, InspectorError> {
    let mut skip_files: Vec<&str> = skip_files.iter().map(String::as_str).collect();
    let mut skip_dirs: Vec<&str> = skip_dirs.iter().map(String::as_str).collect();
    skip_files.sort_unstable();
    skip_dirs.sort_unstable();

    let material = KeyMaterial {
        id,
        analyzer_versions,
        skip_files,
        skip_dirs,
        max_file_size,
    };
    let json = serde_json::to_vec(&material)
        .map_err(|e| InspectorError::Artifact(format!("failed to encode cache key: {e}")))?;
    Ok(sha256_digest(&json))
}

/// 바이트열의 `sha256:<hex>` 다이제스트
pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("{SHA256_PREFIX}{}", hex::encode(Sha256::digest(bytes)))
}

/// 리더 전체의 `sha256:<hex>` 다이제스트
pub fn sha256_reader(reader: &mut impl Read) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{SHA256_PREFIX}{}", hex::encode(hasher.finalize())))
}

/// 파일 트리의 다이제스트를 계산합니다 (블로킹).
///
/// 정렬된 `(상대 경로, 크기, 내용 해시)` 목록의 SHA-256입니다.
/// 스킵 목록에 걸린 파일과 디렉토리는 제외합니다.
pub fn tree_digest(
    root: &Path,
    skip_files: &[String],
    skip_dirs: &[String],
) -> Result<String, InspectorError> {
    if !root.is_dir() {
        return Err(InspectorError::Walk {
            path: root.display().to_string(),
            reason: "not a directory".to_owned(),
        });
    }

    let mut entries: Vec<(String, u64, String)> = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let rel = rel_path(root, entry.path());
            !is_skipped_dir(&rel, skip_dirs)
        });

    for entry in walker {
        let entry = entry.map_err(|e| InspectorError::Walk {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = rel_path(root, entry.path());
        if skip_files.iter().any(|s| *s == rel) {
            continue;
        }

        let mut file = std::fs::File::open(entry.path()).map_err(|e| InspectorError::FileOpen {
            path: rel.clone(),
            source: e,
        })?;
        let size = file
            .metadata()
            .map_err(|e| InspectorError::Stat {
                path: rel.clone(),
                source: e,
            })?
            .len();
        let hash = sha256_reader(&mut file).map_err(|e| InspectorError::Io {
            path: rel.clone(),
            source: e,
        })?;
        entries.push((rel, size, hash));
    }

    entries.sort();
    let json = serde_json::to_vec(&entries)
        .map_err(|e| InspectorError::Artifact(format!("failed to encode tree digest: {e}")))?;
    Ok(sha256_digest(&json))
}

fn rel_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    normalize_rel_path(&rel.to_string_lossy())
}

/// `rel`이 스킵 디렉토리와 같거나 그 아래인지 (경로 세그먼트 단위)
pub(crate) fn is_skipped_dir(rel: &str, skip_dirs: &[String]) -> bool {
    skip_dirs.iter().any(|dir| is_under(rel, dir))
}

/// `path`가 `dir`과 같거나 그 아래에 있는지 확인합니다.
///
/// 끝의 `/`는 무시하고 세그먼트 경계에서만 일치합니다 (`usr/lib`는 `usr/libx`를 덮지 않음).
pub fn is_under(path: &str, dir: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    let path = path.trim_end_matches('/');
    if dir.is_empty() {
        return true;
    }
    path == dir
        || path
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
}
