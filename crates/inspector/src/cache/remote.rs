//! 원격 캐시 클라이언트
//!
//! 캐시 서버의 JSON-over-HTTP 엔드포인트를 호출합니다.
//!
//! ```text
//! POST <remote_url>/twirp/layerscan.cache.v1.Cache/<Operation>
//! Content-Type: application/json
//! ```
//!
//! 2xx가 아닌 응답은 [`CacheError::Status`]가 됩니다.
//! 재시도는 하지 않으며 호출자가 정책을 정합니다.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use layerscan_core::types::{ArtifactInfo, BlobInfo};

use crate::cache::{ArtifactCache, MissingBlobs};
use crate::error::CacheError;

/// 서비스 경로 접두사
const SERVICE_PATH: &str = "twirp/layerscan.cache.v1.Cache";

/// 응답 본문을 에러 메시지에 넣을 때의 최대 길이
const MAX_ERROR_BODY: usize = 512;

/// 원격 캐시 클라이언트
#[derive(Debug)]
pub struct RemoteCache {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct MissingBlobsRequest<'a> {
    artifact_id: &'a str,
    blob_ids: &'a [String],
}

#[derive(Serialize)]
struct PutArtifactRequest<'a> {
    artifact_id: &'a str,
    artifact_info: &'a ArtifactInfo,
}

#[derive(Serialize)]
struct PutBlobRequest<'a> {
    blob_id: &'a str,
    blob_info: &'a BlobInfo,
}

#[derive(Serialize)]
struct GetArtifactRequest<'a> {
    artifact_id: &'a str,
}

#[derive(Deserialize)]
struct GetArtifactResponse {
    #[serde(default)]
    artifact_info: Option<ArtifactInfo>,
}

#[derive(Serialize)]
struct GetBlobRequest<'a> {
    blob_id: &'a str,
}

#[derive(Deserialize)]
struct GetBlobResponse {
    #[serde(default)]
    blob_info: Option<BlobInfo>,
}

#[derive(Serialize)]
struct DeleteBlobsRequest<'a> {
    blob_ids: &'a [String],
}

#[derive(Serialize)]
struct Empty {}

impl RemoteCache {
    /// 원격 캐시 클라이언트를 만듭니다.
    ///
    /// # Errors
    ///
    /// - URL이 비어 있거나 http(s)가 아니면 `CacheError::Remote`
    /// - HTTP 클라이언트 생성 실패 시 `CacheError::Remote`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(CacheError::Remote {
                operation: "connect".to_owned(),
                reason: format!("invalid remote cache url '{base_url}'"),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Remote {
                operation: "connect".to_owned(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/{SERVICE_PATH}/{operation}", self.base_url)
    }

    /// 요청을 보내고 상태 코드를 검사합니다.
    async fn send_request<B: Serialize>(
        &self,
        operation: &str,
        body: &B,
    ) -> Result<reqwest::Response, CacheError> {
        let resp = self
            .client
            .post(self.endpoint(operation))
            .json(body)
            .send()
            .await
            .map_err(|e| CacheError::Remote {
                operation: operation.to_owned(),
                reason: if e.is_timeout() {
                    format!("request timed out: {e}")
                } else {
                    e.to_string()
                },
            })?;

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return Err(CacheError::Status {
                operation: operation.to_owned(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp)
    }

    async fn call<B: Serialize, R: DeserializeOwned>(
        &self,
        operation: &str,
        body: &B,
    ) -> Result<R, CacheError> {
        let resp = self.send_request(operation, body).await?;
        resp.json::<R>().await.map_err(|e| CacheError::Decode {
            key: operation.to_owned(),
            reason: e.to_string(),
        })
    }
}

impl ArtifactCache for RemoteCache {
    async fn missing_blobs(
        &self,
        artifact_id: &str,
        blob_ids: &[String],
    ) -> Result<MissingBlobs, CacheError> {
        self.call(
            "MissingBlobs",
            &MissingBlobsRequest {
                artifact_id,
                blob_ids,
            },
        )
        .await
    }

    async fn put_artifact(&self, artifact_id: &str, info: &ArtifactInfo) -> Result<(), CacheError> {
        self.send_request(
            "PutArtifact",
            &PutArtifactRequest {
                artifact_id,
                artifact_info: info,
            },
        )
        .await?;
        Ok(())
    }

    async fn put_blob(&self, blob_id: &str, blob: &BlobInfo) -> Result<(), CacheError> {
        self.send_request(
            "PutBlob",
            &PutBlobRequest {
                blob_id,
                blob_info: blob,
            },
        )
        .await?;
        Ok(())
    }

    async fn get_artifact(&self, artifact_id: &str) -> Result<ArtifactInfo, CacheError> {
        let resp: GetArtifactResponse = self
            .call("GetArtifact", &GetArtifactRequest { artifact_id })
            .await?;
        Ok(resp.artifact_info.unwrap_or_default())
    }

    async fn get_blob(&self, blob_id: &str) -> Result<BlobInfo, CacheError> {
        let resp: GetBlobResponse = self.call("GetBlob", &GetBlobRequest { blob_id }).await?;
        Ok(resp.blob_info.unwrap_or_default())
    }

    async fn delete_blobs(&self, blob_ids: &[String]) -> Result<(), CacheError> {
        self.send_request("DeleteBlobs", &DeleteBlobsRequest { blob_ids })
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.send_request("Clear", &Empty {}).await?;
        Ok(())
    }
}
