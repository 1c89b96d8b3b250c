use std::{future::Future, sync::Arc};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::{io::StreamReader, sync::CancellationToken};

use crate::{
    api::api_types::{GenerationRecord, GenerationRequest, GenerationStatus},
    config::JukeboxConfig,
    generation::http::{HttpBody, HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient},
    model::{
        constants::{AUDIO_FILE_PREFIX, STATUS_ACCEPTED},
        track::AudioFile,
    },
    Error, Result,
};

#[derive(Serialize)]
struct SubmitPayload<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'a str>,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: Option<String>,
}

#[derive(Deserialize)]
struct AudioResponse {
    url: Option<String>,
}

#[serde_as]
#[derive(Deserialize)]
struct SearchResponse {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    results: Vec<GenerationRecord>,
}

/// Runs `future` unless `cancel` fires first.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}

/// Talks to the music generation provider.
///
/// Holds no mutable state, so a single client can serve any number of
/// concurrent requests.
#[derive(Clone)]
pub struct GenerationClient {
    config: Arc<JukeboxConfig>,
    http: Arc<dyn HttpClient>,
}

impl GenerationClient {
    pub fn new(config: JukeboxConfig) -> Self {
        Self::with_http_client(config, Arc::new(ReqwestHttpClient::new()))
    }

    pub fn with_http_client(config: JukeboxConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            config: Arc::new(config),
            http,
        }
    }

    /// Starts a generation job, returning its id.
    pub async fn submit(&self, request: &GenerationRequest) -> Result<String> {
        let payload = serde_json::to_vec(&SubmitPayload {
            prompt: &request.prompt,
            style: request.style.as_deref(),
        })?;
        let response = self
            .http
            .request(self.authorized(HttpRequest::post(
                format!("{}/generations", self.config.api_url),
                Bytes::from(payload),
            )))
            .await?;

        if response.status != STATUS_ACCEPTED {
            let status = response.status;
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status, %body, "failed to generate music");
            return Err(Error::RemoteRejected { status, body });
        }

        let SubmitResponse { id } = response.json().await?;
        match id {
            Some(id) if !id.is_empty() => {
                tracing::info!(generation_id = %id, "generation submitted");
                Ok(id)
            }
            _ => Err(Error::MalformedResponse("no generation id in response".into())),
        }
    }

    /// Polls the job until it completes, fails, or we run out of attempts.
    ///
    /// Only a still-pending job is retried. Any non-2xx poll ends the wait
    /// straight away.
    pub async fn await_completion(
        &self,
        generation_id: &str,
        cancel: &CancellationToken,
    ) -> Result<GenerationRecord> {
        let max_attempts = self.config.max_poll_attempts;
        for attempt in 1..=max_attempts {
            let record = cancellable(cancel, self.lookup(generation_id)).await?;
            match record.status {
                GenerationStatus::Completed => {
                    tracing::info!(generation_id, attempt, "generation completed");
                    return Ok(record);
                }
                GenerationStatus::Failed => {
                    let reason = record
                        .error
                        .unwrap_or_else(|| "unknown error".to_string());
                    tracing::warn!(generation_id, attempt, %reason, "generation failed");
                    return Err(Error::RemoteGenerationFailed { reason });
                }
                GenerationStatus::Pending => {
                    tracing::debug!(generation_id, attempt, "generation still pending");
                }
            }

            if attempt < max_attempts {
                cancellable(cancel, async {
                    tokio::time::sleep(self.config.poll_interval).await;
                    Ok(())
                })
                .await?;
            }
        }

        tracing::warn!(generation_id, max_attempts, "generation timed out");
        Err(Error::GenerationTimeout {
            attempts: max_attempts,
        })
    }

    /// Fetches the current state of an existing job.
    pub async fn lookup(&self, generation_id: &str) -> Result<GenerationRecord> {
        let response = self
            .get_ok(
                format!("{}/generations/{}", self.config.api_url, generation_id),
                "failed to get generation status",
            )
            .await?;
        response.json().await
    }

    /// Asks the provider where the finished audio can be downloaded from.
    pub async fn resolve_playable_url(&self, generation_id: &str) -> Result<String> {
        let response = self
            .get_ok(
                format!("{}/generations/{}/audio", self.config.api_url, generation_id),
                "failed to get audio url",
            )
            .await?;
        let AudioResponse { url } = response.json().await?;
        url.filter(|url| !url.is_empty())
            .ok_or_else(|| Error::MalformedResponse("no audio url in response".into()))
    }

    /// Downloads `url` into a fresh temp file.
    ///
    /// If anything goes wrong part way through, the partial file is removed
    /// before the error is returned.
    pub async fn materialize(&self, url: &str, cancel: &CancellationToken) -> Result<AudioFile> {
        let response = cancellable(cancel, self.http.request(HttpRequest::get(url))).await?;
        if !response.is_success() {
            return Err(Self::remote_error(response, "failed to download audio").await);
        }

        let file = tempfile::Builder::new()
            .prefix(AUDIO_FILE_PREFIX)
            .suffix(&self.config.audio_suffix)
            .tempfile_in(&self.config.temp_dir)?;

        let copied = match file.as_file().try_clone() {
            Ok(writer) => self.copy_body(response.body, writer, cancel).await,
            Err(error) => Err(error.into()),
        };

        match copied {
            Ok(bytes) => {
                tracing::debug!(path = %file.path().display(), bytes, "downloaded audio");
                Ok(AudioFile::new(file.into_temp_path()))
            }
            Err(error) => {
                let path = file.path().to_path_buf();
                if let Err(close_error) = file.close() {
                    tracing::error!(
                        path = %path.display(),
                        error = %close_error,
                        "error removing partial download"
                    );
                }
                Err(error)
            }
        }
    }

    async fn copy_body(
        &self,
        body: HttpBody,
        writer: std::fs::File,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let mut reader = StreamReader::new(body);
        let mut writer = tokio::fs::File::from_std(writer);
        let mut chunk = vec![0u8; self.config.download_chunk_size.max(1)];
        let mut total = 0u64;

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                read = reader.read(&mut chunk) => {
                    read.map_err(|e| Error::NetworkFailure(e.to_string()))?
                }
            };
            if read == 0 {
                break;
            }
            writer.write_all(&chunk[..read]).await?;
            total += read as u64;
        }
        writer.flush().await?;
        Ok(total)
    }

    /// Searches public generations. No matches is an empty list, not an error.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<GenerationRecord>> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/search/generations", self.config.api_url),
            &[("query", query), ("limit", &limit.to_string())],
        )
        .map_err(|e| Error::Config(format!("bad api url: {e}")))?;

        let response = self
            .get_ok(url.to_string(), "failed to search generations")
            .await?;
        let SearchResponse { results } = response.json().await?;
        Ok(results)
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
    }

    async fn get_ok(&self, url: String, context: &str) -> Result<HttpResponse> {
        let response = self.http.request(self.authorized(HttpRequest::get(url))).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(Self::remote_error(response, context).await)
        }
    }

    async fn remote_error(response: HttpResponse, context: &str) -> Error {
        let status = response.status;
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status, %body, "{context}");
        Error::RemoteError { status, body }
    }
}
