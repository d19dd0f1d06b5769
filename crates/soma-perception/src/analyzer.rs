//! Deep analysis delegated to slower, possibly remote, services.
//!
//! Scene description and audio transcription are allowed to be slow: the
//! pipeline races them against a per-cycle deadline and simply omits the
//! corresponding snapshot field when they lose.  Neither ever blocks a
//! perception cycle.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use soma_types::{Frame, SomaError};

/// Free-text scene description black box.
#[async_trait]
pub trait SceneAnalyzer: Send + Sync {
    async fn describe(&self, frame: &Frame) -> Result<String, SomaError>;
}

/// Speech transcription black box, consulted when the sound-direction
/// sensor fires.  Returns `Ok(None)` when nothing intelligible was heard.
#[async_trait]
pub trait AudioTranscriber: Send + Sync {
    async fn transcribe(&self) -> Result<Option<String>, SomaError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote scene analyzer
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct DescribeRequest<'a> {
    image_b64: String,
    width: u32,
    height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
}

#[derive(Deserialize)]
struct DescribeResponse {
    description: String,
}

/// Scene analyzer backed by an HTTP endpoint (e.g. a vision model running on
/// the brain host).  Posts the JPEG frame base64-encoded and expects
/// `{"description": "..."}` back.
pub struct RemoteSceneAnalyzer {
    client: reqwest::Client,
    url: String,
}

impl RemoteSceneAnalyzer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl SceneAnalyzer for RemoteSceneAnalyzer {
    async fn describe(&self, frame: &Frame) -> Result<String, SomaError> {
        let request = DescribeRequest {
            image_b64: BASE64.encode(&frame.data),
            width: frame.width,
            height: frame.height,
            hint: None,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SomaError::TransportUnreachable {
                detail: format!("scene analyzer: {e}"),
            })?;
        let parsed: DescribeResponse = response
            .json()
            .await
            .map_err(|e| SomaError::Serialization(format!("scene analyzer reply: {e}")))?;
        Ok(parsed.description)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted double
// ─────────────────────────────────────────────────────────────────────────────

/// A [`SceneAnalyzer`] that answers with a fixed string after an optional
/// delay, for exercising the pipeline's deadline behaviour.
pub struct StaticSceneAnalyzer {
    description: String,
    delay: std::time::Duration,
}

impl StaticSceneAnalyzer {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            delay: std::time::Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl SceneAnalyzer for StaticSceneAnalyzer {
    async fn describe(&self, _frame: &Frame) -> Result<String, SomaError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.description.clone())
    }
}

/// An [`AudioTranscriber`] answering with a fixed transcript.
pub struct StaticTranscriber {
    transcript: Option<String>,
}

impl StaticTranscriber {
    pub fn new(transcript: Option<String>) -> Self {
        Self { transcript }
    }
}

#[async_trait]
impl AudioTranscriber for StaticTranscriber {
    async fn transcribe(&self) -> Result<Option<String>, SomaError> {
        Ok(self.transcript.clone())
    }
}
