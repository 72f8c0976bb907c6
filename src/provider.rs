//! Provider Gateway — typed HTTP client for the voice-calling provider.
//!
//! Thin by design: no retries, no backoff. Retry policy belongs to callers
//! (the batch sync loop). The gateway's only job is to speak the provider's
//! wire format and normalize its inconsistencies:
//!
//! - transcripts arrive either as a `transcripts` array of turns or a
//!   `concatenated_transcript` string (the latter preferred for storage)
//! - duration is reported in minutes (`call_length`) or seconds
//!   (`corrected_duration`), normalized here to seconds
//! - price is reported in dollars and converted to integer cents

use crate::config::ProviderConfig;
use crate::types::{Speaker, TranscriptTurn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Gateway error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No credential configured. Fatal at construction, not retryable.
    #[error("provider API key not configured (set PROVIDER_API_KEY)")]
    Configuration,
    /// The provider rejected the request; message preserved verbatim.
    #[error("provider rejected request ({status}): {message}")]
    Provider { status: u16, message: String },
    /// Network or timeout failure. Retryable by the caller's policy.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Parameters for one outbound call.
#[derive(Debug, Clone)]
pub struct OutboundCallRequest {
    /// E.164 phone number, e.g. `+12125551234`.
    pub phone_number: String,
    /// The agent's task prompt.
    pub task: String,
    pub voice: String,
    pub first_sentence: Option<String>,
    pub webhook_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub max_duration_seconds: u32,
    pub temperature: f64,
}

impl OutboundCallRequest {
    pub fn new(phone_number: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            task: task.into(),
            voice: "nat".to_string(),
            first_sentence: None,
            webhook_url: None,
            metadata: None,
            max_duration_seconds: 300,
            temperature: 0.7,
        }
    }
}

/// Normalized detail of a call, pulled from the provider.
#[derive(Debug, Clone)]
pub struct CallDetail {
    pub turns: Vec<TranscriptTurn>,
    /// Full transcript text for storage; the provider's concatenated form
    /// when present, otherwise rendered from the turns.
    pub transcript_text: Option<String>,
    pub duration_seconds: u32,
    pub answered_by: Option<String>,
    pub recording_url: Option<String>,
    /// Provider-reported price in cents, when reported.
    pub price_cents: Option<i64>,
    /// Whether the provider considers the call finished.
    pub completed: bool,
    /// Voice used, echoed back from the original request.
    pub voice: Option<String>,
}

/// Summary row from the provider's call listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CallSummary {
    pub call_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Abstraction over the provider API; the seam the lifecycle manager and
/// tests depend on.
#[async_trait::async_trait]
pub trait ProviderApi: Send + Sync {
    /// Place an outbound call; returns the provider's call id.
    async fn initiate_call(&self, request: &OutboundCallRequest) -> Result<String, GatewayError>;

    /// Fetch authoritative detail for a call.
    async fn get_call_detail(&self, provider_call_id: &str) -> Result<CallDetail, GatewayError>;

    /// List recent calls (paged).
    async fn list_calls(&self, limit: u32, offset: u32) -> Result<Vec<CallSummary>, GatewayError>;
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct InitiateCallBody<'a> {
    phone_number: &'a str,
    task: &'a str,
    model: &'static str,
    voice: &'a str,
    wait_for_greeting: bool,
    record: bool,
    max_duration: u32,
    temperature: f64,
    language: &'static str,
    amd: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_sentence: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct InitiateCallResponse {
    call_id: String,
}

#[derive(Debug, Deserialize)]
struct RawTranscriptTurn {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRequestData {
    #[serde(default)]
    voice: Option<String>,
}

/// Raw call detail; field names vary by provider version, so everything is
/// optional and normalized in [`RawCallDetail::normalize`].
#[derive(Debug, Deserialize)]
struct RawCallDetail {
    #[serde(default)]
    transcripts: Option<Vec<RawTranscriptTurn>>,
    #[serde(default)]
    concatenated_transcript: Option<String>,
    /// Duration in minutes (older field).
    #[serde(default)]
    call_length: Option<f64>,
    /// Duration in seconds (newer field); sometimes serialized as a string.
    #[serde(default)]
    corrected_duration: Option<serde_json::Value>,
    #[serde(default)]
    answered_by: Option<String>,
    #[serde(default)]
    recording_url: Option<String>,
    /// Price in dollars.
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    request_data: Option<RawRequestData>,
}

impl RawCallDetail {
    fn normalize(self) -> CallDetail {
        let turns: Vec<TranscriptTurn> = self
            .transcripts
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| {
                let text = t.text?;
                let speaker = match t.user.as_deref() {
                    Some("user") => Speaker::Lead,
                    _ => Speaker::Agent,
                };
                Some(TranscriptTurn { speaker, text })
            })
            .collect();

        // Prefer the provider's concatenated form; fall back to rendering
        // the turn list.
        let transcript_text = match self.concatenated_transcript {
            Some(text) if !text.trim().is_empty() => Some(text),
            _ if !turns.is_empty() => Some(render_transcript(&turns)),
            _ => None,
        };

        let duration_seconds = duration_from_fields(
            self.corrected_duration.as_ref(),
            self.call_length,
        );

        let completed = self.completed.unwrap_or(false)
            || self.status.as_deref() == Some("completed");

        CallDetail {
            turns,
            transcript_text,
            duration_seconds,
            answered_by: self.answered_by,
            recording_url: self.recording_url,
            price_cents: self.price.map(dollars_to_cents),
            completed,
            voice: self.request_data.and_then(|r| r.voice),
        }
    }
}

/// Seconds from whichever duration field the provider populated.
/// `corrected_duration` (seconds, number or numeric string) wins over
/// `call_length` (minutes).
fn duration_from_fields(
    corrected_duration: Option<&serde_json::Value>,
    call_length_minutes: Option<f64>,
) -> u32 {
    if let Some(v) = corrected_duration {
        let seconds = match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        if let Some(s) = seconds {
            if s >= 0.0 {
                return s.round() as u32;
            }
        }
    }
    call_length_minutes
        .filter(|m| *m >= 0.0)
        .map_or(0, |m| (m * 60.0).round() as u32)
}

fn dollars_to_cents(dollars: f64) -> i64 {
    (dollars * 100.0).round() as i64
}

fn render_transcript(turns: &[TranscriptTurn]) -> String {
    turns
        .iter()
        .map(|t| {
            let who = match t.speaker {
                Speaker::Agent => "assistant",
                Speaker::Lead => "user",
            };
            format!("{who}: {}", t.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// HTTP client
// ============================================================================

/// Reqwest-backed provider client. Constructed once from configuration at
/// process start and injected wherever provider access is needed.
#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ProviderClient {
    /// Build the client. Fails fast with [`GatewayError::Configuration`]
    /// when no API key is configured.
    pub fn new(config: &ProviderConfig) -> Result<Self, GatewayError> {
        if config.api_key.is_empty() {
            return Err(GatewayError::Configuration);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Map a non-2xx response into [`GatewayError::Provider`], preserving
    /// the provider's message verbatim.
    async fn reject(response: reqwest::Response) -> GatewayError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .or_else(|| v.get("error"))
                    .and_then(|m| m.as_str())
                    .map(String::from)
            })
            .unwrap_or(body);
        GatewayError::Provider { status, message }
    }
}

#[async_trait::async_trait]
impl ProviderApi for ProviderClient {
    async fn initiate_call(&self, request: &OutboundCallRequest) -> Result<String, GatewayError> {
        let body = InitiateCallBody {
            phone_number: &request.phone_number,
            task: &request.task,
            model: "enhanced",
            voice: &request.voice,
            wait_for_greeting: true,
            record: true,
            max_duration: request.max_duration_seconds,
            temperature: request.temperature,
            language: "en",
            amd: true,
            first_sentence: request.first_sentence.as_deref(),
            webhook: request.webhook_url.as_deref(),
            metadata: request.metadata.as_ref(),
        };

        let response = self
            .http
            .post(format!("{}/v1/calls", self.base_url))
            .header("authorization", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response).await);
        }

        let parsed: InitiateCallResponse = response.json().await?;
        debug!(provider_call_id = %parsed.call_id, "Outbound call placed");
        Ok(parsed.call_id)
    }

    async fn get_call_detail(&self, provider_call_id: &str) -> Result<CallDetail, GatewayError> {
        let response = self
            .http
            .get(format!("{}/v1/calls/{provider_call_id}", self.base_url))
            .header("authorization", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response).await);
        }

        let raw: RawCallDetail = response.json().await?;
        Ok(raw.normalize())
    }

    async fn list_calls(&self, limit: u32, offset: u32) -> Result<Vec<CallSummary>, GatewayError> {
        let response = self
            .http
            .get(format!("{}/v1/calls", self.base_url))
            .header("authorization", &self.api_key)
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::reject(response).await);
        }

        // Some provider versions wrap the list, some return it bare.
        let value: serde_json::Value = response.json().await?;
        let rows = value
            .get("calls")
            .cloned()
            .unwrap_or(value);
        let summaries: Vec<CallSummary> =
            serde_json::from_value(rows).unwrap_or_default();
        Ok(summaries)
    }
}

/// Stand-in gateway for deployments without a provider credential. Every
/// operation fails with [`GatewayError::Configuration`]; webhook ingestion
/// and listings keep working.
pub struct DisabledGateway;

#[async_trait::async_trait]
impl ProviderApi for DisabledGateway {
    async fn initiate_call(&self, _request: &OutboundCallRequest) -> Result<String, GatewayError> {
        Err(GatewayError::Configuration)
    }

    async fn get_call_detail(&self, _provider_call_id: &str) -> Result<CallDetail, GatewayError> {
        Err(GatewayError::Configuration)
    }

    async fn list_calls(&self, _limit: u32, _offset: u32) -> Result<Vec<CallSummary>, GatewayError> {
        Err(GatewayError::Configuration)
    }
}

/// Minute-rate cost estimate in cents, used when the provider does not
/// report a price. Premium voices bill at a higher rate.
pub fn estimate_cost_cents(duration_seconds: u32, voice: Option<&str>) -> i64 {
    let rate_cents_per_minute = match voice {
        Some("paige" | "june") => 12.0,
        _ => 9.0,
    };
    let minutes = f64::from(duration_seconds) / 60.0;
    (minutes * rate_cents_per_minute).round() as i64
}
