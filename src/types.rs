//! Domain model for the call lifecycle engine.
//!
//! `Call` is the central record: created as `Pending` by call initiation or a
//! campaign launch, driven through its state machine by webhook events and
//! reconciliation pulls, and never hard-deleted by the engine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

/// Call state machine states.
///
/// `Pending → Ringing → InProgress → Completed` on the success path;
/// any non-terminal state may transition to `Failed`. `Completed` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    Ringing,
    InProgress,
    Completed,
    Failed,
}

impl CallStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Classified result of a completed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Interested,
    NotInterested,
    Callback,
    NoAnswer,
    Voicemail,
}

/// Heuristic sentiment of the dialed party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Lead pipeline status, mutated as a side effect of call outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Interested,
    NotInterested,
    Callback,
    DoNotCall,
}

/// Campaign status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

/// Who is speaking in a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The AI agent placing the call.
    Agent,
    /// The dialed party (human or voicemail).
    Lead,
}

// ============================================================================
// Transcript
// ============================================================================

/// One turn of a call transcript, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl TranscriptTurn {
    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Agent,
            text: text.into(),
        }
    }

    pub fn lead(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Lead,
            text: text.into(),
        }
    }
}

// ============================================================================
// Call
// ============================================================================

/// One attempted or completed outbound call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: Uuid,
    /// Immutable after creation.
    pub tenant_id: Uuid,
    pub lead_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub status: CallStatus,
    /// Only set once the call reaches a terminal-ish state.
    pub outcome: Option<CallOutcome>,
    pub sentiment: Option<Sentiment>,
    pub duration_seconds: u32,
    /// Provider call id; unique across all calls when present.
    pub external_call_id: Option<String>,
    pub transcript: Option<String>,
    pub recording_url: Option<String>,
    /// Smallest currency unit (cents).
    pub cost_cents: i64,
    pub notes: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Call {
    /// New `Pending` call for a lead, optionally attached to a campaign.
    pub fn pending(tenant_id: Uuid, lead_id: Uuid, campaign_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            lead_id,
            campaign_id,
            status: CallStatus::Pending,
            outcome: None,
            sentiment: None,
            duration_seconds: 0,
            external_call_id: None,
            transcript: None,
            recording_url: None,
            cost_cents: 0,
            notes: None,
            started_at: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a typed patch: only supplied fields change.
    pub fn apply(&mut self, patch: &CallPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(outcome) = patch.outcome {
            self.outcome = Some(outcome);
        }
        if let Some(sentiment) = patch.sentiment {
            self.sentiment = Some(sentiment);
        }
        if let Some(duration) = patch.duration_seconds {
            self.duration_seconds = duration;
        }
        if let Some(ref external_id) = patch.external_call_id {
            self.external_call_id = Some(external_id.clone());
        }
        if let Some(ref transcript) = patch.transcript {
            self.transcript = Some(transcript.clone());
        }
        if let Some(ref url) = patch.recording_url {
            self.recording_url = Some(url.clone());
        }
        if let Some(cost) = patch.cost_cents {
            self.cost_cents = cost;
        }
        if let Some(ref notes) = patch.notes {
            self.notes = Some(notes.clone());
        }
        if let Some(started) = patch.started_at {
            self.started_at = Some(started);
        }
        if let Some(ended) = patch.ended_at {
            self.ended_at = Some(ended);
        }
        self.updated_at = Utc::now();
    }
}

/// Per-field optional update for a [`Call`]. Absent field = unchanged.
#[derive(Debug, Clone, Default)]
pub struct CallPatch {
    pub status: Option<CallStatus>,
    pub outcome: Option<CallOutcome>,
    pub sentiment: Option<Sentiment>,
    pub duration_seconds: Option<u32>,
    pub external_call_id: Option<String>,
    pub transcript: Option<String>,
    pub recording_url: Option<String>,
    pub cost_cents: Option<i64>,
    pub notes: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CallPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.outcome.is_none()
            && self.sentiment.is_none()
            && self.duration_seconds.is_none()
            && self.external_call_id.is_none()
            && self.transcript.is_none()
            && self.recording_url.is_none()
            && self.cost_cents.is_none()
            && self.notes.is_none()
            && self.started_at.is_none()
            && self.ended_at.is_none()
    }
}

// ============================================================================
// Lead / Campaign
// ============================================================================

/// A contact to be called. Owned by the external store; the engine only
/// writes `status` and appends to `notes` as call-outcome side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    /// Raw user-entered form; normalized at dial time.
    pub phone: String,
    pub company: Option<String>,
    pub status: LeadStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn new(tenant_id: Uuid, first_name: &str, last_name: &str, phone: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: None,
            phone: phone.to_string(),
            company: None,
            status: LeadStatus::New,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A group of leads dialed together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub status: CampaignStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(tenant_id: Uuid, name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.to_string(),
            status: CampaignStatus::Draft,
            start_date: None,
            end_date: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Aggregate campaign progress counters.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignStats {
    pub total_leads: usize,
    pub called: usize,
    pub answered: usize,
    pub interested: usize,
    pub conversion_rate: f64,
    pub progress_percentage: f64,
}
