//! Call Lifecycle Manager — owns the call state machine.
//!
//! Consumes provider webhook events and sync-pull results, runs the
//! classifier over transcripts, persists transitions, and triggers
//! lead-status side effects.
//!
//! Delivery discipline: webhook events arrive unordered and at-least-once,
//! so every transition here is idempotent, and a per-call-id mutex
//! serializes all mutation of a single call record. Reconciles for
//! different calls run in parallel.

use crate::classifier::{self, OutcomeTag};
use crate::config::ProviderConfig;
use crate::phone::normalize_phone;
use crate::provider::{
    estimate_cost_cents, CallDetail, GatewayError, OutboundCallRequest, ProviderApi,
};
use crate::store::{Store, StoreError};
use crate::types::{
    Call, CallOutcome, CallPatch, CallStatus, Lead, LeadStatus, Sentiment,
};
use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle error taxonomy. Provider and store failures surface to the
/// caller unchanged; the manager performs no internal retries.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("call {0} not found")]
    CallNotFound(Uuid),
    #[error("call {0} has no provider call id to reconcile against")]
    MissingExternalId(Uuid),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// Webhook envelope
// ============================================================================

/// Event kinds the provider pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    Started,
    Completed,
    Failed,
}

impl WebhookEventKind {
    fn parse(event: &str) -> Option<Self> {
        match event {
            "call.started" => Some(Self::Started),
            "call.completed" => Some(Self::Completed),
            "call.failed" => Some(Self::Failed),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Started => "call.started",
            Self::Completed => "call.completed",
            Self::Failed => "call.failed",
        }
    }
}

/// Inbound webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Acknowledgment returned for every webhook delivery. Orphan events and
/// unknown kinds are acknowledged as ignored, never errored: the provider
/// retries on error, and a retry would not help.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventAck {
    Processed { event: &'static str },
    Ignored { reason: &'static str },
}

impl EventAck {
    fn processed(kind: WebhookEventKind) -> Self {
        Self::Processed {
            event: kind.as_str(),
        }
    }

    fn ignored(reason: &'static str) -> Self {
        Self::Ignored { reason }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Result of one reconcile pull.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub call_id: Uuid,
    pub status: CallStatus,
    pub outcome: Option<CallOutcome>,
    pub sentiment: Option<Sentiment>,
    pub duration_seconds: u32,
    pub cost_cents: i64,
}

/// Aggregate result of a batch sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub total: usize,
    pub synced: usize,
    pub errored: usize,
}

/// Parameters for initiating one AI call.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiateCallParams {
    pub lead_id: Uuid,
    #[serde(default)]
    pub campaign_id: Option<Uuid>,
    #[serde(default)]
    pub prompt_override: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub first_sentence: Option<String>,
}

// ============================================================================
// Manager
// ============================================================================

/// Owns call records and their state machine.
pub struct LifecycleManager {
    store: Arc<dyn Store>,
    provider: Arc<dyn ProviderApi>,
    defaults: ProviderConfig,
    /// Per-call-id critical sections; all mutation of one call record goes
    /// through its entry here.
    call_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    /// Enrichment queue: `call.completed` webhooks enqueue here instead of
    /// blocking the webhook response on a provider pull.
    enrichment_tx: mpsc::UnboundedSender<Uuid>,
}

impl LifecycleManager {
    /// Build the manager plus the receiving end of its enrichment queue.
    /// Hand the receiver to [`run_enrichment_worker`], or drain it manually
    /// in tests.
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn ProviderApi>,
        defaults: ProviderConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Uuid>) {
        let (enrichment_tx, enrichment_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            store,
            provider,
            defaults,
            call_locks: DashMap::new(),
            enrichment_tx,
        });
        (manager, enrichment_rx)
    }

    fn lock_for(&self, call_id: Uuid) -> Arc<Mutex<()>> {
        self.call_locks
            .entry(call_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop a call's lock entry once no task holds a clone of it. Called
    /// after a call goes terminal, so the registry tracks live calls
    /// instead of growing with every call ever seen. A task that grabbed
    /// the entry between our release and this check keeps it alive; the
    /// `remove_if` predicate runs under the shard lock, so no clone can
    /// slip in mid-removal.
    fn prune_lock(&self, call_id: Uuid) {
        self.call_locks
            .remove_if(&call_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    // ── Event ingestion ─────────────────────────────────────────────────

    /// Apply one provider webhook event.
    ///
    /// Unknown call ids and unknown event kinds are acknowledged as ignored.
    /// Events on terminal calls are idempotent no-ops. `call.failed` wins:
    /// once a call is terminal its state never moves.
    pub async fn apply_event(
        &self,
        envelope: &WebhookEnvelope,
    ) -> Result<EventAck, LifecycleError> {
        let Some(external_id) = envelope.call_id.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(EventAck::ignored("no call_id"));
        };
        let Some(kind) = WebhookEventKind::parse(&envelope.event) else {
            debug!(event = %envelope.event, "Unknown webhook event kind");
            return Ok(EventAck::ignored("unknown event"));
        };
        let Some(call) = self.store.find_call_by_external_id(external_id).await? else {
            info!(
                provider_call_id = %external_id,
                event = %envelope.event,
                "Orphan webhook event ignored"
            );
            return Ok(EventAck::ignored("call not found"));
        };

        let lock = self.lock_for(call.id);
        let guard = lock.lock().await;
        // Re-read under the lock; the record may have moved since lookup.
        let call = self.store.get_call(call.id).await?;

        match kind {
            WebhookEventKind::Started => {
                if matches!(call.status, CallStatus::Pending | CallStatus::Ringing) {
                    let patch = CallPatch {
                        status: Some(CallStatus::InProgress),
                        started_at: call.started_at.is_none().then(Utc::now),
                        ..CallPatch::default()
                    };
                    self.store.update_call(call.id, patch).await?;
                    info!(call_id = %call.id, "Call answered, in progress");
                }
            }
            WebhookEventKind::Completed => {
                // Enrichment is deferred to the reconcile worker; the
                // webhook response must not block on a provider pull.
                if self.enrichment_tx.send(call.id).is_err() {
                    warn!(
                        call_id = %call.id,
                        "Enrichment queue closed; call left for batch sync"
                    );
                }
            }
            WebhookEventKind::Failed => {
                if !call.status.is_terminal() {
                    let reason = envelope
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "Call failed".to_string());
                    let patch = CallPatch {
                        status: Some(CallStatus::Failed),
                        ended_at: Some(Utc::now()),
                        notes: Some(reason.clone()),
                        ..CallPatch::default()
                    };
                    self.store.update_call(call.id, patch).await?;
                    warn!(call_id = %call.id, reason = %reason, "Call failed");
                }
            }
        }

        drop(guard);
        drop(lock);
        if kind == WebhookEventKind::Failed || call.status.is_terminal() {
            self.prune_lock(call.id);
        }
        Ok(EventAck::processed(kind))
    }

    // ── Reconciliation ──────────────────────────────────────────────────

    /// Pull authoritative call detail from the provider and merge it into
    /// the call record in one atomic write.
    ///
    /// Idempotent: the same provider payload yields the same stored record.
    /// A `Failed` call never regresses to `Completed`; its fields may still
    /// be enriched. Tolerates missed lifecycle webhooks by completing any
    /// call the provider reports elapsed duration for.
    pub async fn reconcile(&self, call_id: Uuid) -> Result<ReconcileReport, LifecycleError> {
        let lock = self.lock_for(call_id);
        let guard = lock.lock().await;

        let call = match self.store.get_call(call_id).await {
            Ok(call) => call,
            Err(StoreError::NotFound { .. }) => {
                drop(guard);
                drop(lock);
                self.prune_lock(call_id);
                return Err(LifecycleError::CallNotFound(call_id));
            }
            Err(e) => return Err(e.into()),
        };
        let Some(external_id) = call.external_call_id.clone() else {
            return Err(LifecycleError::MissingExternalId(call_id));
        };

        // The only suspending call of the pipeline; errors surface to the
        // caller unchanged and nothing is committed.
        let detail = self.provider.get_call_detail(&external_id).await?;

        let tag = classifier::classify_outcome(&detail.turns);
        let sentiment = classifier::classify_sentiment(&detail.turns);
        let (patch, first_completion) = build_reconcile_patch(&call, &detail, tag, sentiment);

        let updated = self.store.update_call(call.id, patch).await?;

        if first_completion {
            self.apply_lead_side_effects(&updated, tag).await?;
        }

        info!(
            call_id = %updated.id,
            status = ?updated.status,
            outcome = ?updated.outcome,
            duration_seconds = updated.duration_seconds,
            "Call reconciled"
        );

        drop(guard);
        drop(lock);
        if updated.status.is_terminal() {
            self.prune_lock(call_id);
        }

        Ok(ReconcileReport {
            call_id: updated.id,
            status: updated.status,
            outcome: updated.outcome,
            sentiment: updated.sentiment,
            duration_seconds: updated.duration_seconds,
            cost_cents: updated.cost_cents,
        })
    }

    /// Manually move a call to a new status, e.g. an operator marking a
    /// stuck call failed.
    ///
    /// Transitions out of a terminal state are refused. Entering
    /// `InProgress` stamps `started_at`; entering a terminal state stamps
    /// `ended_at`. No outcome classification happens here.
    pub async fn set_status(
        &self,
        call_id: Uuid,
        status: CallStatus,
    ) -> Result<Call, LifecycleError> {
        let lock = self.lock_for(call_id);
        let guard = lock.lock().await;

        let call = match self.store.get_call(call_id).await {
            Ok(call) => call,
            Err(StoreError::NotFound { .. }) => {
                drop(guard);
                drop(lock);
                self.prune_lock(call_id);
                return Err(LifecycleError::CallNotFound(call_id));
            }
            Err(e) => return Err(e.into()),
        };
        if call.status.is_terminal() {
            drop(guard);
            drop(lock);
            self.prune_lock(call_id);
            return Err(LifecycleError::Validation(format!(
                "call is already {:?}; terminal calls accept no transitions",
                call.status
            )));
        }

        let now = Utc::now();
        let patch = CallPatch {
            status: Some(status),
            started_at: (status == CallStatus::InProgress && call.started_at.is_none())
                .then_some(now),
            ended_at: (status.is_terminal() && call.ended_at.is_none()).then_some(now),
            ..CallPatch::default()
        };
        let updated = self.store.update_call(call.id, patch).await?;
        info!(
            call_id = %updated.id,
            from = ?call.status,
            to = ?updated.status,
            "Call status updated manually"
        );

        drop(guard);
        drop(lock);
        if updated.status.is_terminal() {
            self.prune_lock(call_id);
        }
        Ok(updated)
    }

    /// Outcome → lead-status side effect, applied once per call on its
    /// first completion. Never overwrites a more specific lead status with
    /// a generic one.
    async fn apply_lead_side_effects(
        &self,
        call: &Call,
        tag: OutcomeTag,
    ) -> Result<(), LifecycleError> {
        let (lead_id, tenant_id) = (call.lead_id, call.tenant_id);
        match tag {
            OutcomeTag::Interested => {
                self.store
                    .update_lead_status(lead_id, tenant_id, LeadStatus::Interested)
                    .await?;
            }
            OutcomeTag::NotInterested => {
                self.store
                    .update_lead_status(lead_id, tenant_id, LeadStatus::NotInterested)
                    .await?;
            }
            OutcomeTag::Callback => {
                self.store
                    .update_lead_status(lead_id, tenant_id, LeadStatus::Callback)
                    .await?;
            }
            OutcomeTag::Voicemail => {
                self.store
                    .append_lead_note(lead_id, tenant_id, "Voicemail detected - message left")
                    .await?;
            }
            OutcomeTag::NoAnswer => {
                self.store
                    .append_lead_note(lead_id, tenant_id, "No answer")
                    .await?;
            }
            OutcomeTag::Inconclusive => {
                let lead = self.store.get_lead(lead_id, tenant_id).await?;
                if lead.status == LeadStatus::New {
                    self.store
                        .update_lead_status(lead_id, tenant_id, LeadStatus::Contacted)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Reconcile every call awaiting sync for a tenant.
    ///
    /// Calls are reconciled independently with bounded parallelism; one
    /// call's provider error never aborts the batch. Errored calls stay on
    /// the worklist for the next run.
    pub async fn sync_pending(
        &self,
        tenant_id: Uuid,
        concurrency: usize,
    ) -> Result<SyncReport, LifecycleError> {
        let worklist = self.store.calls_awaiting_sync(tenant_id).await?;
        let total = worklist.len();

        let results: Vec<(Uuid, Result<ReconcileReport, LifecycleError>)> =
            stream::iter(worklist.into_iter().map(|call| async move {
                (call.id, self.reconcile(call.id).await)
            }))
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut synced = 0;
        let mut errored = 0;
        for (call_id, result) in results {
            match result {
                Ok(_) => synced += 1,
                Err(e) => {
                    errored += 1;
                    warn!(call_id = %call_id, error = %e, "Sync failed for call");
                }
            }
        }

        info!(total, synced, errored, "Batch sync finished");
        Ok(SyncReport {
            total,
            synced,
            errored,
        })
    }

    // ── Initiation ──────────────────────────────────────────────────────

    /// Place one AI call to a lead and create its `Pending` call record.
    ///
    /// Lead data is validated and the phone normalized before any provider
    /// request goes out.
    pub async fn initiate(
        &self,
        tenant_id: Uuid,
        params: InitiateCallParams,
    ) -> Result<Call, LifecycleError> {
        let lead = self.store.get_lead(params.lead_id, tenant_id).await?;

        if lead.status == LeadStatus::DoNotCall {
            return Err(LifecycleError::Validation(
                "lead is flagged do-not-call".to_string(),
            ));
        }
        if !lead.phone.chars().any(|c| c.is_ascii_digit()) {
            return Err(LifecycleError::Validation(
                "lead has no dialable phone number".to_string(),
            ));
        }
        if let Some(campaign_id) = params.campaign_id {
            // Reject cross-tenant campaign references up front.
            self.store.get_campaign(campaign_id, tenant_id).await?;
        }

        let phone = normalize_phone(&lead.phone);
        let task = params
            .prompt_override
            .unwrap_or_else(|| default_task_prompt(&lead));
        let first_sentence = params
            .first_sentence
            .unwrap_or_else(|| format!("Hi {}, how are you today?", lead.first_name));

        let mut metadata = serde_json::json!({
            "lead_id": lead.id,
            "tenant_id": tenant_id,
            "lead_name": lead.full_name(),
        });
        if let Some(campaign_id) = params.campaign_id {
            metadata["campaign_id"] = serde_json::json!(campaign_id);
        }

        let request = OutboundCallRequest {
            phone_number: phone,
            task,
            voice: params
                .voice
                .unwrap_or_else(|| self.defaults.default_voice.clone()),
            first_sentence: Some(first_sentence),
            webhook_url: self.defaults.webhook_url.clone(),
            metadata: Some(metadata),
            max_duration_seconds: self.defaults.max_call_duration_secs,
            temperature: self.defaults.temperature,
        };

        let external_id = self.provider.initiate_call(&request).await?;

        let mut call = Call::pending(tenant_id, lead.id, params.campaign_id);
        call.external_call_id = Some(external_id);
        let call = self.store.create_call(call).await?;

        info!(
            call_id = %call.id,
            lead_id = %lead.id,
            provider_call_id = ?call.external_call_id,
            "AI call initiated"
        );
        Ok(call)
    }
}

/// Drain the enrichment queue, reconciling each completed call.
///
/// Failures are logged and dropped: the call stays non-terminal and the
/// next batch sync picks it up again.
pub async fn run_enrichment_worker(
    manager: Arc<LifecycleManager>,
    mut rx: mpsc::UnboundedReceiver<Uuid>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("Enrichment worker stopped");
                break;
            }
            maybe_id = rx.recv() => {
                let Some(call_id) = maybe_id else { break };
                if let Err(e) = manager.reconcile(call_id).await {
                    warn!(
                        call_id = %call_id,
                        error = %e,
                        "Enrichment failed; call remains eligible for batch sync"
                    );
                }
            }
        }
    }
}

/// Classifier tag → call outcome. `Inconclusive` intentionally maps to
/// no outcome at all: the record keeps `outcome = None`.
fn map_outcome(tag: OutcomeTag) -> Option<CallOutcome> {
    match tag {
        OutcomeTag::Interested => Some(CallOutcome::Interested),
        OutcomeTag::NotInterested => Some(CallOutcome::NotInterested),
        OutcomeTag::Callback => Some(CallOutcome::Callback),
        OutcomeTag::Voicemail => Some(CallOutcome::Voicemail),
        OutcomeTag::NoAnswer => Some(CallOutcome::NoAnswer),
        OutcomeTag::Inconclusive => None,
    }
}

/// Compute the single atomic patch for a reconcile, plus whether this
/// reconcile completes the call for the first time (which gates lead side
/// effects).
fn build_reconcile_patch(
    call: &Call,
    detail: &CallDetail,
    tag: OutcomeTag,
    sentiment: Sentiment,
) -> (CallPatch, bool) {
    let duration = detail.duration_seconds;

    // Elapsed duration or a provider "completed" status is enough to
    // complete the call even when lifecycle webhooks were lost. Failed is
    // terminal and never regresses.
    let status = if call.status == CallStatus::Failed {
        None
    } else if detail.completed || duration > 0 {
        Some(CallStatus::Completed)
    } else {
        None
    };
    let first_completion =
        status == Some(CallStatus::Completed) && call.status != CallStatus::Completed;

    // Classification only lands on a terminal-ish record. A sync that
    // catches a call mid-flight (no elapsed duration, not completed)
    // must not stamp an outcome the patch model could never clear.
    let classified = status == Some(CallStatus::Completed) || call.status.is_terminal();

    let cost_cents = detail
        .price_cents
        .unwrap_or_else(|| estimate_cost_cents(duration, detail.voice.as_deref()));

    // Failure reason notes on a failed call are preserved.
    let notes = if !classified || call.status == CallStatus::Failed {
        None
    } else {
        note_for(detail.answered_by.as_deref(), tag)
    };

    let patch = CallPatch {
        status,
        outcome: if classified { map_outcome(tag) } else { None },
        sentiment: classified.then_some(sentiment),
        duration_seconds: Some(duration),
        transcript: detail.transcript_text.clone(),
        recording_url: detail.recording_url.clone(),
        cost_cents: Some(cost_cents),
        notes,
        ended_at: (status == Some(CallStatus::Completed) && call.ended_at.is_none())
            .then(Utc::now),
        ..CallPatch::default()
    };
    (patch, first_completion)
}

fn note_for(answered_by: Option<&str>, tag: OutcomeTag) -> Option<String> {
    let note = match answered_by {
        Some("voicemail") => "Voicemail detected - message left",
        Some("no-answer") => "No answer",
        _ => match tag {
            OutcomeTag::Interested => "Lead expressed interest",
            OutcomeTag::NotInterested => "Lead not interested",
            OutcomeTag::Callback => "Lead requested callback",
            _ => return None,
        },
    };
    Some(note.to_string())
}

fn default_task_prompt(lead: &Lead) -> String {
    format!(
        "You are a professional and friendly sales representative.\n\
         \n\
         Lead Information:\n\
         - Name: {name}\n\
         - Company: {company}\n\
         - Phone: {phone}\n\
         \n\
         Your Goal:\n\
         Have a natural conversation to understand their needs and qualify \
         their interest.\n\
         \n\
         Instructions:\n\
         1. Greet them warmly: \"Hi {first}, how are you today?\"\n\
         2. Introduce yourself and your company briefly\n\
         3. Ask about their current challenges or pain points\n\
         4. Listen actively - let them talk\n\
         5. If interested: offer next steps (demo, meeting, information)\n\
         6. If not interested or busy: thank them politely and offer an \
         email follow-up\n\
         \n\
         Tone: friendly, professional, consultative - never pushy.\n\
         \n\
         Important Rules:\n\
         - Always respect their time\n\
         - If they say \"not interested\" or \"busy\", politely end the call\n\
         - Don't argue or pressure them\n\
         - Offer to send information via email as an alternative\n\
         - Keep the call under 5 minutes unless they're very engaged",
        name = lead.full_name(),
        company = lead.company.as_deref().unwrap_or("Unknown"),
        phone = lead.phone,
        first = lead.first_name,
    )
}
