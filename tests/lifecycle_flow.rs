//! Lifecycle Integration Tests
//!
//! Exercise the lifecycle manager end to end against the in-memory store
//! and a programmable fake provider: webhook ingestion, reconciliation,
//! lead side effects, batch sync, and call initiation.

mod common;

use common::{detail_with_lead_lines, seed_lead, FakeProvider};
use outdial::config::ProviderConfig;
use outdial::lifecycle::{
    EventAck, InitiateCallParams, LifecycleError, LifecycleManager, WebhookEnvelope,
};
use outdial::provider::CallDetail;
use outdial::store::{CallFilter, MemoryStore, Store};
use outdial::types::{Call, CallOutcome, CallStatus, LeadStatus, Sentiment, TranscriptTurn};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

struct Harness {
    store: Arc<MemoryStore>,
    provider: Arc<FakeProvider>,
    manager: Arc<LifecycleManager>,
    enrichment_rx: UnboundedReceiver<Uuid>,
    tenant_id: Uuid,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(FakeProvider::new());
    let (manager, enrichment_rx) = LifecycleManager::new(
        store.clone(),
        provider.clone(),
        ProviderConfig::default(),
    );
    Harness {
        store,
        provider,
        manager,
        enrichment_rx,
        tenant_id: Uuid::new_v4(),
    }
}

fn envelope(event: &str, call_id: &str) -> WebhookEnvelope {
    WebhookEnvelope {
        event: event.to_string(),
        call_id: Some(call_id.to_string()),
        error_message: None,
    }
}

/// Create a pending call bound to a lead with a provider call id attached.
async fn seed_call(h: &Harness, lead_id: Uuid, external_id: &str) -> Call {
    let mut call = Call::pending(h.tenant_id, lead_id, None);
    call.external_call_id = Some(external_id.to_string());
    h.store.create_call(call).await.unwrap()
}

// ============================================================================
// Webhook ingestion
// ============================================================================

#[tokio::test]
async fn test_started_event_marks_call_in_progress_once() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    let call = seed_call(&h, lead.id, "ext-1").await;

    let ack = h
        .manager
        .apply_event(&envelope("call.started", "ext-1"))
        .await
        .unwrap();
    assert!(matches!(ack, EventAck::Processed { .. }));

    let after = h.store.get_call(call.id).await.unwrap();
    assert_eq!(after.status, CallStatus::InProgress);
    let started_at = after.started_at.unwrap();

    // Redelivery keeps the original started_at.
    h.manager
        .apply_event(&envelope("call.started", "ext-1"))
        .await
        .unwrap();
    let after = h.store.get_call(call.id).await.unwrap();
    assert_eq!(after.status, CallStatus::InProgress);
    assert_eq!(after.started_at, Some(started_at));
}

#[tokio::test]
async fn test_orphan_webhook_is_acknowledged_without_mutation() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    seed_call(&h, lead.id, "ext-1").await;

    let ack = h
        .manager
        .apply_event(&envelope("call.completed", "never-dialed"))
        .await
        .unwrap();
    assert_eq!(
        ack,
        EventAck::Ignored {
            reason: "call not found"
        }
    );

    // No new rows, no state changes, nothing pulled from the provider.
    let calls = h
        .store
        .list_calls(h.tenant_id, &CallFilter::default())
        .await
        .unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].status, CallStatus::Pending);
    assert_eq!(h.provider.detail_fetches(), 0);
}

#[tokio::test]
async fn test_unknown_event_kind_is_ignored() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    seed_call(&h, lead.id, "ext-1").await;

    let ack = h
        .manager
        .apply_event(&envelope("call.transferred", "ext-1"))
        .await
        .unwrap();
    assert_eq!(
        ack,
        EventAck::Ignored {
            reason: "unknown event"
        }
    );

    let ack = h
        .manager
        .apply_event(&WebhookEnvelope {
            event: "call.started".to_string(),
            call_id: None,
            error_message: None,
        })
        .await
        .unwrap();
    assert_eq!(
        ack,
        EventAck::Ignored {
            reason: "no call_id"
        }
    );
}

#[tokio::test]
async fn test_failed_event_is_terminal_and_wins() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    let call = seed_call(&h, lead.id, "ext-1").await;

    let mut failed = envelope("call.failed", "ext-1");
    failed.error_message = Some("carrier rejected".to_string());
    h.manager.apply_event(&failed).await.unwrap();

    let after = h.store.get_call(call.id).await.unwrap();
    assert_eq!(after.status, CallStatus::Failed);
    assert_eq!(after.notes.as_deref(), Some("carrier rejected"));
    assert!(after.ended_at.is_some());

    // A late started event must not resurrect the call.
    h.manager
        .apply_event(&envelope("call.started", "ext-1"))
        .await
        .unwrap();
    let after = h.store.get_call(call.id).await.unwrap();
    assert_eq!(after.status, CallStatus::Failed);
}

#[tokio::test]
async fn test_failed_without_reason_gets_default_note() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    let call = seed_call(&h, lead.id, "ext-1").await;

    h.manager
        .apply_event(&envelope("call.failed", "ext-1"))
        .await
        .unwrap();
    let after = h.store.get_call(call.id).await.unwrap();
    assert_eq!(after.notes.as_deref(), Some("Call failed"));
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test]
async fn test_completed_webhook_enqueues_and_reconcile_enriches() {
    let mut h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    let call = seed_call(&h, lead.id, "ext-1").await;
    h.provider.set_detail(
        "ext-1",
        detail_with_lead_lines(&["Yes, that sounds good, I'd love a demo."]),
    );

    h.manager
        .apply_event(&envelope("call.completed", "ext-1"))
        .await
        .unwrap();

    // The webhook handler itself never pulls from the provider.
    assert_eq!(h.provider.detail_fetches(), 0);

    // Drain the enrichment queue the way the worker does.
    let queued = h.enrichment_rx.recv().await.unwrap();
    assert_eq!(queued, call.id);
    h.manager.reconcile(queued).await.unwrap();

    let after = h.store.get_call(call.id).await.unwrap();
    assert_eq!(after.status, CallStatus::Completed);
    assert_eq!(after.outcome, Some(CallOutcome::Interested));
    assert_eq!(after.sentiment, Some(Sentiment::Positive));
    assert_eq!(after.duration_seconds, 95);
    assert!(after.transcript.is_some());
    assert_eq!(after.notes.as_deref(), Some("Lead expressed interest"));
    assert!(after.ended_at.is_some());

    let lead = h.store.get_lead(lead.id, h.tenant_id).await.unwrap();
    assert_eq!(lead.status, LeadStatus::Interested);
}

#[tokio::test]
async fn test_reconcile_twice_is_idempotent() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    let call = seed_call(&h, lead.id, "ext-1").await;
    h.provider.set_detail(
        "ext-1",
        detail_with_lead_lines(&["No thanks, please stop calling me."]),
    );

    h.manager.reconcile(call.id).await.unwrap();
    let first = h.store.get_call(call.id).await.unwrap();

    h.manager.reconcile(call.id).await.unwrap();
    let second = h.store.get_call(call.id).await.unwrap();

    assert_eq!(h.provider.detail_fetches(), 2);
    assert_eq!(first.status, second.status);
    assert_eq!(first.outcome, second.outcome);
    assert_eq!(first.sentiment, second.sentiment);
    assert_eq!(first.duration_seconds, second.duration_seconds);
    assert_eq!(first.cost_cents, second.cost_cents);
    assert_eq!(first.transcript, second.transcript);
    assert_eq!(first.notes, second.notes);
    assert_eq!(first.ended_at, second.ended_at);

    let lead = h.store.get_lead(lead.id, h.tenant_id).await.unwrap();
    assert_eq!(lead.status, LeadStatus::NotInterested);
}

#[tokio::test]
async fn test_inconclusive_call_leaves_outcome_unset() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    let call = seed_call(&h, lead.id, "ext-1").await;
    h.provider.set_detail(
        "ext-1",
        detail_with_lead_lines(&["Hmm, let me think about it."]),
    );

    h.manager.reconcile(call.id).await.unwrap();

    let after = h.store.get_call(call.id).await.unwrap();
    assert_eq!(after.status, CallStatus::Completed);
    assert_eq!(after.outcome, None);
    assert_eq!(after.sentiment, Some(Sentiment::Neutral));

    // A fresh lead still counts as contacted.
    let lead = h.store.get_lead(lead.id, h.tenant_id).await.unwrap();
    assert_eq!(lead.status, LeadStatus::Contacted);
}

#[tokio::test]
async fn test_inconclusive_never_downgrades_lead_status() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    h.store
        .update_lead_status(lead.id, h.tenant_id, LeadStatus::Interested)
        .await
        .unwrap();

    let call = seed_call(&h, lead.id, "ext-1").await;
    h.provider.set_detail(
        "ext-1",
        detail_with_lead_lines(&["Hmm, let me think about it."]),
    );
    h.manager.reconcile(call.id).await.unwrap();

    let lead = h.store.get_lead(lead.id, h.tenant_id).await.unwrap();
    assert_eq!(lead.status, LeadStatus::Interested);
}

#[tokio::test]
async fn test_voicemail_appends_lead_note_without_status_change() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    let call = seed_call(&h, lead.id, "ext-1").await;

    h.provider.set_detail(
        "ext-1",
        CallDetail {
            turns: vec![TranscriptTurn::lead(
                "You have reached the voicemail of Priya. Please leave a message.",
            )],
            transcript_text: Some("user: voicemail greeting".to_string()),
            duration_seconds: 22,
            answered_by: Some("voicemail".to_string()),
            recording_url: None,
            price_cents: None,
            completed: true,
            voice: None,
        },
    );
    h.manager.reconcile(call.id).await.unwrap();

    let after = h.store.get_call(call.id).await.unwrap();
    assert_eq!(after.outcome, Some(CallOutcome::Voicemail));
    assert_eq!(
        after.notes.as_deref(),
        Some("Voicemail detected - message left")
    );

    let lead = h.store.get_lead(lead.id, h.tenant_id).await.unwrap();
    assert_eq!(lead.status, LeadStatus::New);
    assert_eq!(
        lead.notes.as_deref(),
        Some("Voicemail detected - message left")
    );
}

#[tokio::test]
async fn test_empty_transcript_completed_is_no_answer() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    let call = seed_call(&h, lead.id, "ext-1").await;

    h.provider.set_detail(
        "ext-1",
        CallDetail {
            turns: Vec::new(),
            transcript_text: None,
            duration_seconds: 0,
            answered_by: Some("no-answer".to_string()),
            recording_url: None,
            price_cents: None,
            completed: true,
            voice: None,
        },
    );
    h.manager.reconcile(call.id).await.unwrap();

    let after = h.store.get_call(call.id).await.unwrap();
    assert_eq!(after.status, CallStatus::Completed);
    assert_eq!(after.outcome, Some(CallOutcome::NoAnswer));
    assert_eq!(after.notes.as_deref(), Some("No answer"));

    let lead = h.store.get_lead(lead.id, h.tenant_id).await.unwrap();
    assert_eq!(lead.notes.as_deref(), Some("No answer"));
}

#[tokio::test]
async fn test_late_detail_never_regresses_failed_call() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    let call = seed_call(&h, lead.id, "ext-1").await;

    let mut failed = envelope("call.failed", "ext-1");
    failed.error_message = Some("carrier rejected".to_string());
    h.manager.apply_event(&failed).await.unwrap();

    h.provider.set_detail(
        "ext-1",
        detail_with_lead_lines(&["Yes, that sounds good, I'd love a demo."]),
    );
    h.manager.reconcile(call.id).await.unwrap();

    let after = h.store.get_call(call.id).await.unwrap();
    assert_eq!(after.status, CallStatus::Failed);
    // Enrichment data still lands, the failure note stays.
    assert!(after.transcript.is_some());
    assert_eq!(after.notes.as_deref(), Some("carrier rejected"));
}

#[tokio::test]
async fn test_premature_sync_leaves_live_call_unclassified() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    let call = seed_call(&h, lead.id, "ext-1").await;

    // Sync while the call is still being placed: nothing elapsed yet.
    h.provider.set_detail(
        "ext-1",
        CallDetail {
            turns: Vec::new(),
            transcript_text: None,
            duration_seconds: 0,
            answered_by: None,
            recording_url: None,
            price_cents: None,
            completed: false,
            voice: None,
        },
    );
    h.manager.reconcile(call.id).await.unwrap();

    let after = h.store.get_call(call.id).await.unwrap();
    assert_eq!(after.status, CallStatus::Pending);
    assert_eq!(after.outcome, None);
    assert_eq!(after.sentiment, None);
    assert_eq!(after.notes, None);
    let lead_row = h.store.get_lead(lead.id, h.tenant_id).await.unwrap();
    assert_eq!(lead_row.status, LeadStatus::New);

    // The call finishes with an inconclusive conversation. Had the early
    // sync stamped no_answer, it would be stuck now; outcome stays unset.
    h.provider.set_detail(
        "ext-1",
        detail_with_lead_lines(&["Hmm, let me think about it."]),
    );
    h.manager.reconcile(call.id).await.unwrap();

    let after = h.store.get_call(call.id).await.unwrap();
    assert_eq!(after.status, CallStatus::Completed);
    assert_eq!(after.outcome, None);
    assert_eq!(after.sentiment, Some(Sentiment::Neutral));
}

#[tokio::test]
async fn test_reconcile_without_external_id_is_rejected() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    let call = Call::pending(h.tenant_id, lead.id, None);
    let call = h.store.create_call(call).await.unwrap();

    let err = h.manager.reconcile(call.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::MissingExternalId(id) if id == call.id));

    let err = h.manager.reconcile(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::CallNotFound(_)));
}

#[tokio::test]
async fn test_concurrent_reconcile_of_same_call_is_serialized() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    let call = seed_call(&h, lead.id, "ext-1").await;
    h.provider.set_detail(
        "ext-1",
        detail_with_lead_lines(&["I'm busy right now, maybe call back next week."]),
    );

    let (a, b) = tokio::join!(h.manager.reconcile(call.id), h.manager.reconcile(call.id));
    a.unwrap();
    b.unwrap();

    let after = h.store.get_call(call.id).await.unwrap();
    assert_eq!(after.status, CallStatus::Completed);
    assert_eq!(after.outcome, Some(CallOutcome::Callback));
    let lead = h.store.get_lead(lead.id, h.tenant_id).await.unwrap();
    assert_eq!(lead.status, LeadStatus::Callback);
}

// ============================================================================
// Manual status updates
// ============================================================================

#[tokio::test]
async fn test_manual_status_update_stamps_timestamps() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    let call = seed_call(&h, lead.id, "ext-1").await;

    let updated = h
        .manager
        .set_status(call.id, CallStatus::InProgress)
        .await
        .unwrap();
    assert_eq!(updated.status, CallStatus::InProgress);
    assert!(updated.started_at.is_some());
    let started_at = updated.started_at;

    let updated = h
        .manager
        .set_status(call.id, CallStatus::Failed)
        .await
        .unwrap();
    assert_eq!(updated.status, CallStatus::Failed);
    assert!(updated.ended_at.is_some());
    assert_eq!(updated.started_at, started_at);
    // Manual updates move status only; classification stays untouched.
    assert_eq!(updated.outcome, None);
}

#[tokio::test]
async fn test_manual_status_update_refuses_terminal_calls() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    let call = seed_call(&h, lead.id, "ext-1").await;

    h.manager
        .apply_event(&envelope("call.failed", "ext-1"))
        .await
        .unwrap();

    let err = h
        .manager
        .set_status(call.id, CallStatus::InProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    let after = h.store.get_call(call.id).await.unwrap();
    assert_eq!(after.status, CallStatus::Failed);

    let err = h
        .manager
        .set_status(Uuid::new_v4(), CallStatus::Failed)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::CallNotFound(_)));
}

// ============================================================================
// Webhook path vs explicit sync parity
// ============================================================================

#[tokio::test]
async fn test_webhook_and_explicit_sync_agree_on_inconclusive() {
    let mut h = harness();
    let lead_a = seed_lead(&h.store, h.tenant_id).await;
    let lead_b = seed_lead(&h.store, h.tenant_id).await;
    let via_webhook = seed_call(&h, lead_a.id, "ext-a").await;
    let via_sync = seed_call(&h, lead_b.id, "ext-b").await;

    let detail = detail_with_lead_lines(&["Hmm, let me think about it."]);
    h.provider.set_detail("ext-a", detail.clone());
    h.provider.set_detail("ext-b", detail);

    h.manager
        .apply_event(&envelope("call.completed", "ext-a"))
        .await
        .unwrap();
    let queued = h.enrichment_rx.recv().await.unwrap();
    h.manager.reconcile(queued).await.unwrap();

    h.manager.reconcile(via_sync.id).await.unwrap();

    let a = h.store.get_call(via_webhook.id).await.unwrap();
    let b = h.store.get_call(via_sync.id).await.unwrap();
    assert_eq!(a.status, b.status);
    assert_eq!(a.outcome, b.outcome);
    assert_eq!(a.sentiment, b.sentiment);
    assert_eq!(a.notes, b.notes);
    assert_eq!(a.cost_cents, b.cost_cents);
}

// ============================================================================
// Batch sync
// ============================================================================

#[tokio::test]
async fn test_sync_pending_isolates_per_call_errors() {
    let h = harness();
    let lead_a = seed_lead(&h.store, h.tenant_id).await;
    let lead_b = seed_lead(&h.store, h.tenant_id).await;
    let good = seed_call(&h, lead_a.id, "ext-good").await;
    let bad = seed_call(&h, lead_b.id, "ext-bad").await;
    h.provider.set_detail(
        "ext-good",
        detail_with_lead_lines(&["Yes, that sounds good, I'd love a demo."]),
    );
    // "ext-bad" has no detail — the fake provider rejects it.

    let report = h.manager.sync_pending(h.tenant_id, 4).await.unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.synced, 1);
    assert_eq!(report.errored, 1);

    let good = h.store.get_call(good.id).await.unwrap();
    assert_eq!(good.status, CallStatus::Completed);

    // The errored call stays on the worklist for the next run.
    let bad = h.store.get_call(bad.id).await.unwrap();
    assert_eq!(bad.status, CallStatus::Pending);
    let pending = h.store.calls_awaiting_sync(h.tenant_id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, bad.id);
}

#[tokio::test]
async fn test_sync_pending_skips_terminal_and_unlinked_calls() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    seed_call(&h, lead.id, "ext-1").await;

    // Terminal call and a call never handed to the provider: not on the worklist.
    let mut failed = Call::pending(h.tenant_id, lead.id, None);
    failed.external_call_id = Some("ext-failed".to_string());
    failed.status = CallStatus::Failed;
    h.store.create_call(failed).await.unwrap();
    h.store
        .create_call(Call::pending(h.tenant_id, lead.id, None))
        .await
        .unwrap();

    let worklist = h.store.calls_awaiting_sync(h.tenant_id).await.unwrap();
    assert_eq!(worklist.len(), 1);
    assert_eq!(worklist[0].external_call_id.as_deref(), Some("ext-1"));
}

// ============================================================================
// Initiation
// ============================================================================

#[tokio::test]
async fn test_initiate_creates_pending_call_with_provider_id() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;

    let call = h
        .manager
        .initiate(
            h.tenant_id,
            InitiateCallParams {
                lead_id: lead.id,
                campaign_id: None,
                prompt_override: None,
                voice: None,
                first_sentence: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(call.status, CallStatus::Pending);
    assert_eq!(call.external_call_id.as_deref(), Some("prov-0"));
    assert_eq!(h.provider.initiated_count(), 1);

    let stored = h.store.get_call(call.id).await.unwrap();
    assert_eq!(stored.lead_id, lead.id);
}

#[tokio::test]
async fn test_initiate_rejects_do_not_call_and_undialable_leads() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;
    h.store
        .update_lead_status(lead.id, h.tenant_id, LeadStatus::DoNotCall)
        .await
        .unwrap();

    let params = InitiateCallParams {
        lead_id: lead.id,
        campaign_id: None,
        prompt_override: None,
        voice: None,
        first_sentence: None,
    };
    let err = h.manager.initiate(h.tenant_id, params.clone()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    let mut no_phone = outdial::types::Lead::new(h.tenant_id, "Sam", "Lee", "N/A");
    no_phone.status = LeadStatus::New;
    h.store.insert_lead(no_phone.clone()).await;
    let err = h
        .manager
        .initiate(
            h.tenant_id,
            InitiateCallParams {
                lead_id: no_phone.id,
                ..params
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Validation(_)));

    // Nothing reached the provider.
    assert_eq!(h.provider.initiated_count(), 0);
}

#[tokio::test]
async fn test_initiate_is_tenant_scoped() {
    let h = harness();
    let lead = seed_lead(&h.store, h.tenant_id).await;

    let err = h
        .manager
        .initiate(
            Uuid::new_v4(),
            InitiateCallParams {
                lead_id: lead.id,
                campaign_id: None,
                prompt_override: None,
                voice: None,
                first_sentence: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Store(_)));
}
