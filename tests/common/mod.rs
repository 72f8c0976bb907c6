//! Shared fixtures: a programmable fake provider gateway and store seeding.
#![allow(dead_code)]

use outdial::provider::{
    CallDetail, CallSummary, GatewayError, OutboundCallRequest, ProviderApi,
};
use outdial::store::MemoryStore;
use outdial::types::{Campaign, Lead, TranscriptTurn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// In-memory provider double. Call details are keyed by provider call id;
/// unknown ids yield a 404-style provider rejection.
#[derive(Default)]
pub struct FakeProvider {
    details: Mutex<HashMap<String, CallDetail>>,
    detail_fetches: AtomicU64,
    initiated: AtomicU64,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_detail(&self, provider_call_id: &str, detail: CallDetail) {
        self.details
            .lock()
            .unwrap()
            .insert(provider_call_id.to_string(), detail);
    }

    pub fn detail_fetches(&self) -> u64 {
        self.detail_fetches.load(Ordering::SeqCst)
    }

    pub fn initiated_count(&self) -> u64 {
        self.initiated.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ProviderApi for FakeProvider {
    async fn initiate_call(&self, _request: &OutboundCallRequest) -> Result<String, GatewayError> {
        let n = self.initiated.fetch_add(1, Ordering::SeqCst);
        Ok(format!("prov-{n}"))
    }

    async fn get_call_detail(&self, provider_call_id: &str) -> Result<CallDetail, GatewayError> {
        self.detail_fetches.fetch_add(1, Ordering::SeqCst);
        self.details
            .lock()
            .unwrap()
            .get(provider_call_id)
            .cloned()
            .ok_or(GatewayError::Provider {
                status: 404,
                message: format!("call {provider_call_id} not found"),
            })
    }

    async fn list_calls(&self, _limit: u32, _offset: u32) -> Result<Vec<CallSummary>, GatewayError> {
        Ok(Vec::new())
    }
}

/// A completed call detail with the given lead-side lines.
pub fn detail_with_lead_lines(lines: &[&str]) -> CallDetail {
    let mut turns = vec![TranscriptTurn::agent("Hi, this is Alex from Acme.")];
    for line in lines {
        turns.push(TranscriptTurn::lead(*line));
    }
    let transcript_text = turns
        .iter()
        .map(|t| {
            let who = match t.speaker {
                outdial::types::Speaker::Agent => "assistant",
                outdial::types::Speaker::Lead => "user",
            };
            format!("{who}: {}", t.text)
        })
        .collect::<Vec<_>>()
        .join("\n");
    CallDetail {
        turns,
        transcript_text: Some(transcript_text),
        duration_seconds: 95,
        answered_by: Some("human".to_string()),
        recording_url: Some("https://recordings.example/1.mp3".to_string()),
        price_cents: None,
        completed: true,
        voice: Some("nat".to_string()),
    }
}

/// Seed one lead and return it.
pub async fn seed_lead(store: &MemoryStore, tenant_id: Uuid) -> Lead {
    let lead = Lead::new(tenant_id, "Priya", "Sharma", "9876543210");
    store.insert_lead(lead.clone()).await;
    lead
}

/// Seed a campaign with `n` leads; returns the campaign and lead ids.
pub async fn seed_campaign(store: &MemoryStore, tenant_id: Uuid, n: usize) -> (Campaign, Vec<Uuid>) {
    let campaign = Campaign::new(tenant_id, "Q3 Outreach");
    store.insert_campaign(campaign.clone()).await;

    let mut lead_ids = Vec::with_capacity(n);
    for i in 0..n {
        let lead = Lead::new(tenant_id, "Lead", &format!("{i}"), &format!("212555{i:04}"));
        lead_ids.push(lead.id);
        store.insert_lead(lead).await;
        store.add_lead_to_campaign(campaign.id, lead_ids[i]).await;
    }
    (campaign, lead_ids)
}
