//! In-memory reference store.
//!
//! A single `RwLock` over the whole dataset gives read-committed visibility
//! and makes the launch write (N call rows + campaign status) trivially
//! atomic. Suitable for tests and single-process deployments.

use super::{CallFilter, Store, StoreError};
use crate::types::{
    Call, CallOutcome, CallPatch, CallStatus, Campaign, CampaignStats, CampaignStatus, Lead,
    LeadStatus,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    leads: HashMap<Uuid, Lead>,
    campaigns: HashMap<Uuid, Campaign>,
    /// campaign id → associated lead ids
    campaign_leads: HashMap<Uuid, HashSet<Uuid>>,
    calls: HashMap<Uuid, Call>,
    /// provider call id → internal call id (uniqueness index)
    calls_by_external: HashMap<String, Uuid>,
}

/// Reference [`Store`] implementation backed by process memory.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Seeding helpers for tests and bootstrap. Lead/campaign CRUD itself is
    // owned by the surrounding system, not this engine.

    pub async fn insert_lead(&self, lead: Lead) {
        self.inner.write().await.leads.insert(lead.id, lead);
    }

    pub async fn insert_campaign(&self, campaign: Campaign) {
        let mut inner = self.inner.write().await;
        inner.campaign_leads.entry(campaign.id).or_default();
        inner.campaigns.insert(campaign.id, campaign);
    }

    pub async fn add_lead_to_campaign(&self, campaign_id: Uuid, lead_id: Uuid) {
        self.inner
            .write()
            .await
            .campaign_leads
            .entry(campaign_id)
            .or_default()
            .insert(lead_id);
    }
}

fn matches_filter(call: &Call, filter: &CallFilter) -> bool {
    filter.status.is_none_or(|s| call.status == s)
        && filter.outcome.is_none_or(|o| call.outcome == Some(o))
        && filter.campaign_id.is_none_or(|c| call.campaign_id == Some(c))
        && filter.lead_id.is_none_or(|l| call.lead_id == l)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get_lead(&self, id: Uuid, tenant_id: Uuid) -> Result<Lead, StoreError> {
        self.inner
            .read()
            .await
            .leads
            .get(&id)
            .filter(|l| l.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("lead"))
    }

    async fn update_lead_status(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        status: LeadStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let lead = inner
            .leads
            .get_mut(&id)
            .filter(|l| l.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::not_found("lead"))?;
        lead.status = status;
        lead.updated_at = Utc::now();
        Ok(())
    }

    async fn append_lead_note(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        note: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let lead = inner
            .leads
            .get_mut(&id)
            .filter(|l| l.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::not_found("lead"))?;
        lead.notes = Some(match lead.notes.take() {
            Some(existing) => format!("{existing}\n{note}"),
            None => note.to_string(),
        });
        lead.updated_at = Utc::now();
        Ok(())
    }

    async fn get_campaign(&self, id: Uuid, tenant_id: Uuid) -> Result<Campaign, StoreError> {
        self.inner
            .read()
            .await
            .campaigns
            .get(&id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("campaign"))
    }

    async fn set_campaign_status(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        status: CampaignStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let campaign = inner
            .campaigns
            .get_mut(&id)
            .filter(|c| c.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::not_found("campaign"))?;
        campaign.status = status;
        campaign.updated_at = Utc::now();
        Ok(())
    }

    async fn campaign_lead_ids(&self, campaign_id: Uuid) -> Result<HashSet<Uuid>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .campaign_leads
            .get(&campaign_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn called_lead_ids(&self, campaign_id: Uuid) -> Result<HashSet<Uuid>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .calls
            .values()
            .filter(|c| c.campaign_id == Some(campaign_id))
            .map(|c| c.lead_id)
            .collect())
    }

    async fn campaign_stats(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<CampaignStats, StoreError> {
        let inner = self.inner.read().await;
        inner
            .campaigns
            .get(&campaign_id)
            .filter(|c| c.tenant_id == tenant_id)
            .ok_or_else(|| StoreError::not_found("campaign"))?;

        let total_leads = inner
            .campaign_leads
            .get(&campaign_id)
            .map_or(0, HashSet::len);
        let campaign_calls: Vec<&Call> = inner
            .calls
            .values()
            .filter(|c| c.campaign_id == Some(campaign_id))
            .collect();
        let called = campaign_calls.len();
        let answered = campaign_calls
            .iter()
            .filter(|c| c.status == CallStatus::Completed)
            .count();
        let interested = campaign_calls
            .iter()
            .filter(|c| c.outcome == Some(CallOutcome::Interested))
            .count();

        let conversion_rate = if called > 0 {
            round1(interested as f64 / called as f64 * 100.0)
        } else {
            0.0
        };
        let progress_percentage = if total_leads > 0 {
            round1(called as f64 / total_leads as f64 * 100.0)
        } else {
            0.0
        };

        Ok(CampaignStats {
            total_leads,
            called,
            answered,
            interested,
            conversion_rate,
            progress_percentage,
        })
    }

    async fn create_call(&self, call: Call) -> Result<Call, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(ref external_id) = call.external_call_id {
            if inner.calls_by_external.contains_key(external_id) {
                return Err(StoreError::DuplicateExternalId(external_id.clone()));
            }
            inner
                .calls_by_external
                .insert(external_id.clone(), call.id);
        }
        inner.calls.insert(call.id, call.clone());
        Ok(call)
    }

    async fn create_calls_and_activate(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
        calls: Vec<Call>,
    ) -> Result<(), StoreError> {
        // Single write-lock section: either everything lands or nothing does.
        let mut inner = self.inner.write().await;
        if !inner
            .campaigns
            .get(&campaign_id)
            .is_some_and(|c| c.tenant_id == tenant_id)
        {
            return Err(StoreError::not_found("campaign"));
        }

        // Re-check dedup under the write lock: a concurrent launch may have
        // queued some of these leads after the caller took its snapshot.
        let already_called: HashSet<Uuid> = inner
            .calls
            .values()
            .filter(|c| c.campaign_id == Some(campaign_id))
            .map(|c| c.lead_id)
            .collect();
        for call in calls {
            if already_called.contains(&call.lead_id) {
                continue;
            }
            inner.calls.insert(call.id, call);
        }
        if let Some(campaign) = inner.campaigns.get_mut(&campaign_id) {
            campaign.status = CampaignStatus::Active;
            campaign.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_call(&self, id: Uuid) -> Result<Call, StoreError> {
        self.inner
            .read()
            .await
            .calls
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("call"))
    }

    async fn find_call_by_external_id(
        &self,
        external_call_id: &str,
    ) -> Result<Option<Call>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .calls_by_external
            .get(external_call_id)
            .and_then(|id| inner.calls.get(id))
            .cloned())
    }

    async fn update_call(&self, id: Uuid, patch: CallPatch) -> Result<Call, StoreError> {
        let mut inner = self.inner.write().await;

        if let Some(ref external_id) = patch.external_call_id {
            if let Some(owner) = inner.calls_by_external.get(external_id) {
                if *owner != id {
                    return Err(StoreError::DuplicateExternalId(external_id.clone()));
                }
            }
        }

        let call = inner
            .calls
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("call"))?;
        call.apply(&patch);
        let updated = call.clone();

        if let Some(external_id) = patch.external_call_id {
            inner.calls_by_external.insert(external_id, id);
        }
        Ok(updated)
    }

    async fn list_calls(
        &self,
        tenant_id: Uuid,
        filter: &CallFilter,
    ) -> Result<Vec<Call>, StoreError> {
        let inner = self.inner.read().await;
        let mut calls: Vec<Call> = inner
            .calls
            .values()
            .filter(|c| c.tenant_id == tenant_id && matches_filter(c, filter))
            .cloned()
            .collect();
        calls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(calls)
    }

    async fn calls_awaiting_sync(&self, tenant_id: Uuid) -> Result<Vec<Call>, StoreError> {
        let inner = self.inner.read().await;
        let mut calls: Vec<Call> = inner
            .calls
            .values()
            .filter(|c| {
                c.tenant_id == tenant_id
                    && !c.status.is_terminal()
                    && c.external_call_id.is_some()
            })
            .cloned()
            .collect();
        calls.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(calls)
    }
}
