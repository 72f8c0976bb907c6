//! Store seam — the persistence collaborator the engine writes through.
//!
//! The engine does not own persistence design: any durable backend with
//! per-tenant row isolation, read-committed reads, and an atomic multi-row
//! write for the campaign launch satisfies [`Store`]. [`memory::MemoryStore`]
//! is the reference implementation used by the binary and the test suite.

pub mod memory;

pub use memory::MemoryStore;

use crate::types::{
    Call, CallOutcome, CallPatch, CallStatus, Campaign, CampaignStats, CampaignStatus, Lead,
    LeadStatus,
};
use std::collections::HashSet;
use uuid::Uuid;

/// Store error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    /// The external provider call id is unique across all calls.
    #[error("duplicate external call id: {0}")]
    DuplicateExternalId(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }
}

/// Optional filters for call listings.
#[derive(Debug, Clone, Default)]
pub struct CallFilter {
    pub status: Option<CallStatus>,
    pub outcome: Option<CallOutcome>,
    pub campaign_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
}

/// Persistence operations consumed by the engine.
///
/// Tenant-scoped reads never return another tenant's rows. Lookups keyed by
/// provider call id are unscoped: webhook events carry no tenant identity.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ── Leads ───────────────────────────────────────────────────────────

    async fn get_lead(&self, id: Uuid, tenant_id: Uuid) -> Result<Lead, StoreError>;

    async fn update_lead_status(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        status: LeadStatus,
    ) -> Result<(), StoreError>;

    /// Append a line to the lead's free-text notes.
    async fn append_lead_note(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        note: &str,
    ) -> Result<(), StoreError>;

    // ── Campaigns ───────────────────────────────────────────────────────

    async fn get_campaign(&self, id: Uuid, tenant_id: Uuid) -> Result<Campaign, StoreError>;

    async fn set_campaign_status(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        status: CampaignStatus,
    ) -> Result<(), StoreError>;

    /// Full lead-id association set of a campaign.
    async fn campaign_lead_ids(&self, campaign_id: Uuid) -> Result<HashSet<Uuid>, StoreError>;

    /// Lead ids with at least one call row for this campaign, any status.
    async fn called_lead_ids(&self, campaign_id: Uuid) -> Result<HashSet<Uuid>, StoreError>;

    async fn campaign_stats(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<CampaignStats, StoreError>;

    // ── Calls ───────────────────────────────────────────────────────────

    async fn create_call(&self, call: Call) -> Result<Call, StoreError>;

    /// Atomic launch write: persist the call rows and flip the campaign to
    /// `Active`, or persist nothing. Rows whose lead already has a call for
    /// this campaign are skipped inside the write, so two racing launches
    /// cannot double-queue a lead.
    async fn create_calls_and_activate(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
        calls: Vec<Call>,
    ) -> Result<(), StoreError>;

    async fn get_call(&self, id: Uuid) -> Result<Call, StoreError>;

    async fn find_call_by_external_id(
        &self,
        external_call_id: &str,
    ) -> Result<Option<Call>, StoreError>;

    /// Apply a typed patch to a call; returns the updated record.
    async fn update_call(&self, id: Uuid, patch: CallPatch) -> Result<Call, StoreError>;

    async fn list_calls(
        &self,
        tenant_id: Uuid,
        filter: &CallFilter,
    ) -> Result<Vec<Call>, StoreError>;

    /// Non-terminal calls with a provider call id — the batch sync worklist.
    async fn calls_awaiting_sync(&self, tenant_id: Uuid) -> Result<Vec<Call>, StoreError>;
}
