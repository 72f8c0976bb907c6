//! Campaign launch — queue calls for every not-yet-called lead.

use crate::store::{Store, StoreError};
use crate::types::Call;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// What one launch did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchReport {
    pub campaign_id: Uuid,
    pub total_leads: usize,
    pub already_called: usize,
    pub queued: usize,
}

/// Launches campaigns. Stateless besides the store handle; safe to share.
pub struct CampaignLauncher {
    store: Arc<dyn Store>,
}

impl CampaignLauncher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Queue a `Pending` call for every campaign lead that has no call row
    /// yet, then activate the campaign — both in one atomic store write.
    ///
    /// Relaunching is safe: leads with any prior call row for this campaign
    /// are skipped regardless of how that call went. A launch with nothing
    /// left to queue is a no-op and does not touch campaign status.
    pub async fn launch(
        &self,
        campaign_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<LaunchReport, StoreError> {
        self.store.get_campaign(campaign_id, tenant_id).await?;

        let all_leads = self.store.campaign_lead_ids(campaign_id).await?;
        let called = self.store.called_lead_ids(campaign_id).await?;

        let to_call: Vec<Uuid> = all_leads.difference(&called).copied().collect();
        let report = LaunchReport {
            campaign_id,
            total_leads: all_leads.len(),
            already_called: all_leads.len() - to_call.len(),
            queued: to_call.len(),
        };

        if to_call.is_empty() {
            info!(campaign_id = %campaign_id, "Launch found no uncalled leads; nothing queued");
            return Ok(report);
        }

        let calls: Vec<Call> = to_call
            .into_iter()
            .map(|lead_id| Call::pending(tenant_id, lead_id, Some(campaign_id)))
            .collect();
        self.store
            .create_calls_and_activate(campaign_id, tenant_id, calls)
            .await?;

        info!(
            campaign_id = %campaign_id,
            queued = report.queued,
            already_called = report.already_called,
            "Campaign launched"
        );
        Ok(report)
    }
}
