//! outdial: Call Lifecycle & Outcome Reconciliation Engine
//!
//! Drives outbound AI phone calls from initiation to a classified outcome.
//!
//! ## Architecture
//!
//! - **Lifecycle Manager**: call state machine, webhook ingestion, reconciliation
//! - **Classifier**: heuristic transcript outcome and sentiment detection
//! - **Provider Gateway**: HTTP client for the voice-calling provider
//! - **Campaign Launcher**: dedup-safe bulk call queueing
//! - **Store**: persistence seam with an in-memory reference implementation

pub mod api;
pub mod campaign;
pub mod classifier;
pub mod config;
pub mod lifecycle;
pub mod phone;
pub mod provider;
pub mod store;
pub mod types;

// Re-export configuration
pub use config::{AppConfig, ProviderConfig};

// Re-export commonly used types
pub use types::{
    Call, CallOutcome, CallPatch, CallStatus, Campaign, CampaignStats, CampaignStatus, Lead,
    LeadStatus, Sentiment, Speaker, TranscriptTurn,
};

// Re-export the lifecycle surface
pub use lifecycle::{
    run_enrichment_worker, EventAck, InitiateCallParams, LifecycleError, LifecycleManager,
    ReconcileReport, SyncReport, WebhookEnvelope,
};

// Re-export campaign launch
pub use campaign::{CampaignLauncher, LaunchReport};

// Re-export the provider gateway
pub use provider::{
    CallDetail, CallSummary, DisabledGateway, GatewayError, OutboundCallRequest, ProviderApi,
    ProviderClient,
};

// Re-export the store seam
pub use store::{CallFilter, MemoryStore, Store, StoreError};

// Re-export phone normalization
pub use phone::normalize_phone;
