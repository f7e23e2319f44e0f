//! Contracts for the external collaborators the dashboard consumes.
//!
//! Persistence, event queries and panel synchronisation live in other
//! services. This module only describes their operations so the dashboard
//! logic can be driven by any implementation, including test doubles.

pub mod types;

use std::collections::HashMap;

pub use types::*;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Request rejected by {service}: {message}")]
    Rejected { service: String, message: String },
    #[error("Unexpected response from {service}: {message}")]
    BadResponse { service: String, message: String },
}

/// Saved dashboard profiles
pub trait ProfileStore {
    fn get_profiles(&self, scope: &FeatureScope, variant: &str) -> Result<ProfileList, ServiceError>;

    /// Returns whether the store reported success
    fn delete_profile(&self, profile_id: &str, scope: &FeatureScope) -> Result<bool, ServiceError>;
}

/// Event catalog and alert counts. Implementations are queried from several threads at once.
pub trait EventQueryService: Sync {
    fn get_events_list(&self, scope: &FeatureScope) -> Result<Vec<EventCatalogEntry>, ServiceError>;

    fn get_alert_list(
        &self,
        event_ids: &[String],
        range: &DateRange,
        aggregate: bool,
        class: EventClass,
    ) -> Result<HashMap<String, u64>, ServiceError>;
}

/// Keeps API panels in step with the API event catalog.
///
/// The call is an idempotent upsert; its effect is observed by re-fetching
/// profiles, not from a return value.
pub trait PanelSyncService {
    fn auto_sync_api_panels(
        &self,
        scope: &FeatureScope,
        api_events: &[EventCatalogEntry],
    ) -> Result<(), ServiceError>;
}
