//! High-level orchestration over the external dashboard services.
//!
//! Loads the event catalog and profiles, keeps API panels synchronised,
//! and refreshes sidebar alert counts. Background work (panel sync, alert
//! refresh) logs and swallows its failures.

use std::collections::{HashMap, HashSet};

use crate::analysis::flow_graph::build_flow_graph;
use crate::analysis::types::{FlowGraph, FlowInput, Stage};
use crate::services::{
    DateRange, EventCatalogEntry, EventClass, EventQueryService, FeatureScope, PanelSyncService,
    ProfileStore, ServiceError,
};
use crate::config::{Config, ValidationError};
use crate::sidebar::ProfileSidebar;

pub struct Dashboard<'a, S: ?Sized, Q: ?Sized, P: ?Sized> {
    scope: FeatureScope,
    variant: String,
    profile_store: &'a S,
    event_service: &'a Q,
    sync_service: &'a P,
    catalog: Vec<EventCatalogEntry>,
    pub sidebar: ProfileSidebar,
}

impl<'a, S, Q, P> Dashboard<'a, S, Q, P>
where
    S: ProfileStore + ?Sized,
    Q: EventQueryService + ?Sized,
    P: PanelSyncService + ?Sized,
{
    pub fn new(
        scope: FeatureScope,
        variant: impl Into<String>,
        profile_store: &'a S,
        event_service: &'a Q,
        sync_service: &'a P,
    ) -> Self {
        Self {
            scope,
            variant: variant.into(),
            profile_store,
            event_service,
            sync_service,
            catalog: Vec::new(),
            sidebar: ProfileSidebar::default(),
        }
    }

    pub fn catalog(&self) -> &[EventCatalogEntry] {
        &self.catalog
    }

    /// Fetch the event catalog for this scope
    pub fn load_catalog(&mut self) -> Result<&[EventCatalogEntry], ServiceError> {
        self.catalog = self.event_service.get_events_list(&self.scope)?;
        log::info!("Loaded {} catalog events for {}", self.catalog.len(), self.scope);
        Ok(&self.catalog)
    }

    fn fetch_profiles(&mut self) -> Result<usize, ServiceError> {
        let list = self.profile_store.get_profiles(&self.scope, &self.variant)?;
        if !list.success {
            return Err(ServiceError::BadResponse {
                service: "profile store".to_string(),
                message: format!("get_profiles failed for {}", self.scope),
            });
        }
        let count = list.items.len();
        self.sidebar.set_profiles(list.items);
        Ok(count)
    }

    /// Fetch profiles, then sync API panels and re-fetch to observe the sync.
    ///
    /// Only the first fetch can fail the call.
    pub fn load_profiles(&mut self) -> Result<usize, ServiceError> {
        let count = self.fetch_profiles()?;
        log::info!("Loaded {} profiles for {}", count, self.scope);

        if self.sync_api_panels() {
            match self.fetch_profiles() {
                Ok(count) => return Ok(count),
                Err(e) => log::warn!("Re-fetching profiles after panel sync failed: {}", e),
            }
        }
        Ok(count)
    }

    /// Upsert panels for API catalog events. Returns true when the sync call succeeded.
    fn sync_api_panels(&self) -> bool {
        let api_events: Vec<EventCatalogEntry> = self
            .catalog
            .iter()
            .filter(|e| e.is_api_event)
            .cloned()
            .collect();
        if api_events.is_empty() {
            return false;
        }

        match self.sync_service.auto_sync_api_panels(&self.scope, &api_events) {
            Ok(()) => {
                log::debug!("Synced {} API panels", api_events.len());
                true
            }
            Err(e) => {
                log::warn!("API panel sync failed: {}", e);
                false
            }
        }
    }

    fn class_of(&self, event_id: &str) -> EventClass {
        self.catalog
            .iter()
            .find(|e| e.event_id == event_id)
            .map(|e| e.class())
            .unwrap_or(EventClass::Regular)
    }

    /// Fetch alert counts for regular and API events concurrently and merge them.
    ///
    /// A failed fetch contributes no counts.
    pub fn fetch_alert_counts(&self, event_ids: &[String], range: &DateRange) -> HashMap<String, u64> {
        let (api, regular): (Vec<String>, Vec<String>) = event_ids
            .iter()
            .cloned()
            .partition(|id| self.class_of(id) == EventClass::Api);

        let event_service = self.event_service;
        let fetch = |ids: &[String], class: EventClass| -> HashMap<String, u64> {
            if ids.is_empty() {
                return HashMap::new();
            }
            match event_service.get_alert_list(ids, range, true, class) {
                Ok(counts) => counts,
                Err(e) => {
                    log::warn!("Alert count fetch for {:?} events failed: {}", class, e);
                    HashMap::new()
                }
            }
        };

        let (mut merged, api_counts) = rayon::join(
            || fetch(&regular, EventClass::Regular),
            || fetch(&api, EventClass::Api),
        );
        merged.extend(api_counts);
        merged
    }

    /// Refresh the sidebar's alert counts for every referenced event
    pub fn refresh_alert_counts(&mut self, range: &DateRange) -> bool {
        let ticket = self.sidebar.issue_refresh();

        let mut seen = HashSet::new();
        let event_ids: Vec<String> = self
            .sidebar
            .profiles()
            .iter()
            .flat_map(|p| p.event_ids())
            .filter(|id| seen.insert(id.to_string()))
            .map(String::from)
            .collect();

        let counts = self.fetch_alert_counts(&event_ids, range);
        self.sidebar.apply_alert_counts(ticket, counts)
    }

    /// Display names from the catalog, keyed by event id
    pub fn labels(&self) -> HashMap<String, String> {
        self.catalog
            .iter()
            .map(|e| (e.event_id.clone(), e.name.clone()))
            .collect()
    }

    fn catalog_ids(&self) -> HashSet<String> {
        self.catalog.iter().map(|e| e.event_id.clone()).collect()
    }

    /// Build a user-flow panel graph using catalog names as labels.
    ///
    /// With `flow.strict_stage_events` set, stages referencing events outside
    /// the loaded catalog are rejected.
    pub fn flow_graph(
        &self,
        input: &FlowInput,
        stages: &[Stage],
        config: &Config,
    ) -> Result<FlowGraph, ValidationError> {
        config.enforce_stage_events(stages, &self.catalog_ids())?;
        Ok(build_flow_graph(input, stages, &self.labels(), &config.flow_settings()))
    }
}
