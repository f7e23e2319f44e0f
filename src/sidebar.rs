//! Profile sidebar state.
//!
//! Holds the fetched profiles, the search box, the two-step delete flow and
//! the alert counts shown next to each profile. Failures that the user
//! should see are queued as notices; nothing is retried.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::services::{FeatureScope, Profile, ProfileStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Non-blocking message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Identifies one alert-count refresh. Later tickets supersede earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshTicket(u64);

#[derive(Debug, Default)]
pub struct ProfileSidebar {
    profiles: Vec<Profile>,
    search: String,
    selected: Option<String>,
    pending_delete: Option<String>,
    notices: Vec<Notice>,
    alert_counts: HashMap<String, u64>,
    latest_ticket: u64,
}

impl ProfileSidebar {
    pub fn new(profiles: Vec<Profile>) -> Self {
        Self {
            profiles,
            ..Self::default()
        }
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Replace the profile list after a re-fetch, dropping state for vanished profiles
    pub fn set_profiles(&mut self, profiles: Vec<Profile>) {
        let exists = |id: &Option<String>| {
            id.as_ref()
                .map_or(true, |id| profiles.iter().any(|p| &p.profile_id == id))
        };
        if !exists(&self.selected) {
            self.selected = None;
        }
        if !exists(&self.pending_delete) {
            self.pending_delete = None;
        }
        self.profiles = profiles;
    }

    pub fn set_search(&mut self, query: &str) {
        self.search = query.trim().to_lowercase();
    }

    /// Profiles whose name contains the search text, case-insensitively
    pub fn visible_profiles(&self) -> Vec<&Profile> {
        self.profiles
            .iter()
            .filter(|p| self.search.is_empty() || p.name.to_lowercase().contains(&self.search))
            .collect()
    }

    pub fn select(&mut self, profile_id: &str) -> bool {
        if self.find(profile_id).is_some() {
            self.selected = Some(profile_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn selected(&self) -> Option<&Profile> {
        self.selected.as_deref().and_then(|id| self.find(id))
    }

    fn find(&self, profile_id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.profile_id == profile_id)
    }

    /// First step of deletion: ask for confirmation
    pub fn request_delete(&mut self, profile_id: &str) -> bool {
        if self.find(profile_id).is_some() {
            self.pending_delete = Some(profile_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn pending_delete(&self) -> Option<&Profile> {
        self.pending_delete.as_deref().and_then(|id| self.find(id))
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Second step of deletion. Returns true when the profile was removed.
    pub fn confirm_delete<S: ProfileStore + ?Sized>(&mut self, store: &S, scope: &FeatureScope) -> bool {
        let Some(profile_id) = self.pending_delete.take() else {
            return false;
        };
        let name = self
            .find(&profile_id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| profile_id.clone());

        match store.delete_profile(&profile_id, scope) {
            Ok(true) => {
                log::info!("Deleted profile {} ({})", name, profile_id);
                self.profiles.retain(|p| p.profile_id != profile_id);
                if self.selected.as_deref() == Some(profile_id.as_str()) {
                    self.selected = None;
                }
                self.notices.push(Notice::info(format!("Deleted \"{}\"", name)));
                true
            }
            Ok(false) => {
                log::warn!("Profile store refused to delete {}", profile_id);
                self.notices
                    .push(Notice::error(format!("Could not delete \"{}\"", name)));
                false
            }
            Err(e) => {
                log::warn!("Failed to delete profile {}: {}", profile_id, e);
                self.notices
                    .push(Notice::error(format!("Could not delete \"{}\": {}", name, e)));
                false
            }
        }
    }

    /// Drain queued notices for display
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Start an alert-count refresh; only the newest ticket's results are kept
    pub fn issue_refresh(&mut self) -> RefreshTicket {
        self.latest_ticket += 1;
        RefreshTicket(self.latest_ticket)
    }

    /// Install fetched counts unless a newer refresh has been issued since
    pub fn apply_alert_counts(&mut self, ticket: RefreshTicket, counts: HashMap<String, u64>) -> bool {
        if ticket.0 < self.latest_ticket {
            log::debug!(
                "Discarding stale alert counts (ticket {}, latest {})",
                ticket.0,
                self.latest_ticket
            );
            return false;
        }
        self.alert_counts = counts;
        true
    }

    pub fn alert_count(&self, event_id: &str) -> u64 {
        self.alert_counts.get(event_id).copied().unwrap_or(0)
    }

    /// Sum of alert counts over every event the profile's panels reference
    pub fn alert_total(&self, profile: &Profile) -> u64 {
        profile.event_ids().into_iter().map(|id| self.alert_count(id)).sum()
    }
}
