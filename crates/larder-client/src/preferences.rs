//! Per-user, per-view display preferences.
//!
//! Owned by whoever mounts a view and passed in explicitly. Nothing here is
//! global; persisting the store is the caller's job via [`to_ron`] /
//! [`from_ron`].
//!
//! [`to_ron`]: UserPreferenceStore::to_ron
//! [`from_ron`]: UserPreferenceStore::from_ron

use std::cmp::Reverse;

use dashmap::DashMap;
use larder_types::{OrderedEntity, UserId, ViewId};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::ConfigError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ViewMode {
    /// Items under their category headers.
    #[default]
    Grouped,
    Flat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SortPreference {
    /// User-defined order (sort keys). The only order drag-and-drop edits.
    #[default]
    Manual,
    Alphabetical,
    RecentlyAdded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewPreferences {
    pub mode: ViewMode,
    pub sort: SortPreference,
    pub show_checked: bool,
}

impl Default for ViewPreferences {
    fn default() -> Self {
        Self {
            mode: ViewMode::default(),
            sort: SortPreference::default(),
            show_checked: true,
        }
    }
}

impl ViewPreferences {
    /// Whether drag reordering makes sense under these preferences.
    pub fn allows_reorder(&self) -> bool {
        self.sort == SortPreference::Manual
    }

    /// Entities filtered and ordered for display.
    ///
    /// Grouping is left to the caller; within the result, entities sharing a
    /// group keep the chosen relative order.
    pub fn arrange(&self, entities: &[OrderedEntity]) -> Vec<OrderedEntity> {
        let mut shown: Vec<OrderedEntity> = entities
            .iter()
            .filter(|e| self.show_checked || !e.checked)
            .cloned()
            .collect();
        match self.sort {
            SortPreference::Manual => shown.sort_by(|a, b| a.render_cmp(b)),
            SortPreference::Alphabetical => {
                shown.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then(a.id.cmp(&b.id)))
            }
            // Server ids grow with creation time. Provisional ids are newer still
            // and count down from -1.
            SortPreference::RecentlyAdded => {
                shown.sort_by_key(|e| (!e.id.is_provisional(), Reverse(e.id.get().unsigned_abs())))
            }
        }
        shown
    }
}

#[derive(Serialize, Deserialize)]
struct PreferenceEntry {
    user: UserId,
    view: ViewId,
    preferences: ViewPreferences,
}

#[derive(Debug, Default)]
pub struct UserPreferenceStore {
    entries: DashMap<(UserId, ViewId), ViewPreferences>,
}

impl UserPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preferences for a view being mounted, initialised to defaults on first use.
    pub fn get_or_init(&self, user: UserId, view: &ViewId) -> ViewPreferences {
        self.entries
            .entry((user, view.clone()))
            .or_insert_with(|| {
                trace!(%user, %view, "initialising view preferences");
                ViewPreferences::default()
            })
            .value()
            .clone()
    }

    pub fn get(&self, user: UserId, view: &ViewId) -> Option<ViewPreferences> {
        self.entries.get(&(user, view.clone())).map(|p| p.value().clone())
    }

    pub fn set(&self, user: UserId, view: ViewId, preferences: ViewPreferences) {
        self.entries.insert((user, view), preferences);
    }

    pub fn remove(&self, user: UserId, view: &ViewId) -> Option<ViewPreferences> {
        self.entries.remove(&(user, view.clone())).map(|(_, p)| p)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize all entries, sorted by user then view.
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        let mut entries: Vec<PreferenceEntry> = self
            .entries
            .iter()
            .map(|entry| PreferenceEntry {
                user: entry.key().0,
                view: entry.key().1.clone(),
                preferences: entry.value().clone(),
            })
            .collect();
        entries.sort_by(|a, b| (a.user, &a.view).cmp(&(b.user, &b.view)));
        Ok(ron::ser::to_string_pretty(&entries, ron::ser::PrettyConfig::default())?)
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let entries: Vec<PreferenceEntry> = ron::from_str(text)?;
        let store = Self::new();
        for entry in entries {
            store.set(entry.user, entry.view, entry.preferences);
        }
        Ok(store)
    }
}
