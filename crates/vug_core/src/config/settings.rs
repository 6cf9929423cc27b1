//! Settings struct with TOML-based sections.
//!
//! One versioned schema with serde defaults on every field, so documents
//! written by older versions load cleanly and get migrated in place
//! rather than being carried as parallel near-duplicate types.

use serde::{Deserialize, Serialize};

use crate::models::UpscaleWorkflow;

/// Current settings schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Number of workflow slots persisted across sessions.
pub const WORKFLOW_SLOTS: usize = 3;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version of the document on disk.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Application-level settings.
    #[serde(default)]
    pub app: AppSettings,

    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Persisted workflow slots.
    #[serde(default = "default_workflows")]
    pub workflows: Vec<UpscaleWorkflow>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn default_workflows() -> Vec<UpscaleWorkflow> {
    (0..WORKFLOW_SLOTS).map(UpscaleWorkflow::default_slot).collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            app: AppSettings::default(),
            paths: PathSettings::default(),
            workflows: default_workflows(),
        }
    }
}

impl Settings {
    /// Upgrade a document loaded from disk to the current schema and
    /// repair an empty workflow list.
    ///
    /// Returns whether anything changed (the caller saves the document
    /// back when it did).
    pub fn migrate(&mut self) -> bool {
        let mut changed = false;

        if self.workflows.is_empty() {
            self.workflows = default_workflows();
            changed = true;
        }

        if self.schema_version < SCHEMA_VERSION {
            // Future structural migrations chain here, version by version.
            self.schema_version = SCHEMA_VERSION;
            changed = true;
        }

        changed
    }

    /// The selected workflow slot, clamped to the valid range. The slot
    /// list is never empty after `migrate()`.
    pub fn current_workflow(&self) -> &UpscaleWorkflow {
        let index = self
            .app
            .selected_workflow
            .min(self.workflows.len().saturating_sub(1));
        &self.workflows[index]
    }
}

/// Application-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Download updates automatically when available.
    #[serde(default = "default_true")]
    pub auto_update: bool,

    /// Index of the active workflow slot.
    #[serde(default)]
    pub selected_workflow: usize,
}

fn default_true() -> bool {
    true
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            auto_update: true,
            selected_workflow: 0,
        }
    }
}

/// Path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Backend root override; empty selects the per-user data directory
    /// (or the portable `backend` folder next to the executable).
    #[serde(default)]
    pub backend_root: String,

    /// Folder for log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,
}

fn default_logs_folder() -> String {
    "logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            backend_root: String::new(),
            logs_folder: default_logs_folder(),
        }
    }
}

/// Sections that can be updated independently on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    App,
    Paths,
    Workflows,
}

impl ConfigSection {
    /// TOML table name for the section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::App => "app",
            ConfigSection::Paths => "paths",
            ConfigSection::Workflows => "workflows",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_every_slot() {
        let settings = Settings::default();
        assert_eq!(settings.workflows.len(), WORKFLOW_SLOTS);
        assert_eq!(settings.workflows[0].name, "Workflow 1");
        assert_eq!(settings.workflows[2].name, "Workflow 3");
        assert!(settings.app.auto_update);
    }

    #[test]
    fn migrate_bumps_old_versions() {
        let mut settings = Settings {
            schema_version: 0,
            ..Settings::default()
        };
        assert!(settings.migrate());
        assert_eq!(settings.schema_version, SCHEMA_VERSION);

        // Already current: nothing to do.
        assert!(!settings.migrate());
    }

    #[test]
    fn migrate_repairs_empty_workflow_list() {
        let mut settings = Settings::default();
        settings.workflows.clear();
        assert!(settings.migrate());
        assert_eq!(settings.workflows.len(), WORKFLOW_SLOTS);
    }

    #[test]
    fn current_workflow_clamps_index() {
        let mut settings = Settings::default();
        settings.app.selected_workflow = 99;
        assert_eq!(settings.current_workflow().index, WORKFLOW_SLOTS - 1);
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let mut settings = Settings::default();
        settings.workflows[1].overwrite_existing = true;
        settings.workflows[1].rife.enabled = true;

        let text = toml::to_string_pretty(&settings).unwrap();
        let loaded: Settings = toml::from_str(&text).unwrap();

        assert_eq!(loaded.workflows.len(), WORKFLOW_SLOTS);
        assert!(loaded.workflows[1].overwrite_existing);
        assert!(loaded.workflows[1].rife.enabled);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let loaded: Settings = toml::from_str("[app]\nauto_update = false\n").unwrap();
        assert!(!loaded.app.auto_update);
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
        assert_eq!(loaded.workflows.len(), WORKFLOW_SLOTS);
    }
}
