//! Config manager for loading, saving, and atomic updates.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Section-level updates (only the modified section is changed)
//! - Migration on load, saving back if the document changed
//! - Workflow export/import as standalone JSON documents

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use crate::models::UpscaleWorkflow;

use super::settings::{ConfigSection, Settings};

/// File extension for exported single-workflow documents.
pub const WORKFLOW_EXPORT_EXTENSION: &str = "uwf";

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to parse config for editing: {0}")]
    EditParse(#[from] toml_edit::TomlError),

    #[error("invalid workflow document: {0}")]
    Workflow(#[from] serde_json::Error),

    #[error("config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages the persisted application settings.
pub struct ConfigManager {
    /// Path to the config file.
    config_path: PathBuf,
    /// Current settings loaded in memory.
    settings: Settings,
}

impl ConfigManager {
    /// Create a config manager for the given file path.
    ///
    /// Does not load the config - call `load()` or `load_or_create()`
    /// after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get a reference to the current settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get a mutable reference to the current settings.
    ///
    /// Changes made here are only in memory until `save()` or
    /// `update_section()` is called.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Load the config from disk. Fails if the file does not exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        self.settings = toml::from_str(&content)?;
        if self.settings.migrate() {
            self.save()?;
        }
        Ok(())
    }

    /// Load the config, creating it with defaults if it does not exist.
    /// Migrated documents are written back.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            self.load()
        } else {
            self.settings = Settings::default();
            self.save()
        }
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let mut content = String::new();
        content.push_str("# Video Upscale GUI configuration\n");
        content.push_str("# This file is auto-generated.\n\n");
        content.push_str(&toml::to_string_pretty(&self.settings)?);
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Update a single section on disk, leaving the rest of the file
    /// untouched.
    ///
    /// Re-reads the current file, replaces only the section's tables, and
    /// writes back atomically.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current.is_empty() {
            DocumentMut::new()
        } else {
            current.parse()?
        };

        // Serialize just the wanted section and graft its item into the
        // document.
        let section_doc: DocumentMut = match section {
            ConfigSection::App => wrap_section("app", &self.settings.app)?,
            ConfigSection::Paths => wrap_section("paths", &self.settings.paths)?,
            ConfigSection::Workflows => wrap_section("workflows", &self.settings.workflows)?,
        };

        let table_name = section.table_name();
        match section_doc.get(table_name) {
            Some(item) => doc[table_name] = item.clone(),
            None => doc[table_name] = Item::None,
        }

        self.atomic_write(&doc.to_string())?;
        Ok(())
    }

    /// Write content to the config file atomically (temp file + rename).
    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.config_path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

/// Serialize one named section into its own parsed document.
fn wrap_section<T: Serialize>(name: &str, value: &T) -> ConfigResult<DocumentMut> {
    let mut map = std::collections::BTreeMap::new();
    map.insert(name, value);
    let text = toml::to_string_pretty(&map)?;
    Ok(text.parse()?)
}

/// Export a single workflow to a standalone JSON document.
pub fn export_workflow(path: &Path, workflow: &UpscaleWorkflow) -> ConfigResult<()> {
    let text = serde_json::to_string_pretty(workflow)?;
    fs::write(path, text)?;
    Ok(())
}

/// Import a workflow from a document written by [`export_workflow`],
/// re-targeting it at the given slot.
pub fn import_workflow(path: &Path, slot: usize) -> ConfigResult<UpscaleWorkflow> {
    let text = fs::read_to_string(path)?;
    let mut workflow: UpscaleWorkflow = serde_json::from_str(&text)?;
    workflow.index = slot;
    workflow.renumber_steps();
    Ok(workflow)
}
