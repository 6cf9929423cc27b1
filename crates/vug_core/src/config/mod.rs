//! Application settings persistence.
//!
//! One versioned TOML document holds the app-level settings and every
//! workflow slot. Individual workflows export/import as standalone JSON
//! documents with their own extension.

mod manager;
mod settings;

pub use manager::{
    export_workflow, import_workflow, ConfigError, ConfigManager, ConfigResult,
    WORKFLOW_EXPORT_EXTENSION,
};
pub use settings::{
    AppSettings, ConfigSection, PathSettings, Settings, SCHEMA_VERSION, WORKFLOW_SLOTS,
};
