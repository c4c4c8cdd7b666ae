//! Named targets: server URL, API key and poll settings stored in
//! `<config dir>/zs-deploy/targets.json`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub url: String,
    pub key_name: String,
    pub key_secret: String,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<Duration>,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub wait_timeout: Option<Duration>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStore {
    #[serde(default)]
    pub targets: BTreeMap<String, Target>,
}

/// `ZS_DEPLOY_CONFIG` overrides the location.
pub fn default_store_path() -> PathBuf {
    if let Ok(path) = std::env::var("ZS_DEPLOY_CONFIG") {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zs-deploy")
        .join("targets.json")
}

impl TargetStore {
    /// Load the store; a missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read target store {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("target store {} is corrupted", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write target store {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    /// Insert or replace; returns true when an existing target was replaced.
    pub fn upsert(&mut self, name: &str, target: Target) -> bool {
        self.targets.insert(name.to_string(), target).is_some()
    }
}
