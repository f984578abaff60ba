use std::path::Path;

use anyhow::Context;
use quota_engine::QuotaConfig;
use quota_store::{InMemoryNodeStore, StoreSnapshot};

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

/// Load a snapshot file into a fresh in-memory store.
pub fn load_store(path: &Path) -> anyhow::Result<InMemoryNodeStore> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let snapshot: StoreSnapshot = if is_toml(path) {
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
    } else {
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
    };
    InMemoryNodeStore::from_snapshot(snapshot)
        .with_context(|| format!("invalid snapshot {}", path.display()))
}

/// Write the store's contents, in the format the extension names.
pub fn save_store(store: &InMemoryNodeStore, path: &Path) -> anyhow::Result<()> {
    let snapshot = store.snapshot()?;
    let text = if is_toml(path) {
        toml::to_string_pretty(&snapshot)?
    } else {
        serde_json::to_string_pretty(&snapshot)?
    };
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<QuotaConfig> {
    match path {
        Some(path) => Ok(QuotaConfig::load(path)?),
        None => Ok(QuotaConfig::default()),
    }
}
