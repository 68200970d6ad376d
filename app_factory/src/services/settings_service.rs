use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;

use crate::models::settings::migrate;
use crate::models::FactorySettings;
use crate::services::push_service::validate_email;
use crate::store::{self, KeyValueStore, SETTINGS_KEY};

/// Loads, migrates and persists the factory settings document.
pub struct SettingsManager {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Stored settings brought up to date, or defaults when none are stored.
    pub fn load(&self) -> anyhow::Result<FactorySettings> {
        let Some(raw) = store::load_json::<Value>(self.store.as_ref(), SETTINGS_KEY)? else {
            return Ok(FactorySettings::default());
        };
        let settings = parse(raw)?;
        Ok(settings)
    }

    pub fn save(&self, settings: &FactorySettings) -> anyhow::Result<()> {
        store::save_json(self.store.as_ref(), SETTINGS_KEY, settings)?;
        tracing::info!(apps = settings.apps.len(), "Settings saved");
        Ok(())
    }

    /// Write the current settings to `path` as pretty JSON.
    pub fn export(&self, path: &Path) -> anyhow::Result<()> {
        let settings = self.load()?;
        let body = serde_json::to_string_pretty(&settings)?;
        std::fs::write(path, body)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Settings exported");
        Ok(())
    }

    /// Read a settings document from `path`, migrate and validate it, then store it.
    pub fn import(&self, path: &Path) -> anyhow::Result<FactorySettings> {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let raw: Value = serde_json::from_str(&body)
            .with_context(|| format!("{} is not valid JSON", path.display()))?;
        let settings = parse(raw)?;
        validate(&settings)?;
        self.save(&settings)?;
        tracing::info!(path = %path.display(), "Settings imported");
        Ok(settings)
    }

    pub fn reset(&self) -> anyhow::Result<FactorySettings> {
        self.store.delete(SETTINGS_KEY)?;
        tracing::info!("Settings reset to defaults");
        Ok(FactorySettings::default())
    }
}

fn parse(raw: Value) -> anyhow::Result<FactorySettings> {
    let migrated = migrate(raw)?;
    serde_json::from_value(migrated).context("Settings document has an invalid shape")
}

fn validate(settings: &FactorySettings) -> anyhow::Result<()> {
    if !settings.author.email.is_empty() {
        validate_email(&settings.author.email)?;
    }
    if settings.codemagic.enabled && settings.codemagic.workflow_id.trim().is_empty() {
        anyhow::bail!("codemagic.workflowId must be set when Codemagic is enabled");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn load_defaults_when_empty() {
        let settings = SettingsManager::new(Arc::new(MemoryStore::new()));
        assert_eq!(settings.load().unwrap(), FactorySettings::default());
    }

    #[test]
    fn stored_v1_document_is_migrated_on_load() {
        let store = Arc::new(MemoryStore::new());
        store::save_json(
            store.as_ref(),
            SETTINGS_KEY,
            &json!({"authorName": "Ada", "authorEmail": "ada@example.com", "useCodemagic": true}),
        )
        .unwrap();

        let loaded = SettingsManager::new(store).load().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.author.name, "Ada");
        assert!(loaded.codemagic.enabled);
    }

    #[test]
    fn export_import_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path().join("data")).unwrap());
        let manager = SettingsManager::new(store);

        let mut settings = FactorySettings::default();
        settings.author.name = "Ada".to_string();
        settings.author.email = "ada@example.com".to_string();
        settings.github.enable_pages = true;
        manager.save(&settings).unwrap();

        let exported = dir.path().join("settings.json");
        manager.export(&exported).unwrap();
        manager.reset().unwrap();
        assert_eq!(manager.load().unwrap(), FactorySettings::default());

        let imported = manager.import(&exported).unwrap();
        assert_eq!(imported, settings);
        assert_eq!(manager.load().unwrap(), settings);
    }

    #[test]
    fn import_rejects_bad_author_email() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            json!({"version": 2, "author": {"name": "Ada", "email": "not-an-email"}}).to_string(),
        )
        .unwrap();

        let manager = SettingsManager::new(Arc::new(MemoryStore::new()));
        assert!(manager.import(&path).is_err());
        assert_eq!(manager.load().unwrap(), FactorySettings::default());
    }
}
