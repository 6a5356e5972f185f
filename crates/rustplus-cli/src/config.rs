//! CLI config file: connection settings plus entities to watch.

use std::path::Path;

use anyhow::Context;
use rustplus_core::{ConnectionConfig, EntityId};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub entities: Vec<EntityDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntityDef {
    pub id: EntityId,
    pub name: String,
}

impl CliConfig {
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content).context("invalid config")?;
        config.connection.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Display name for `id`, if the config names it.
    pub fn entity_name(&self, id: EntityId) -> Option<&str> {
        self.entities
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
ip = "203.0.113.7"
port = 28083
use_proxy = true

[[tokens]]
player_id = 76561198000000001
player_token = 99

[[entities]]
id = 1234
name = "front door"

[[entities]]
id = 5678
name = "loot room"
"#;

    #[test]
    fn parses_connection_and_entities() {
        let config = CliConfig::parse(SAMPLE).unwrap();
        assert!(config.connection.use_proxy);
        assert_eq!(config.connection.tokens.len(), 1);
        assert_eq!(config.entities.len(), 2);
        assert_eq!(config.entity_name(5678), Some("loot room"));
        assert_eq!(config.entity_name(1), None);
    }

    #[test]
    fn entities_are_optional() {
        let config = CliConfig::parse("ip = \"h\"\nport = 28082\n").unwrap();
        assert!(config.entities.is_empty());
    }

    #[test]
    fn load_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"ip = \"\"\nport = 1\n").unwrap();
        let err = CliConfig::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("ip must not be empty"));
    }
}
