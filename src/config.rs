use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AsmDiffConfig {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub m2c: M2cConfig,
}

/// [tools] section: interpreter and tool directories (relative to the workspace)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m2c_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PanelConfig {
    /// Cursor line push cadence
    #[serde(default = "default_sync_interval")]
    pub sync_interval_ms: u64,
    /// Template/asset root. Defaults to the crate's bundled `assets/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchConfig {
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct M2cConfig {
    /// Default context file offered in the prompt
    #[serde(default = "default_context")]
    pub context: String,
}

fn default_interpreter() -> String {
    "python3".into()
}

fn default_sync_interval() -> u64 {
    50
}

fn default_debounce() -> u64 {
    100
}

fn default_context() -> String {
    "ctx.c".into()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            path: None,
            m2c_path: None,
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: default_sync_interval(),
            assets: None,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce(),
        }
    }
}

impl Default for M2cConfig {
    fn default() -> Self {
        Self {
            context: default_context(),
        }
    }
}

impl AsmDiffConfig {
    /// Asset root for panel templates
    pub fn asset_root(&self) -> PathBuf {
        match &self.panel.assets {
            Some(dir) => PathBuf::from(dir),
            None => Path::new(env!("CARGO_MANIFEST_DIR")).join("assets"),
        }
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("asm-diff").join("config.toml"))
}

fn read_table(path: &Path) -> Option<toml::Table> {
    let content = std::fs::read_to_string(path).ok()?;
    match content.parse::<toml::Table>() {
        Ok(table) => Some(table),
        Err(e) => {
            log::warn!("ignoring {}: {}", path.display(), e);
            None
        }
    }
}

/// Load config by merging global defaults with per-workspace overrides.
/// Priority: `<workspace>/.asm-diff.toml` > `~/.config/asm-diff/config.toml` > built-in defaults.
pub fn load_config(workspace: &Path) -> AsmDiffConfig {
    let global_table = global_config_path().and_then(|p| read_table(&p));
    let local_table = read_table(&workspace.join(".asm-diff.toml"));
    merge_tables(global_table, local_table)
}

fn merge_tables(
    global: Option<toml::map::Map<String, toml::Value>>,
    local: Option<toml::map::Map<String, toml::Value>>,
) -> AsmDiffConfig {
    let merged = match (global, local) {
        (Some(mut global), Some(local)) => {
            deep_merge(&mut global, local);
            toml::Value::Table(global)
        }
        (Some(global), None) => toml::Value::Table(global),
        (None, Some(local)) => toml::Value::Table(local),
        (None, None) => return AsmDiffConfig::default(),
    };

    merged.try_into().unwrap_or_else(|e| {
        log::warn!("ignoring malformed config: {}", e);
        AsmDiffConfig::default()
    })
}

/// Recursively merge `overlay` into `base`. Overlay values win; nested tables are merged recursively.
fn deep_merge(
    base: &mut toml::map::Map<String, toml::Value>,
    overlay: toml::map::Map<String, toml::Value>,
) {
    for (key, value) in overlay {
        match (base.get_mut(&key), &value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                deep_merge(base_table, overlay_table.clone());
            }
            _ => {
                base.insert(key, value);
            }
        }
    }
}

/// Key/value view over the config used by the diff session and the path
/// picker. Writes go to the in-memory copy first, then to the global file.
pub struct Settings {
    config: AsmDiffConfig,
    persist_to: Option<PathBuf>,
}

impl Settings {
    pub fn load(workspace: &Path) -> Self {
        Self {
            config: load_config(workspace),
            persist_to: global_config_path(),
        }
    }

    /// Settings that never touch disk
    pub fn in_memory(config: AsmDiffConfig) -> Self {
        Self {
            config,
            persist_to: None,
        }
    }

    pub fn config(&self) -> &AsmDiffConfig {
        &self.config
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "path" => self.config.tools.path.clone(),
            "path:m2c" => self.config.tools.m2c_path.clone(),
            "interpreter" => Some(self.config.tools.interpreter.clone()),
            "m2c.context" => Some(self.config.m2c.context.clone()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "path" => self.config.tools.path = Some(value.to_string()),
            "path:m2c" => self.config.tools.m2c_path = Some(value.to_string()),
            "interpreter" => self.config.tools.interpreter = value.to_string(),
            "m2c.context" => self.config.m2c.context = value.to_string(),
            _ => anyhow::bail!("Unknown setting '{}'", key),
        }

        if let Some(path) = &self.persist_to {
            save_value(path, key, value)?;
            log::info!("saved {} = {} to {}", key, value, path.display());
        }
        Ok(())
    }
}

/// Write a single key into the config file at `path`, keeping everything
/// else in it untouched.
fn save_value(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut table = read_table(path).unwrap_or_default();
    let (section, field) = match key {
        "path" => ("tools", "path"),
        "path:m2c" => ("tools", "m2c_path"),
        "interpreter" => ("tools", "interpreter"),
        "m2c.context" => ("m2c", "context"),
        _ => anyhow::bail!("Unknown setting '{}'", key),
    };

    let entry = table
        .entry(section.to_string())
        .or_insert_with(|| toml::Value::Table(Default::default()));
    match entry {
        toml::Value::Table(t) => {
            t.insert(field.to_string(), toml::Value::String(value.to_string()));
        }
        other => {
            let mut t = toml::map::Map::new();
            t.insert(field.to_string(), toml::Value::String(value.to_string()));
            *other = toml::Value::Table(t);
        }
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let content = toml::to_string_pretty(&toml::Value::Table(table))?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(src: &str) -> Option<toml::Table> {
        Some(src.parse::<toml::Table>().unwrap())
    }

    #[test]
    fn defaults_when_nothing_on_disk() {
        let cfg = merge_tables(None, None);
        assert_eq!(cfg.tools.interpreter, "python3");
        assert_eq!(cfg.panel.sync_interval_ms, 50);
        assert_eq!(cfg.m2c.context, "ctx.c");
        assert!(cfg.tools.path.is_none());
    }

    #[test]
    fn workspace_overrides_single_fields() {
        let global = table("[tools]\ninterpreter = \"python3.11\"\npath = \"tools/asm-differ\"\n");
        let local = table("[tools]\npath = \"asm-differ\"\n");
        let cfg = merge_tables(global, local);
        assert_eq!(cfg.tools.interpreter, "python3.11");
        assert_eq!(cfg.tools.path.as_deref(), Some("asm-differ"));
    }

    #[test]
    fn malformed_config_falls_back_to_defaults() {
        let local = table("[panel]\nsync_interval_ms = \"fast\"\n");
        assert_eq!(merge_tables(None, local), AsmDiffConfig::default());
    }

    #[test]
    fn reads_config_documents_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "[tools]\npath = \"asm-differ\"\n\n[panel]\nsync_interval_ms = 80\n").unwrap();
        let read = read_table(&file).unwrap();
        assert!(read.contains_key("tools"));
        assert!(read.contains_key("panel"));

        std::fs::write(&file, "[tools\n").unwrap();
        assert!(read_table(&file).is_none());
    }

    #[test]
    fn workspace_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".asm-diff.toml"),
            "[tools]\npath = \"tools/asm-differ\"\n",
        )
        .unwrap();
        let cfg = load_config(dir.path());
        assert_eq!(cfg.tools.path.as_deref(), Some("tools/asm-differ"));
    }

    #[test]
    fn has_get_set_in_memory() {
        let mut settings = Settings::in_memory(AsmDiffConfig::default());
        assert!(!settings.has("path"));
        settings.set("path", "tools/asm-differ").unwrap();
        assert!(settings.has("path"));
        assert_eq!(settings.get("path").as_deref(), Some("tools/asm-differ"));
        assert!(!settings.has("path:m2c"));
        assert!(settings.set("nope", "x").is_err());
    }

    #[test]
    fn set_persists_without_clobbering_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("asm-diff").join("config.toml");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, "[panel]\nsync_interval_ms = 80\n").unwrap();

        let mut settings = Settings {
            config: AsmDiffConfig::default(),
            persist_to: Some(file.clone()),
        };
        settings.set("path:m2c", "tools/m2c").unwrap();

        let saved: AsmDiffConfig = toml::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(saved.tools.m2c_path.as_deref(), Some("tools/m2c"));
        assert_eq!(saved.panel.sync_interval_ms, 80);
    }
}
