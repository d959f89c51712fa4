use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::graph::DisplayMode;
use crate::pane::InsertPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend root; the project name is appended as a path segment.
    pub backend_url: String,
    pub project: String,
    pub request_timeout_secs: u64,
    pub max_panes: usize,
    /// Visible nodes a pane may hold before an expansion asks for a decision.
    pub pane_node_ceiling: usize,
    pub default_mode: DisplayMode,
    pub insert_policy: InsertPolicy,
    pub best_path_max_steps: usize,
    pub brush_window_ms: u64,
    pub overview_socket: Option<String>,
    pub auto_sync: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8080".to_string(),
            project: "default".to_string(),
            request_timeout_secs: 30,
            max_panes: 6,
            pane_node_ceiling: 500,
            default_mode: DisplayMode::States,
            insert_policy: InsertPolicy::AfterSpawner,
            best_path_max_steps: 5,
            brush_window_ms: 50,
            overview_socket: None,
            auto_sync: false,
        }
    }
}

impl EngineConfig {
    /// `<backend_url>/<project>` without a trailing slash.
    pub fn backend_base(&self) -> String {
        let root = self.backend_url.trim_end_matches('/');
        let project = self.project.trim_matches('/');
        if project.is_empty() {
            root.to_string()
        } else {
            format!("{root}/{project}")
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn brush_window(&self) -> Duration {
        Duration::from_millis(self.brush_window_ms)
    }

    pub fn overview_socket_path(&self) -> String {
        self.overview_socket
            .clone()
            .unwrap_or_else(default_overview_socket)
    }
}

fn default_overview_socket() -> String {
    static CACHED: OnceLock<String> = OnceLock::new();
    CACHED
        .get_or_init(|| {
            if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
                format!("{dir}/statespace-overview.sock")
            } else {
                "/tmp/statespace-overview.sock".to_string()
            }
        })
        .clone()
}

pub fn config_file_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "statespace")?;
    Some(proj.config_dir().join("explorer.toml"))
}

pub fn load_or_default() -> EngineConfig {
    let Some(path) = config_file_path() else {
        return EngineConfig::default();
    };
    load_or_default_from_path(&path)
}

pub fn load_or_default_from_path(path: &Path) -> EngineConfig {
    let Ok(contents) = fs::read_to_string(path) else {
        return EngineConfig::default();
    };
    toml::from_str(&contents).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
        EngineConfig::default()
    })
}

pub fn save(cfg: &EngineConfig) -> anyhow::Result<()> {
    let Some(path) = config_file_path() else {
        return Err(anyhow::anyhow!("no config directory available"));
    };
    save_to_path(cfg, &path)
}

pub fn save_to_path(cfg: &EngineConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let data = toml::to_string_pretty(cfg).context("failed to serialize engine config")?;
    fs::write(path, data)
        .with_context(|| format!("failed to write engine config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn engine_config_roundtrip_save_load() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("explorer.toml");
        let cfg = EngineConfig {
            project: "dice".to_string(),
            default_mode: DisplayMode::Both,
            insert_policy: InsertPolicy::AtEnd,
            overview_socket: Some("/tmp/o.sock".to_string()),
            ..EngineConfig::default()
        };

        save_to_path(&cfg, &path).expect("save config");
        let loaded = load_or_default_from_path(&path);

        assert_eq!(cfg, loaded);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("explorer.toml");
        fs::write(&path, "max_panes = 3\ndefault_mode = \"s+t\"\n").expect("write");

        let loaded = load_or_default_from_path(&path);
        assert_eq!(loaded.max_panes, 3);
        assert_eq!(loaded.default_mode, DisplayMode::Both);
        assert_eq!(loaded.pane_node_ceiling, 500);
        assert_eq!(loaded.best_path_max_steps, 5);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("explorer.toml");
        fs::write(&path, "max_panes = [").expect("write");
        assert_eq!(load_or_default_from_path(&path), EngineConfig::default());
        assert_eq!(
            load_or_default_from_path(&dir.path().join("missing.toml")),
            EngineConfig::default()
        );
    }

    #[test]
    fn backend_base_joins_project() {
        let cfg = EngineConfig {
            backend_url: "http://host:8080/".to_string(),
            project: "/dice/".to_string(),
            ..EngineConfig::default()
        };
        assert_eq!(cfg.backend_base(), "http://host:8080/dice");
    }
}
