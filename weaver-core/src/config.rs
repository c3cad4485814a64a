//! Weaver configuration.
//!
//! # Storage layout
//!
//! ```text
//! <dir>/
//!   .weaver/
//!     config.json    (created with defaults on first load)
//!     logs/          (default logs_folder)
//!     backups/       (default backups_folder)
//!   weaver.md        (default monitored_file)
//! ```
//!
//! # API pattern
//!
//! - `fn_at(dir: &Path, …)` — explicit base directory; used in tests with `TempDir`
//! - `fn(…)` — derives the base directory from `std::env::current_dir()`
//!
//! Every field is optional on disk. Missing fields default relative to the
//! project root; relative paths are resolved against it as well.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::parser::DirectiveParser;

pub const WEAVER_DIR: &str = ".weaver";
pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_MONITORED_FILE: &str = "weaver.md";
pub const DEFAULT_PRIMARY_BRANCH: &str = "main";

/// Resolved runtime configuration. Every path is absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaverConfig {
    pub project_root: PathBuf,
    pub logs_folder: PathBuf,
    pub backups_folder: PathBuf,
    pub monitored_file: PathBuf,
    /// Branch update branches are merged into.
    pub primary_branch: String,
    /// Program plus leading arguments; the project root is appended on launch.
    /// Empty disables the editor hand-off.
    pub editor_command: Vec<String>,
}

/// On-disk shape: everything optional so hand-edited files stay valid.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    project_root: Option<PathBuf>,
    logs_folder: Option<PathBuf>,
    backups_folder: Option<PathBuf>,
    monitored_file: Option<PathBuf>,
    primary_branch: Option<String>,
    editor_command: Option<Vec<String>>,
}

impl WeaverConfig {
    /// Defaults rooted at `project_root`.
    pub fn defaults_for(project_root: &Path) -> Self {
        let weaver_dir = project_root.join(WEAVER_DIR);
        Self {
            project_root: project_root.to_path_buf(),
            logs_folder: weaver_dir.join("logs"),
            backups_folder: weaver_dir.join("backups"),
            monitored_file: project_root.join(DEFAULT_MONITORED_FILE),
            primary_branch: DEFAULT_PRIMARY_BRANCH.to_string(),
            editor_command: vec!["code-server".to_string(), "--goto".to_string()],
        }
    }

    /// `<project_root>/.weaver/`
    pub fn weaver_dir(&self) -> PathBuf {
        self.project_root.join(WEAVER_DIR)
    }

    /// Monitored file relative to the project root, if it lives inside it.
    pub fn monitored_relative(&self) -> Option<&Path> {
        self.monitored_file.strip_prefix(&self.project_root).ok()
    }

    /// Parser that refuses to target the monitored file or `document`.
    pub fn directive_parser(&self, document: &Path) -> DirectiveParser {
        let mut parser = DirectiveParser::new();
        if let Some(monitored) = self.monitored_relative() {
            parser = parser.protect(monitored);
        }
        if let Ok(relative) = document.strip_prefix(&self.project_root) {
            parser = parser.protect(relative);
        }
        parser
    }

    fn resolve(base: &Path, raw: RawConfig) -> Self {
        let project_root = match raw.project_root {
            Some(root) => absolutize(base, root),
            None => base.to_path_buf(),
        };
        let defaults = Self::defaults_for(&project_root);

        Self {
            logs_folder: raw
                .logs_folder
                .map(|p| absolutize(&project_root, p))
                .unwrap_or(defaults.logs_folder),
            backups_folder: raw
                .backups_folder
                .map(|p| absolutize(&project_root, p))
                .unwrap_or(defaults.backups_folder),
            monitored_file: raw
                .monitored_file
                .map(|p| absolutize(&project_root, p))
                .unwrap_or(defaults.monitored_file),
            primary_branch: raw
                .primary_branch
                .filter(|b| !b.trim().is_empty())
                .unwrap_or(defaults.primary_branch),
            editor_command: raw.editor_command.unwrap_or(defaults.editor_command),
            project_root,
        }
    }
}

fn absolutize(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// `<dir>/.weaver/config.json`. Pure, no I/O.
pub fn config_path_at(dir: &Path) -> PathBuf {
    dir.join(WEAVER_DIR).join(CONFIG_FILE)
}

/// Load `<dir>/.weaver/config.json`, writing a default file first if absent.
///
/// Returns the resolved config and whether a default file was created.
pub fn load_or_init_at(dir: &Path) -> Result<(WeaverConfig, bool), ConfigError> {
    let path = config_path_at(dir);
    if !path.exists() {
        let config = WeaverConfig::defaults_for(dir);
        save_at(dir, &config)?;
        return Ok((config, true));
    }
    Ok((load_at(dir)?, false))
}

/// Load `<dir>/.weaver/config.json`; a missing file resolves to defaults
/// without touching disk.
pub fn load_at(dir: &Path) -> Result<WeaverConfig, ConfigError> {
    let path = config_path_at(dir);
    if !path.exists() {
        return Ok(WeaverConfig::defaults_for(dir));
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let raw: RawConfig =
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })?;
    Ok(WeaverConfig::resolve(dir, raw))
}

/// Save atomically: write `config.json.tmp`, then rename over `config.json`.
pub fn save_at(dir: &Path, config: &WeaverConfig) -> Result<(), ConfigError> {
    let path = config_path_at(dir);
    let Some(parent) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid config path"),
        ));
    };
    std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;

    let json = serde_json::to_string_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// `load_or_init_at` convenience wrapper rooted at the current directory.
pub fn load_or_init() -> Result<(WeaverConfig, bool), ConfigError> {
    load_or_init_at(&current_dir()?)
}

/// `load_at` convenience wrapper rooted at the current directory.
pub fn load() -> Result<WeaverConfig, ConfigError> {
    load_at(&current_dir()?)
}

fn current_dir() -> Result<PathBuf, ConfigError> {
    std::env::current_dir().map_err(ConfigError::CurrentDirUnavailable)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
