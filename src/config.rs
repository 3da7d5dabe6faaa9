//! Configuration loading and validation.
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables (after `.env` has been loaded by the binary).
//! Credentials are normally supplied only through the environment.
//!
//! ```toml
//! [db]
//! path = "data/blog.sqlite"
//!
//! [staging]
//! dir = "src/content/feishu"
//!
//! [exporter]
//! command = ["npx", "feishu-pages", "--no-cache"]
//! base_url = "/blog/feishu"
//! url_style = "nested"
//! timeout_secs = 600
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use blog_sync_core::models::SYNCED_POST_TYPE;

/// Environment variables holding the exporter credentials.
pub const APP_ID_VAR: &str = "FEISHU_APP_ID";
pub const APP_SECRET_VAR: &str = "FEISHU_APP_SECRET";
pub const SPACE_ID_VAR: &str = "FEISHU_SPACE_ID";

/// Errors in configuration values, kept apart from runtime failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub exporter: ExporterConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/blog.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct StagingConfig {
    /// Canonical staging directory holding one `<slug>.md` per document.
    #[serde(default = "default_staging_dir")]
    pub dir: PathBuf,
    /// Index file that is never treated as a document.
    #[serde(default = "default_index_file")]
    pub index_file: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: default_staging_dir(),
            index_file: default_index_file(),
        }
    }
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("src/content/feishu")
}
fn default_index_file() -> String {
    "SUMMARY.md".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExporterConfig {
    /// Program and arguments of the external export tool.
    #[serde(default = "default_command")]
    pub command: Vec<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub app_secret: Option<String>,
    #[serde(default)]
    pub space_id: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_url_style")]
    pub url_style: String,
    #[serde(default)]
    pub root_node_token: Option<String>,
    /// Scratch directory the tool writes into. Wiped before and after a run.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_force_refresh")]
    pub force_refresh: bool,
    /// Tag written into synthesized metadata blocks.
    #[serde(default = "default_category_tag")]
    pub category_tag: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            app_id: None,
            app_secret: None,
            space_id: None,
            base_url: default_base_url(),
            url_style: default_url_style(),
            root_node_token: None,
            temp_dir: default_temp_dir(),
            timeout_secs: default_timeout_secs(),
            force_refresh: default_force_refresh(),
            category_tag: default_category_tag(),
        }
    }
}

fn default_command() -> Vec<String> {
    vec![
        "npx".to_string(),
        "feishu-pages".to_string(),
        "--no-cache".to_string(),
    ]
}
fn default_base_url() -> String {
    "/blog/feishu".to_string()
}
fn default_url_style() -> String {
    "nested".to_string()
}
fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp_feishu_export")
}
fn default_timeout_secs() -> u64 {
    600
}
fn default_force_refresh() -> bool {
    true
}
fn default_category_tag() -> String {
    "飞书".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Provenance type owned by the pipeline.
    #[serde(default = "default_post_type")]
    pub post_type: String,
    /// Single-flight lock file. Defaults to `blogsync.lock` beside the database.
    #[serde(default)]
    pub lock_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            post_type: default_post_type(),
            lock_path: None,
        }
    }
}

fn default_post_type() -> String {
    SYNCED_POST_TYPE.to_string()
}

impl SyncConfig {
    pub fn lock_path(&self, db: &DbConfig) -> PathBuf {
        match &self.lock_path {
            Some(path) => path.clone(),
            None => db
                .path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("blogsync.lock"),
        }
    }
}

/// Credentials for the export tool, all present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub app_id: String,
    pub app_secret: String,
    pub space_id: String,
}

impl ExporterConfig {
    /// Return the credentials, or every missing variable name.
    pub fn credentials(&self) -> std::result::Result<Credentials, ConfigError> {
        let mut missing = Vec::new();
        if self.app_id.is_none() {
            missing.push(APP_ID_VAR);
        }
        if self.app_secret.is_none() {
            missing.push(APP_SECRET_VAR);
        }
        if self.space_id.is_none() {
            missing.push(SPACE_ID_VAR);
        }
        match (&self.app_id, &self.app_secret, &self.space_id) {
            (Some(app_id), Some(app_secret), Some(space_id)) => Ok(Credentials {
                app_id: app_id.clone(),
                app_secret: app_secret.clone(),
                space_id: space_id.clone(),
            }),
            _ => Err(ConfigError::MissingCredentials(missing)),
        }
    }
}

impl Config {
    /// Apply environment overrides through `lookup`. Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(APP_ID_VAR) {
            self.exporter.app_id = Some(v);
        }
        if let Some(v) = get(APP_SECRET_VAR) {
            self.exporter.app_secret = Some(v);
        }
        if let Some(v) = get(SPACE_ID_VAR) {
            self.exporter.space_id = Some(v);
        }
        if let Some(v) = get("OUTPUT_DIR") {
            self.staging.dir = PathBuf::from(v);
        }
        if let Some(v) = get("BASE_URL") {
            self.exporter.base_url = v;
        }
        if let Some(v) = get("URL_STYLE") {
            self.exporter.url_style = v;
        }
        if let Some(v) = get("ROOT_NODE_TOKEN") {
            self.exporter.root_node_token = Some(v);
        }
        if let Some(v) = get("DATABASE_URL") {
            let path = v
                .strip_prefix("sqlite://")
                .or_else(|| v.strip_prefix("sqlite:"))
                .or_else(|| v.strip_prefix("file:"))
                .unwrap_or(&v);
            self.db.path = PathBuf::from(path);
        }

        // Treat blank values from the file the same as unset ones.
        for field in [
            &mut self.exporter.app_id,
            &mut self.exporter.app_secret,
            &mut self.exporter.space_id,
            &mut self.exporter.root_node_token,
        ] {
            if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *field = None;
            }
        }
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.exporter.command.is_empty() || self.exporter.command[0].trim().is_empty() {
            return Err(ConfigError::Invalid(
                "exporter.command must name a program".to_string(),
            ));
        }
        if self.exporter.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "exporter.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.sync.post_type.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "sync.post_type must not be empty".to_string(),
            ));
        }
        if !self.staging.index_file.ends_with(".md") {
            return Err(ConfigError::Invalid(format!(
                "staging.index_file must end in .md, got '{}'",
                self.staging.index_file
            )));
        }
        Ok(())
    }
}

/// Parse the TOML at `path` if it exists, otherwise start from defaults.
pub fn load_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

/// Load the file, apply process environment overrides, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = load_file(path)?;
    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_match_export_conventions() {
        let cfg = Config::default();
        assert_eq!(cfg.staging.dir, PathBuf::from("src/content/feishu"));
        assert_eq!(cfg.staging.index_file, "SUMMARY.md");
        assert_eq!(cfg.exporter.base_url, "/blog/feishu");
        assert_eq!(cfg.exporter.url_style, "nested");
        assert_eq!(cfg.sync.post_type, "feishu");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides_file() {
        let mut cfg: Config = toml::from_str(
            r#"
            [staging]
            dir = "from-file"

            [exporter]
            base_url = "/file"
            "#,
        )
        .unwrap();
        let vars = env(&[
            ("OUTPUT_DIR", "from-env"),
            ("BASE_URL", ""),
            ("URL_STYLE", "flat"),
            ("ROOT_NODE_TOKEN", "tok"),
            ("DATABASE_URL", "file:./prisma/dev.db"),
        ]);
        cfg.apply_env(|k| vars.get(k).cloned());

        assert_eq!(cfg.staging.dir, PathBuf::from("from-env"));
        assert_eq!(cfg.exporter.base_url, "/file");
        assert_eq!(cfg.exporter.url_style, "flat");
        assert_eq!(cfg.exporter.root_node_token.as_deref(), Some("tok"));
        assert_eq!(cfg.db.path, PathBuf::from("./prisma/dev.db"));
    }

    #[test]
    fn missing_credentials_are_all_reported() {
        let mut cfg = Config::default();
        let vars = env(&[(APP_ID_VAR, "id"), (APP_SECRET_VAR, "  ")]);
        cfg.apply_env(|k| vars.get(k).cloned());

        let err = cfg.exporter.credentials().unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingCredentials(vec![APP_SECRET_VAR, SPACE_ID_VAR])
        );
        assert!(err.to_string().contains("FEISHU_APP_SECRET, FEISHU_SPACE_ID"));
    }

    #[test]
    fn complete_credentials() {
        let mut cfg = Config::default();
        let vars = env(&[
            (APP_ID_VAR, "id"),
            (APP_SECRET_VAR, "secret"),
            (SPACE_ID_VAR, "space"),
        ]);
        cfg.apply_env(|k| vars.get(k).cloned());
        let creds = cfg.exporter.credentials().unwrap();
        assert_eq!(creds.space_id, "space");
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.exporter.timeout_secs = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = Config::default();
        cfg.staging.index_file = "SUMMARY".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.exporter.command.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn lock_defaults_beside_database() {
        let cfg = Config::default();
        assert_eq!(
            cfg.sync.lock_path(&cfg.db),
            PathBuf::from("data/blogsync.lock")
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_file(Path::new("/definitely/not/here.toml")).unwrap();
        assert_eq!(cfg.exporter.timeout_secs, 600);
    }
}
