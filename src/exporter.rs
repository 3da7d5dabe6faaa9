//! Exporter adapter: run the external knowledge-base export tool and
//! normalize its output into the staging directory.
//!
//! Workflow:
//! 1. Check credentials (before touching the filesystem).
//! 2. Recreate the temporary export directory.
//! 3. Run the tool with its settings mapped to environment variables,
//!    bounded by `exporter.timeout_secs`. Its stdout/stderr are inherited.
//! 4. Require `<temp>/docs` to exist.
//! 5. Copy `<temp>/docs` into `<staging>.partial`, giving every markdown
//!    file without a metadata block a synthesized one, then swap it in
//!    place of the staging directory.
//! 6. Remove the temporary directory (failure is only a warning).
//!
//! The staging directory is only replaced once step 5 has fully succeeded,
//! so a failed or timed out export leaves it as it was before the run.

use chrono::{NaiveDate, Utc};
use std::borrow::Borrow;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use walkdir::WalkDir;

use blog_sync_core::extract::extract_title;
use blog_sync_core::frontmatter::{self, FrontMatter};

use crate::config::{Config, ConfigError, Credentials, ExporterConfig};

/// Subdirectory of the tool's output holding the document tree.
pub const DOCS_SUBDIR: &str = "docs";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start exporter '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("exporter exited with {}", describe_code(.code))]
    NonZeroExit { code: Option<i32> },

    #[error("exporter did not finish within {secs}s and was killed")]
    TimedOut { secs: u64 },

    #[error("exporter output is missing the expected directory: {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk export output: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("normalization task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn describe_code(code: impl Borrow<Option<i32>>) -> String {
    match *code.borrow() {
        Some(code) => format!("status code {}", code),
        None => "no status code (terminated by signal)".to_string(),
    }
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub exit_code: Option<i32>,
    pub staging_dir: PathBuf,
    pub summary: NormalizeSummary,
}

/// Counts from copying the export tree into staging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeSummary {
    /// Markdown files written.
    pub documents: usize,
    /// Markdown files that received a synthesized metadata block.
    pub headers_added: usize,
    /// Non-markdown files copied byte for byte.
    pub assets: usize,
}

/// Fields written into synthesized metadata blocks.
#[derive(Debug, Clone)]
pub struct HeaderTemplate {
    pub post_type: String,
    pub category_tag: String,
    pub date: NaiveDate,
}

impl HeaderTemplate {
    /// Metadata for `content`, with its title extracted from the body.
    pub fn front_matter_for(&self, content: &str) -> FrontMatter {
        FrontMatter {
            title: Some(extract_title(content)),
            date: Some(self.date.format("%Y-%m-%d").to_string()),
            post_type: Some(self.post_type.clone()),
            published: Some(true),
            tags: vec![self.category_tag.clone()],
            ..Default::default()
        }
    }
}

/// Prepend a metadata block unless the content already starts with one.
pub fn with_header(content: &str, template: &HeaderTemplate) -> Option<String> {
    if frontmatter::has_front_matter(content) {
        return None;
    }
    let mut out = template.front_matter_for(content).render();
    out.push_str(content);
    Some(out)
}

/// Environment passed to the export tool, on top of the inherited one.
///
/// `OUTPUT_DIR` points the tool at the temporary directory, not at staging.
pub fn exporter_env(
    exporter: &ExporterConfig,
    credentials: &Credentials,
    output_dir: &Path,
) -> Vec<(String, String)> {
    let mut env = vec![
        ("FEISHU_APP_ID".to_string(), credentials.app_id.clone()),
        ("FEISHU_APP_SECRET".to_string(), credentials.app_secret.clone()),
        ("FEISHU_SPACE_ID".to_string(), credentials.space_id.clone()),
        (
            "OUTPUT_DIR".to_string(),
            output_dir.to_string_lossy().to_string(),
        ),
        ("BASE_URL".to_string(), exporter.base_url.clone()),
        ("URL_STYLE".to_string(), exporter.url_style.clone()),
    ];
    if exporter.force_refresh {
        env.push(("FORCE_REFRESH".to_string(), "true".to_string()));
    }
    if let Some(token) = &exporter.root_node_token {
        env.push(("ROOT_NODE_TOKEN".to_string(), token.clone()));
    }
    env
}

/// Run the full export into `config.staging.dir`.
pub async fn run_export(config: &Config) -> Result<ExportOutcome, ExportError> {
    let credentials = config.exporter.credentials()?;
    let temp_dir = &config.exporter.temp_dir;

    let result = export_into_staging(config, &credentials, temp_dir).await;

    match tokio::fs::remove_dir_all(temp_dir).await {
        Ok(()) => tracing::debug!(dir = %temp_dir.display(), "removed temporary export directory"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            dir = %temp_dir.display(),
            error = %e,
            "failed to remove temporary export directory"
        ),
    }

    result
}

async fn export_into_staging(
    config: &Config,
    credentials: &Credentials,
    temp_dir: &Path,
) -> Result<ExportOutcome, ExportError> {
    reset_dir(temp_dir).await?;
    let output_dir = tokio::fs::canonicalize(temp_dir)
        .await
        .map_err(io_at(temp_dir))?;

    let env = exporter_env(&config.exporter, credentials, &output_dir);
    tracing::info!(
        command = %config.exporter.command.join(" "),
        output = %output_dir.display(),
        "running exporter"
    );
    let exit_code = run_tool(
        &config.exporter.command,
        &env,
        Duration::from_secs(config.exporter.timeout_secs),
    )
    .await?;

    let docs_dir = output_dir.join(DOCS_SUBDIR);
    if !docs_dir.is_dir() {
        return Err(ExportError::MissingOutput(docs_dir));
    }

    let staging_dir = config.staging.dir.clone();
    let template = HeaderTemplate {
        post_type: config.sync.post_type.clone(),
        category_tag: config.exporter.category_tag.clone(),
        date: Utc::now().date_naive(),
    };
    let summary = tokio::task::spawn_blocking({
        let staging_dir = staging_dir.clone();
        move || {
            stage_atomically(&staging_dir, |partial| {
                normalize_tree(&docs_dir, partial, &template)
            })
        }
    })
    .await??;
    tracing::info!(
        staging = %staging_dir.display(),
        documents = summary.documents,
        headers_added = summary.headers_added,
        assets = summary.assets,
        "export normalized"
    );

    Ok(ExportOutcome {
        exit_code,
        staging_dir,
        summary,
    })
}

/// Run the tool and wait for it, killing it if the timeout elapses.
///
/// On unix the tool leads its own process group, and a timeout kills the
/// whole group so helpers it started (`npx` runs node under a shell) go too.
pub async fn run_tool(
    command: &[String],
    env: &[(String, String)],
    timeout: Duration,
) -> Result<Option<i32>, ExportError> {
    let Some((program, args)) = command.split_first() else {
        return Err(ConfigError::Invalid("exporter.command must name a program".to_string()).into());
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| ExportError::Spawn {
        program: program.clone(),
        source,
    })?;
    let pid = child.id();

    let waited = tokio::time::timeout(timeout, child.wait()).await;
    match waited {
        Ok(Ok(status)) if status.success() => Ok(status.code()),
        Ok(Ok(status)) => Err(ExportError::NonZeroExit {
            code: status.code(),
        }),
        Ok(Err(source)) => Err(ExportError::Io {
            path: PathBuf::from(program),
            source,
        }),
        Err(_) => {
            if let Some(pid) = pid {
                kill_group(pid);
            }
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "failed to kill timed out exporter");
            }
            Err(ExportError::TimedOut {
                secs: timeout.as_secs(),
            })
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg takes plain integers and touches no memory of ours.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        let e = io::Error::last_os_error();
        tracing::warn!(pgid, error = %e, "failed to kill exporter process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

async fn reset_dir(dir: &Path) -> Result<(), ExportError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_at(dir)(e)),
    }
    tokio::fs::create_dir_all(dir).await.map_err(io_at(dir))
}

/// `<staging>.partial`, next to the staging directory so the final rename
/// stays on one filesystem.
fn partial_dir(staging: &Path) -> PathBuf {
    let mut name = staging
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("staging"));
    name.push(".partial");
    staging.with_file_name(name)
}

fn remove_if_present(dir: &Path) -> Result<(), ExportError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_at(dir)(e)),
    }
}

/// Build a new staging tree with `fill` and swap it in for `staging`.
///
/// `fill` writes into an empty sibling directory. On error that directory
/// is removed and `staging` keeps its previous contents.
pub fn stage_atomically<T, F>(staging: &Path, fill: F) -> Result<T, ExportError>
where
    F: FnOnce(&Path) -> Result<T, ExportError>,
{
    let partial = partial_dir(staging);
    remove_if_present(&partial)?;
    std::fs::create_dir_all(&partial).map_err(io_at(&partial))?;

    let value = match fill(&partial) {
        Ok(value) => value,
        Err(e) => {
            if let Err(cleanup) = remove_if_present(&partial) {
                tracing::warn!(error = %cleanup, "failed to remove partial staging directory");
            }
            return Err(e);
        }
    };

    remove_if_present(staging)?;
    std::fs::rename(&partial, staging).map_err(io_at(staging))?;
    Ok(value)
}

/// Copy `src` into `dst`, preserving structure. Markdown files get a
/// metadata block if they lack one; everything else is copied verbatim.
pub fn normalize_tree(
    src: &Path,
    dst: &Path,
    template: &HeaderTemplate,
) -> Result<NormalizeSummary, ExportError> {
    let mut summary = NormalizeSummary::default();
    std::fs::create_dir_all(dst).map_err(io_at(dst))?;

    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        let relative = path.strip_prefix(src).unwrap_or(path);
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(io_at(&target))?;
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let is_markdown = path.extension().is_some_and(|ext| ext == "md");
        if !is_markdown {
            std::fs::copy(path, &target).map_err(io_at(path))?;
            summary.assets += 1;
            continue;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => {
                let written = match with_header(&content, template) {
                    Some(with_header) => {
                        summary.headers_added += 1;
                        with_header
                    }
                    None => content,
                };
                std::fs::write(&target, written).map_err(io_at(&target))?;
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                // Left for the reconcile phase to skip as unreadable.
                tracing::warn!(file = %path.display(), "markdown file is not UTF-8; copied as-is");
                std::fs::copy(path, &target).map_err(io_at(path))?;
            }
            Err(e) => return Err(io_at(path)(e)),
        }
        summary.documents += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn template() -> HeaderTemplate {
        HeaderTemplate {
            post_type: "feishu".to_string(),
            category_tag: "飞书".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            app_id: "id".to_string(),
            app_secret: "secret".to_string(),
            space_id: "space".to_string(),
        }
    }

    #[test]
    fn header_is_synthesized_once() {
        let content = "# Alpha\n\nHello world.";
        let first = with_header(content, &template()).unwrap();
        assert_eq!(
            first,
            "---\ntitle: \"Alpha\"\ndate: \"2024-03-09\"\ntype: \"feishu\"\npublished: true\ntags: [\"飞书\"]\n---\n# Alpha\n\nHello world."
        );
        assert!(with_header(&first, &template()).is_none());
    }

    #[test]
    fn env_maps_settings() {
        let mut exporter = ExporterConfig::default();
        exporter.root_node_token = Some("root".to_string());
        let env = exporter_env(&exporter, &credentials(), Path::new("/tmp/out"));
        let get = |k: &str| {
            env.iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("OUTPUT_DIR"), Some("/tmp/out"));
        assert_eq!(get("BASE_URL"), Some("/blog/feishu"));
        assert_eq!(get("URL_STYLE"), Some("nested"));
        assert_eq!(get("FORCE_REFRESH"), Some("true"));
        assert_eq!(get("ROOT_NODE_TOKEN"), Some("root"));
        assert_eq!(get("FEISHU_SPACE_ID"), Some("space"));
    }

    #[test]
    fn env_omits_unset_token() {
        let mut exporter = ExporterConfig::default();
        exporter.force_refresh = false;
        let env = exporter_env(&exporter, &credentials(), Path::new("out"));
        assert!(env.iter().all(|(k, _)| k != "ROOT_NODE_TOKEN" && k != "FORCE_REFRESH"));
    }

    #[test]
    fn normalize_preserves_tree_and_assets() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("docs");
        let dst = tmp.path().join("staging");
        fs::create_dir_all(src.join("assets")).unwrap();
        fs::write(src.join("a.md"), "# Alpha\n\nbody").unwrap();
        fs::write(src.join("b.md"), "---\ntitle: \"Kept\"\n---\nbody").unwrap();
        fs::write(src.join("assets").join("pic.png"), [137u8, 80, 78, 71]).unwrap();

        let summary = normalize_tree(&src, &dst, &template()).unwrap();
        assert_eq!(
            summary,
            NormalizeSummary {
                documents: 2,
                headers_added: 1,
                assets: 1,
            }
        );

        let a = fs::read_to_string(dst.join("a.md")).unwrap();
        assert!(a.starts_with("---\ntitle: \"Alpha\""));
        assert_eq!(
            fs::read_to_string(dst.join("b.md")).unwrap(),
            "---\ntitle: \"Kept\"\n---\nbody"
        );
        assert_eq!(
            fs::read(dst.join("assets").join("pic.png")).unwrap(),
            vec![137u8, 80, 78, 71]
        );
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_filesystem() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.exporter.temp_dir = tmp.path().join("temp");
        config.staging.dir = tmp.path().join("staging");

        let err = run_export(&config).await.unwrap_err();
        assert!(matches!(
            err,
            ExportError::Config(ConfigError::MissingCredentials(_))
        ));
        assert!(!config.exporter.temp_dir.exists());
        assert!(!config.staging.dir.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let command = vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()];
        let err = run_tool(&command, &[], Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::NonZeroExit { code: Some(3) }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_tool_times_out() {
        let command = vec!["sh".to_string(), "-c".to_string(), "sleep 30".to_string()];
        let err = run_tool(&command, &[], Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::TimedOut { .. }));
    }

    /// Running or not yet reaped.
    #[cfg(target_os = "linux")]
    fn is_alive(pid: &str) -> bool {
        match fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => {
                let state = stat.rsplit(')').next().unwrap_or("").trim_start();
                !state.starts_with('Z')
            }
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timeout_kills_background_children() {
        let tmp = TempDir::new().unwrap();
        let pid_file = tmp.path().join("child.pid");
        let command = vec![
            "sh".to_string(),
            "-c".to_string(),
            "sleep 30 & echo $! > \"$PID_FILE\"; wait".to_string(),
        ];
        let env = vec![(
            "PID_FILE".to_string(),
            pid_file.to_string_lossy().to_string(),
        )];

        let err = run_tool(&command, &env, Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::TimedOut { .. }));

        let pid = fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let mut alive = true;
        for _ in 0..40 {
            alive = is_alive(&pid);
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!alive, "background sleep {} survived the timeout", pid);
    }

    #[test]
    fn failed_fill_keeps_previous_staging() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("old.md"), "# Old").unwrap();

        let err = stage_atomically(&staging, |dir| -> Result<(), ExportError> {
            fs::write(dir.join("a.md"), "# A").unwrap();
            Err(io_at(dir)(io::Error::new(io::ErrorKind::Other, "disk full")))
        })
        .unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));

        assert!(staging.join("old.md").exists());
        assert!(!staging.join("a.md").exists());
        assert!(!tmp.path().join("staging.partial").exists());
    }

    #[test]
    fn filled_staging_replaces_previous() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("old.md"), "# Old").unwrap();

        let written = stage_atomically(&staging, |dir| {
            fs::write(dir.join("a.md"), "# A").map_err(io_at(dir))?;
            Ok(1)
        })
        .unwrap();
        assert_eq!(written, 1);

        assert!(!staging.join("old.md").exists());
        assert_eq!(fs::read_to_string(staging.join("a.md")).unwrap(), "# A");
        assert!(!tmp.path().join("staging.partial").exists());
    }

    #[test]
    fn missing_staging_is_created() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path().join("nested").join("staging");
        stage_atomically(&staging, |_| Ok(())).unwrap();
        assert!(staging.is_dir());
    }

    #[tokio::test]
    async fn unknown_program_fails_to_spawn() {
        let command = vec!["blogsync-no-such-exporter".to_string()];
        let err = run_tool(&command, &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_export_leaves_staging_untouched() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.exporter.app_id = Some("id".to_string());
        config.exporter.app_secret = Some("secret".to_string());
        config.exporter.space_id = Some("space".to_string());
        config.exporter.temp_dir = tmp.path().join("temp");
        config.staging.dir = tmp.path().join("staging");
        // Succeeds but never writes docs/.
        config.exporter.command = vec!["sh".to_string(), "-c".to_string(), "true".to_string()];

        fs::create_dir_all(&config.staging.dir).unwrap();
        fs::write(config.staging.dir.join("old.md"), "# Old").unwrap();

        let err = run_export(&config).await.unwrap_err();
        assert!(matches!(err, ExportError::MissingOutput(_)));
        assert!(config.staging.dir.join("old.md").exists());
        assert!(!config.exporter.temp_dir.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_export_replaces_staging() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.exporter.app_id = Some("id".to_string());
        config.exporter.app_secret = Some("secret".to_string());
        config.exporter.space_id = Some("space".to_string());
        config.exporter.temp_dir = tmp.path().join("temp");
        config.staging.dir = tmp.path().join("staging");
        config.exporter.command = vec![
            "sh".to_string(),
            "-c".to_string(),
            "mkdir -p \"$OUTPUT_DIR/docs\" && printf '# %s\\n\\nbody' \"$FEISHU_SPACE_ID\" > \"$OUTPUT_DIR/docs/new.md\""
                .to_string(),
        ];

        fs::create_dir_all(&config.staging.dir).unwrap();
        fs::write(config.staging.dir.join("old.md"), "# Old").unwrap();

        let outcome = run_export(&config).await.unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.summary.documents, 1);
        assert!(!config.staging.dir.join("old.md").exists());
        let new = fs::read_to_string(config.staging.dir.join("new.md")).unwrap();
        assert!(new.starts_with("---\ntitle: \"space\""));
        assert!(new.ends_with("# space\n\nbody"));
        assert!(!config.exporter.temp_dir.exists());
    }
}
