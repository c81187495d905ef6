//! Launching and stopping the AlpyneServer process.
//!
//! The server is a Java app that loads the exported model from its working
//! directory and serves it over HTTP on the given port. Exported models may
//! arrive as a `.zip`, in which case they are extracted to a temporary
//! directory that lives as long as the [`ResolvedModel`].

use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use sysinfo::{Pid, System};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::constants::JavaLogLevel;

const SERVER_MAIN_CLASS: &str = "com.anylogic.alpyne.AlpyneServer";
const MODEL_JAR: &str = "model.jar";

/// Ask the OS for a currently unused local port.
pub fn find_free_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

/// Location of an exported `model.jar`, plus the temp dir it was extracted into (if any).
#[derive(Debug)]
pub struct ResolvedModel {
    pub jar: PathBuf,
    temp_dir: Option<TempDir>,
}

impl ResolvedModel {
    pub fn model_dir(&self) -> &Path {
        self.jar.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn is_temporary(&self) -> bool {
        self.temp_dir.is_some()
    }

    /// Delete the extraction directory now rather than on drop.
    pub fn cleanup(mut self) {
        if let Some(dir) = self.temp_dir.take() {
            let path = dir.path().display().to_string();
            match dir.close() {
                Ok(()) => info!("Deleted temporary directory: {}", path),
                Err(e) => warn!("Failed to delete temporary directory {}: {}", path, e),
            }
        }
    }
}

/// Accepts a `model.jar`, a directory containing one, or an exported `.zip`.
pub fn resolve_model_jar(path: &Path) -> Result<ResolvedModel> {
    if path.is_dir() {
        let jar = path.join(MODEL_JAR);
        if !jar.is_file() {
            bail!("No {} found in directory {}", MODEL_JAR, path.display());
        }
        return Ok(ResolvedModel {
            jar: absolute(&jar)?,
            temp_dir: None,
        });
    }

    if !path.is_file() {
        bail!("Model location does not exist: {}", path.display());
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("jar") => Ok(ResolvedModel {
            jar: absolute(path)?,
            temp_dir: None,
        }),
        Some(ext) if ext.eq_ignore_ascii_case("zip") => {
            let temp_dir = tempfile::Builder::new()
                .prefix("alpyne_")
                .tempdir()
                .context("Failed to create temporary directory for the model")?;
            let data = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            extract_zip(&data, temp_dir.path())?;
            let jar = find_model_jar(temp_dir.path()).ok_or_else(|| {
                anyhow!("No {} found inside {}", MODEL_JAR, path.display())
            })?;
            info!("Extracted {} to {}", path.display(), temp_dir.path().display());
            Ok(ResolvedModel {
                jar,
                temp_dir: Some(temp_dir),
            })
        }
        _ => bail!(
            "Unsupported model location {} (expected a .jar, a .zip, or a directory)",
            path.display()
        ),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).with_context(|| format!("Failed to resolve {}", path.display()))
}

/// Extract an archive into `target`, skipping entries that would escape it.
fn extract_zip(data: &[u8], target: &Path) -> Result<()> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(data)).context("Invalid ZIP file")?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).context("Failed to read ZIP entry")?;
        if file.is_dir() {
            continue;
        }
        let Some(relative) = file.enclosed_name() else {
            warn!("Skipping unsafe ZIP entry: {}", file.name());
            continue;
        };
        let target_path = target.join(relative);
        if let Some(parent) = target_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .context("Failed to read file from ZIP")?;
        std::fs::write(&target_path, contents)
            .with_context(|| format!("Failed to write {}", target_path.display()))?;
    }

    Ok(())
}

/// Shallowest `model.jar` under `root`.
fn find_model_jar(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == MODEL_JAR)
        .min_by_key(|e| e.depth())
        .map(|e| e.into_path())
}

/// Build a class path of `<dir>/*` wildcards, one per directory holding jars.
///
/// Wildcards keep the argument short on systems with a command-line length
/// limit. Directories under `relative_to` are written relative to it.
pub fn class_path(roots: &[&Path], relative_to: &Path) -> String {
    let mut dirs = BTreeSet::new();
    for root in roots {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let is_jar = entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("jar"));
            if let (true, Some(parent)) = (is_jar, entry.path().parent()) {
                dirs.insert(parent.to_path_buf());
            }
        }
    }

    let separator = if cfg!(windows) { ";" } else { ":" };
    dirs.iter()
        .map(|dir| {
            let shown = match dir.strip_prefix(relative_to) {
                Ok(rel) if rel.as_os_str().is_empty() => PathBuf::from("."),
                Ok(rel) => Path::new(".").join(rel),
                Err(_) => dir.clone(),
            };
            format!("{}{}*", shown.display(), std::path::MAIN_SEPARATOR)
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// A running AlpyneServer.
pub struct ServerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    pid: Option<u32>,
    _output_tasks: Vec<JoinHandle<()>>,
}

impl ServerProcess {
    /// Start the server for the model in `model_dir` on `port`.
    pub async fn spawn(
        java_path: &str,
        server_lib: &Path,
        model_dir: &Path,
        port: u16,
        log_level: JavaLogLevel,
    ) -> Result<Self> {
        let server_lib = std::fs::canonicalize(server_lib).unwrap_or_else(|_| server_lib.to_path_buf());
        debug!("Loading server from {}", server_lib.display());
        debug!("Launching using model in {}", model_dir.display());

        let cp = class_path(&[server_lib.as_path(), model_dir], model_dir);

        let mut cmd = Command::new(java_path);
        cmd.current_dir(model_dir)
            .arg("-cp")
            .arg(&cp)
            .arg(SERVER_MAIN_CLASS)
            .arg("-p")
            .arg(port.to_string())
            .arg("-l")
            .arg(log_level.as_str())
            .arg(".")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            "Executing: {} -cp {} {} -p {} -l {} .",
            java_path, cp, SERVER_MAIN_CLASS, port, log_level
        );

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow!("Java not found. Please check your system path.")
            } else {
                anyhow!("Failed to start the server with '{}': {}", java_path, e)
            }
        })?;

        if let Some(status) = child.try_wait().context("Failed to poll the server process")? {
            if !status.success() {
                bail!("Process returned code: {}", status);
            }
        }

        let mut output_tasks = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            output_tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.is_empty() {
                        debug!("Server stdout: {}", line);
                    }
                }
            }));
        }
        if let Some(stderr) = child.stderr.take() {
            output_tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.is_empty() {
                        debug!("Server stderr: {}", line);
                    }
                }
            }));
        }

        let pid = child.id();
        info!("Started app | PID = {}", pid.map(|p| p.to_string()).unwrap_or_default());

        Ok(Self {
            stdin: child.stdin.take(),
            child,
            pid,
            _output_tasks: output_tasks,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the server to quit through stdin, force killing it if it lingers.
    pub async fn shutdown(mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.write_all(b"q\n").await {
                debug!("Failed to send quit to the server: {}", e);
            }
        }

        match tokio::time::timeout(Duration::from_secs(3), self.child.wait()).await {
            Ok(Ok(status)) => info!("Quit with return code {}", status),
            Ok(Err(e)) => error!("Failed to wait for the server: {}", e),
            Err(_) => {
                warn!("Force killing app; did not quit as expected");
                if let Err(e) = self.child.kill().await {
                    error!("Failed to kill the server: {}", e);
                }
            }
        }

        if let Some(pid) = self.pid {
            if process_alive(pid) {
                error!(
                    "All attempts to force kill app (PID {}) failed. Requires system restart or manual quit to close.",
                    pid
                );
            }
        }
    }
}

fn process_alive(pid: u32) -> bool {
    let system = System::new_all();
    system.process(Pid::from_u32(pid)).is_some()
}
