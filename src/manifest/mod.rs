//! Launch manifest patching.
//!
//! The preview project describes how it is launched in an on-disk manifest
//! (a `package.json` with a `scripts.dev` entry by default). Before every
//! spawn the supervisor rewrites that command so it binds the allocated
//! port, removing whatever port flag the generator left behind.

mod error;

use std::path::{Path, PathBuf};

use serde_json::Value;

pub use error::ManifestError;

/// Default manifest file name inside a project directory.
pub const DEFAULT_MANIFEST_FILE: &str = "package.json";

/// Default script entry holding the launch command.
pub const DEFAULT_SCRIPT_KEY: &str = "dev";

/// Remove every port flag from `command` and append `--port <port>`.
///
/// Recognised forms are `-p N`, `-p=N`, `--port N` and `--port=N`. Tokens
/// are re-joined with single spaces.
#[must_use]
pub fn rewrite_port_flag(command: &str, port: u16) -> String {
    let port = port.to_string();
    let mut kept: Vec<&str> = Vec::new();
    let mut tokens = command.split_whitespace().peekable();

    while let Some(token) = tokens.next() {
        match token {
            "-p" | "--port" => {
                if tokens.peek().is_some_and(|next| is_port_number(next)) {
                    tokens.next();
                }
            }
            t if t.starts_with("--port=") || t.starts_with("-p=") => {}
            t => kept.push(t),
        }
    }

    kept.push("--port");
    kept.push(&port);
    kept.join(" ")
}

fn is_port_number(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

/// A parsed launch manifest.
#[derive(Debug, Clone)]
pub struct LaunchManifest {
    path: PathBuf,
    document: Value,
}

impl LaunchManifest {
    /// Load the manifest at `path`.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not a
    /// JSON object.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Option<Self>, ManifestError> {
        let path = path.into();
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ManifestError::Read { path, source }),
        };

        let document: Value =
            serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
                path: path.clone(),
                source,
            })?;
        if !document.is_object() {
            return Err(ManifestError::NotAnObject(path));
        }

        Ok(Some(Self { path, document }))
    }

    /// Path the manifest was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current launch command stored under `scripts.<key>`.
    #[must_use]
    pub fn script(&self, key: &str) -> Option<&str> {
        self.document.get("scripts")?.get(key)?.as_str()
    }

    /// Rewrite `scripts.<key>` to bind `port`.
    ///
    /// Returns the new command, or `None` if the script is absent.
    pub fn inject_port(&mut self, key: &str, port: u16) -> Option<String> {
        let rewritten = rewrite_port_flag(self.script(key)?, port);
        let slot = self.document.get_mut("scripts")?.get_mut(key)?;
        *slot = Value::String(rewritten.clone());
        Some(rewritten)
    }

    /// Write the manifest back to where it was loaded from.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self) -> Result<(), ManifestError> {
        let mut content = serde_json::to_string_pretty(&self.document).map_err(|source| {
            ManifestError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;
        content.push('\n');
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|source| ManifestError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

/// Patch the manifest in `project_dir` so its launch script binds `port`.
///
/// Returns the rewritten command, or `None` when there is no manifest or no
/// such script (both logged and skipped).
///
/// # Errors
///
/// Returns an error if the manifest exists but cannot be parsed or written.
pub async fn patch_launch_port(
    project_dir: &Path,
    manifest_file: &str,
    script_key: &str,
    port: u16,
) -> Result<Option<String>, ManifestError> {
    let Some(mut manifest) = LaunchManifest::load(project_dir.join(manifest_file)).await? else {
        tracing::debug!(dir = %project_dir.display(), "No launch manifest, skipping port patch");
        return Ok(None);
    };

    let Some(command) = manifest.inject_port(script_key, port) else {
        tracing::warn!(
            path = %manifest.path().display(),
            script = script_key,
            "Launch script missing from manifest"
        );
        return Ok(None);
    };

    manifest.save().await?;
    tracing::debug!(port, command = %command, "Patched launch manifest");
    Ok(Some(command))
}
