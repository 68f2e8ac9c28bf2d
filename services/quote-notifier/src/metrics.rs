//! Prometheus textfile output
//!
//! A run is a short batch job, so instead of serving `/metrics` the rendered
//! exposition is written to a file picked up by node-exporter's textfile
//! collector. The write goes through a temp file and a rename so the
//! collector never reads a half-written file.

use std::path::Path;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Render `handle` and atomically replace the file at `path`.
pub async fn write_textfile(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .with_context(|| format!("textfile path {} has no file name", path.display()))?;
    let tmp_path = path.with_file_name(format!(
        ".{}.tmp.{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    tokio::fs::write(&tmp_path, handle.render())
        .await
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e).with_context(|| format!("failed to replace {}", path.display()));
    }
    Ok(())
}
