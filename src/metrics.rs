// src/metrics.rs
//! Prometheus exposition for one-shot runs: install the recorder at startup,
//! write the rendered text to a file when the run ends (node_exporter
//! textfile-collector style).

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::{Path, PathBuf};

use crate::state::write_atomic;

pub struct MetricsFile {
    handle: PrometheusHandle,
    path: PathBuf,
}

impl MetricsFile {
    /// Install the global Prometheus recorder. Call at most once per process.
    pub fn install(path: impl Into<PathBuf>) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        Ok(Self {
            handle,
            path: path.into(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn write(&self) -> Result<()> {
        write_atomic(&self.path, self.render().as_bytes())
            .with_context(|| format!("writing metrics to {}", self.path.display()))?;
        Ok(())
    }
}
