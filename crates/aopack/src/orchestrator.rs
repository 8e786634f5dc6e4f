//! End-to-end bundling: resolve the project, emit the chunk, write it out

use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{
    bundler::{Bundle, build_executable},
    config::Config,
    fs::{FileSystem, OsFileSystem},
    graph_builder::{ResolvedProject, build_project},
};

/// Result of one bundling run
#[derive(Debug, Clone)]
pub struct BundleResult {
    pub project: ResolvedProject,
    pub bundle: Bundle,
}

impl BundleResult {
    /// Size of the entry file in bytes
    pub fn entry_size(&self) -> usize {
        self.project
            .entry()
            .map_or(0, |module| module.source().len())
    }
}

#[derive(Debug)]
pub struct BundleOrchestrator<F: FileSystem = OsFileSystem> {
    config: Config,
    fs: F,
}

impl BundleOrchestrator {
    pub fn new(config: Config) -> Self {
        Self::with_file_system(config, OsFileSystem)
    }
}

impl<F: FileSystem> BundleOrchestrator<F> {
    pub fn with_file_system(config: Config, fs: F) -> Self {
        Self { config, fs }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve the project rooted at `entry` without emitting a bundle
    pub fn resolve(&self, entry: &Path) -> Result<ResolvedProject> {
        debug!("Resolving project from {}", entry.display());
        build_project(entry, &self.fs, &self.config)
            .with_context(|| format!("Failed to resolve project {}", entry.display()))
    }

    /// Resolve and bundle the project rooted at `entry`
    pub fn bundle(&self, entry: &Path) -> Result<BundleResult> {
        let project = self.resolve(entry)?;
        let bundle = build_executable(&project.modules, &self.config.bundle)
            .with_context(|| format!("Failed to bundle {}", entry.display()))?;

        info!("Bundled {} modules", bundle.module_count());
        if !project.skipped.is_empty() {
            info!(
                "Left to the process: {}",
                project.skipped.join(", ")
            );
        }

        Ok(BundleResult { project, bundle })
    }

    /// Write the bundle to `output`, creating missing parent directories
    pub fn write_bundle(&self, result: &BundleResult, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        std::fs::write(output, &result.bundle.source)
            .with_context(|| format!("Failed to write bundle to {}", output.display()))?;
        info!(
            "Wrote {} bytes to {}",
            result.bundle.source.len(),
            output.display()
        );
        Ok(())
    }
}
