//! Configuration for aopack
//!
//! Settings are layered, each layer overriding the keys it sets:
//!
//! 1. built-in defaults
//! 2. user config (`<config dir>/aopack/aopack.toml`, see [`crate::dirs`])
//! 3. project config (`aopack.toml` next to the entry file)
//! 4. an explicit `--config` file
//!
//! CLI flags are applied on top by the binary.

use std::path::Path;

use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use toml::{Table, Value};

use crate::{dirs, naming::DEFAULT_EXTENSION};

/// File name looked up in the user config directory and the project directory
pub const CONFIG_FILE_NAME: &str = "aopack.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Extension appended to import names when resolving them to files
    pub extension: String,
    /// Fail instead of warning when the require graph has a cycle
    pub strict_cycles: bool,
    /// Shape of the generated bundle
    pub bundle: BundleConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleConfig {
    /// Lua expression of the module cache table
    pub cache_table: String,
    /// Prefix of the generated wrapper function names
    pub function_prefix: String,
    /// Emit a `-- module: "name"` comment above each wrapper
    pub module_headers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_owned(),
            strict_cycles: false,
            bundle: BundleConfig::default(),
        }
    }
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            cache_table: "_G.package.loaded".to_owned(),
            function_prefix: "_loaded_mod_".to_owned(),
            module_headers: true,
        }
    }
}

impl Config {
    /// Load the layered configuration
    ///
    /// `project_dir` is the directory of the entry file. A missing user or
    /// project config is fine; a missing explicit config is an error.
    pub fn load(explicit: Option<&Path>, project_dir: Option<&Path>) -> Result<Self> {
        let user = dirs::user_config_path().ok();
        Self::load_with_user_config(user.as_deref(), explicit, project_dir)
    }

    pub fn load_with_user_config(
        user: Option<&Path>,
        explicit: Option<&Path>,
        project_dir: Option<&Path>,
    ) -> Result<Self> {
        let mut merged = Table::new();

        if let Some(user) = user
            && user.is_file()
        {
            debug!("Loading user config from {}", user.display());
            merge_tables(&mut merged, read_table(user)?);
        }

        if let Some(dir) = project_dir {
            let project = dir.join(CONFIG_FILE_NAME);
            if project.is_file() {
                debug!("Loading project config from {}", project.display());
                merge_tables(&mut merged, read_table(&project)?);
            }
        }

        if let Some(explicit) = explicit {
            if !explicit.is_file() {
                bail!("Config file not found: {}", explicit.display());
            }
            debug!("Loading config from {}", explicit.display());
            merge_tables(&mut merged, read_table(explicit)?);
        }

        Self::from_table(merged)
    }

    /// Parse a single TOML document on top of the defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let table = toml::from_str::<Table>(contents).context("Invalid TOML in configuration")?;
        Self::from_table(table)
    }

    fn from_table(table: Table) -> Result<Self> {
        let config: Self = Value::Table(table)
            .try_into()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Extension without a leading dot
    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    pub fn validate(&self) -> Result<()> {
        let extension = self.extension();
        if extension.is_empty() || extension.contains(['/', '\\']) {
            bail!("Invalid module extension: {:?}", self.extension);
        }
        if self.bundle.cache_table.trim().is_empty() {
            bail!("bundle.cache_table must not be empty");
        }
        if !is_lua_identifier(&self.bundle.function_prefix) {
            bail!(
                "bundle.function_prefix must be a Lua identifier, got {:?}",
                self.bundle.function_prefix
            );
        }
        Ok(())
    }
}

fn read_table(path: &Path) -> Result<Table> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("Invalid TOML in {}", path.display()))
}

/// Deep-merge `overlay` into `base`; nested tables merge key by key
fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        let value = match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(nested)) => {
                merge_tables(existing, nested);
                continue;
            }
            (_, value) => value,
        };
        base.insert(key, value);
    }
}

fn is_lua_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
