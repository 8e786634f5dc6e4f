//! Bundle emission
//!
//! Turns the ordered module list of a [`ResolvedProject`] into one Lua chunk.
//! Every library module is wrapped in a local function whose result is
//! stored in the module cache right after the definition:
//!
//! ```lua
//! -- module: "util"
//! local function _loaded_mod_util()
//! <source of util.lua>
//! end
//!
//! _G.package.loaded["util"] = _loaded_mod_util()
//! ```
//!
//! A later `require("util")` anywhere in the bundle then hits the cache, so
//! each file runs exactly once. The entry module follows verbatim.
//!
//! [`ResolvedProject`]: crate::graph_builder::ResolvedProject

use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Result, bail};
use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::{config::BundleConfig, graph_builder::ModuleNode, naming::sanitize_identifier};

/// Separator between the blocks of the bundle
const BLOCK_SEPARATOR: &str = "\n\n";

/// Locals a single Lua function may declare (`MAXVARS` in `lparser.c`)
///
/// Every wrapper is a local of the main chunk and shares this budget with the
/// entry module's own top-level locals.
pub const MAX_CHUNK_LOCALS: usize = 200;

/// How a module name is represented in the bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Wrapped in a function and registered in the cache
    Wrapped,
    /// Extra cache key pointing at an already wrapped module
    Alias,
    /// The entry module, emitted unwrapped at the end
    Entry,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wrapped => write!(f, "module"),
            Self::Alias => write!(f, "alias"),
            Self::Entry => write!(f, "entry"),
        }
    }
}

/// One module name embedded in a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub import_path: String,
    /// Sanitized identifier of the wrapper that produces the module value
    pub identifier: String,
    pub resolved_path: PathBuf,
    pub kind: RecordKind,
}

/// The generated chunk plus what went into it
#[derive(Debug, Clone)]
pub struct Bundle {
    pub source: String,
    pub modules: Vec<ModuleRecord>,
}

impl Bundle {
    /// Number of distinct files in the bundle, entry included
    pub fn module_count(&self) -> usize {
        self.modules
            .iter()
            .filter(|record| record.kind != RecordKind::Alias)
            .count()
    }

    /// Number of `local function` wrappers declared in the main chunk
    pub fn wrapper_count(&self) -> usize {
        self.modules
            .iter()
            .filter(|record| record.kind == RecordKind::Wrapped)
            .count()
    }

    /// Whether the wrappers alone exceed the locals Lua allows per chunk
    pub fn exceeds_local_limit(&self) -> bool {
        self.wrapper_count() > MAX_CHUNK_LOCALS
    }

    pub fn entry(&self) -> Option<&ModuleRecord> {
        self.modules
            .iter()
            .find(|record| record.kind == RecordKind::Entry)
    }

    pub fn record(&self, import_path: &str) -> Option<&ModuleRecord> {
        self.modules
            .iter()
            .find(|record| record.import_path == import_path)
    }
}

/// Build the executable chunk from modules in load order
///
/// The last module is the entry; all others are libraries. Fails only when
/// `modules` is empty.
pub fn build_executable(modules: &[ModuleNode], config: &BundleConfig) -> Result<Bundle> {
    let Some((entry, libraries)) = modules.split_last() else {
        bail!("Cannot bundle an empty module list");
    };

    let mut emitter = BundleEmitter::new(config);
    for module in libraries {
        emitter.add_library(module);
    }
    let bundle = emitter.finish(entry);
    if bundle.exceeds_local_limit() {
        warn!(
            "Bundle declares {} wrapper functions but Lua allows {} locals per chunk; it will not load",
            bundle.wrapper_count(),
            MAX_CHUNK_LOCALS
        );
    }
    Ok(bundle)
}

struct BundleEmitter<'a> {
    config: &'a BundleConfig,
    blocks: Vec<String>,
    records: Vec<ModuleRecord>,
    /// Resolved path -> (canonical import name, identifier) of emitted wrappers
    emitted: FxHashMap<&'a Path, (&'a str, String)>,
    /// Identifier -> import name that claimed it first
    identifiers: FxHashMap<String, &'a str>,
}

impl<'a> BundleEmitter<'a> {
    fn new(config: &'a BundleConfig) -> Self {
        Self {
            config,
            blocks: Vec::new(),
            records: Vec::new(),
            emitted: FxHashMap::default(),
            identifiers: FxHashMap::default(),
        }
    }

    fn add_library(&mut self, module: &'a ModuleNode) {
        if let Some((canonical, identifier)) = self.emitted.get(module.resolved_path.as_path()) {
            let (canonical, identifier) = (*canonical, identifier.clone());
            debug!(
                "{} already bundled as \"{}\", registering aliases only",
                module.resolved_path.display(),
                canonical
            );
            let lines: Vec<String> = module
                .import_names()
                .filter(|&name| name != canonical)
                .map(|name| self.alias(name, canonical, &identifier, module))
                .collect();
            if !lines.is_empty() {
                self.blocks.push(lines.join("\n"));
            }
            return;
        }

        let identifier = sanitize_identifier(&module.import_path);
        if let Some(&other) = self.identifiers.get(&identifier) {
            warn!(
                "Modules \"{}\" and \"{}\" share the wrapper name {}{}",
                other, module.import_path, self.config.function_prefix, identifier
            );
        } else {
            self.identifiers
                .insert(identifier.clone(), &module.import_path);
        }

        let function = format!("{}{}", self.config.function_prefix, identifier);
        let mut block = String::new();
        if self.config.module_headers {
            block.push_str(&format!(
                "-- module: {}\n",
                lua_string_literal(&module.import_path)
            ));
        }
        block.push_str(&format!("local function {function}()\n"));
        block.push_str(module.source());
        block.push_str("\nend\n");
        block.push_str(&format!(
            "\n{} = {function}()",
            self.cache_entry(&module.import_path)
        ));

        self.records.push(ModuleRecord {
            import_path: module.import_path.clone(),
            identifier: identifier.clone(),
            resolved_path: module.resolved_path.clone(),
            kind: RecordKind::Wrapped,
        });
        for alias in &module.aliases {
            let line = self.alias(alias, &module.import_path, &identifier, module);
            block.push('\n');
            block.push_str(&line);
        }

        self.blocks.push(block);
        self.emitted.insert(
            module.resolved_path.as_path(),
            (module.import_path.as_str(), identifier),
        );
    }

    /// Register `alias` by copying the cached value of `canonical`
    ///
    /// Calling the wrapper again would run the module a second time.
    fn alias(
        &mut self,
        alias: &str,
        canonical: &str,
        identifier: &str,
        module: &ModuleNode,
    ) -> String {
        self.records.push(ModuleRecord {
            import_path: alias.to_owned(),
            identifier: identifier.to_owned(),
            resolved_path: module.resolved_path.clone(),
            kind: RecordKind::Alias,
        });
        format!(
            "{} = {}",
            self.cache_entry(alias),
            self.cache_entry(canonical)
        )
    }

    fn cache_entry(&self, name: &str) -> String {
        format!("{}[{}]", self.config.cache_table, lua_string_literal(name))
    }

    fn finish(mut self, entry: &ModuleNode) -> Bundle {
        if !entry.aliases.is_empty() {
            debug!(
                "Entry module is also required as {:?}; those requires are left to the process",
                entry.aliases
            );
        }

        self.records.push(ModuleRecord {
            import_path: entry.import_path.clone(),
            identifier: sanitize_identifier(&entry.import_path),
            resolved_path: entry.resolved_path.clone(),
            kind: RecordKind::Entry,
        });
        self.blocks.push(entry.source().to_owned());

        Bundle {
            source: self.blocks.join(BLOCK_SEPARATOR),
            modules: self.records,
        }
    }
}

/// Quote a decoded import name as a Lua string literal
///
/// The literal evaluates to the same string the `require` call passed, so the
/// cache key matches what the entry file looks up.
fn lua_string_literal(name: &str) -> String {
    let mut literal = String::with_capacity(name.len() + 2);
    literal.push('"');
    for c in name.chars() {
        match c {
            '\\' => literal.push_str("\\\\"),
            '"' => literal.push_str("\\\""),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            c if c.is_ascii_control() => {
                literal.push_str(&format!("\\{:03}", u32::from(c)));
            }
            c => literal.push(c),
        }
    }
    literal.push('"');
    literal
}
