/// Graph builder that discovers the local modules of a Lua project
///
/// Starting at the entry file, every `require` found by the scanner is
/// resolved against the entry file's directory and visited depth-first.
/// Modules are appended after all of their dependencies (post-order), which
/// yields a load order with the entry file last.
use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use indexmap::{IndexMap, IndexSet};
use log::{debug, trace, warn};
use rustc_hash::FxHashSet;

use crate::{
    config::Config,
    dependency_graph::DependencyGraph,
    fs::FileSystem,
    naming::{entry_module_name, normalize_path, resolve_import},
    require_scanner::scan_requires,
};

/// One discovered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNode {
    /// Import name of the first `require` that reached this file
    pub import_path: String,
    /// Other import names that resolved to the same file, in discovery order
    pub aliases: Vec<String>,
    /// Normalized file path, the identity of the module
    pub resolved_path: PathBuf,
    /// File contents; `None` when the file does not exist locally
    pub source_text: Option<String>,
    /// Resolved paths of the direct requires, in source order
    pub dependencies: Vec<PathBuf>,
}

impl ModuleNode {
    pub fn new(import_path: impl Into<String>, resolved_path: PathBuf) -> Self {
        Self {
            import_path: import_path.into(),
            aliases: Vec::new(),
            resolved_path,
            source_text: None,
            dependencies: Vec::new(),
        }
    }

    /// Whether the file was found locally
    pub fn is_local(&self) -> bool {
        self.source_text.is_some()
    }

    pub fn source(&self) -> &str {
        self.source_text.as_deref().unwrap_or_default()
    }

    /// The canonical import name followed by every alias
    pub fn import_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.import_path.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Local modules of a project in load order
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    /// Directory every import name is resolved against
    pub base_dir: PathBuf,
    /// Dependencies first, entry module last
    pub modules: Vec<ModuleNode>,
    /// Import names with no local file, assumed to exist on the remote side
    pub skipped: Vec<String>,
    /// Require cycles among local modules, empty for acyclic projects
    pub cycles: Vec<Vec<PathBuf>>,
}

impl ResolvedProject {
    pub fn entry(&self) -> Option<&ModuleNode> {
        self.modules.last()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::from_modules(&self.modules)
    }
}

/// Discover the project rooted at `entry` and order its modules
pub fn build_project(entry: &Path, fs: &dyn FileSystem, config: &Config) -> Result<ResolvedProject> {
    let entry = normalize_path(entry);
    if !fs.exists(&entry) {
        bail!("Entry file not found: {}", entry.display());
    }
    if !fs.is_file(&entry) {
        bail!("Entry path is not a file: {}", entry.display());
    }

    let base_dir = entry.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut builder = GraphBuilder::new(fs, base_dir, config.extension());
    builder.visit(&entry_module_name(&entry), entry.clone())?;

    let project = builder.finish();
    if project
        .entry()
        .is_none_or(|module| module.resolved_path != entry)
    {
        bail!("Entry file not found: {}", entry.display());
    }

    if !project.cycles.is_empty() {
        for cycle in &project.cycles {
            warn!("Circular require detected: {}", format_cycle(cycle));
        }
        if config.strict_cycles {
            bail!(
                "Circular require detected: {}",
                format_cycle(&project.cycles[0])
            );
        }
    }

    debug!(
        "Resolved {} local modules ({} skipped)",
        project.modules.len(),
        project.skipped.len()
    );
    Ok(project)
}

fn is_missing(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

fn format_cycle(cycle: &[PathBuf]) -> String {
    let mut names: Vec<String> = cycle.iter().map(|path| path.display().to_string()).collect();
    if let Some(first) = names.first().cloned() {
        names.push(first);
    }
    names.join(" -> ")
}

/// Depth-first post-order walk over the require graph
#[derive(Debug)]
pub struct GraphBuilder<'a> {
    fs: &'a dyn FileSystem,
    base_dir: PathBuf,
    extension: &'a str,
    /// Paths the walk has entered, finished or not
    visited: FxHashSet<PathBuf>,
    /// Every discovered node, local or not
    nodes: IndexMap<PathBuf, ModuleNode>,
    /// Post-order of finished paths
    sorted: Vec<PathBuf>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(fs: &'a dyn FileSystem, base_dir: PathBuf, extension: &'a str) -> Self {
        Self {
            fs,
            base_dir,
            extension,
            visited: FxHashSet::default(),
            nodes: IndexMap::new(),
            sorted: Vec::new(),
        }
    }

    /// Visit the module `import_path` living at `resolved_path`
    ///
    /// Each path is read and scanned at most once. Re-entering a path that is
    /// still on the stack (a cycle) returns immediately, so the walk always
    /// terminates.
    pub fn visit(&mut self, import_path: &str, resolved_path: PathBuf) -> Result<()> {
        if !self.visited.insert(resolved_path.clone()) {
            self.record_alias(import_path, &resolved_path);
            return Ok(());
        }

        let source_text = self.read_module(&resolved_path)?;
        let children: IndexMap<PathBuf, Vec<String>> = source_text
            .as_deref()
            .map(|source| self.resolve_requires(&resolved_path, source))
            .unwrap_or_default();

        let mut node = ModuleNode::new(import_path, resolved_path.clone());
        node.source_text = source_text;
        node.dependencies = children.keys().cloned().collect();
        self.nodes.insert(resolved_path.clone(), node);

        for (child_path, names) in children {
            for name in names {
                self.visit(&name, child_path.clone())?;
            }
        }

        trace!("Finished {}", resolved_path.display());
        self.sorted.push(resolved_path);
        Ok(())
    }

    /// Requires of one module grouped by resolved path, in first-seen order
    fn resolve_requires(&self, from: &Path, source: &str) -> IndexMap<PathBuf, Vec<String>> {
        let mut children: IndexMap<PathBuf, Vec<String>> = IndexMap::new();
        let mut seen_names = IndexSet::new();
        for call in scan_requires(source) {
            if !seen_names.insert(call.name.clone()) {
                continue;
            }
            let path = resolve_import(&self.base_dir, &call.name, self.extension);
            trace!(
                "{}:{} requires \"{}\" -> {}",
                from.display(),
                call.line,
                call.name,
                path.display()
            );
            children.entry(path).or_default().push(call.name);
        }
        children
    }

    /// Read a module, mapping "does not exist" to `None`
    ///
    /// A path running through a regular file (`util/helpers.lua` next to a
    /// file named `util`) does not exist either.
    fn read_module(&self, path: &Path) -> Result<Option<String>> {
        match self.fs.read(path) {
            Ok(source) => Ok(Some(source)),
            Err(err) if is_missing(&err) => {
                debug!("{} is not local, leaving it to the process", path.display());
                Ok(None)
            }
            Err(err) => Err(err).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn record_alias(&mut self, import_path: &str, resolved_path: &Path) {
        if let Some(node) = self.nodes.get_mut(resolved_path)
            && node.import_names().all(|name| name != import_path)
        {
            debug!(
                "\"{}\" is an alias of \"{}\" ({})",
                import_path,
                node.import_path,
                resolved_path.display()
            );
            node.aliases.push(import_path.to_owned());
        }
    }

    /// Turn the walk into the ordered project, dropping non-local modules
    pub fn finish(mut self) -> ResolvedProject {
        let mut modules = Vec::with_capacity(self.sorted.len());
        let mut skipped = Vec::new();

        for path in &self.sorted {
            let Some(node) = self.nodes.swap_remove(path) else {
                continue;
            };
            if node.is_local() {
                modules.push(node);
            } else {
                skipped.extend(node.import_names().map(str::to_owned));
            }
        }

        let graph = DependencyGraph::from_modules(&modules);
        let cycles = if graph.has_cycles() {
            graph.find_cycles()
        } else {
            Vec::new()
        };
        ResolvedProject {
            base_dir: self.base_dir,
            modules,
            skipped,
            cycles,
        }
    }
}
