use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use aopack::{
    bundler::{RecordKind, build_executable},
    config::Config,
    graph_builder::ResolvedProject,
    orchestrator::{BundleOrchestrator, BundleResult},
};
use clap::{ArgAction, ArgGroup, Parser};
use log::info;

/// Bundle a multi-file Lua project into a single AO Eval payload
#[derive(Parser, Debug)]
#[command(name = "aopack", version, about, long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["output", "stdout", "list"]),
))]
struct Cli {
    /// Entry Lua file; requires resolve relative to its directory
    #[arg(short, long)]
    entry: PathBuf,

    /// Write the bundle to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the bundle to stdout
    #[arg(long)]
    stdout: bool,

    /// Print the resolved module order instead of bundling
    #[arg(long)]
    list: bool,

    /// Extra configuration file, applied over user and project config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fail when the require graph contains a cycle
    #[arg(long)]
    strict_cycles: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::print_stderr)]
fn report_error(err: &anyhow::Error) {
    eprintln!("Error: {err:?}");
}

/// Default filter for `-v` count; `RUST_LOG` still wins
fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn init_logging(verbose: u8) {
    let env = env_logger::Env::default().default_filter_or(log_level(verbose));
    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(verbose > 1)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let project_dir = cli.entry.parent().filter(|dir| !dir.as_os_str().is_empty());
    let mut config = Config::load(cli.config.as_deref(), project_dir)?;
    config.strict_cycles |= cli.strict_cycles;

    let orchestrator = BundleOrchestrator::new(config);
    info!("Loading Lua file: {}", cli.entry.display());

    if cli.list {
        let project = orchestrator.resolve(&cli.entry)?;
        return print_listing(&orchestrator, &project);
    }

    let result = orchestrator.bundle(&cli.entry)?;
    info!("File size: {} bytes", result.entry_size());
    info!("Project structure: {} modules", result.project.len());

    if let Some(output) = &cli.output {
        orchestrator.write_bundle(&result, output)?;
    }
    if cli.stdout {
        write_stdout(&result)?;
    }
    Ok(())
}

fn write_stdout(result: &BundleResult) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(result.bundle.source.as_bytes())
        .and_then(|()| stdout.write_all(b"\n"))
        .and_then(|()| stdout.flush())
        .context("Failed to write bundle to stdout")
}

fn print_listing(orchestrator: &BundleOrchestrator, project: &ResolvedProject) -> Result<()> {
    let bundle = build_executable(&project.modules, &orchestrator.config().bundle)?;

    let graph = project.dependency_graph();
    let relative = |path: &Path| {
        path.strip_prefix(&project.base_dir)
            .unwrap_or(path)
            .display()
            .to_string()
    };

    let mut stdout = io::stdout().lock();
    let mut listing = String::new();
    for (index, record) in bundle.modules.iter().enumerate() {
        let marker = match record.kind {
            RecordKind::Wrapped => String::new(),
            kind => format!(" ({kind})"),
        };
        listing.push_str(&format!(
            "{:>3}. {}{} -> {} [{}]",
            index + 1,
            record.import_path,
            marker,
            record.resolved_path.display(),
            record.identifier
        ));
        let dependencies = graph.dependencies(&record.resolved_path);
        if record.kind != RecordKind::Alias && !dependencies.is_empty() {
            let names: Vec<String> = dependencies.into_iter().map(relative).collect();
            listing.push_str(&format!(" requires {}", names.join(", ")));
        }
        listing.push('\n');
    }
    for name in &project.skipped {
        listing.push_str(&format!("  -  {name} (not local)\n"));
    }
    for cycle in &project.cycles {
        let members: Vec<String> = cycle.iter().map(|path| path.display().to_string()).collect();
        listing.push_str(&format!("  !  cycle: {}\n", members.join(" -> ")));
    }

    stdout
        .write_all(listing.as_bytes())
        .and_then(|()| stdout.flush())
        .context("Failed to write module listing")
}
