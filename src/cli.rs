//! CLI argument parsing and command handlers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::analyzer::Analyzer;
use crate::config::{load_config, AnalyzerConfig};
use crate::models::{Position, SymbolDefinition, UsageLocation};
use crate::module_graph::ModuleGraph;
use crate::output;

/// modscope: module-aware definition and usage lookup for TypeScript workspaces
#[derive(Parser, Debug)]
#[command(
    name = "modscope",
    version,
    about = "Module-aware go-to-definition and find-usages for TypeScript",
    long_about = "modscope resolves definitions and usages in TypeScript workspaces built \
                  from decorated modules (`@Module({ imports, exports, providers, controllers })`). \
                  Usage searches are restricted to the modules that can actually see a symbol: \
                  its own module and the modules importing it directly.\n\n\
                  Line and column numbers are 1-based."
)]
pub struct Cli {
    /// Enable verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Workspace root
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    pub root: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find the declaration of the symbol at a position
    ///
    /// Examples:
    ///   modscope definition src/user/user.controller.ts 12 25
    ///   modscope definition src/app.module.ts 4 14 --json
    Definition {
        /// Source file
        file: PathBuf,

        /// Line number (1-based)
        line: usize,

        /// Column number (1-based)
        column: usize,

        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output (only with --json)
        #[arg(long)]
        pretty: bool,
    },

    /// Find the usages of the symbol at a position
    ///
    /// By default only files of the symbol's module and of the modules
    /// importing it directly are searched.
    ///
    /// Examples:
    ///   modscope usages src/user/user.service.ts 5 14
    ///   modscope usages src/user/user.service.ts 9 3 --no-scope --all
    Usages {
        /// Source file
        file: PathBuf,

        /// Line number (1-based)
        line: usize,

        /// Column number (1-based)
        column: usize,

        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output (only with --json)
        #[arg(long)]
        pretty: bool,

        /// Search the whole workspace instead of the accessible modules
        #[arg(long)]
        no_scope: bool,

        /// Show every usage instead of the first `max_inline_usages`
        #[arg(long)]
        all: bool,
    },

    /// Show the module a file belongs to
    Module {
        /// Source file
        file: PathBuf,

        /// Output format as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the module graph
    Graph {
        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output (only with --json)
        #[arg(long)]
        pretty: bool,
    },

    /// Watch the workspace and keep the analyzer up to date
    ///
    /// Runs until interrupted with Ctrl+C.
    Watch,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        // Setup logging based on verbosity
        let log_level = match self.verbose {
            0 => "warn",   // Default: only warnings and errors
            1 => "info",   // -v: show info messages
            2 => "debug",  // -vv: show debug messages
            _ => "trace",  // -vvv: show trace messages
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
            .init();

        let root = self
            .root
            .canonicalize()
            .with_context(|| format!("Workspace root not found: {}", self.root.display()))?;
        let mut config = load_config(&root)?;

        if let Command::Usages { no_scope: true, .. } = self.command {
            config.enable_module_scoping = false;
        }

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async {
            match self.command {
                Command::Definition { file, line, column, json, pretty } => {
                    handle_definition(&root, config, &file, line, column, json, pretty).await
                }
                Command::Usages { file, line, column, json, pretty, all, .. } => {
                    handle_usages(&root, config, &file, line, column, json, pretty, all).await
                }
                Command::Module { file, json } => handle_module(&root, config, &file, json).await,
                Command::Graph { json, pretty } => handle_graph(&root, config, json, pretty).await,
                Command::Watch => handle_watch(&root, config).await,
            }
        })
    }
}

/// Convert 1-based command-line coordinates to a zero-based position
fn to_position(line: usize, column: usize) -> Result<Position> {
    if line == 0 || column == 0 {
        anyhow::bail!("Line and column numbers start at 1 (got {}:{})", line, column);
    }
    Ok(Position::new(line - 1, column - 1))
}

/// Absolute, canonical path of a file given on the command line
fn resolve_file(file: &Path) -> Result<PathBuf> {
    file.canonicalize()
        .with_context(|| format!("File not found: {}", file.display()))
}

/// Path relative to the workspace root for display
fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json_output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json_output);
    Ok(())
}

/// Smart truncate preview to keep one usage per line
/// Truncates at word boundary if possible, adds ellipsis if truncated
pub fn truncate_preview(preview: &str, max_chars: usize) -> String {
    if preview.chars().count() <= max_chars {
        return preview.to_string();
    }

    // Find a good break point (prefer word boundary)
    let truncate_at = preview
        .char_indices()
        .take(max_chars)
        .filter(|(_, c)| c.is_whitespace())
        .last()
        .map(|(i, _)| i)
        .unwrap_or_else(|| {
            preview
                .char_indices()
                .nth(max_chars)
                .map(|(i, _)| i)
                .unwrap_or(preview.len())
        });

    let mut truncated = preview[..truncate_at].to_string();
    truncated.push('…');
    truncated
}

/// Handle the `definition` subcommand
async fn handle_definition(
    root: &Path,
    config: AnalyzerConfig,
    file: &Path,
    line: usize,
    column: usize,
    as_json: bool,
    pretty_json: bool,
) -> Result<()> {
    let position = to_position(line, column)?;
    let file = resolve_file(file)?;
    let analyzer = Analyzer::for_root(root, config);

    let start = Instant::now();
    let definition = analyzer.find_definition(&file, position).await?;
    log::info!("Definition lookup took {:?}", start.elapsed());

    if as_json {
        return print_json(&definition, pretty_json);
    }

    match definition {
        Some(definition) => println!("{}", format_definition(root, &definition)),
        None => output::info("No definition found."),
    }
    Ok(())
}

fn format_definition(root: &Path, definition: &SymbolDefinition) -> String {
    let qualified = match &definition.container_name {
        Some(container) => format!("{}.{}", container, definition.name),
        None => definition.name.clone(),
    };
    format!(
        "{}:{}:{}  {} {}",
        display_path(root, &definition.path).cyan(),
        definition.range.start.line + 1,
        definition.range.start.character + 1,
        definition.kind.to_string().dimmed(),
        qualified.bold()
    )
}

/// Handle the `usages` subcommand
#[allow(clippy::too_many_arguments)]
async fn handle_usages(
    root: &Path,
    config: AnalyzerConfig,
    file: &Path,
    line: usize,
    column: usize,
    as_json: bool,
    pretty_json: bool,
    show_all: bool,
) -> Result<()> {
    let position = to_position(line, column)?;
    let file = resolve_file(file)?;
    let max_inline = config.max_inline_usages;
    let scoped = config.enable_module_scoping;
    let analyzer = Analyzer::for_root(root, config);

    if scoped && analyzer.get_module_for_file(&file).await?.is_none() {
        log::info!("{} belongs to no module; searching the whole workspace", file.display());
    }

    let start = Instant::now();
    let usages = analyzer.find_usages(&file, position).await?;
    log::info!("Usage search took {:?}", start.elapsed());

    if as_json {
        return print_json(&usages, pretty_json);
    }

    if usages.is_empty() {
        output::info("No usages found.");
        return Ok(());
    }

    println!("Found {} usage(s)", usages.len());
    let shown = if show_all { usages.len() } else { max_inline.min(usages.len()) };
    for usage in &usages[..shown] {
        println!("{}", format_usage(root, usage));
    }
    if shown < usages.len() {
        println!(
            "{}",
            format!("… and {} more (use --all to show every usage)", usages.len() - shown).dimmed()
        );
    }
    Ok(())
}

fn format_usage(root: &Path, usage: &UsageLocation) -> String {
    let module = usage
        .module_name
        .as_deref()
        .map(|m| format!("[{}] ", m))
        .unwrap_or_default();
    format!(
        "{}:{}:{}  {}{}",
        display_path(root, &usage.path).cyan(),
        usage.range.start.line + 1,
        usage.range.start.character + 1,
        module.yellow(),
        truncate_preview(&usage.preview, 100)
    )
}

#[derive(Serialize)]
struct ModuleMembership {
    file: PathBuf,
    module: Option<String>,
}

/// Handle the `module` subcommand
async fn handle_module(root: &Path, config: AnalyzerConfig, file: &Path, as_json: bool) -> Result<()> {
    let file = resolve_file(file)?;
    let analyzer = Analyzer::for_root(root, config);
    let module = analyzer.get_module_for_file(&file).await?;

    if as_json {
        return print_json(&ModuleMembership { file, module }, false);
    }

    match module {
        Some(module) => println!("{}", module),
        None => output::warn(&format!("{} belongs to no module.", display_path(root, &file))),
    }
    Ok(())
}

/// One module of the graph as shown by `modscope graph`
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct GraphEntry {
    name: String,
    file: PathBuf,
    imports: Vec<String>,
    imported_by: Vec<String>,
    providers: Vec<String>,
    controllers: Vec<String>,
    exports: Vec<String>,
}

fn graph_entries(graph: &ModuleGraph) -> Vec<GraphEntry> {
    graph
        .nodes()
        .map(|node| GraphEntry {
            name: node.module.name.clone(),
            file: node.module.file_path.clone(),
            imports: node.imports.iter().cloned().collect(),
            imported_by: node.imported_by.iter().cloned().collect(),
            providers: node.module.providers.clone(),
            controllers: node.module.controllers.clone(),
            exports: node.module.exports.clone(),
        })
        .collect()
}

/// Handle the `graph` subcommand
async fn handle_graph(root: &Path, config: AnalyzerConfig, as_json: bool, pretty_json: bool) -> Result<()> {
    let analyzer = Analyzer::for_root(root, config);
    let graph = analyzer.module_graph().await?;
    let entries = graph_entries(&graph);

    if as_json {
        return print_json(&entries, pretty_json);
    }

    if entries.is_empty() {
        output::warn("No modules found. Module declarations live in *.module.ts files.");
        return Ok(());
    }

    let list = |items: &[String]| if items.is_empty() { "-".to_string() } else { items.join(", ") };
    for entry in &entries {
        println!("{}  {}", entry.name.bold(), display_path(root, &entry.file).dimmed());
        println!("  imports:      {}", list(&entry.imports));
        println!("  imported by:  {}", list(&entry.imported_by));
        println!("  providers:    {}", list(&entry.providers));
        println!("  controllers:  {}", list(&entry.controllers));
        println!("  exports:      {}", list(&entry.exports));
    }
    Ok(())
}

/// Handle the `watch` subcommand
async fn handle_watch(root: &Path, config: AnalyzerConfig) -> Result<()> {
    log::info!("Starting watch mode for {:?}", root);

    println!("Starting modscope watch mode...");
    println!("  Directory: {}", root.display());
    println!("  Debounce: {}ms", config.debounce_ms);
    println!("  Press Ctrl+C to stop.\n");

    let analyzer = Arc::new(Analyzer::for_root(root, config.clone()));
    let graph = analyzer.module_graph().await?;
    println!("Module graph ready: {} modules", graph.len());

    tokio::select! {
        result = crate::watcher::watch(root, analyzer.clone(), &config) => result?,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, stopping watcher");
        }
    }

    println!("Watcher stopped.");
    Ok(())
}
