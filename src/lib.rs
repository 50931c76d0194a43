//! modscope: module-aware symbol analysis for TypeScript workspaces
//!
//! Answers go-to-definition and find-usages queries using syntax only, and
//! narrows usage searches to the modules that can see a symbol. A module is a
//! class decorated with `@Module({ imports, exports, providers, controllers })`
//! in a `*.module.ts` file; a module is visible to itself and to the modules
//! importing it directly.
//!
//! # Architecture
//!
//! - **Module graph**: parsed module declarations plus reverse import edges
//! - **Resolver**: declaration lookup with receiver-type inference
//! - **Usage finder**: scoped, batched reference search
//! - **Analyzer**: lazy graph build, LRU query cache and change handling
//!
//! # Example Usage
//!
//! ```no_run
//! use modscope::{Analyzer, AnalyzerConfig, Position};
//! use std::path::Path;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let analyzer = Analyzer::for_root("/path/to/workspace", AnalyzerConfig::default());
//! let file = Path::new("/path/to/workspace/src/user/user.service.ts");
//!
//! let usages = analyzer.find_usages(file, Position::new(4, 14)).await?;
//! println!("Found {} usages", usages.len());
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod index_cache;
pub mod models;
pub mod module_graph;
pub mod output;
pub mod parsers;
pub mod resolver;
pub mod usages;
pub mod watcher;
pub mod workspace;

// Re-export commonly used types
pub use analyzer::{Analyzer, AnalyzerState};
pub use config::AnalyzerConfig;
pub use models::{Module, Position, Range, SymbolDefinition, SymbolKind, UsageLocation};
pub use module_graph::ModuleGraph;
pub use workspace::{ChangeKind, DocumentProvider, FileChange, FileEnumerator, FsWorkspace};
