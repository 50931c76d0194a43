//! Module visibility graph
//!
//! Every `*.module.ts` file may declare one module: a class carrying a
//! `@Module({...})` decorator whose object literal lists `imports`,
//! `exports`, `providers` and `controllers`. The graph records the declared
//! import edges plus their transpose (`imported_by`), which is what decides
//! the set of files a symbol can be referenced from.
//!
//! # Visibility is one hop
//!
//! The modules that can see module `M` are `M` itself and the modules that
//! import `M` directly. A module importing an intermediate module that
//! imports `M` is *not* included:
//!
//! ```text
//! AppModule ──imports──▶ OrdersModule ──imports──▶ UserModule
//!
//! accessible_modules("UserModule") == { UserModule, OrdersModule }
//! ```
//!
//! The graph is immutable once built; a rebuild produces a new instance.

use anyhow::Result;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tree_sitter::Node;

use crate::models::Module;
use crate::parsers::typescript::{
    decorator_first_argument, decorator_name, decorators, declaration_name, node_text, Preorder,
};
use crate::parsers::ParserFactory;
use crate::workspace::{DocumentProvider, FileEnumerator, MODULE_GLOB};

/// Number of module files read and parsed concurrently
const BUILD_BATCH_SIZE: usize = 10;

/// Decorator marking a module declaration
const MODULE_DECORATOR: &str = "Module";

/// A module plus its derived import relations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleGraphNode {
    pub module: Module,
    /// Names of the modules this module imports (mirrors `module.imports`)
    pub imports: BTreeSet<String>,
    /// Names of the modules that list this module in their imports
    pub imported_by: BTreeSet<String>,
}

/// Mapping from module name to graph node
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    nodes: BTreeMap<String, ModuleGraphNode>,
}

impl ModuleGraph {
    /// Assemble a graph from parsed module declarations
    ///
    /// If two files declare the same module name, the first one wins.
    /// Imports naming unknown modules are kept in `imports` but produce no
    /// `imported_by` edge.
    pub fn from_modules(modules: impl IntoIterator<Item = Module>) -> Self {
        let mut nodes: BTreeMap<String, ModuleGraphNode> = BTreeMap::new();

        for module in modules {
            if let Some(existing) = nodes.get(&module.name) {
                log::warn!(
                    "Module {} declared in both {:?} and {:?}; keeping the first",
                    module.name,
                    existing.module.file_path,
                    module.file_path
                );
                continue;
            }
            let imports = module.imports.iter().cloned().collect();
            nodes.insert(
                module.name.clone(),
                ModuleGraphNode {
                    module,
                    imports,
                    imported_by: BTreeSet::new(),
                },
            );
        }

        let edges: Vec<(String, String)> = nodes
            .values()
            .flat_map(|node| {
                node.imports
                    .iter()
                    .map(move |target| (node.module.name.clone(), target.clone()))
            })
            .collect();

        for (importer, target) in edges {
            match nodes.get_mut(&target) {
                Some(node) => {
                    node.imported_by.insert(importer);
                }
                None => {
                    log::debug!("{} imports unknown module {}", importer, target);
                }
            }
        }

        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ModuleGraphNode> {
        self.nodes.get(name)
    }

    /// Nodes ordered by module name
    pub fn nodes(&self) -> impl Iterator<Item = &ModuleGraphNode> {
        self.nodes.values()
    }

    /// Module owning `path`
    ///
    /// Resolution order:
    /// 1. `path` is itself a module declaration file
    /// 2. `path` lives in (or below) a module's directory and its PascalCase
    ///    file name (`user.service.ts` → `UserService`) is one of that
    ///    module's providers or controllers
    /// 3. the module whose directory is the nearest ancestor of `path`
    ///
    /// Steps 2 and 3 prefer the deepest module directory, so a nested module
    /// wins over the module of an enclosing directory.
    pub fn module_for_file(&self, path: &Path) -> Option<&Module> {
        if let Some(node) = self.nodes.values().find(|n| n.module.file_path == path) {
            return Some(&node.module);
        }

        let dir = path.parent()?;
        let mut candidates: Vec<&Module> = self
            .nodes
            .values()
            .map(|n| &n.module)
            .filter(|m| dir.starts_with(m.directory()))
            .collect();
        candidates.sort_by(|a, b| {
            b.directory()
                .components()
                .count()
                .cmp(&a.directory().components().count())
                .then_with(|| a.name.cmp(&b.name))
        });

        if let Some(type_name) = pascal_case_type_name(path) {
            if let Some(owner) = candidates.iter().copied().find(|m| m.owns(&type_name)) {
                return Some(owner);
            }
        }

        candidates.first().copied()
    }

    /// `name` plus the modules importing it directly
    pub fn accessible_modules(&self, name: &str) -> BTreeSet<String> {
        let mut accessible = BTreeSet::from([name.to_string()]);
        if let Some(node) = self.nodes.get(name) {
            accessible.extend(node.imported_by.iter().cloned());
        }
        accessible
    }

    /// Declaration files of the modules in [`accessible_modules`](Self::accessible_modules)
    ///
    /// Only the module files themselves; the usage finder widens this to the
    /// module directories.
    pub fn accessible_files(&self, name: &str) -> BTreeSet<PathBuf> {
        self.accessible_modules(name)
            .iter()
            .filter_map(|m| self.nodes.get(m))
            .map(|node| node.module.file_path.clone())
            .collect()
    }
}

/// Type name derived from a file name: `user-profile.controller.ts` → `UserProfileController`
pub fn pascal_case_type_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let name: String = stem
        .split(['.', '-', '_'])
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();

    if name.is_empty() { None } else { Some(name) }
}

/// Extract the module declared in `source`, if any
///
/// Looks for the first class decorated with `@Module(<object literal>)`.
/// Array elements that are not plain identifiers (calls such as
/// `forwardRef(() => X)` or `ConfigModule.forRoot()`, spreads) are ignored.
pub fn parse_module_declaration(path: &Path, source: &str) -> Result<Option<Module>> {
    let tree = ParserFactory::parse(path, source)?;
    let root = tree.root_node();

    for node in Preorder::new(root) {
        if !matches!(node.kind(), "class_declaration" | "abstract_class_declaration") {
            continue;
        }

        let config = decorators(node).into_iter().find_map(|decorator| {
            let is_module = decorator_name(decorator, source).as_deref() == Some(MODULE_DECORATOR);
            if !is_module {
                return None;
            }
            decorator_first_argument(decorator).filter(|arg| arg.kind() == "object")
        });
        let Some(config) = config else {
            continue;
        };
        let Some(name) = declaration_name(node) else {
            continue;
        };

        let mut module = Module {
            name: node_text(name, source).to_string(),
            file_path: path.to_path_buf(),
            imports: Vec::new(),
            exports: Vec::new(),
            providers: Vec::new(),
            controllers: Vec::new(),
        };

        let mut cursor = config.walk();
        for pair in config.named_children(&mut cursor).filter(|c| c.kind() == "pair") {
            let (Some(key), Some(value)) = (
                pair.child_by_field_name("key"),
                pair.child_by_field_name("value"),
            ) else {
                continue;
            };

            let target = match property_key(key, source) {
                "imports" => &mut module.imports,
                "exports" => &mut module.exports,
                "providers" => &mut module.providers,
                "controllers" => &mut module.controllers,
                _ => continue,
            };
            target.extend(identifier_elements(value, source));
        }

        return Ok(Some(module));
    }

    Ok(None)
}

/// Key of an object-literal property, with quotes stripped from string keys
fn property_key<'s>(key: Node, source: &'s str) -> &'s str {
    node_text(key, source).trim_matches(|c| c == '\'' || c == '"')
}

/// Identifier elements of an array literal
fn identifier_elements(array: Node, source: &str) -> Vec<String> {
    if array.kind() != "array" {
        return Vec::new();
    }
    let mut cursor = array.walk();
    array
        .named_children(&mut cursor)
        .filter(|element| element.kind() == "identifier")
        .map(|element| node_text(element, source).to_string())
        .collect()
}

/// Scans the workspace for module declarations and assembles the graph
pub struct ModuleGraphBuilder<'a> {
    files: &'a dyn FileEnumerator,
    documents: &'a dyn DocumentProvider,
    exclude_patterns: &'a [String],
}

impl<'a> ModuleGraphBuilder<'a> {
    pub fn new(
        files: &'a dyn FileEnumerator,
        documents: &'a dyn DocumentProvider,
        exclude_patterns: &'a [String],
    ) -> Self {
        Self {
            files,
            documents,
            exclude_patterns,
        }
    }

    /// Build a fresh graph from every module declaration file
    ///
    /// Files that cannot be read or parsed are logged and skipped; only a
    /// failure to enumerate the workspace is returned as an error.
    pub async fn build(&self) -> Result<ModuleGraph> {
        let module_files = self
            .files
            .find_files(MODULE_GLOB, self.exclude_patterns)
            .await?;
        log::info!("Building module graph from {} module files", module_files.len());

        let mut modules = Vec::new();
        for batch in module_files.chunks(BUILD_BATCH_SIZE) {
            let parsed = join_all(batch.iter().map(|path| self.load_module(path))).await;
            modules.extend(parsed.into_iter().flatten());
        }

        let graph = ModuleGraph::from_modules(modules);
        log::info!("Module graph built: {} modules", graph.len());
        Ok(graph)
    }

    async fn load_module(&self, path: &Path) -> Option<Module> {
        let document = match self.documents.open(path).await {
            Ok(document) => document,
            Err(e) => {
                log::warn!("Failed to read module file {}: {:#}", path.display(), e);
                return None;
            }
        };

        match parse_module_declaration(path, document.text()) {
            Ok(Some(module)) => {
                log::debug!(
                    "Found module {} in {} ({} imports)",
                    module.name,
                    path.display(),
                    module.imports.len()
                );
                Some(module)
            }
            Ok(None) => {
                log::debug!("No module declaration in {}", path.display());
                None
            }
            Err(e) => {
                log::warn!("Failed to parse module file {}: {:#}", path.display(), e);
                None
            }
        }
    }
}
