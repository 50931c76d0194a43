//! Core data models for Modscope
//!
//! These structures are the normalized output of every query: declarations,
//! usages and the module declarations the visibility graph is built from.
//! All of them serialize to JSON for the CLI's `--json` output.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum::{Display, EnumString};

/// A zero-based line/character location inside a document
///
/// `character` counts Unicode scalar values within the line, not bytes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

impl Position {
    pub fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

/// Half-open source range (`start` inclusive, `end` exclusive)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Whether `position` falls inside this range
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position < self.end
    }
}

/// Classification of a resolved declaration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "PascalCase")]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    /// Type or class declaration (class, interface, enum, type alias)
    Class,
    Method,
    /// Class field, or a top-level variable (exported constants, functions-as-values)
    Field,
    Function,
    /// Class decorated with `@Injectable`
    Injectable,
    /// Class decorated with `@Controller`
    Controller,
    /// Class decorated with `@Module`
    Module,
}

impl SymbolKind {
    /// Kind of a class carrying the given decorator, if the decorator is a recognized role
    pub fn from_decorator(name: &str) -> Option<Self> {
        match name {
            "Injectable" => Some(SymbolKind::Injectable),
            "Controller" => Some(SymbolKind::Controller),
            "Module" => Some(SymbolKind::Module),
            _ => None,
        }
    }
}

/// A resolved declaration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymbolDefinition {
    /// Declared name
    pub name: String,
    /// File containing the declaration
    pub path: PathBuf,
    /// Range of the declared name
    pub range: Range,
    pub kind: SymbolKind,
    /// Enclosing type for methods and fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
}

/// One reference to a symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageLocation {
    pub path: PathBuf,
    /// Range of the identifier token
    pub range: Range,
    /// Trimmed text of the line containing the reference
    pub preview: String,
    /// Module owning the file, when one could be determined
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
}

/// A module declaration extracted from a `*.module.ts` file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Module {
    /// Declared class name, e.g. `UserModule`
    pub name: String,
    /// File declaring the module
    pub file_path: PathBuf,
    /// Modules this module depends on
    pub imports: Vec<String>,
    /// Providers made visible to importers
    pub exports: Vec<String>,
    pub providers: Vec<String>,
    pub controllers: Vec<String>,
}

impl Module {
    /// Directory the module lives in
    pub fn directory(&self) -> &std::path::Path {
        self.file_path
            .parent()
            .unwrap_or_else(|| std::path::Path::new(""))
    }

    /// Whether the module lists `type_name` among its providers or controllers
    pub fn owns(&self, type_name: &str) -> bool {
        self.providers.iter().any(|p| p == type_name)
            || self.controllers.iter().any(|c| c == type_name)
    }
}

/// Query kinds, used as the first segment of cache keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum QueryKind {
    Definition,
    Usages,
}

impl QueryKind {
    pub const ALL: [QueryKind; 2] = [QueryKind::Definition, QueryKind::Usages];

    /// Cache key for a query at `position` in `path`
    ///
    /// Format: `<kind>:<path>:<line>:<character>`
    pub fn cache_key(&self, path: &std::path::Path, position: Position) -> String {
        format!(
            "{}:{}:{}:{}",
            self,
            path.display(),
            position.line,
            position.character
        )
    }

    /// Prefix shared by every key of this kind for `path`
    pub fn file_prefix(&self, path: &std::path::Path) -> String {
        format!("{}:{}:", self, path.display())
    }
}
