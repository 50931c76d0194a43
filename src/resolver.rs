//! Symbol resolution
//!
//! Finds the declaration of the identifier under a cursor using syntax only.
//! For property accesses (`recv.save()`, `this.recv.save()`) the receiver's
//! declared type is inferred from explicit type annotations in the same file,
//! and only members of that type are considered.
//!
//! Declarations are matched in pre-order over the syntax tree; the first one
//! wins. The querying file is searched first, then every other workspace file
//! in enumeration order.

use anyhow::Result;
use tree_sitter::Node;

use crate::models::{Position, Range, SymbolDefinition, SymbolKind};
use crate::parsers::typescript::{
    decorator_name, decorators, declaration_name, enclosing_class_name, identifier_at,
    is_declaration_name, is_parameter_property, named_type, node_text, property_access_of,
    Preorder, CLASS_KINDS, TYPE_DECLARATION_KINDS,
};
use crate::parsers::ParserFactory;
use crate::workspace::{DocumentProvider, FileEnumerator, TextDocument, SOURCE_GLOB};

/// Class member declarations filtered by container name
const MEMBER_KINDS: &[&str] = &[
    "method_definition",
    "abstract_method_signature",
    "public_field_definition",
];

/// What sits under the cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolQuery {
    /// Identifier text
    pub name: String,
    /// Whether the identifier is the property of a member access (`recv.name`)
    pub is_property_access: bool,
    /// Declared type of the receiver, when it could be inferred
    pub receiver_type: Option<String>,
    /// Class declaring the member, when the cursor is on a method or field declaration
    pub declared_in: Option<String>,
}

/// Inspect the identifier at `position`
///
/// Returns `None` when no identifier is under the cursor.
pub fn symbol_at(document: &TextDocument, position: Position) -> Result<Option<SymbolQuery>> {
    let source = document.text();
    let tree = ParserFactory::parse(document.path(), source)?;
    let root = tree.root_node();

    let Some(node) = identifier_at(root, document.point_at(position)) else {
        return Ok(None);
    };

    let is_property_access = property_access_of(node).is_some();
    let receiver_type = if is_property_access {
        container_class_name(root, node, source)
    } else {
        None
    };
    let declared_in = if is_declaration_name(node) {
        node.parent().and_then(|parent| {
            if MEMBER_KINDS.contains(&parent.kind()) {
                owning_class_name(parent, source)
            } else {
                parameter_property_class(parent, source)
            }
        })
    } else {
        None
    };

    Ok(Some(SymbolQuery {
        name: node_text(node, source).to_string(),
        is_property_access,
        receiver_type,
        declared_in,
    }))
}

/// Declared type of the receiver of a property access
///
/// Handles `recv.name`, `this.recv.name` and `this.name` (the enclosing
/// class). Returns `None` when `node` is not a property access or the
/// receiver has no explicit single-type annotation in this file.
pub fn container_class_name(root: Node, node: Node, source: &str) -> Option<String> {
    let access = property_access_of(node)?;
    let object = access.child_by_field_name("object")?;

    match object.kind() {
        "this" => enclosing_class_name(node, source),
        "identifier" => resolve_declared_type(root, source, node_text(object, source)),
        "member_expression" => {
            let inner = object.child_by_field_name("object")?;
            if inner.kind() != "this" {
                return None;
            }
            let receiver = object.child_by_field_name("property")?;
            resolve_declared_type(root, source, node_text(receiver, source))
        }
        _ => None,
    }
}

/// Type annotation of the first parameter, field or variable named `receiver`
///
/// Declarations without a usable annotation are skipped, not treated as a
/// failed resolution.
pub fn resolve_declared_type(root: Node, source: &str, receiver: &str) -> Option<String> {
    Preorder::new(root).find_map(|node| {
        let name_field = match node.kind() {
            "required_parameter" | "optional_parameter" => "pattern",
            "public_field_definition" | "variable_declarator" => "name",
            _ => return None,
        };

        let name = node.child_by_field_name(name_field)?;
        if node_text(name, source) != receiver {
            return None;
        }
        let annotation = node.child_by_field_name("type")?;
        named_type(annotation, source)
    })
}

/// Name of the class whose body directly contains `member`
fn owning_class_name(member: Node, source: &str) -> Option<String> {
    let body = member.parent().filter(|p| p.kind() == "class_body")?;
    let class = body.parent().filter(|c| CLASS_KINDS.contains(&c.kind()))?;
    declaration_name(class).map(|name| node_text(name, source).to_string())
}

/// Class whose constructor declares the parameter property `parameter`
fn parameter_property_class(parameter: Node, source: &str) -> Option<String> {
    if !is_parameter_property(parameter) {
        return None;
    }
    let parameters = parameter.parent().filter(|p| p.kind() == "formal_parameters")?;
    let constructor = parameters
        .parent()
        .filter(|m| m.kind() == "method_definition")
        .filter(|m| declaration_name(*m).is_some_and(|name| node_text(name, source) == "constructor"))?;
    owning_class_name(constructor, source)
}

/// Whether a variable declarator is declared at module level
fn is_top_level(declarator: Node) -> bool {
    let Some(declaration) = declarator.parent() else {
        return false;
    };
    if !matches!(declaration.kind(), "lexical_declaration" | "variable_declaration") {
        return false;
    }
    match declaration.parent() {
        Some(parent) if parent.kind() == "program" => true,
        Some(parent) if parent.kind() == "export_statement" => {
            parent.parent().map(|p| p.kind() == "program").unwrap_or(false)
        }
        _ => false,
    }
}

/// Kind of a matched declaration node, honoring the container filter
fn match_declaration<'t>(
    node: Node<'t>,
    source: &str,
    name: &str,
    container: Option<&str>,
) -> Option<(Node<'t>, SymbolKind, Option<String>)> {
    let kind = node.kind();
    if matches!(kind, "required_parameter" | "optional_parameter") {
        let name_node = node.child_by_field_name("pattern")?;
        if node_text(name_node, source) != name {
            return None;
        }
        let class = parameter_property_class(node, source)?;
        if container.is_some_and(|required| required != class) {
            return None;
        }
        return Some((name_node, SymbolKind::Field, Some(class)));
    }

    let is_candidate = TYPE_DECLARATION_KINDS.contains(&kind)
        || MEMBER_KINDS.contains(&kind)
        || matches!(
            kind,
            "function_declaration" | "generator_function_declaration" | "variable_declarator"
        );
    if !is_candidate {
        return None;
    }

    let name_node = declaration_name(node)?;
    if node_text(name_node, source) != name {
        return None;
    }

    if TYPE_DECLARATION_KINDS.contains(&kind) {
        let role = decorators(node)
            .into_iter()
            .filter_map(|d| decorator_name(d, source))
            .find_map(|d| SymbolKind::from_decorator(&d));
        return Some((name_node, role.unwrap_or(SymbolKind::Class), None));
    }

    if MEMBER_KINDS.contains(&kind) {
        let class = owning_class_name(node, source)?;
        if container.is_some_and(|required| required != class) {
            return None;
        }
        let member_kind = if kind == "public_field_definition" {
            SymbolKind::Field
        } else {
            SymbolKind::Method
        };
        return Some((name_node, member_kind, Some(class)));
    }

    match kind {
        "function_declaration" | "generator_function_declaration" => {
            Some((name_node, SymbolKind::Function, None))
        }
        "variable_declarator" if is_top_level(node) => Some((name_node, SymbolKind::Field, None)),
        _ => None,
    }
}

/// First declaration of `name` in `document`
///
/// With a `container`, methods and fields of other classes are skipped; the
/// traversal still descends into their bodies.
pub fn definition_in(
    document: &TextDocument,
    name: &str,
    container: Option<&str>,
) -> Result<Option<SymbolDefinition>> {
    let source = document.text();
    let tree = ParserFactory::parse(document.path(), source)?;

    let found = Preorder::new(tree.root_node())
        .find_map(|node| match_declaration(node, source, name, container));

    Ok(found.map(|(name_node, kind, container_name)| SymbolDefinition {
        name: name.to_string(),
        path: document.path().to_path_buf(),
        range: Range::new(
            document.position_of_point(name_node.start_position()),
            document.position_of_point(name_node.end_position()),
        ),
        kind,
        container_name,
    }))
}

/// Resolves declarations across the workspace
pub struct SymbolResolver<'a> {
    files: &'a dyn FileEnumerator,
    documents: &'a dyn DocumentProvider,
    exclude_patterns: &'a [String],
}

impl<'a> SymbolResolver<'a> {
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

    /// Declaration of the symbol at `position`
    pub async fn find_definition(
        &self,
        document: &TextDocument,
        position: Position,
    ) -> Result<Option<SymbolDefinition>> {
        let Some(query) = symbol_at(document, position)? else {
            log::debug!("No identifier at {:?} in {}", position, document.path().display());
            return Ok(None);
        };
        let container = query.receiver_type.as_deref();

        if let Some(definition) = definition_in(document, &query.name, container)? {
            return Ok(Some(definition));
        }

        let files = self.files.find_files(SOURCE_GLOB, self.exclude_patterns).await?;
        for path in files.iter().filter(|p| p.as_path() != document.path()) {
            let candidate = match self.documents.open(path).await {
                Ok(candidate) => candidate,
                Err(e) => {
                    log::debug!("Skipping {} during definition search: {:#}", path.display(), e);
                    continue;
                }
            };

            match definition_in(&candidate, &query.name, container) {
                Ok(Some(definition)) => return Ok(Some(definition)),
                Ok(None) => {}
                Err(e) => log::warn!("Failed to parse {}: {:#}", path.display(), e),
            }
        }

        log::debug!("No declaration found for {}", query.name);
        Ok(None)
    }
}
