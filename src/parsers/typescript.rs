//! Syntax helpers over the tree-sitter-typescript grammar
//!
//! Everything here is purely syntactic:
//! - locating the identifier under a cursor
//! - lazy pre-order traversal of a (sub)tree
//! - decorator lookup for class declarations (including `export class`)
//! - classification of declaration sites and property accesses
//! - extraction of a single named type from a type annotation

use tree_sitter::{Node, Point, TreeCursor};

/// Node kinds that carry a symbol name
pub const IDENTIFIER_KINDS: &[&str] = &[
    "identifier",
    "property_identifier",
    "type_identifier",
    "shorthand_property_identifier",
];

/// Class-like declarations that can contain methods and fields
pub const CLASS_KINDS: &[&str] = &["class_declaration", "abstract_class_declaration", "class"];

/// Type declarations resolved as `SymbolKind::Class`
pub const TYPE_DECLARATION_KINDS: &[&str] = &[
    "class_declaration",
    "abstract_class_declaration",
    "interface_declaration",
    "enum_declaration",
    "type_alias_declaration",
];

/// Declarations whose `name` field introduces a symbol
const NAMED_DECLARATION_KINDS: &[&str] = &[
    "class_declaration",
    "abstract_class_declaration",
    "class",
    "interface_declaration",
    "enum_declaration",
    "type_alias_declaration",
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "method_definition",
    "method_signature",
    "abstract_method_signature",
    "public_field_definition",
    "property_signature",
    "variable_declarator",
    "type_parameter",
    "enum_assignment",
];

/// Text of a node, or an empty string for invalid UTF-8
pub fn node_text<'s>(node: Node, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

pub fn is_identifier(node: &Node) -> bool {
    IDENTIFIER_KINDS.contains(&node.kind())
}

/// Find the identifier covering `point`
///
/// A cursor placed right after an identifier (`foo|`) still selects it,
/// matching how editors compute the word under the cursor.
pub fn identifier_at<'t>(root: Node<'t>, point: Point) -> Option<Node<'t>> {
    let at_point = root
        .descendant_for_point_range(point, point)
        .filter(is_identifier);
    if at_point.is_some() {
        return at_point;
    }

    if point.column == 0 {
        return None;
    }
    let before = Point::new(point.row, point.column - 1);
    root.descendant_for_point_range(before, before)
        .filter(is_identifier)
        .filter(|node| node.end_position() == point)
}

/// Depth-first pre-order sequence of the nodes of a subtree
///
/// Lazy and finite; create a new one to restart the walk.
pub struct Preorder<'t> {
    cursor: TreeCursor<'t>,
    done: bool,
}

impl<'t> Preorder<'t> {
    pub fn new(root: Node<'t>) -> Self {
        Self {
            cursor: root.walk(),
            done: false,
        }
    }
}

impl<'t> Iterator for Preorder<'t> {
    type Item = Node<'t>;

    fn next(&mut self) -> Option<Node<'t>> {
        if self.done {
            return None;
        }

        let node = self.cursor.node();
        if self.cursor.goto_first_child() {
            return Some(node);
        }
        loop {
            if self.cursor.goto_next_sibling() {
                return Some(node);
            }
            // goto_parent never leaves the subtree the cursor was created on
            if !self.cursor.goto_parent() {
                self.done = true;
                return Some(node);
            }
        }
    }
}

/// Decorator nodes attached to a declaration
///
/// tree-sitter attaches the decorators of `export class Foo {}` to the
/// enclosing `export_statement`, so both places are checked.
pub fn decorators<'t>(declaration: Node<'t>) -> Vec<Node<'t>> {
    let mut holders = vec![declaration];
    if let Some(parent) = declaration.parent() {
        if parent.kind() == "export_statement" {
            holders.push(parent);
        }
    }

    let mut found = Vec::new();
    for holder in holders {
        let mut cursor = holder.walk();
        found.extend(holder.children(&mut cursor).filter(|c| c.kind() == "decorator"));
    }
    found
}

/// Name of a decorator: `@Injectable()` and `@Injectable` both yield `Injectable`,
/// `@common.Injectable()` yields `Injectable`
pub fn decorator_name(decorator: Node, source: &str) -> Option<String> {
    let expression = decorator.named_child(0)?;
    let callee = match expression.kind() {
        "call_expression" | "decorator_call_expression" => {
            expression.child_by_field_name("function")?
        }
        _ => expression,
    };

    match callee.kind() {
        "identifier" => Some(node_text(callee, source).to_string()),
        "member_expression" | "decorator_member_expression" => callee
            .child_by_field_name("property")
            .map(|p| node_text(p, source).to_string()),
        _ => None,
    }
}

/// First argument of a called decorator (`@Module({ ... })` → the object literal)
pub fn decorator_first_argument<'t>(decorator: Node<'t>) -> Option<Node<'t>> {
    let expression = decorator.named_child(0)?;
    if !matches!(expression.kind(), "call_expression" | "decorator_call_expression") {
        return None;
    }
    let arguments = expression.child_by_field_name("arguments")?;
    let mut cursor = arguments.walk();
    let first = arguments
        .named_children(&mut cursor)
        .find(|argument| argument.kind() != "comment");
    first
}

/// The `name` node of a declaration
pub fn declaration_name(node: Node) -> Option<Node> {
    node.child_by_field_name("name")
}

/// Whether a constructor parameter also declares a field
/// (`constructor(private readonly repo: Repo)`)
pub fn is_parameter_property(parameter: Node) -> bool {
    if !matches!(parameter.kind(), "required_parameter" | "optional_parameter") {
        return false;
    }
    let mut cursor = parameter.walk();
    parameter
        .children(&mut cursor)
        .any(|c| matches!(c.kind(), "accessibility_modifier" | "readonly" | "override_modifier"))
}

/// Nearest enclosing class-like declaration of `node`
pub fn enclosing_class(node: Node) -> Option<Node> {
    let mut current = node.parent();
    while let Some(candidate) = current {
        if CLASS_KINDS.contains(&candidate.kind()) {
            return Some(candidate);
        }
        current = candidate.parent();
    }
    None
}

/// Name of the nearest enclosing class-like declaration
pub fn enclosing_class_name(node: Node, source: &str) -> Option<String> {
    let class = enclosing_class(node)?;
    declaration_name(class).map(|name| node_text(name, source).to_string())
}

/// The `member_expression` in which `node` is the property (`recv.node`)
pub fn property_access_of(node: Node) -> Option<Node> {
    let parent = node.parent()?;
    if parent.kind() == "member_expression" && parent.child_by_field_name("property") == Some(node) {
        Some(parent)
    } else {
        None
    }
}

/// Whether `node` is the name introduced by a declaration rather than a reference
pub fn is_declaration_name(node: Node) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    let is_field = |field: &str| parent.child_by_field_name(field) == Some(node);

    match parent.kind() {
        kind if NAMED_DECLARATION_KINDS.contains(&kind) => is_field("name"),
        "required_parameter" | "optional_parameter" => is_field("pattern"),
        "arrow_function" => is_field("parameter"),
        "pair" => is_field("key"),
        "pair_pattern" => true,
        "array_pattern" | "rest_pattern" | "enum_body" => true,
        "catch_clause" => is_field("parameter"),
        _ => false,
    }
}

/// Single named type of a type annotation
///
/// `: Foo` → `Foo`, `: Foo<Bar>` → `Foo`, `: ns.Foo` → `Foo`. Unions,
/// literals, arrays and other composite types yield `None`.
pub fn named_type(type_annotation: Node, source: &str) -> Option<String> {
    let ty = if type_annotation.kind() == "type_annotation" {
        type_annotation.named_child(0)?
    } else {
        type_annotation
    };

    match ty.kind() {
        "type_identifier" => Some(node_text(ty, source).to_string()),
        "generic_type" | "nested_type_identifier" => {
            let name = ty.child_by_field_name("name")?;
            named_type(name, source)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::ParserFactory;
    use std::path::Path;

    fn parse(source: &str) -> tree_sitter::Tree {
        ParserFactory::parse(Path::new("test.ts"), source).unwrap()
    }

    #[test]
    fn test_identifier_at_inside_and_after() {
        let source = "const total = compute(items);";
        let tree = parse(source);
        let root = tree.root_node();

        let inside = identifier_at(root, Point::new(0, 16)).unwrap();
        assert_eq!(node_text(inside, source), "compute");

        // cursor right after `compute`, before `(`
        let after = identifier_at(root, Point::new(0, 21)).unwrap();
        assert_eq!(node_text(after, source), "compute");
    }

    #[test]
    fn test_identifier_at_whitespace_is_none() {
        let source = "const a = 1;\n\nconst b = 2;";
        let tree = parse(source);
        assert!(identifier_at(tree.root_node(), Point::new(1, 0)).is_none());
    }

    #[test]
    fn test_preorder_visits_parents_before_children() {
        let source = "function f() { return g(); }";
        let tree = parse(source);
        let kinds: Vec<&str> = Preorder::new(tree.root_node()).map(|n| n.kind()).collect();

        assert_eq!(kinds[0], "program");
        let function_index = kinds.iter().position(|k| *k == "function_declaration").unwrap();
        let call_index = kinds.iter().position(|k| *k == "call_expression").unwrap();
        assert!(function_index < call_index);
    }

    #[test]
    fn test_preorder_is_restartable() {
        let tree = parse("let a = b + c;");
        let first = Preorder::new(tree.root_node()).count();
        let second = Preorder::new(tree.root_node()).count();
        assert_eq!(first, second);
        assert!(first > 5);
    }

    #[test]
    fn test_decorators_on_exported_and_plain_classes() {
        let source = r#"
@Injectable()
export class UserService {}

@Controller('users')
class UserController {}
"#;
        let tree = parse(source);
        let classes: Vec<Node> = Preorder::new(tree.root_node())
            .filter(|n| n.kind() == "class_declaration")
            .collect();
        assert_eq!(classes.len(), 2);

        let names: Vec<Vec<String>> = classes
            .iter()
            .map(|c| {
                decorators(*c)
                    .into_iter()
                    .filter_map(|d| decorator_name(d, source))
                    .collect()
            })
            .collect();
        assert_eq!(names[0], vec!["Injectable".to_string()]);
        assert_eq!(names[1], vec!["Controller".to_string()]);
    }

    #[test]
    fn test_decorator_first_argument_is_object() {
        let source = "@Module({ imports: [A] })\nexport class AppModule {}";
        let tree = parse(source);
        let class = Preorder::new(tree.root_node())
            .find(|n| n.kind() == "class_declaration")
            .unwrap();
        let decorator = decorators(class)[0];
        let argument = decorator_first_argument(decorator).unwrap();
        assert_eq!(argument.kind(), "object");
    }

    #[test]
    fn test_decorator_first_argument_skips_comments() {
        let source = "@Module(/* shared */ { imports: [A] })\nexport class SharedModule {}";
        let tree = parse(source);
        let class = Preorder::new(tree.root_node())
            .find(|n| n.kind() == "class_declaration")
            .unwrap();
        let argument = decorator_first_argument(decorators(class)[0]).unwrap();
        assert_eq!(argument.kind(), "object");
    }

    #[test]
    fn test_parameter_properties_need_a_modifier() {
        let source = "class A { constructor(private a: X, readonly b: Y, c: Z, public d?: W) {} }";
        let tree = parse(source);
        let properties: Vec<&str> = Preorder::new(tree.root_node())
            .filter(|n| is_parameter_property(*n))
            .filter_map(|n| n.child_by_field_name("pattern"))
            .map(|n| node_text(n, source))
            .collect();
        assert_eq!(properties, vec!["a", "b", "d"]);
    }

    #[test]
    fn test_declaration_names() {
        let source = r#"
class Repo {
    items: string[] = [];
    save(entity: Item) { const copy = entity; return { copy: copy }; }
}
"#;
        let tree = parse(source);
        let declared: Vec<&str> = Preorder::new(tree.root_node())
            .filter(|n| is_identifier(n) && is_declaration_name(*n))
            .map(|n| node_text(n, source))
            .collect();

        assert!(declared.contains(&"Repo"));
        assert!(declared.contains(&"items"));
        assert!(declared.contains(&"save"));
        assert!(declared.contains(&"entity"));
        // variable declarator name and the object-literal key
        assert_eq!(declared.iter().filter(|n| **n == "copy").count(), 2);
    }

    #[test]
    fn test_property_access_and_enclosing_class() {
        let source = "class Svc { run() { this.repo.save(); } }";
        let tree = parse(source);
        let save = Preorder::new(tree.root_node())
            .find(|n| node_text(*n, source) == "save" && n.kind() == "property_identifier")
            .unwrap();

        let access = property_access_of(save).unwrap();
        assert_eq!(node_text(access, source), "this.repo.save");
        assert_eq!(enclosing_class_name(save, source).as_deref(), Some("Svc"));
    }

    #[test]
    fn test_named_type_variants() {
        let source = "let a: Foo; let b: Repo<User>; let c: ns.Bar; let d: A | B;";
        let tree = parse(source);
        let types: Vec<Option<String>> = Preorder::new(tree.root_node())
            .filter(|n| n.kind() == "type_annotation")
            .map(|n| named_type(n, source))
            .collect();

        assert_eq!(
            types,
            vec![
                Some("Foo".to_string()),
                Some("Repo".to_string()),
                Some("Bar".to_string()),
                None
            ]
        );
    }
}
