//! Java parser using tree-sitter
//!
//! Extracts every method declaration from Java source, including methods of
//! nested, local and anonymous classes. Constructors are not methods here.
//!
//! Anonymous classes are named `Enclosing$N`, numbered from 1 in source
//! order within their enclosing class, so `run()` of two different
//! `new Runnable() {..}` bodies gets two signatures.

use super::ParsedMethod;
use crate::metrics::static_metrics::StaticMetrics;
use crate::models::{LineSpan, MethodIdentity};
use anyhow::{bail, Context, Result};
use tree_sitter::{Node, Parser};

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

/// Parse Java source and return its methods in source order.
///
/// Source with syntax errors is rejected as a whole: half a tree would
/// produce line spans that do not line up with the diff.
pub fn parse_methods(source: &str) -> Result<Vec<ParsedMethod>> {
    let mut parser = Parser::new();
    let language = tree_sitter_java::LANGUAGE;
    parser
        .set_language(&language.into())
        .context("Failed to set Java language")?;

    let tree = parser
        .parse(source, None)
        .context("Failed to parse Java source")?;

    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_line(&root).unwrap_or(0);
        bail!("syntax error near line {}", line);
    }

    let source_bytes = source.as_bytes();
    let package = package_name(&root, source_bytes);

    let mut methods = Vec::new();
    let mut types = Vec::new();
    collect_methods(&root, source_bytes, package.as_deref(), &mut types, &mut methods);
    Ok(methods)
}

fn first_error_line(node: &Node) -> Option<u32> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row as u32 + 1);
    }
    node.children(&mut node.walk())
        .filter(|c| c.has_error())
        .find_map(|c| first_error_line(&c))
}

fn package_name(root: &Node, source: &[u8]) -> Option<String> {
    root.children(&mut root.walk())
        .find(|c| c.kind() == "package_declaration")
        .and_then(|pkg| {
            pkg.named_children(&mut pkg.walk())
                .find(|c| c.kind() == "scoped_identifier" || c.kind() == "identifier")
        })
        .and_then(|n| n.utf8_text(source).ok())
        .map(collapse_whitespace)
}

/// One enclosing type with its running count of anonymous classes.
struct TypeScope {
    name: String,
    anonymous: u32,
}

/// Walk the tree keeping the chain of enclosing type names.
fn collect_methods(
    node: &Node,
    source: &[u8],
    package: Option<&str>,
    types: &mut Vec<TypeScope>,
    out: &mut Vec<ParsedMethod>,
) {
    for child in node.children(&mut node.walk()) {
        let kind = child.kind();
        if TYPE_DECLARATIONS.contains(&kind) {
            let name = child
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source).ok())
                .unwrap_or("?")
                .to_string();
            types.push(TypeScope { name, anonymous: 0 });
            collect_methods(&child, source, package, types, out);
            types.pop();
        } else if kind == "class_body" && node.kind() == "object_creation_expression" {
            let name = match types.last_mut() {
                Some(outer) => {
                    outer.anonymous += 1;
                    format!("{}${}", outer.name, outer.anonymous)
                }
                None => "$1".to_string(),
            };
            // Outer$1 replaces Outer in the chain rather than nesting under it
            let outer = types.pop();
            let depth = types.len();
            types.push(TypeScope { name, anonymous: 0 });
            collect_methods(&child, source, package, types, out);
            types.truncate(depth);
            types.extend(outer);
        } else {
            if kind == "method_declaration" {
                if let Some(method) = parse_method_node(&child, source, package, types) {
                    out.push(method);
                }
            }
            // Method bodies may hold local or anonymous classes.
            collect_methods(&child, source, package, types, out);
        }
    }
}

fn parse_method_node(
    node: &Node,
    source: &[u8],
    package: Option<&str>,
    types: &[TypeScope],
) -> Option<ParsedMethod> {
    let name = node.child_by_field_name("name")?.utf8_text(source).ok()?;
    let params = parameter_types(node.child_by_field_name("parameters"), source);

    let class_name = types
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(".");
    let mut full_signature = String::new();
    if let Some(pkg) = package {
        full_signature.push_str(pkg);
        full_signature.push('.');
    }
    if !class_name.is_empty() {
        full_signature.push_str(&class_name);
        full_signature.push('.');
    }
    full_signature.push_str(name);
    full_signature.push('(');
    full_signature.push_str(&params.join(", "));
    full_signature.push(')');

    let span = LineSpan::new(
        node.start_position().row as u32 + 1,
        node.end_position().row as u32 + 1,
    );

    Some(ParsedMethod {
        identity: MethodIdentity::new(full_signature, class_name, name),
        span,
        metrics: StaticMetrics::measure(node, span),
    })
}

/// Source text of each parameter's type, whitespace collapsed.
fn parameter_types(params_node: Option<Node>, source: &[u8]) -> Vec<String> {
    let Some(node) = params_node else {
        return vec![];
    };

    let mut types = Vec::new();
    for child in node.named_children(&mut node.walk()) {
        match child.kind() {
            "formal_parameter" => {
                let Some(ty) = child.child_by_field_name("type") else {
                    continue;
                };
                let mut text = collapse_whitespace(ty.utf8_text(source).unwrap_or(""));
                // C-style array dims on the name: `int a[]`
                if let Some(dims) = child.child_by_field_name("dimensions") {
                    text.push_str(&collapse_whitespace(dims.utf8_text(source).unwrap_or("")));
                }
                types.push(text);
            }
            "spread_parameter" => {
                let ty = child
                    .named_children(&mut child.walk())
                    .find(|c| c.kind() != "modifiers" && c.kind() != "variable_declarator");
                if let Some(ty) = ty {
                    types.push(format!(
                        "{}...",
                        collapse_whitespace(ty.utf8_text(source).unwrap_or(""))
                    ));
                }
            }
            _ => {}
        }
    }
    types
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
