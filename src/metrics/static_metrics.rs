//! Static metrics measured on a method's syntax tree

use crate::models::LineSpan;
use serde::Serialize;
use tree_sitter::Node;

/// Size and complexity of one method at one revision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StaticMetrics {
    pub loc: u32,
    pub statements: u32,
    pub cyclomatic_complexity: u32,
    /// Branches weighted by how deeply they are nested
    pub cognitive_complexity: u32,
    pub nesting_depth: u32,
    pub parameter_count: u32,
    pub local_variables: u32,
    /// 0 for void or primitive, 1 for a plain reference type, 2 for generic or array.
    pub return_type_complexity: u32,
}

impl StaticMetrics {
    pub const HEADERS: [&'static str; 8] = [
        "LOC",
        "Statements",
        "CyclomaticComplexity",
        "CognitiveComplexity",
        "NestingDepth",
        "ParameterCount",
        "LocalVariables",
        "ReturnTypeComplexity",
    ];

    pub fn values(&self) -> [u32; 8] {
        [
            self.loc,
            self.statements,
            self.cyclomatic_complexity,
            self.cognitive_complexity,
            self.nesting_depth,
            self.parameter_count,
            self.local_variables,
            self.return_type_complexity,
        ]
    }

    /// Measure a `method_declaration` node.
    pub fn measure(node: &Node, span: LineSpan) -> Self {
        let mut metrics = StaticMetrics {
            loc: span.len(),
            cyclomatic_complexity: 1,
            ..Default::default()
        };

        if let Some(params) = node.child_by_field_name("parameters") {
            metrics.parameter_count = params
                .named_children(&mut params.walk())
                .filter(|c| c.kind() == "formal_parameter" || c.kind() == "spread_parameter")
                .count() as u32;
        }

        metrics.return_type_complexity = match node.child_by_field_name("type").map(|t| t.kind()) {
            Some("void_type" | "integral_type" | "floating_point_type" | "boolean_type") | None => 0,
            Some("generic_type" | "array_type") => 2,
            Some(_) => 1,
        };

        if let Some(body) = node.child_by_field_name("body") {
            metrics.nesting_depth = nesting_depth(&body);
            metrics.cognitive_complexity = cognitive(&body, 0);
            walk_body(&body, &mut metrics);
        }

        metrics
    }
}

fn is_nesting(kind: &str) -> bool {
    matches!(
        kind,
        "if_statement"
            | "while_statement"
            | "for_statement"
            | "enhanced_for_statement"
            | "do_statement"
            | "switch_expression"
            | "try_statement"
            | "try_with_resources_statement"
            | "synchronized_statement"
    )
}

/// Deepest chain of nested control-flow statements under `node`.
fn nesting_depth(node: &Node) -> u32 {
    let below = node
        .children(&mut node.walk())
        .map(|c| nesting_depth(&c))
        .max()
        .unwrap_or(0);
    // `else if` is a sibling branch, not a deeper level
    let else_if = node.kind() == "if_statement"
        && node
            .parent()
            .is_some_and(|p| p.kind() == "if_statement" && p.child_by_field_name("alternative") == Some(*node));
    if is_nesting(node.kind()) && !else_if {
        below + 1
    } else {
        below
    }
}

fn cognitive_children(node: &Node, nesting: u32) -> u32 {
    node.children(&mut node.walk()).map(|c| cognitive(&c, nesting)).sum()
}

/// Cognitive complexity: +1 per branch plus its nesting level. `else` and
/// `else if` add 1 flat, each run of one logical operator adds 1, lambdas
/// and local classes only deepen the nesting.
fn cognitive(node: &Node, nesting: u32) -> u32 {
    match node.kind() {
        "if_statement" => if_chain(node, nesting, false),
        "while_statement" | "for_statement" | "enhanced_for_statement" | "do_statement"
        | "switch_expression" | "catch_clause" | "ternary_expression" => {
            1 + nesting + cognitive_children(node, nesting + 1)
        }
        "lambda_expression" | "class_body" => cognitive_children(node, nesting + 1),
        "binary_expression" => {
            let operator = |n: &Node| n.child_by_field_name("operator").map(|o| o.kind());
            let op = operator(node);
            let starts_run = matches!(op, Some("&&" | "||"))
                && node
                    .parent()
                    .filter(|p| p.kind() == "binary_expression")
                    .and_then(|p| operator(&p))
                    != op;
            u32::from(starts_run) + cognitive_children(node, nesting)
        }
        "break_statement" | "continue_statement" => {
            let labelled = node.named_children(&mut node.walk()).any(|c| c.kind() == "identifier");
            u32::from(labelled)
        }
        _ => cognitive_children(node, nesting),
    }
}

fn if_chain(node: &Node, nesting: u32, else_if: bool) -> u32 {
    let mut total = if else_if { 1 } else { 1 + nesting };
    if let Some(condition) = node.child_by_field_name("condition") {
        total += cognitive(&condition, nesting);
    }
    if let Some(consequence) = node.child_by_field_name("consequence") {
        total += cognitive(&consequence, nesting + 1);
    }
    if let Some(alternative) = node.child_by_field_name("alternative") {
        total += if alternative.kind() == "if_statement" {
            if_chain(&alternative, nesting, true)
        } else {
            1 + cognitive(&alternative, nesting + 1)
        };
    }
    total
}

fn walk_body(node: &Node, metrics: &mut StaticMetrics) {
    let kind = node.kind();

    if (kind.ends_with("_statement") && kind != "block") || kind == "local_variable_declaration" {
        metrics.statements += 1;
    }

    match kind {
        "if_statement"
        | "while_statement"
        | "for_statement"
        | "enhanced_for_statement"
        | "do_statement" => {
            metrics.cyclomatic_complexity += 1;
        }
        "catch_clause" => {
            metrics.cyclomatic_complexity += 1;
        }
        "switch_rule" | "switch_block_statement_group" => {
            metrics.cyclomatic_complexity += 1;
        }
        "ternary_expression" => {
            metrics.cyclomatic_complexity += 1;
        }
        "binary_expression" => {
            for child in node.children(&mut node.walk()) {
                if child.kind() == "&&" || child.kind() == "||" {
                    metrics.cyclomatic_complexity += 1;
                }
            }
        }
        "local_variable_declaration" => {
            metrics.local_variables += node
                .children(&mut node.walk())
                .filter(|c| c.kind() == "variable_declarator")
                .count() as u32;
        }
        _ => {}
    }

    for child in node.children(&mut node.walk()) {
        walk_body(&child, metrics);
    }
}

#[cfg(test)]
mod tests {
    use crate::parsers::java::parse_methods;

    #[test]
    fn test_metrics_for_simple_method() {
        let source = r#"
class M {
    int sum(int[] xs) {
        int total = 0, seen = 0;
        for (int x : xs) {
            if (x > 0 && x < 100) {
                total += x;
            }
            seen++;
        }
        return total;
    }
}
"#;
        let methods = parse_methods(source).expect("should parse Java source");
        let m = &methods[0].metrics;
        assert_eq!(m.loc, 10);
        assert_eq!(m.parameter_count, 1);
        assert_eq!(m.local_variables, 2);
        assert_eq!(m.nesting_depth, 2);
        // base + for + if + &&
        assert_eq!(m.cyclomatic_complexity, 4);
        // for + nested if (1 + 1) + &&
        assert_eq!(m.cognitive_complexity, 4);
        // declaration, for, if, two expression statements, return
        assert_eq!(m.statements, 6);
        assert_eq!(m.return_type_complexity, 0);
    }

    #[test]
    fn test_return_type_complexity() {
        let source = r#"
class R {
    void a() {}
    String b() { return ""; }
    java.util.List<String> c() { return null; }
    int[] d() { return null; }
}
"#;
        let methods = parse_methods(source).expect("should parse Java source");
        let rtc: Vec<_> = methods.iter().map(|m| m.metrics.return_type_complexity).collect();
        assert_eq!(rtc, vec![0, 1, 2, 2]);
    }

    #[test]
    fn test_else_if_chain_is_flat() {
        let source = r#"
class E {
    int pick(int x) {
        if (x == 1) {
            return 1;
        } else if (x == 2) {
            return 2;
        } else {
            return 3;
        }
    }
}
"#;
        let methods = parse_methods(source).expect("should parse Java source");
        assert_eq!(methods[0].metrics.nesting_depth, 1);
        assert_eq!(methods[0].metrics.cyclomatic_complexity, 3);
        // if, else if, else: no nesting penalty along the chain
        assert_eq!(methods[0].metrics.cognitive_complexity, 3);
    }

    #[test]
    fn test_cognitive_complexity_weights_nesting() {
        let source = r#"
class N {
    int f(int a, int b) {
        if (a > 0) {
            for (int i = 0; i < b; i++) {
                if (i % 2 == 0 && a > i) {
                    a--;
                }
            }
        } else {
            a = b > 0 ? b : -b;
        }
        return a;
    }

    boolean g(boolean x, boolean y, boolean z) {
        return x && y && z || x;
    }
}
"#;
        let methods = parse_methods(source).expect("should parse Java source");
        // if 1, for 2, inner if 3, && 1, else 1, ternary inside else 2
        assert_eq!(methods[0].metrics.cognitive_complexity, 10);
        // one run of && and one of ||
        assert_eq!(methods[1].metrics.cognitive_complexity, 2);
    }

    #[test]
    fn test_abstract_method_has_no_body() {
        let source = "interface I { long size(String key); }";
        let methods = parse_methods(source).expect("should parse Java source");
        let m = &methods[0].metrics;
        assert_eq!(m.loc, 1);
        assert_eq!(m.statements, 0);
        assert_eq!(m.cyclomatic_complexity, 1);
        assert_eq!(m.cognitive_complexity, 0);
        assert_eq!(m.parameter_count, 1);
    }
}
