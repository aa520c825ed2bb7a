use serde::{Deserialize, Serialize};

use crate::ast::{Expression, Program, Statement, StatementKind};

/// Language-neutral view of an AST node, as consumed by external viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericNode {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<GenericNode>,
}

impl GenericNode {
    fn new(node_type: &str) -> Self {
        Self {
            node_type: node_type.to_string(),
            value: None,
            params: None,
            children: Vec::new(),
        }
    }

    fn with_value(mut self, value: impl ToString) -> Self {
        self.value = Some(value.to_string());
        self
    }

    fn with_children(mut self, children: Vec<GenericNode>) -> Self {
        self.children = children;
        self
    }
}

pub fn program_to_tree(program: &Program) -> Vec<GenericNode> {
    program.0.iter().map(to_tree).collect()
}

pub fn to_tree(statement: &Statement) -> GenericNode {
    match &statement.kind {
        StatementKind::VarDeclaration(name, initializer) => GenericNode::new("VarStmt")
            .with_value(name)
            .with_children(initializer.iter().map(expression_to_tree).collect()),
        StatementKind::FunctionDeclaration(function) => {
            let mut node = GenericNode::new("FunctionStmt")
                .with_value(&function.name)
                .with_children(function.body.iter().map(to_tree).collect());
            node.params = Some(function.params.clone());
            node
        }
        StatementKind::Block(statements) => {
            GenericNode::new("BlockStmt").with_children(statements.iter().map(to_tree).collect())
        }
        StatementKind::If(condition, then_branch, else_branch) => {
            let mut children = vec![expression_to_tree(condition), to_tree(then_branch)];
            children.extend(else_branch.as_deref().map(to_tree));
            GenericNode::new("IfStmt").with_children(children)
        }
        StatementKind::While(condition, body) => GenericNode::new("WhileStmt")
            .with_children(vec![expression_to_tree(condition), to_tree(body)]),
        StatementKind::Print(expr) => {
            GenericNode::new("PrintStmt").with_children(vec![expression_to_tree(expr)])
        }
        StatementKind::Return(value) => GenericNode::new("ReturnStmt")
            .with_children(value.iter().map(expression_to_tree).collect()),
        StatementKind::Expression(expr) => {
            GenericNode::new("ExprStmt").with_children(vec![expression_to_tree(expr)])
        }
        StatementKind::Break => GenericNode::new("BreakStmt"),
        StatementKind::Continue => GenericNode::new("ContinueStmt"),
        StatementKind::Include(module) => GenericNode::new("IncludeStmt").with_value(module),
        StatementKind::TryCatch {
            body,
            error_name,
            handler,
        } => {
            let mut node =
                GenericNode::new("TryStmt").with_children(vec![to_tree(body), to_tree(handler)]);
            node.value = error_name.clone();
            node
        }
    }
}

fn expression_to_tree(expr: &Expression) -> GenericNode {
    match expr {
        Expression::Literal(literal) => GenericNode::new("Literal").with_value(literal),
        Expression::Variable(name) => GenericNode::new("Variable").with_value(name),
        Expression::Binary(left, op, right) => GenericNode::new("BinaryExpr")
            .with_value(op)
            .with_children(vec![expression_to_tree(left), expression_to_tree(right)]),
        Expression::Unary(op, right) => GenericNode::new("UnaryExpr")
            .with_value(op)
            .with_children(vec![expression_to_tree(right)]),
        Expression::Call(callee, args) => {
            let mut children = vec![expression_to_tree(callee)];
            children.extend(args.iter().map(expression_to_tree));
            GenericNode::new("CallExpr").with_children(children)
        }
        Expression::Assign(name, value) => GenericNode::new("AssignExpr")
            .with_value(name)
            .with_children(vec![expression_to_tree(value)]),
    }
}

/// Renders nodes as a top-down Mermaid flowchart, one box per node.
pub fn to_mermaid(nodes: &[GenericNode]) -> String {
    let mut out = String::from("graph TD\n");
    let mut next_id = 0;
    for node in nodes {
        write_mermaid_node(&mut out, node, &mut next_id);
    }
    out
}

fn write_mermaid_node(out: &mut String, node: &GenericNode, next_id: &mut usize) -> usize {
    let id = *next_id;
    *next_id += 1;

    let label = match &node.value {
        Some(value) => format!("{}: {}", node.node_type, value),
        None => node.node_type.clone(),
    };
    out.push_str(&format!("    n{}[\"{}\"]\n", id, label.replace('"', "#quot;")));

    for child in &node.children {
        let child_id = write_mermaid_node(out, child, next_id);
        out.push_str(&format!("    n{} --> n{}\n", id, child_id));
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser::parse, tokenizer::tokenize};

    fn tree(source: &str) -> Vec<GenericNode> {
        let program = parse(&tokenize(source).unwrap()).into_result().unwrap();
        program_to_tree(&program)
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(tree("fonksiyon topla(a, b) { dön a + b }")).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "type": "FunctionStmt",
                "value": "topla",
                "params": ["a", "b"],
                "children": [{
                    "type": "ReturnStmt",
                    "children": [{
                        "type": "BinaryExpr",
                        "value": "+",
                        "children": [
                            {"type": "Variable", "value": "a"},
                            {"type": "Variable", "value": "b"}
                        ]
                    }]
                }]
            }])
        );
    }

    #[test]
    fn test_literal_kinds_survive() {
        let nodes = tree("yazdır \"42\"\nyazdır 42\nyazdır 2.5\nyazdır doğru\nyazdır yok");
        let values: Vec<_> = nodes
            .iter()
            .map(|node| node.children[0].value.clone().unwrap())
            .collect();
        assert_eq!(values, vec!["\"42\"", "42", "2.5", "doğru", "yok"]);
    }

    #[test]
    fn test_deterministic() {
        let source = "değişken x = 1\ndöngü x < 3 { x = x + 1 }";
        assert_eq!(tree(source), tree(source));
    }

    #[test]
    fn test_mermaid() {
        let diagram = to_mermaid(&tree("yazdır \"a\""));
        assert_eq!(
            diagram,
            "graph TD\n    n0[\"PrintStmt\"]\n    n1[\"Literal: #quot;a#quot;\"]\n    n0 --> n1\n"
        );
    }
}
