//! Python syntax access backed by tree-sitter.
//!
//! Parsing is pure: it takes source text and returns either a tree or a
//! [`SyntaxError`]. Callers decide how a parse failure degrades.

use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("python grammar could not be loaded: {0}")]
    Language(String),
    #[error("parser produced no tree")]
    NoTree,
    #[error("syntax error near line {line}")]
    Invalid { line: usize },
}

/// A call expression found in source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Callee text with whitespace removed, e.g. `os.system`.
    pub name: String,
    /// 1-based line of the call.
    pub line: usize,
}

pub fn parse(source: &str) -> Result<Tree, SyntaxError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| SyntaxError::Language(e.to_string()))?;
    let tree = parser.parse(source, None).ok_or(SyntaxError::NoTree)?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(SyntaxError::Invalid {
            line: first_error_line(root),
        });
    }
    Ok(tree)
}

pub fn is_valid(source: &str) -> bool {
    parse(source).is_ok()
}

/// Every call expression in document order.
pub fn call_sites(source: &str) -> Result<Vec<CallSite>, SyntaxError> {
    let tree = parse(source)?;
    let bytes = source.as_bytes();
    let mut calls = Vec::new();
    preorder(tree.root_node(), |node| {
        if node.kind() != "call" {
            return;
        }
        if let Some(function) = node.child_by_field_name("function")
            && let Ok(text) = function.utf8_text(bytes)
        {
            calls.push(CallSite {
                name: text.chars().filter(|c| !c.is_whitespace()).collect(),
                line: node.start_position().row + 1,
            });
        }
    });
    Ok(calls)
}

/// Local module names a file may import, in first-seen order without duplicates.
///
/// `import a.b.c` yields `c`; `from a.b import x, y` yields `b`, `x`, `y`;
/// `from . import x` yields `x`.
pub fn import_candidates(source: &str) -> Result<Vec<String>, SyntaxError> {
    let tree = parse(source)?;
    let bytes = source.as_bytes();
    let mut names: Vec<String> = Vec::new();
    let mut push = |name: Option<String>| {
        if let Some(name) = name
            && !name.is_empty()
            && !names.contains(&name)
        {
            names.push(name);
        }
    };

    preorder(tree.root_node(), |node| match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for imported in node.children_by_field_name("name", &mut cursor) {
                push(last_segment(imported_module(imported), bytes));
            }
        }
        "import_from_statement" => {
            if let Some(module) = node.child_by_field_name("module_name") {
                let dotted = if module.kind() == "relative_import" {
                    named_child_of_kind(module, "dotted_name")
                } else {
                    Some(module)
                };
                if let Some(dotted) = dotted {
                    push(last_segment(dotted, bytes));
                }
            }
            let mut cursor = node.walk();
            for imported in node.children_by_field_name("name", &mut cursor) {
                push(last_segment(imported_module(imported), bytes));
            }
        }
        _ => {}
    });
    Ok(names)
}

/// `import a.b as c` names the module `a.b`, not the alias.
fn imported_module(node: Node<'_>) -> Node<'_> {
    if node.kind() == "aliased_import" {
        node.child_by_field_name("name").unwrap_or(node)
    } else {
        node
    }
}

fn named_child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).find(|c| c.kind() == kind)
}

fn last_segment(node: Node<'_>, bytes: &[u8]) -> Option<String> {
    let text = node.utf8_text(bytes).ok()?;
    text.rsplit('.').next().map(|s| s.trim().to_string())
}

fn first_error_line(root: Node<'_>) -> usize {
    let mut line = None;
    preorder(root, |node| {
        if line.is_none() && (node.is_error() || node.is_missing()) {
            line = Some(node.start_position().row + 1);
        }
    });
    line.unwrap_or(1)
}

/// Visit every node below `root` (inclusive) in document order.
fn preorder<'t>(root: Node<'t>, mut visit: impl FnMut(Node<'t>)) {
    let mut cursor = root.walk();
    loop {
        visit(cursor.node());
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_source_parses() {
        assert!(is_valid("def f(x):\n    return x + 1\n"));
        assert!(is_valid(""));
    }

    #[test]
    fn broken_source_reports_line() {
        let err = parse("x = 1\ndef broken(:\n    pass\n").expect_err("invalid");
        assert!(matches!(err, SyntaxError::Invalid { line } if line >= 2));
        assert!(!is_valid("if True\n    pass\n"));
    }

    #[test]
    fn call_sites_strip_whitespace_and_keep_lines() {
        let source = "import os\n\nos . system('ls')\nvalue = eval('1')\n";
        let calls = call_sites(source).expect("calls");
        let names: Vec<_> = calls.iter().map(|c| (c.name.as_str(), c.line)).collect();
        assert_eq!(names, vec![("os.system", 3), ("eval", 4)]);
    }

    #[test]
    fn nested_calls_are_all_reported() {
        let calls = call_sites("print(len(eval('[1]')))\n").expect("calls");
        let names: Vec<_> = calls.into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["print", "len", "eval"]);
    }

    #[test]
    fn import_candidates_follow_statement_shapes() {
        let source = "\
import pkg.utils
import helpers as h
from app.models import User, Order as O
from . import sibling
from .pkg.inner import thing
import helpers
";
        let names = import_candidates(source).expect("imports");
        assert_eq!(
            names,
            vec!["utils", "helpers", "models", "User", "Order", "sibling", "inner", "thing"]
        );
    }
}
