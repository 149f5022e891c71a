//! ASCII tree rendering for feed snapshots.

use crate::models::{FeatureTreeNode, NodeKind};

const FEATURE: char = '●';
const TOKEN: char = '◇';
const UNBOUND: char = '○';

fn kind_symbol(kind: NodeKind) -> char {
    match kind {
        NodeKind::Feature => FEATURE,
        NodeKind::Token => TOKEN,
        NodeKind::Unbound => UNBOUND,
    }
}

/// Render a snapshot as ASCII art with kind symbols.
///
/// Example output:
/// ```text
/// Home
/// ├── ● Weather
/// ├── ● Headlines
/// │   ├── ● Story one
/// │   └── ○ story#2
/// └── ◇ token#1
/// ```
pub fn render_tree(root: &FeatureTreeNode) -> String {
    let mut output = String::new();
    render_node(&mut output, root, "", true, true);
    output
}

fn render_node(
    output: &mut String,
    node: &FeatureTreeNode,
    prefix: &str,
    is_last: bool,
    is_root: bool,
) {
    if is_root {
        output.push_str(&node.label());
        output.push('\n');
    } else {
        let branch = if is_last { "└── " } else { "├── " };
        output.push_str(prefix);
        output.push_str(branch);
        output.push(kind_symbol(node.kind));
        output.push(' ');
        output.push_str(&node.label());
        output.push('\n');
    }

    let child_prefix = if is_root {
        String::new()
    } else {
        let continuation = if is_last { "    " } else { "│   " };
        format!("{}{}", prefix, continuation)
    };

    for (i, child) in node.children.iter().enumerate() {
        let child_is_last = i == node.children.len() - 1;
        render_node(output, child, &child_prefix, child_is_last, false);
    }
}

/// Count nodes by kind, root included.
pub fn count_kinds(root: &FeatureTreeNode) -> (usize, usize, usize) {
    let mut counts = match root.kind {
        NodeKind::Feature => (1, 0, 0),
        NodeKind::Token => (0, 1, 0),
        NodeKind::Unbound => (0, 0, 1),
    };
    for child in &root.children {
        let (f, t, u) = count_kinds(child);
        counts.0 += f;
        counts.1 += t;
        counts.2 += u;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentId;
    use serde_json::json;

    fn feature(id: &str, title: Option<&str>, children: Vec<FeatureTreeNode>) -> FeatureTreeNode {
        FeatureTreeNode {
            content_id: ContentId::from(id),
            kind: NodeKind::Feature,
            data: title.map(|t| json!({ "title": t })),
            children,
        }
    }

    fn leaf(id: &str, kind: NodeKind) -> FeatureTreeNode {
        FeatureTreeNode {
            content_id: ContentId::from(id),
            kind,
            data: None,
            children: vec![],
        }
    }

    #[test]
    fn test_single_root() {
        let output = render_tree(&feature("root", Some("Home"), vec![]));
        assert_eq!(output, "Home\n");
    }

    #[test]
    fn test_untitled_nodes_use_content_id() {
        let tree = feature("root", None, vec![feature("card#0", None, vec![])]);
        assert_eq!(render_tree(&tree), "root\n└── ● card#0\n");
    }

    #[test]
    fn test_nested_children() {
        let tree = feature(
            "root",
            Some("Home"),
            vec![
                feature("weather", Some("Weather"), vec![]),
                feature(
                    "headlines",
                    Some("Headlines"),
                    vec![
                        feature("story#1", Some("Story one"), vec![]),
                        leaf("story#2", NodeKind::Unbound),
                    ],
                ),
                leaf("token#1", NodeKind::Token),
            ],
        );
        let expected = "Home\n├── ● Weather\n├── ● Headlines\n│   ├── ● Story one\n│   └── ○ story#2\n└── ◇ token#1\n";
        assert_eq!(render_tree(&tree), expected);
    }

    #[test]
    fn test_count_kinds() {
        let tree = feature(
            "root",
            None,
            vec![
                feature("a", None, vec![leaf("b", NodeKind::Unbound)]),
                leaf("token#1", NodeKind::Token),
            ],
        );
        assert_eq!(count_kinds(&tree), (2, 1, 1));
    }
}
