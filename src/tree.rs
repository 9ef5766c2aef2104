//! Derivation trees record one top-down expansion of a start symbol.

/// Handle to a node inside a [`DerivationTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    symbol: String,
    expansion: Option<String>,
    value: Option<String>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(symbol: String) -> Self {
        Self {
            symbol,
            expansion: None,
            value: None,
            children: Vec::new(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Leaves without an explicit value stand for themselves.
    fn leaf_value(&self) -> &str {
        self.value.as_deref().unwrap_or(&self.symbol)
    }
}

/// The record of one top-down expansion of a start symbol.
///
/// Nodes live in an arena and reference each other by [`NodeId`], which keeps
/// cloning and traversal cheap. Internal nodes carry the expansion that was
/// chosen for their symbol; their children correspond token-by-token to that
/// expansion. Leaves carry the terminal text.
#[derive(Debug, Clone)]
pub struct DerivationTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl DerivationTree {
    /// Create a tree consisting of a single root node for `symbol`.
    pub fn new<S: Into<String>>(symbol: S) -> Self {
        Self {
            nodes: vec![Node::new(symbol.into())],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Append a child node for `symbol` to `parent`.
    pub fn add_child<S: Into<String>>(&mut self, parent: NodeId, symbol: S) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(symbol.into()));
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Record the expansion that was chosen for `node`.
    pub fn set_expansion<S: Into<String>>(&mut self, node: NodeId, expansion: S) {
        self.nodes[node.0].expansion = Some(expansion.into());
    }

    /// Set the terminal text of a leaf.
    pub fn set_value<S: Into<String>>(&mut self, node: NodeId, value: S) {
        self.nodes[node.0].value = Some(value.into());
    }

    pub fn symbol(&self, node: NodeId) -> &str {
        &self.nodes[node.0].symbol
    }

    pub fn expansion(&self, node: NodeId) -> Option<&str> {
        self.nodes[node.0].expansion.as_deref()
    }

    pub fn value(&self, node: NodeId) -> Option<&str> {
        self.nodes[node.0].value.as_deref()
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Concatenate the values of all leaves in left-to-right order, with no
    /// separator. This is the input string the tree derives.
    pub fn leaf_string(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if node.is_leaf() {
                out.push_str(node.leaf_value());
            } else {
                stack.extend(node.children.iter().rev());
            }
        }

        out
    }

    /// The values of all leaves in left-to-right order.
    pub fn leaf_values(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if node.is_leaf() {
                out.push(node.leaf_value());
            } else {
                stack.extend(node.children.iter().rev());
            }
        }

        out
    }

    /// All `(symbol, expansion)` pairs used by internal nodes, in preorder.
    pub fn expansions(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if let Some(expansion) = &node.expansion {
                out.push((node.symbol.as_str(), expansion.as_str()));
            }
            stack.extend(node.children.iter().rev());
        }

        out
    }

    /// Maximum number of edges from the root down to any leaf.
    pub fn depth(&self) -> usize {
        self.depth_of(self.root)
    }

    fn depth_of(&self, id: NodeId) -> usize {
        let node = &self.nodes[id.0];
        node.children
            .iter()
            .map(|child| self.depth_of(*child) + 1)
            .max()
            .unwrap_or(0)
    }

    /// S-expression form of the tree, used for tree-level deduplication.
    pub fn serialize(&self) -> String {
        self.serialize_node(self.root)
    }

    fn serialize_node(&self, id: NodeId) -> String {
        let node = &self.nodes[id.0];
        if node.is_leaf() {
            return node.leaf_value().to_string();
        }

        let children: Vec<String> = node
            .children
            .iter()
            .map(|child| self.serialize_node(*child))
            .collect();
        format!("({} {})", node.symbol, children.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// <start> -> <a> <b>, <a> -> x, <b> -> y
    fn sample() -> DerivationTree {
        let mut tree = DerivationTree::new("<start>");
        let root = tree.root();
        tree.set_expansion(root, "<a> <b>");

        let a = tree.add_child(root, "<a>");
        tree.set_expansion(a, "x");
        let x = tree.add_child(a, "x");
        tree.set_value(x, "x");

        let b = tree.add_child(root, "<b>");
        tree.set_expansion(b, "y");
        let y = tree.add_child(b, "y");
        tree.set_value(y, "y");

        tree
    }

    #[test]
    fn test_leaf_string() {
        assert_eq!(sample().leaf_string(), "xy");
        assert_eq!(sample().leaf_values(), vec!["x", "y"]);
    }

    #[test]
    fn test_expansions_preorder() {
        let tree = sample();
        let pairs = tree.expansions();
        assert_eq!(
            pairs,
            vec![("<start>", "<a> <b>"), ("<a>", "x"), ("<b>", "y")]
        );
    }

    #[test]
    fn test_depth() {
        assert_eq!(sample().depth(), 2);
        assert_eq!(DerivationTree::new("<start>").depth(), 0);
    }

    #[test]
    fn test_serialize() {
        assert_eq!(sample().serialize(), "(<start> (<a> x) (<b> y))");
        assert_eq!(DerivationTree::new("<start>").serialize(), "<start>");
    }

    #[test]
    fn test_leaf_without_value_stands_for_itself() {
        let tree = DerivationTree::new("<lonely>");
        assert_eq!(tree.leaf_string(), "<lonely>");
    }
}
