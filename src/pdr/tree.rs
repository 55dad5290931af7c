//! In-memory PVL tree produced by the parser

/// Kind of aggregation block a node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Object,
    Group,
}

/// Scalar `KEY = VALUE` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// Value text with surrounding quotes removed
    pub value: String,
}

impl Attribute {
    pub fn as_u64(&self) -> Option<u64> {
        self.value.trim().parse().ok()
    }
}

/// A block in the PVL document (root, `OBJECT` or `GROUP`)
///
/// Attributes and children keep document order. Tag lookups are
/// case-insensitive, matching how PVL keywords are compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvlNode {
    kind: NodeKind,
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<PvlNode>,
}

impl PvlNode {
    pub(crate) fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub(crate) fn root() -> Self {
        Self::new(NodeKind::Root, "ROOT")
    }

    pub(crate) fn push_attribute(&mut self, name: String, value: String) {
        self.attributes.push(Attribute { name, value });
    }

    pub(crate) fn push_child(&mut self, child: PvlNode) {
        self.children.push(child);
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn children(&self) -> &[PvlNode] {
        &self.children
    }

    /// Direct child objects tagged `name`, in document order
    pub fn objects(&self, name: &str) -> Vec<&PvlNode> {
        self.children
            .iter()
            .filter(|c| c.kind == NodeKind::Object && c.name.eq_ignore_ascii_case(name))
            .collect()
    }

    /// Direct child groups, in document order
    pub fn groups(&self) -> Vec<&PvlNode> {
        self.children
            .iter()
            .filter(|c| c.kind == NodeKind::Group)
            .collect()
    }

    /// First attribute named `name` on this node
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Shorthand for `get(name).value`
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(|a| a.value.as_str())
    }
}
