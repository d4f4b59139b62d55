use crate::{DialectProfile, EntityDescriptor, Expr, UnaryOpType};
use std::{fmt::Write, sync::Arc};

/// One table reference in the join tree: the root or a lazily joined
/// navigation child.
#[derive(Debug)]
pub struct JoinNode {
    pub alias: String,
    pub descriptor: Arc<EntityDescriptor>,
    pub parent: Option<usize>,
    pub property: Option<&'static str>,
}

/// What an AST node resolved to inside the scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A joined entity; expands to its full column list.
    Entity(usize),
    /// A concrete `alias.column`.
    Column { node: usize, column: String },
}

/// Per-statement scope. Assigns aliases `t0, t1, …` in first-touch order and
/// materializes a join only at the moment a clause references the navigation
/// property. Created fresh per statement build, discarded afterwards.
#[derive(Debug, Default)]
pub struct QueryScope {
    nodes: Vec<JoinNode>,
    alias_offset: usize,
}

impl QueryScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope whose alias numbering continues after `offset` existing tables,
    /// used by nested selects so aliases stay unique per statement.
    pub fn offset_by(offset: usize) -> Self {
        Self {
            nodes: Vec::new(),
            alias_offset: offset,
        }
    }

    pub fn add_root(&mut self, descriptor: Arc<EntityDescriptor>) -> usize {
        self.push_node(descriptor, None, None)
    }

    /// Root whose references are qualified by `alias` verbatim instead of a
    /// generated `tN`. UPDATE/DELETE lower against the quoted table name,
    /// which stays valid without a FROM clause.
    pub fn add_root_named(&mut self, descriptor: Arc<EntityDescriptor>, alias: String) -> usize {
        let index = self.push_node(descriptor, None, None);
        self.nodes[index].alias = alias;
        index
    }

    /// Join `property` of `parent` if it is a valid navigation property,
    /// reusing the node when it is already joined.
    pub fn add_child(&mut self, parent: usize, property: &'static str) -> Option<usize> {
        if let Some(existing) = self
            .nodes
            .iter()
            .position(|n| n.parent == Some(parent) && n.property == Some(property))
        {
            return Some(existing);
        }
        let child = self.nodes[parent]
            .descriptor
            .navigation(property)?
            .child
            .clone();
        Some(self.push_node(child, Some(parent), Some(property)))
    }

    fn push_node(
        &mut self,
        descriptor: Arc<EntityDescriptor>,
        parent: Option<usize>,
        property: Option<&'static str>,
    ) -> usize {
        let index = self.nodes.len();
        let mut alias = String::with_capacity(3);
        let _ = write!(alias, "t{}", self.alias_offset + index);
        self.nodes.push(JoinNode {
            alias,
            descriptor,
            parent,
            property,
        });
        index
    }

    pub fn node(&self, index: usize) -> &JoinNode {
        &self.nodes[index]
    }

    pub fn alias(&self, index: usize) -> &str {
        &self.nodes[index].alias
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resolve an AST node to a joined entity or an `alias.column` pair.
    /// Recurses through convert, parameter and member-access nodes; a miss
    /// returns `None` and the caller treats the node as a plain scalar
    /// expression.
    pub fn resolve(&mut self, expr: &Expr) -> Option<Resolution> {
        match expr {
            // A statement has a single root entity, so every parameter
            // symbol refers to it.
            Expr::Param(_) => {
                if self.nodes.is_empty() {
                    None
                } else {
                    Some(Resolution::Entity(0))
                }
            }
            Expr::Unary {
                op: UnaryOpType::Convert,
                expr,
            } => self.resolve(expr),
            Expr::Member { base, name } => match self.resolve(base)? {
                Resolution::Entity(node) => {
                    if let Some(map) = self.nodes[node].descriptor.column(name) {
                        Some(Resolution::Column {
                            node,
                            column: map.column.clone(),
                        })
                    } else if self.nodes[node].descriptor.navigation(name).is_some() {
                        self.add_child(node, name).map(Resolution::Entity)
                    } else {
                        None
                    }
                }
                Resolution::Column { .. } => None,
            },
            _ => None,
        }
    }

    /// Emit the `LEFT JOIN` clauses for every materialized child, in alias
    /// order. The join condition matches the parent's foreign key against the
    /// child's identity column.
    pub fn write_joins(&self, profile: &DialectProfile, out: &mut String) {
        for node in &self.nodes {
            let Some(parent) = node.parent else {
                continue;
            };
            let property = node.property.expect("child nodes carry their property");
            let parent_node = &self.nodes[parent];
            let navigation = parent_node
                .descriptor
                .navigation(property)
                .expect("joined children come from navigation properties");
            let child_identity = node
                .descriptor
                .identity()
                .expect("navigation targets carry an identity column");
            out.push_str(" LEFT JOIN ");
            profile.quote(out, &node.descriptor.table);
            out.push(' ');
            out.push_str(&node.alias);
            out.push_str(" ON ");
            out.push_str(&node.alias);
            out.push('.');
            profile.quote(out, &child_identity.column);
            out.push_str(" = ");
            out.push_str(&parent_node.alias);
            out.push('.');
            profile.quote(out, &navigation.foreign_key);
        }
    }
}
