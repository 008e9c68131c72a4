//! Query expression trees.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Deepest nesting the planner accepts.
pub const MAX_QUERY_DEPTH: usize = 64;

/// A term expression, as produced by the query parser or built by hand.
///
/// Terms hold raw user text; they are normalized by the planner with the
/// same analysis used at indexing time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryNode {
    Term(String),
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    /// Excludes matches of the child; only valid next to a positive operand.
    Not(Box<QueryNode>),
    /// Terms at consecutive positions, in order.
    Phrase(Vec<String>),
    /// All terms in any order, spanning fewer than `distance` plus the
    /// number of terms words.
    Near { terms: Vec<String>, distance: u32 },
    /// Restricts the child to the named fields.
    Field {
        fields: Vec<String>,
        node: Box<QueryNode>,
    },
}

impl QueryNode {
    pub fn term<S: Into<String>>(text: S) -> Self {
        QueryNode::Term(text.into())
    }

    pub fn and<I: IntoIterator<Item = QueryNode>>(nodes: I) -> Self {
        QueryNode::And(nodes.into_iter().collect())
    }

    pub fn or<I: IntoIterator<Item = QueryNode>>(nodes: I) -> Self {
        QueryNode::Or(nodes.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(node: QueryNode) -> Self {
        QueryNode::Not(Box::new(node))
    }

    pub fn phrase<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryNode::Phrase(terms.into_iter().map(Into::into).collect())
    }

    pub fn near<I, S>(terms: I, distance: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryNode::Near {
            terms: terms.into_iter().map(Into::into).collect(),
            distance,
        }
    }

    pub fn field<I, S>(fields: I, node: QueryNode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryNode::Field {
            fields: fields.into_iter().map(Into::into).collect(),
            node: Box::new(node),
        }
    }

    /// Nesting depth; a single leaf has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            QueryNode::Term(_) | QueryNode::Phrase(_) | QueryNode::Near { .. } => 1,
            QueryNode::And(children) | QueryNode::Or(children) => {
                1 + children.iter().map(QueryNode::depth).max().unwrap_or(0)
            }
            QueryNode::Not(child) => 1 + child.depth(),
            QueryNode::Field { node, .. } => 1 + node.depth(),
        }
    }
}

fn write_words(f: &mut fmt::Formatter<'_>, words: &[String]) -> fmt::Result {
    f.write_str("\"")?;
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        f.write_str(word)?;
    }
    f.write_str("\"")
}

fn write_list(f: &mut fmt::Formatter<'_>, nodes: &[QueryNode], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{node}")?;
    }
    f.write_str(")")
}

/// Renders the tree in query-string syntax.
impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::Term(text) => f.write_str(text),
            QueryNode::And(children) => write_list(f, children, " "),
            QueryNode::Or(children) => write_list(f, children, " | "),
            QueryNode::Not(child) => write!(f, "-{child}"),
            QueryNode::Phrase(words) => write_words(f, words),
            QueryNode::Near { terms, distance } => {
                write_words(f, terms)?;
                write!(f, "~{distance}")
            }
            QueryNode::Field { fields, node } => {
                write!(f, "(@({}) {node})", fields.join(","))
            }
        }
    }
}
