//! Query planning.
//!
//! The planner turns a [`QueryNode`] tree into an [`ExecutionPlan`]:
//!
//! - words are normalized with the analyzers of the fields they may match,
//!   so a field with stemming and a field without it each get the term
//!   form they were indexed with;
//! - a word that analyses into several tokens becomes a phrase;
//! - words analysed away (stop words, length bounds) disappear, and
//!   operators left without operands collapse to [`PlanNode::Empty`];
//! - nested AND/OR are flattened and negated operands of an AND are moved
//!   into an AND-NOT node.
//!
//! Structural errors are reported here, before any execution starts.

use std::fmt;

use crate::analysis::analyzer::PerFieldAnalyzer;
use crate::error::{LexisError, Result};
use crate::query::ast::{MAX_QUERY_DEPTH, QueryNode};

/// Set of field indexes a term may match in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldMask([u64; 4]);

impl FieldMask {
    /// The first `count` fields.
    pub fn all(count: usize) -> Self {
        let mut mask = FieldMask::default();
        for field in 0..count.min(256) {
            mask.insert(field);
        }
        mask
    }

    pub fn from_fields(fields: &[usize]) -> Self {
        let mut mask = FieldMask::default();
        for &field in fields {
            mask.insert(field);
        }
        mask
    }

    pub fn insert(&mut self, field: usize) {
        if field < 256 {
            self.0[field / 64] |= 1 << (field % 64);
        }
    }

    #[inline]
    pub fn contains(&self, field: usize) -> bool {
        field < 256 && self.0[field / 64] & (1 << (field % 64)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    /// Field indexes in the mask, ascending.
    pub fn fields(&self) -> impl Iterator<Item = usize> + '_ {
        (0..256).filter(|&f| self.contains(f))
    }
}

impl fmt::Debug for FieldMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.fields()).finish()
    }
}

/// A normalized term occurrence in the plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanTerm {
    /// Normalized term text, as stored in segment dictionaries.
    pub text: String,

    /// Index into [`ExecutionPlan::terms`].
    pub slot: usize,

    /// Position relative to the first term of its phrase.
    pub offset: u32,

    /// Fields the term may match in.
    pub fields: FieldMask,

    /// Whether `fields` leaves out some indexed field.
    pub restricted: bool,
}

/// A node of the execution plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    /// Matches nothing; the query had no searchable terms.
    Empty,
    Term(PlanTerm),
    And(Vec<PlanNode>),
    Or(Vec<PlanNode>),
    AndNot {
        include: Box<PlanNode>,
        exclude: Box<PlanNode>,
    },
    Phrase(Vec<PlanTerm>),
    Near { terms: Vec<PlanTerm>, distance: u32 },
}

/// Per-term information shared by all segments.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTerm {
    pub text: String,

    /// Word position in the query, used by proximity ranking.
    pub query_pos: u32,

    /// Whether the term only appears under a NOT.
    pub negated: bool,
}

/// A validated, normalized query ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub root: PlanNode,
    pub terms: Vec<QueryTerm>,
    pub field_count: usize,
}

impl ExecutionPlan {
    /// Whether the plan can match nothing.
    pub fn is_empty(&self) -> bool {
        self.root == PlanNode::Empty
    }

    /// Slots of terms that contribute to ranking.
    pub fn positive_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.terms
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.negated)
            .map(|(slot, _)| slot)
    }
}

/// Plan `query` against the fields of `analyzers`.
pub fn plan(query: &QueryNode, analyzers: &PerFieldAnalyzer) -> Result<ExecutionPlan> {
    let depth = query.depth();
    if depth > MAX_QUERY_DEPTH {
        return Err(LexisError::malformed_query(format!(
            "query nesting depth {depth} exceeds {MAX_QUERY_DEPTH}"
        )));
    }

    let mut planner = Planner {
        analyzers,
        terms: Vec::new(),
        next_query_pos: 0,
    };
    let all = FieldMask::all(analyzers.len());
    let root = planner.lower(query, all, false)?;

    Ok(ExecutionPlan {
        root,
        terms: planner.terms,
        field_count: analyzers.len(),
    })
}

#[derive(Clone, Copy)]
enum Shape {
    Phrase,
    Near(u32),
}

struct Planner<'a> {
    analyzers: &'a PerFieldAnalyzer,
    terms: Vec<QueryTerm>,
    next_query_pos: u32,
}

/// `Not`, possibly wrapped in field limits.
fn is_negative(node: &QueryNode) -> bool {
    match node {
        QueryNode::Not(_) => true,
        QueryNode::Field { node, .. } => is_negative(node),
        _ => false,
    }
}

fn flatten_into(node: PlanNode, out: &mut Vec<PlanNode>, and: bool) {
    match node {
        PlanNode::Empty => {}
        PlanNode::And(children) if and => out.extend(children),
        PlanNode::Or(children) if !and => out.extend(children),
        other => out.push(other),
    }
}

fn combine(mut nodes: Vec<PlanNode>, and: bool) -> PlanNode {
    match nodes.len() {
        0 => PlanNode::Empty,
        1 => nodes.remove(0),
        _ if and => PlanNode::And(nodes),
        _ => PlanNode::Or(nodes),
    }
}

impl Planner<'_> {
    fn lower(&mut self, node: &QueryNode, mask: FieldMask, negated: bool) -> Result<PlanNode> {
        match node {
            QueryNode::Term(text) => self.lower_text(text, mask, negated, Shape::Phrase),
            QueryNode::Phrase(words) => {
                self.lower_text(&words.join(" "), mask, negated, Shape::Phrase)
            }
            QueryNode::Near { terms, distance } => {
                if terms.len() < 2 {
                    return Err(LexisError::malformed_query(format!(
                        "NEAR needs at least two terms, got {}",
                        terms.len()
                    )));
                }
                if *distance == 0 {
                    return Err(LexisError::malformed_query("NEAR distance must be positive"));
                }
                self.lower_text(&terms.join(" "), mask, negated, Shape::Near(*distance))
            }
            QueryNode::Field { fields, node } => {
                if fields.is_empty() {
                    return Err(LexisError::malformed_query("empty field limit"));
                }
                let indexes = self.analyzers.resolve_fields(fields)?;
                self.lower(node, FieldMask::from_fields(&indexes), negated)
            }
            QueryNode::Or(children) => {
                if children.iter().any(is_negative) {
                    return Err(LexisError::malformed_query(
                        "NOT cannot be an operand of OR",
                    ));
                }
                let mut branches = Vec::with_capacity(children.len());
                for child in children {
                    let lowered = self.lower(child, mask, negated)?;
                    flatten_into(lowered, &mut branches, false);
                }
                Ok(combine(branches, false))
            }
            QueryNode::And(children) => self.lower_and(children, mask, negated),
            QueryNode::Not(_) => Err(LexisError::malformed_query(
                "NOT needs a positive operand in the same group",
            )),
        }
    }

    fn lower_and(
        &mut self,
        children: &[QueryNode],
        mask: FieldMask,
        negated: bool,
    ) -> Result<PlanNode> {
        if children.is_empty() {
            return Ok(PlanNode::Empty);
        }
        if children.iter().all(is_negative) {
            return Err(LexisError::malformed_query(
                "query has only negated terms",
            ));
        }

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for child in children {
            if is_negative(child) {
                let lowered = self.lower_negative(child, mask)?;
                flatten_into(lowered, &mut exclude, false);
            } else {
                let lowered = self.lower(child, mask, negated)?;
                flatten_into(lowered, &mut include, true);
            }
        }

        let include = combine(include, true);
        if include == PlanNode::Empty || exclude.is_empty() {
            return Ok(include);
        }
        Ok(PlanNode::AndNot {
            include: Box::new(include),
            exclude: Box::new(combine(exclude, false)),
        })
    }

    fn lower_negative(&mut self, node: &QueryNode, mask: FieldMask) -> Result<PlanNode> {
        match node {
            QueryNode::Not(child) => self.lower(child, mask, true),
            QueryNode::Field { fields, node } => {
                let indexes = self.analyzers.resolve_fields(fields)?;
                self.lower_negative(node, FieldMask::from_fields(&indexes))
            }
            _ => self.lower(node, mask, true),
        }
    }

    /// Analyze `text` for every field of `mask`, grouping fields whose
    /// analyzers agree.
    fn analyze(&self, text: &str, mask: FieldMask) -> Result<Vec<(Vec<(String, u32)>, FieldMask)>> {
        let mut groups: Vec<(Vec<(String, u32)>, FieldMask)> = Vec::new();
        for field in mask.fields() {
            let Some(analyzer) = self.analyzers.get(field) else {
                break;
            };
            let tokens: Vec<(String, u32)> = analyzer
                .analyze(text)?
                .map(|t| (t.text, t.position))
                .collect();
            match groups.iter_mut().find(|(existing, _)| *existing == tokens) {
                Some((_, fields)) => fields.insert(field),
                None => groups.push((tokens, FieldMask::from_fields(&[field]))),
            }
        }
        Ok(groups)
    }

    fn lower_text(
        &mut self,
        text: &str,
        mask: FieldMask,
        negated: bool,
        shape: Shape,
    ) -> Result<PlanNode> {
        let groups = self.analyze(text, mask)?;
        let all = FieldMask::all(self.analyzers.len());
        let base = self.next_query_pos;
        let mut span = 0u32;
        let mut alternatives = Vec::new();

        for (tokens, fields) in groups {
            let Some(first) = tokens.first().map(|(_, pos)| *pos) else {
                continue;
            };
            let mut terms = Vec::with_capacity(tokens.len());
            for (text, pos) in tokens {
                let offset = pos - first;
                span = span.max(offset + 1);
                terms.push(PlanTerm {
                    slot: self.terms.len(),
                    text: text.clone(),
                    offset,
                    fields,
                    restricted: fields != all,
                });
                self.terms.push(QueryTerm {
                    text,
                    query_pos: base + offset,
                    negated,
                });
            }

            alternatives.push(if terms.len() == 1 {
                PlanNode::Term(terms.remove(0))
            } else {
                match shape {
                    Shape::Phrase => PlanNode::Phrase(terms),
                    Shape::Near(distance) => PlanNode::Near { terms, distance },
                }
            });
        }

        self.next_query_pos = base + span;
        Ok(combine(alternatives, false))
    }
}
