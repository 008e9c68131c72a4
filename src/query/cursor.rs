//! Pull-based document cursors.
//!
//! A cursor walks the matching local documents of one segment in increasing
//! order. Every cursor is positioned on its first match when created and
//! reports `None` from [`DocCursor::doc`] once exhausted. Cursors are built
//! per segment from a [`PlanNode`] by [`build`].

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::Result;
use crate::query::planner::{FieldMask, PlanNode, PlanTerm};
use crate::segment::posting::PostingCursor;
use crate::segment::types::{position_field, position_word};
use crate::segment::{LocalDocNo, Segment};

/// One occurrence of a query term in the current document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Plan slot of the term.
    pub slot: usize,

    /// Hit position (field and word).
    pub position: u32,
}

/// Iterator over matching documents of one segment.
pub trait DocCursor {
    /// Current document, `None` when exhausted.
    fn doc(&self) -> Option<LocalDocNo>;

    /// Move to the next match.
    fn advance(&mut self) -> Result<Option<LocalDocNo>>;

    /// Move to the first match `>= target`; never moves backwards.
    fn seek(&mut self, target: LocalDocNo) -> Result<Option<LocalDocNo>>;

    /// Upper bound on the number of matches, used to order intersections.
    fn cost(&self) -> u64;

    /// Append the hits of the current document.
    fn collect_matches(&mut self, hits: &mut Vec<Hit>) -> Result<()>;
}

pub type BoxCursor<'a> = Box<dyn DocCursor + 'a>;

/// Postings of one term, optionally limited to some fields.
pub struct TermCursor<'a> {
    postings: PostingCursor<'a>,
    slot: usize,
    fields: FieldMask,
    restricted: bool,
}

impl<'a> TermCursor<'a> {
    pub fn new(postings: PostingCursor<'a>, term: &PlanTerm) -> Result<Self> {
        let mut cursor = TermCursor {
            postings,
            slot: term.slot,
            fields: term.fields,
            restricted: term.restricted,
        };
        cursor.settle()?;
        Ok(cursor)
    }

    /// Skip documents without a position in the allowed fields.
    fn settle(&mut self) -> Result<Option<LocalDocNo>> {
        if !self.restricted {
            return Ok(self.postings.doc());
        }
        let fields = self.fields;
        while let Some(doc) = self.postings.doc() {
            let positions = self.postings.positions()?;
            if positions.iter().any(|&p| fields.contains(position_field(p))) {
                return Ok(Some(doc));
            }
            self.postings.advance()?;
        }
        Ok(None)
    }
}

impl DocCursor for TermCursor<'_> {
    fn doc(&self) -> Option<LocalDocNo> {
        self.postings.doc()
    }

    fn advance(&mut self) -> Result<Option<LocalDocNo>> {
        self.postings.advance()?;
        self.settle()
    }

    fn seek(&mut self, target: LocalDocNo) -> Result<Option<LocalDocNo>> {
        self.postings.seek(target)?;
        self.settle()
    }

    fn cost(&self) -> u64 {
        u64::from(self.postings.doc_freq())
    }

    fn collect_matches(&mut self, hits: &mut Vec<Hit>) -> Result<()> {
        if self.postings.doc().is_none() {
            return Ok(());
        }
        let (slot, fields, restricted) = (self.slot, self.fields, self.restricted);
        let positions = self.postings.positions()?;
        hits.extend(
            positions
                .iter()
                .filter(|&&p| !restricted || fields.contains(position_field(p)))
                .map(|&position| Hit { slot, position }),
        );
        Ok(())
    }
}

/// Leapfrog intersection; the cheapest child drives.
pub struct AndCursor<'a> {
    children: Vec<BoxCursor<'a>>,
    doc: Option<LocalDocNo>,
}

impl<'a> AndCursor<'a> {
    pub fn new(mut children: Vec<BoxCursor<'a>>) -> Result<Self> {
        children.sort_by_key(|c| c.cost());
        let first = children.first().and_then(|c| c.doc());
        let mut cursor = AndCursor {
            children,
            doc: None,
        };
        cursor.align(first)?;
        Ok(cursor)
    }

    fn align(&mut self, mut candidate: Option<LocalDocNo>) -> Result<Option<LocalDocNo>> {
        'search: loop {
            let Some(target) = candidate else {
                self.doc = None;
                return Ok(None);
            };
            for i in 1..self.children.len() {
                match self.children[i].seek(target)? {
                    None => {
                        self.doc = None;
                        return Ok(None);
                    }
                    Some(doc) if doc > target => {
                        candidate = self.children[0].seek(doc)?;
                        continue 'search;
                    }
                    Some(_) => {}
                }
            }
            self.doc = Some(target);
            return Ok(self.doc);
        }
    }
}

impl DocCursor for AndCursor<'_> {
    fn doc(&self) -> Option<LocalDocNo> {
        self.doc
    }

    fn advance(&mut self) -> Result<Option<LocalDocNo>> {
        if self.doc.is_none() {
            return Ok(None);
        }
        let next = self.children[0].advance()?;
        self.align(next)
    }

    fn seek(&mut self, target: LocalDocNo) -> Result<Option<LocalDocNo>> {
        match self.doc {
            None => Ok(None),
            Some(doc) if doc >= target => Ok(Some(doc)),
            Some(_) => {
                let next = self.children[0].seek(target)?;
                self.align(next)
            }
        }
    }

    fn cost(&self) -> u64 {
        self.children.first().map_or(0, |c| c.cost())
    }

    fn collect_matches(&mut self, hits: &mut Vec<Hit>) -> Result<()> {
        if self.doc.is_none() {
            return Ok(());
        }
        for child in &mut self.children {
            child.collect_matches(hits)?;
        }
        Ok(())
    }
}

/// Union over a min-heap of child positions.
pub struct OrCursor<'a> {
    children: Vec<BoxCursor<'a>>,
    heap: BinaryHeap<Reverse<(LocalDocNo, usize)>>,
}

impl<'a> OrCursor<'a> {
    pub fn new(children: Vec<BoxCursor<'a>>) -> Self {
        let heap = children
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.doc().map(|doc| Reverse((doc, i))))
            .collect();
        OrCursor { children, heap }
    }
}

impl DocCursor for OrCursor<'_> {
    fn doc(&self) -> Option<LocalDocNo> {
        self.heap.peek().map(|Reverse((doc, _))| *doc)
    }

    fn advance(&mut self) -> Result<Option<LocalDocNo>> {
        let Some(current) = self.doc() else {
            return Ok(None);
        };
        while let Some(&Reverse((doc, i))) = self.heap.peek() {
            if doc != current {
                break;
            }
            self.heap.pop();
            if let Some(next) = self.children[i].advance()? {
                self.heap.push(Reverse((next, i)));
            }
        }
        Ok(self.doc())
    }

    fn seek(&mut self, target: LocalDocNo) -> Result<Option<LocalDocNo>> {
        while let Some(&Reverse((doc, i))) = self.heap.peek() {
            if doc >= target {
                break;
            }
            self.heap.pop();
            if let Some(next) = self.children[i].seek(target)? {
                self.heap.push(Reverse((next, i)));
            }
        }
        Ok(self.doc())
    }

    fn cost(&self) -> u64 {
        self.children.iter().map(|c| c.cost()).sum()
    }

    fn collect_matches(&mut self, hits: &mut Vec<Hit>) -> Result<()> {
        let Some(current) = self.doc() else {
            return Ok(());
        };
        for child in &mut self.children {
            if child.doc() == Some(current) {
                child.collect_matches(hits)?;
            }
        }
        Ok(())
    }
}

/// Matches of `include` that `exclude` does not match.
pub struct AndNotCursor<'a> {
    include: BoxCursor<'a>,
    exclude: BoxCursor<'a>,
}

impl<'a> AndNotCursor<'a> {
    pub fn new(include: BoxCursor<'a>, exclude: BoxCursor<'a>) -> Result<Self> {
        let mut cursor = AndNotCursor { include, exclude };
        cursor.settle()?;
        Ok(cursor)
    }

    fn settle(&mut self) -> Result<Option<LocalDocNo>> {
        while let Some(doc) = self.include.doc() {
            if self.exclude.seek(doc)? != Some(doc) {
                return Ok(Some(doc));
            }
            self.include.advance()?;
        }
        Ok(None)
    }
}

impl DocCursor for AndNotCursor<'_> {
    fn doc(&self) -> Option<LocalDocNo> {
        self.include.doc()
    }

    fn advance(&mut self) -> Result<Option<LocalDocNo>> {
        self.include.advance()?;
        self.settle()
    }

    fn seek(&mut self, target: LocalDocNo) -> Result<Option<LocalDocNo>> {
        self.include.seek(target)?;
        self.settle()
    }

    fn cost(&self) -> u64 {
        self.include.cost()
    }

    fn collect_matches(&mut self, hits: &mut Vec<Hit>) -> Result<()> {
        self.include.collect_matches(hits)
    }
}

/// Positional check applied to documents of an intersection.
#[derive(Debug, Clone, Copy)]
enum Proximity {
    /// Terms at their phrase offsets from a common start.
    Adjacent,
    /// Every term inside one window spanning at most this many words.
    Window(u32),
}

/// Intersection filtered by term positions: phrases and NEAR.
pub struct PositionalCursor<'a> {
    inner: AndCursor<'a>,
    /// Slot and phrase offset of each term.
    terms: Vec<(usize, u32)>,
    proximity: Proximity,
    scratch: Vec<Hit>,
    positions: Vec<Vec<u32>>,
    matched: Vec<Hit>,
}

impl<'a> PositionalCursor<'a> {
    /// Terms must occur at their offsets, in order.
    pub fn phrase(inner: AndCursor<'a>, terms: Vec<(usize, u32)>) -> Result<Self> {
        Self::new(inner, terms, Proximity::Adjacent)
    }

    /// Terms must occur in one field, spanning fewer than `distance` plus the
    /// number of terms words.
    pub fn near(inner: AndCursor<'a>, terms: Vec<(usize, u32)>, distance: u32) -> Result<Self> {
        Self::new(inner, terms, Proximity::Window(distance))
    }

    fn new(inner: AndCursor<'a>, terms: Vec<(usize, u32)>, proximity: Proximity) -> Result<Self> {
        let positions = vec![Vec::new(); terms.len()];
        let mut cursor = PositionalCursor {
            inner,
            terms,
            proximity,
            scratch: Vec::new(),
            positions,
            matched: Vec::new(),
        };
        cursor.settle()?;
        Ok(cursor)
    }

    fn settle(&mut self) -> Result<Option<LocalDocNo>> {
        while let Some(doc) = self.inner.doc() {
            if self.verify()? {
                return Ok(Some(doc));
            }
            self.inner.advance()?;
        }
        Ok(None)
    }

    fn verify(&mut self) -> Result<bool> {
        self.scratch.clear();
        self.matched.clear();
        self.inner.collect_matches(&mut self.scratch)?;
        for list in &mut self.positions {
            list.clear();
        }
        for hit in &self.scratch {
            if let Some(i) = self.terms.iter().position(|&(slot, _)| slot == hit.slot) {
                self.positions[i].push(hit.position);
            }
        }
        for list in &mut self.positions {
            list.sort_unstable();
        }

        match self.proximity {
            Proximity::Adjacent => self.verify_adjacent(),
            Proximity::Window(distance) => self.verify_window(distance),
        }
        Ok(!self.matched.is_empty())
    }

    fn verify_adjacent(&mut self) {
        let (_, first_offset) = self.terms[0];
        for &p in &self.positions[0] {
            if position_word(p) < first_offset {
                continue;
            }
            let start = p - first_offset;
            let field = position_field(p);
            let aligned = self.terms.iter().zip(&self.positions).all(|(&(_, offset), list)| {
                start
                    .checked_add(offset)
                    .filter(|&q| position_field(q) == field)
                    .is_some_and(|q| list.binary_search(&q).is_ok())
            });
            if aligned {
                for &(slot, offset) in &self.terms {
                    self.matched.push(Hit {
                        slot,
                        position: start + offset,
                    });
                }
            }
        }
    }

    /// All terms in one field, spanning fewer than `distance + terms` words.
    /// For two terms this is at most `distance` words apart.
    fn verify_window(&mut self, distance: u32) {
        let max_spread = (distance + self.terms.len() as u32).saturating_sub(2);
        let mut occurrences: Vec<(u32, usize)> = self
            .positions
            .iter()
            .enumerate()
            .flat_map(|(i, list)| list.iter().map(move |&p| (p, i)))
            .collect();
        occurrences.sort_unstable();

        let mut counts = vec![0usize; self.terms.len()];
        let mut covered = 0;
        let mut left = 0;
        let mut found = false;
        for right in 0..occurrences.len() {
            let (_, term) = occurrences[right];
            if counts[term] == 0 {
                covered += 1;
            }
            counts[term] += 1;

            while covered == self.terms.len() {
                let (start, first) = occurrences[left];
                let (end, _) = occurrences[right];
                if position_field(start) == position_field(end) && end - start <= max_spread {
                    found = true;
                }
                counts[first] -= 1;
                if counts[first] == 0 {
                    covered -= 1;
                }
                left += 1;
            }
            if found {
                break;
            }
        }

        if found {
            self.matched.extend_from_slice(&self.scratch);
        }
    }
}

impl DocCursor for PositionalCursor<'_> {
    fn doc(&self) -> Option<LocalDocNo> {
        self.inner.doc()
    }

    fn advance(&mut self) -> Result<Option<LocalDocNo>> {
        self.inner.advance()?;
        self.settle()
    }

    fn seek(&mut self, target: LocalDocNo) -> Result<Option<LocalDocNo>> {
        if self.inner.doc().is_some_and(|doc| doc >= target) {
            return Ok(self.inner.doc());
        }
        self.inner.seek(target)?;
        self.settle()
    }

    fn cost(&self) -> u64 {
        self.inner.cost()
    }

    fn collect_matches(&mut self, hits: &mut Vec<Hit>) -> Result<()> {
        hits.extend_from_slice(&self.matched);
        Ok(())
    }
}

fn term_cursor<'a>(term: &PlanTerm, segment: &'a Segment) -> Result<Option<BoxCursor<'a>>> {
    let Some(info) = segment.term_info(&term.text) else {
        return Ok(None);
    };
    let cursor = TermCursor::new(segment.postings_for(info)?, term)?;
    Ok(cursor.doc().map(|_| Box::new(cursor) as BoxCursor<'a>))
}

fn term_cursors<'a>(terms: &[PlanTerm], segment: &'a Segment) -> Result<Option<Vec<BoxCursor<'a>>>> {
    let mut cursors = Vec::with_capacity(terms.len());
    for term in terms {
        match term_cursor(term, segment)? {
            Some(cursor) => cursors.push(cursor),
            None => return Ok(None),
        }
    }
    Ok(Some(cursors))
}

fn positional_terms(terms: &[PlanTerm]) -> Vec<(usize, u32)> {
    terms.iter().map(|t| (t.slot, t.offset)).collect()
}

/// Build the cursor tree of `node` for one segment.
///
/// Returns `None` when the segment cannot match, e.g. a required term is
/// missing from its dictionary.
pub fn build<'a>(node: &PlanNode, segment: &'a Segment) -> Result<Option<BoxCursor<'a>>> {
    let cursor: Option<BoxCursor<'a>> = match node {
        PlanNode::Empty => None,
        PlanNode::Term(term) => term_cursor(term, segment)?,
        PlanNode::And(children) => {
            let mut cursors = Vec::with_capacity(children.len());
            for child in children {
                match build(child, segment)? {
                    Some(cursor) => cursors.push(cursor),
                    None => return Ok(None),
                }
            }
            Some(Box::new(AndCursor::new(cursors)?))
        }
        PlanNode::Or(children) => {
            let mut cursors = Vec::with_capacity(children.len());
            for child in children {
                if let Some(cursor) = build(child, segment)? {
                    cursors.push(cursor);
                }
            }
            match cursors.len() {
                0 => None,
                1 => cursors.pop(),
                _ => Some(Box::new(OrCursor::new(cursors))),
            }
        }
        PlanNode::AndNot { include, exclude } => match build(include, segment)? {
            None => None,
            Some(include) => match build(exclude, segment)? {
                None => Some(include),
                Some(exclude) => Some(Box::new(AndNotCursor::new(include, exclude)?)),
            },
        },
        PlanNode::Phrase(terms) => match term_cursors(terms, segment)? {
            None => None,
            Some(cursors) => Some(Box::new(PositionalCursor::phrase(
                AndCursor::new(cursors)?,
                positional_terms(terms),
            )?)),
        },
        PlanNode::Near { terms, distance } => match term_cursors(terms, segment)? {
            None => None,
            Some(cursors) => Some(Box::new(PositionalCursor::near(
                AndCursor::new(cursors)?,
                positional_terms(terms),
                *distance,
            )?)),
        },
    };
    Ok(cursor.filter(|c| c.doc().is_some()))
}
