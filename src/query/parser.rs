//! Query-string parser.
//!
//! Supported syntax:
//!
//! - `hello world`: implicit AND between whitespace-separated operands
//! - `hello | world`: OR
//! - `-hello`, `!hello`: NOT (needs a positive sibling at plan time)
//! - `(hello | world) rust`: grouping
//! - `"hello world"`: phrase
//! - `"hello world"~5`: proximity. All words in any order, in a span of
//!   fewer than the distance plus the number of words, so `"a b c"~5`
//!   needs a span of at most 7 words
//! - `hello NEAR/3 world`: proximity between two words, at most 3 positions
//!   apart
//! - `@title hello`, `@(title,body) hello`: field limit for the rest of the
//!   enclosing group, including further `|` branches, up to the closing `)`
//!   or the next field limit
//!
//! Errors carry the byte offset of the offending input.

use crate::error::{LexisError, Result};
use crate::query::ast::{MAX_QUERY_DEPTH, QueryNode};

const NEAR_KEYWORD: &str = "NEAR/";

/// Parses query strings into [`QueryNode`] trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParser;

impl QueryParser {
    pub fn new() -> Self {
        QueryParser
    }

    /// Parse a query string.
    ///
    /// A blank string parses to an empty `And`, which plans to an empty
    /// query.
    pub fn parse(&self, input: &str) -> Result<QueryNode> {
        let mut parser = Parser {
            input,
            pos: 0,
            depth: 0,
        };
        parser.skip_whitespace();
        if parser.at_end() {
            return Ok(QueryNode::And(Vec::new()));
        }

        let node = parser.parse_or()?;
        parser.skip_whitespace();
        match parser.peek() {
            None => Ok(node),
            Some(')') => Err(parser.error(parser.pos, "unbalanced ')'")),
            Some(c) => Err(parser.error(parser.pos, format!("unexpected '{c}'"))),
        }
    }
}

/// The `@field` limit in force while parsing a group.
struct FieldLimit {
    at: usize,
    fields: Vec<String>,
    used: bool,
}

fn limited_group(fields: Vec<String>, nodes: &mut Vec<QueryNode>) -> QueryNode {
    let node = if nodes.len() == 1 {
        nodes.remove(0)
    } else {
        QueryNode::And(std::mem::take(nodes))
    };
    QueryNode::Field {
        fields,
        node: Box::new(node),
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '|' | '"' | '@' | '~')
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error<S: AsRef<str>>(&self, at: usize, msg: S) -> LexisError {
        LexisError::malformed_query(format!("{} at byte {at}", msg.as_ref()))
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_QUERY_DEPTH {
            return Err(self.error(self.pos, "query nested too deeply"));
        }
        Ok(())
    }

    /// OR-separated branches. A field limit stays in force until the next
    /// limit or the end of the group, across `|`.
    fn parse_or(&mut self) -> Result<QueryNode> {
        let mut limit: Option<FieldLimit> = None;
        let mut branches = vec![self.parse_and(&mut limit)?];
        loop {
            self.skip_whitespace();
            if self.peek() != Some('|') {
                break;
            }
            self.bump();
            branches.push(self.parse_and(&mut limit)?);
        }
        Ok(if branches.len() == 1 {
            branches.remove(0)
        } else {
            QueryNode::Or(branches)
        })
    }

    fn parse_and(&mut self, limit: &mut Option<FieldLimit>) -> Result<QueryNode> {
        let mut items = Vec::new();
        let mut limited = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                None | Some(')') | Some('|') => break,
                Some('@') => {
                    let at = self.pos;
                    let fields = self.parse_field_limit()?;
                    let next = FieldLimit {
                        at,
                        fields,
                        used: false,
                    };
                    if let Some(previous) = limit.replace(next) {
                        if !previous.used {
                            return Err(self.error(previous.at, "field limit without terms"));
                        }
                        if !limited.is_empty() {
                            items.push(limited_group(previous.fields, &mut limited));
                        }
                    }
                }
                Some(_) => {
                    let node = self.parse_unary()?;
                    match limit {
                        Some(active) => {
                            active.used = true;
                            limited.push(node);
                        }
                        None => items.push(node),
                    }
                }
            }
        }
        if let Some(active) = limit {
            if !active.used {
                return Err(self.error(active.at, "field limit without terms"));
            }
            if !limited.is_empty() {
                items.push(limited_group(active.fields.clone(), &mut limited));
            }
        }

        match items.len() {
            0 => Err(self.error(self.pos, "expected a term")),
            1 => Ok(items.remove(0)),
            _ => Ok(QueryNode::And(items)),
        }
    }

    /// `@name` or `@(name, name)`.
    fn parse_field_limit(&mut self) -> Result<Vec<String>> {
        let start = self.pos;
        self.bump();

        let fields: Vec<String> = if self.peek() == Some('(') {
            self.bump();
            let close = self
                .rest()
                .find(')')
                .ok_or_else(|| self.error(start, "unterminated field list"))?;
            let list = &self.rest()[..close];
            self.pos += close + 1;
            list.split(',').map(|f| f.trim().to_string()).collect()
        } else {
            let name = self.read_word();
            vec![name.to_string()]
        };

        if fields.iter().any(|f| f.is_empty()) {
            return Err(self.error(start, "empty field name"));
        }
        Ok(fields)
    }

    fn parse_unary(&mut self) -> Result<QueryNode> {
        let start = self.pos;
        match self.peek() {
            Some('-') | Some('!') => {
                self.bump();
                if !self.peek().is_some_and(|c| !c.is_whitespace()) {
                    return Err(self.error(start, "dangling NOT operator"));
                }
                self.enter()?;
                let child = self.parse_unary()?;
                self.depth -= 1;
                Ok(QueryNode::Not(Box::new(child)))
            }
            Some('(') => {
                self.bump();
                self.enter()?;
                let node = self.parse_or()?;
                self.skip_whitespace();
                if self.bump() != Some(')') {
                    return Err(self.error(start, "unbalanced '('"));
                }
                self.depth -= 1;
                Ok(node)
            }
            Some('"') => self.parse_quoted(),
            Some(c) if !is_word_char(c) => Err(self.error(start, format!("unexpected '{c}'"))),
            Some(_) => self.parse_word(),
            None => Err(self.error(start, "expected a term")),
        }
    }

    fn read_word(&mut self) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn read_number(&mut self, what: &str) -> Result<u32> {
        let start = self.pos;
        let rest = self.rest();
        let len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error(start, format!("expected {what}")));
        }
        self.pos += len;
        rest[..len]
            .parse()
            .map_err(|_| self.error(start, format!("{what} out of range")))
    }

    /// A word, possibly followed by `NEAR/n word` links.
    fn parse_word(&mut self) -> Result<QueryNode> {
        let start = self.pos;
        if self.rest().starts_with(NEAR_KEYWORD) {
            return Err(self.error(start, "NEAR without a left operand"));
        }
        let mut left = self.read_word().to_string();
        let mut links = Vec::new();

        loop {
            let before = self.pos;
            self.skip_whitespace();
            if !self.rest().starts_with(NEAR_KEYWORD) {
                self.pos = before;
                break;
            }
            let keyword = self.pos;
            self.pos += NEAR_KEYWORD.len();
            let distance = self.read_number("NEAR distance")?;
            self.skip_whitespace();
            if !self.peek().is_some_and(is_word_char)
                || matches!(self.peek(), Some('-') | Some('!'))
                || self.rest().starts_with(NEAR_KEYWORD)
            {
                return Err(self.error(keyword, "NEAR needs a word on both sides"));
            }
            let right = self.read_word().to_string();
            links.push(QueryNode::Near {
                terms: vec![std::mem::replace(&mut left, right.clone()), right],
                distance,
            });
        }

        Ok(match links.len() {
            0 => QueryNode::Term(left),
            1 => links.remove(0),
            _ => QueryNode::And(links),
        })
    }

    /// `"a b c"` or `"a b c"~n`.
    fn parse_quoted(&mut self) -> Result<QueryNode> {
        let start = self.pos;
        self.bump();
        let close = self
            .rest()
            .find('"')
            .ok_or_else(|| self.error(start, "unterminated phrase"))?;
        let words: Vec<String> = self.rest()[..close]
            .split_whitespace()
            .map(str::to_string)
            .collect();
        self.pos += close + 1;

        if self.peek() == Some('~') {
            self.bump();
            let distance = self.read_number("proximity distance")?;
            return Ok(QueryNode::Near {
                terms: words,
                distance,
            });
        }
        Ok(QueryNode::Phrase(words))
    }
}
