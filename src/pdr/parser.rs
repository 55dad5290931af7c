//! PVL text parser
//!
//! Handles the subset of PVL that PDRs use:
//!
//! ```text
//! ORIGINATING_SYSTEM = ASTER;
//! OBJECT = FILE_GROUP;
//!   OBJECT = FILE_SPEC;
//!     DIRECTORY_ID = /data/L1A;
//!     FILE_ID = "foo.001";
//!   END_OBJECT = FILE_SPEC;
//! END_OBJECT = FILE_GROUP;
//! END;
//! ```
//!
//! Statements end with `;` or a newline. Quoted strings and parenthesised
//! sequences may span either. `/* */` comments are dropped.

use thiserror::Error;

use super::tree::{NodeKind, PvlNode};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: {marker} without a matching open block")]
    UnexpectedEnd { line: usize, marker: String },

    #[error("line {line}: expected end of {expected}, found end of {found}")]
    MismatchedEnd {
        line: usize,
        expected: String,
        found: String,
    },

    #[error("block {name} opened on line {line} is never closed")]
    UnclosedBlock { name: String, line: usize },

    #[error("line {line}: statement is not an assignment: {statement}")]
    MissingAssignment { line: usize, statement: String },

    #[error("line {line}: unterminated quoted string")]
    UnterminatedQuote { line: usize },

    #[error("line {line}: unterminated comment")]
    UnterminatedComment { line: usize },
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Raw statement with the line it started on
#[derive(Debug)]
struct Statement {
    line: usize,
    text: String,
}

/// Parse PVL text into a tree rooted at a [`NodeKind::Root`] node
pub fn parse(input: &str) -> Result<PvlNode> {
    let statements = split_statements(input)?;

    // (node, line it was opened on)
    let mut stack: Vec<(PvlNode, usize)> = vec![(PvlNode::root(), 0)];

    for Statement { line, text } in statements {
        if text.eq_ignore_ascii_case("END") {
            break;
        }

        let (key, value) = match text.split_once('=') {
            Some((k, v)) => (k.trim().to_string(), unquote(v.trim())),
            // END_OBJECT / END_GROUP may appear without a name
            None if is_end_marker(&text) => (text.clone(), String::new()),
            None => {
                return Err(ParseError::MissingAssignment {
                    line,
                    statement: text,
                });
            }
        };

        match block_marker(&key) {
            Some(Marker::Begin(kind)) => {
                stack.push((PvlNode::new(kind, value), line));
            }
            Some(Marker::End(kind)) => {
                if stack.len() < 2 {
                    return Err(ParseError::UnexpectedEnd { line, marker: key });
                }
                let (node, _) = stack.pop().ok_or(ParseError::UnexpectedEnd {
                    line,
                    marker: key.clone(),
                })?;

                let name_mismatch = !value.is_empty() && !value.eq_ignore_ascii_case(node.name());
                if node.kind() != kind || name_mismatch {
                    return Err(ParseError::MismatchedEnd {
                        line,
                        expected: node.name().to_string(),
                        found: if value.is_empty() { key } else { value },
                    });
                }

                if let Some((parent, _)) = stack.last_mut() {
                    parent.push_child(node);
                }
            }
            None => {
                if let Some((current, _)) = stack.last_mut() {
                    current.push_attribute(key, value);
                }
            }
        }
    }

    if stack.len() > 1 {
        let (node, line) = stack.swap_remove(stack.len() - 1);
        return Err(ParseError::UnclosedBlock {
            name: node.name().to_string(),
            line,
        });
    }

    Ok(stack
        .pop()
        .map(|(root, _)| root)
        .unwrap_or_else(PvlNode::root))
}

enum Marker {
    Begin(NodeKind),
    End(NodeKind),
}

fn block_marker(key: &str) -> Option<Marker> {
    match key.to_ascii_uppercase().as_str() {
        "OBJECT" | "BEGIN_OBJECT" => Some(Marker::Begin(NodeKind::Object)),
        "GROUP" | "BEGIN_GROUP" => Some(Marker::Begin(NodeKind::Group)),
        "END_OBJECT" => Some(Marker::End(NodeKind::Object)),
        "END_GROUP" => Some(Marker::End(NodeKind::Group)),
        _ => None,
    }
}

fn is_end_marker(text: &str) -> bool {
    matches!(block_marker(text.trim()), Some(Marker::End(_)))
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

/// Split input into trimmed, non-empty statements
fn split_statements(input: &str) -> Result<Vec<Statement>> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut start_line = 1;
    let mut line = 1;
    let mut quote: Option<char> = None;
    let mut quote_line = 0;
    let mut depth = 0usize;

    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == '\n' {
                line += 1;
            }
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let comment_line = line;
                let mut closed = false;
                while let Some(cc) = chars.next() {
                    if cc == '\n' {
                        line += 1;
                    }
                    if cc == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(ParseError::UnterminatedComment { line: comment_line });
                }
            }
            '"' | '\'' => {
                quote = Some(c);
                quote_line = line;
                current.push(c);
            }
            '(' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ';' if depth == 0 => {
                flush(&mut statements, &mut current, start_line);
                start_line = line;
            }
            '\n' => {
                if depth == 0 {
                    flush(&mut statements, &mut current, start_line);
                    start_line = line + 1;
                } else {
                    current.push(' ');
                }
                line += 1;
            }
            _ => {
                if current.trim().is_empty() {
                    start_line = line;
                }
                current.push(c);
            }
        }
    }

    if quote.is_some() {
        return Err(ParseError::UnterminatedQuote { line: quote_line });
    }
    flush(&mut statements, &mut current, start_line);

    Ok(statements)
}

fn flush(statements: &mut Vec<Statement>, current: &mut String, line: usize) {
    let text = current.trim();
    if !text.is_empty() {
        statements.push(Statement {
            line,
            text: text.to_string(),
        });
    }
    current.clear();
}
