//! Winnow-based parser for the command language.
//!
//! Grammar (one command per line):
//! ```text
//! line     = comment | command | blank
//! comment  = "//" REST_OF_LINE
//! command  = "begin" "(" IDENT ")"
//!          | "R" "(" IDENT "," IDENT ")"
//!          | "W" "(" IDENT "," IDENT "," IDENT ")"
//!          | "fail" "(" IDENT ")"
//!          | "recover" "(" IDENT ")"
//!          | "end" "(" IDENT ")"
//!          | "dump" "(" ")"
//! IDENT    = [A-Za-z0-9_]+
//! ```
//!
//! Whitespace is tolerated around every token. A line that matches
//! nothing above is classified as [`Line::Unexpected`] rather than
//! failing the script; the dispatcher reports it and moves on.

use core::fmt;

use winnow::ascii::multispace0;
use winnow::combinator::{alt, delimited, eof, preceded, terminated};
use winnow::prelude::*;
use winnow::token::{literal, take_while};
use winnow::ModalResult;

/// A parsed workload command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `begin(T)`
    Begin { txn: String },
    /// `R(T, x)`
    Read { txn: String, variable: String },
    /// `W(T, x, v)`
    Write {
        txn: String,
        variable: String,
        value: String,
    },
    /// `fail(s)`
    Fail { site: String },
    /// `recover(s)`
    Recover { site: String },
    /// `end(T)`
    End { txn: String },
    /// `dump()`
    Dump,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin { txn } => write!(f, "begin({txn})"),
            Self::Read { txn, variable } => write!(f, "R({txn}, {variable})"),
            Self::Write {
                txn,
                variable,
                value,
            } => write!(f, "W({txn}, {variable}, {value})"),
            Self::Fail { site } => write!(f, "fail({site})"),
            Self::Recover { site } => write!(f, "recover({site})"),
            Self::End { txn } => write!(f, "end({txn})"),
            Self::Dump => write!(f, "dump()"),
        }
    }
}

/// Classification of one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Command(Command),
    Comment(String),
    Blank,
    /// Anything the grammar does not recognize; reported, not fatal.
    Unexpected(String),
}

/// Classify a single input line.
#[must_use]
pub fn parse_line(input: &str) -> Line {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Line::Blank;
    }
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Line::Comment(rest.trim().to_string());
    }
    let mut stream: &str = trimmed;
    match terminated(command, (multispace0, eof)).parse_next(&mut stream) {
        Ok(command) => Line::Command(command),
        Err(_) => Line::Unexpected(trimmed.to_string()),
    }
}

/// Classify every line of a script, 1-based line numbers attached.
#[must_use]
pub fn parse_script(input: &str) -> Vec<(usize, Line)> {
    input
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, parse_line(line)))
        .collect()
}

// ---------------------------------------------------------------------------
// Leaf parsers
// ---------------------------------------------------------------------------

/// One or more word characters: letters, digits, or `_`.
fn ident(input: &mut &str) -> ModalResult<String> {
    take_while(1.., |c: char| c.is_alphanumeric() || c == '_')
        .map(|s: &str| s.to_string())
        .parse_next(input)
}

/// An identifier with surrounding whitespace tolerated.
fn padded_ident(input: &mut &str) -> ModalResult<String> {
    delimited(multispace0, ident, multispace0).parse_next(input)
}

/// `"(" a ")"` with whitespace tolerated.
fn one_arg(input: &mut &str) -> ModalResult<String> {
    delimited(literal("("), padded_ident, literal(")")).parse_next(input)
}

/// `"(" a "," b ")"`.
fn two_args(input: &mut &str) -> ModalResult<(String, String)> {
    literal("(").parse_next(input)?;
    let first = padded_ident.parse_next(input)?;
    literal(",").parse_next(input)?;
    let second = padded_ident.parse_next(input)?;
    literal(")").parse_next(input)?;
    Ok((first, second))
}

/// `"(" a "," b "," c ")"`.
fn three_args(input: &mut &str) -> ModalResult<(String, String, String)> {
    literal("(").parse_next(input)?;
    let first = padded_ident.parse_next(input)?;
    literal(",").parse_next(input)?;
    let second = padded_ident.parse_next(input)?;
    literal(",").parse_next(input)?;
    let third = padded_ident.parse_next(input)?;
    literal(")").parse_next(input)?;
    Ok((first, second, third))
}

// ---------------------------------------------------------------------------
// Command parsers
// ---------------------------------------------------------------------------

fn begin_command(input: &mut &str) -> ModalResult<Command> {
    preceded((literal("begin"), multispace0), one_arg)
        .map(|txn| Command::Begin { txn })
        .parse_next(input)
}

fn read_command(input: &mut &str) -> ModalResult<Command> {
    preceded((literal("R"), multispace0), two_args)
        .map(|(txn, variable)| Command::Read { txn, variable })
        .parse_next(input)
}

fn write_command(input: &mut &str) -> ModalResult<Command> {
    preceded((literal("W"), multispace0), three_args)
        .map(|(txn, variable, value)| Command::Write {
            txn,
            variable,
            value,
        })
        .parse_next(input)
}

fn fail_command(input: &mut &str) -> ModalResult<Command> {
    preceded((literal("fail"), multispace0), one_arg)
        .map(|site| Command::Fail { site })
        .parse_next(input)
}

fn recover_command(input: &mut &str) -> ModalResult<Command> {
    preceded((literal("recover"), multispace0), one_arg)
        .map(|site| Command::Recover { site })
        .parse_next(input)
}

fn end_command(input: &mut &str) -> ModalResult<Command> {
    preceded((literal("end"), multispace0), one_arg)
        .map(|txn| Command::End { txn })
        .parse_next(input)
}

fn dump_command(input: &mut &str) -> ModalResult<Command> {
    (
        literal("dump"),
        multispace0,
        literal("("),
        multispace0,
        literal(")"),
    )
        .map(|_| Command::Dump)
        .parse_next(input)
}

/// Any command. Keywords are disjoint, so the order only matters for
/// backtracking cost.
fn command(input: &mut &str) -> ModalResult<Command> {
    alt((
        begin_command,
        read_command,
        write_command,
        fail_command,
        recover_command,
        end_command,
        dump_command,
    ))
    .parse_next(input)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
