//! Cheap structural pre-scan run before a body reaches the engine.
//!
//! The engine parses and compiles recursively, so a body such as
//! `x = !!!!…1` or `((((…))))` a few hundred thousand levels deep would
//! exhaust the worker stack before any runtime limit applies. The scanner
//! walks the source once, skipping strings, template text, comments and
//! regular expression literals, and rejects bodies whose nesting exceeds
//! the configured depth.

use crate::error::ScriptError;

/// Binary operator chains nest on the left; they may run longer than
/// right-nested constructs before the compiler's recursion becomes a risk.
const OPERATOR_CHAIN_FACTOR: usize = 16;

/// Keywords that start a nested unary expression.
const PREFIX_KEYWORDS: &[&str] = &["typeof", "void", "delete", "await", "new"];

/// Keywords after which an expression (and so a regex literal) may follow.
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "yield", "case", "in", "of", "instanceof", "throw", "else", "do",
];

/// Reject `source` if brackets, prefix operators or operator chains nest
/// deeper than `max`.
pub(crate) fn check_nesting(source: &str, max: usize) -> Result<(), ScriptError> {
    Scanner::new(source.as_bytes(), max).run()
}

#[derive(Debug, Default)]
struct Level {
    /// Right-nested `=`, `=>` and `?` since the last statement boundary.
    assignments: usize,
    /// Binary and member operators since the last statement boundary.
    operators: usize,
    /// Consecutive prefix operators.
    prefix: usize,
}

impl Level {
    fn reset(&mut self) {
        *self = Level::default();
    }
}

#[derive(Debug)]
enum Frame {
    Code(Level),
    Template,
}

/// What the previous significant token was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prev {
    /// An operator, an opening bracket or the start of input: an expression
    /// is expected next.
    Operator,
    /// An identifier, literal or closing bracket.
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Prefix,
    Binary,
    Assignment,
    Other,
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
    max: usize,
    stack: Vec<Frame>,
    prev: Prev,
    line_break: bool,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a [u8], max: usize) -> Self {
        Self {
            src,
            pos: 0,
            max,
            stack: vec![Frame::Code(Level::default())],
            prev: Prev::Operator,
            line_break: false,
        }
    }

    fn run(mut self) -> Result<(), ScriptError> {
        while self.pos < self.src.len() {
            match self.stack.last() {
                Some(Frame::Template) => self.template_text()?,
                _ => self.code_token()?,
            }
        }
        Ok(())
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn too_deep(&self) -> ScriptError {
        ScriptError::Limit(format!("nesting too deep (more than {} levels)", self.max))
    }

    fn level(&mut self) -> Option<&mut Level> {
        match self.stack.last_mut() {
            Some(Frame::Code(level)) => Some(level),
            _ => None,
        }
    }

    fn push(&mut self, frame: Frame) -> Result<(), ScriptError> {
        self.stack.push(frame);
        if self.stack.len() - 1 > self.max {
            return Err(self.too_deep());
        }
        Ok(())
    }

    /// Bookkeeping shared by every significant token.
    fn begin_token(&mut self, starts_statement: bool, op: Op) -> Result<(), ScriptError> {
        let max = self.max;
        let line_break = std::mem::take(&mut self.line_break);
        let Some(level) = self.level() else {
            return Ok(());
        };
        if line_break && starts_statement {
            level.reset();
        }
        match op {
            Op::Prefix => level.prefix += 1,
            Op::Binary => {
                level.prefix = 0;
                level.operators += 1;
            }
            Op::Assignment => {
                level.prefix = 0;
                level.assignments += 1;
            }
            Op::Other => level.prefix = 0,
        }
        let over = level.prefix > max
            || level.assignments > max
            || level.operators > max.saturating_mul(OPERATOR_CHAIN_FACTOR);
        if over {
            return Err(self.too_deep());
        }
        Ok(())
    }

    fn template_text(&mut self) -> Result<(), ScriptError> {
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' => self.pos += 2,
                b'`' => {
                    self.pos += 1;
                    self.stack.pop();
                    self.prev = Prev::Value;
                    return Ok(());
                }
                b'$' if self.peek(1) == Some(b'{') => {
                    self.pos += 2;
                    self.prev = Prev::Operator;
                    return self.push(Frame::Code(Level::default()));
                }
                _ => self.pos += 1,
            }
        }
        Ok(())
    }

    fn code_token(&mut self) -> Result<(), ScriptError> {
        let b = self.src[self.pos];
        match b {
            b'\n' | b'\r' => {
                if self.prev == Prev::Value {
                    self.line_break = true;
                }
                self.pos += 1;
            }
            b' ' | b'\t' | 0x0b | 0x0c => self.pos += 1,
            b'/' => self.slash()?,
            b'\'' | b'"' => {
                self.begin_token(true, Op::Other)?;
                self.skip_string(b);
                self.prev = Prev::Value;
            }
            b'`' => {
                self.begin_token(true, Op::Other)?;
                self.pos += 1;
                self.push(Frame::Template)?;
            }
            b'(' | b'[' | b'{' => {
                self.begin_token(b == b'{', Op::Other)?;
                self.pos += 1;
                self.prev = Prev::Operator;
                self.push(Frame::Code(Level::default()))?;
            }
            b')' | b']' | b'}' => {
                self.pos += 1;
                if self.stack.len() > 1 {
                    self.stack.pop();
                }
                self.begin_token(false, Op::Other)?;
                self.prev = if b == b'}' { Prev::Operator } else { Prev::Value };
            }
            b';' | b',' => {
                self.pos += 1;
                self.line_break = false;
                if let Some(level) = self.level() {
                    level.reset();
                }
                self.prev = Prev::Operator;
            }
            b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' | b'\\' | 0x80..=0xff => {
                self.word()?
            }
            _ => self.operator(b)?,
        }
        Ok(())
    }

    fn slash(&mut self) -> Result<(), ScriptError> {
        match self.peek(1) {
            Some(b'/') => {
                while let Some(b) = self.peek(0) {
                    if b == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            }
            Some(b'*') => {
                let body = &self.src[self.pos + 2..];
                let len = body
                    .windows(2)
                    .position(|w| w == b"*/")
                    .unwrap_or(body.len());
                if self.prev == Prev::Value && body[..len].contains(&b'\n') {
                    self.line_break = true;
                }
                self.pos += 2 + len + 2;
            }
            _ if self.prev == Prev::Operator => {
                self.begin_token(true, Op::Other)?;
                self.skip_regex();
                self.prev = Prev::Value;
            }
            Some(b'=') => {
                self.pos += 2;
                self.begin_token(false, Op::Assignment)?;
                self.prev = Prev::Operator;
            }
            _ => {
                self.pos += 1;
                self.begin_token(false, Op::Binary)?;
                self.prev = Prev::Operator;
            }
        }
        Ok(())
    }

    fn skip_string(&mut self, quote: u8) {
        self.pos += 1;
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' => self.pos += 2,
                b'\n' => return,
                _ if b == quote => {
                    self.pos += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
    }

    fn skip_regex(&mut self) {
        self.pos += 1;
        let mut in_class = false;
        while let Some(b) = self.peek(0) {
            match b {
                b'\\' => self.pos += 2,
                b'\n' => return,
                b'[' => {
                    in_class = true;
                    self.pos += 1;
                }
                b']' => {
                    in_class = false;
                    self.pos += 1;
                }
                b'/' if !in_class => {
                    self.pos += 1;
                    return;
                }
                _ => self.pos += 1,
            }
        }
    }

    fn word(&mut self) -> Result<(), ScriptError> {
        let start = self.pos;
        let numeric = self.src[start].is_ascii_digit();
        while let Some(b) = self.peek(0) {
            let continues = b.is_ascii_alphanumeric()
                || matches!(b, b'_' | b'$' | b'\\' | 0x80..=0xff)
                || (numeric && b == b'.');
            if !continues {
                break;
            }
            self.pos += 1;
        }
        let word = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");

        if PREFIX_KEYWORDS.contains(&word) {
            self.begin_token(true, Op::Prefix)?;
            self.prev = Prev::Operator;
        } else if word == "in" || word == "instanceof" {
            self.begin_token(false, Op::Binary)?;
            self.prev = Prev::Operator;
        } else if EXPRESSION_KEYWORDS.contains(&word) {
            self.begin_token(true, Op::Other)?;
            self.prev = Prev::Operator;
        } else {
            self.begin_token(true, Op::Other)?;
            self.prev = Prev::Value;
        }
        Ok(())
    }

    fn operator(&mut self, b: u8) -> Result<(), ScriptError> {
        let next = self.peek(1);
        let (width, op) = match b {
            b'.' if next == Some(b'.') => (3, Op::Other),
            b'.' if next.is_some_and(|n| n.is_ascii_digit()) => {
                self.pos += 1;
                return self.word();
            }
            b'.' => (1, Op::Binary),
            b'!' | b'~' if b == b'!' && next == Some(b'=') => {
                let width = if self.peek(2) == Some(b'=') { 3 } else { 2 };
                (width, Op::Binary)
            }
            b'!' | b'~' => (1, Op::Prefix),
            b'+' | b'-' if next == Some(b) => {
                let op = if self.prev == Prev::Operator { Op::Prefix } else { Op::Other };
                (2, op)
            }
            b'+' | b'-' if next == Some(b'=') => (2, Op::Assignment),
            b'+' | b'-' if self.prev == Prev::Operator => (1, Op::Prefix),
            b'+' | b'-' => (1, Op::Binary),
            b'=' if next == Some(b'>') => (2, Op::Assignment),
            b'=' if next == Some(b'=') => {
                let width = if self.peek(2) == Some(b'=') { 3 } else { 2 };
                (width, Op::Binary)
            }
            b'=' => (1, Op::Assignment),
            b'?' if next == Some(b'.') && !self.peek(2).is_some_and(|n| n.is_ascii_digit()) => {
                (2, Op::Binary)
            }
            b'?' if next == Some(b'?') => {
                if self.peek(2) == Some(b'=') {
                    (3, Op::Assignment)
                } else {
                    (2, Op::Binary)
                }
            }
            b'?' => (1, Op::Assignment),
            b'<' | b'>' | b'*' | b'%' | b'&' | b'|' | b'^' => {
                let mut width = 1;
                while matches!(
                    self.peek(width),
                    Some(b'<' | b'>' | b'*' | b'%' | b'&' | b'|' | b'^')
                ) {
                    width += 1;
                }
                if self.peek(width) == Some(b'=') {
                    let comparison = width == 1 && matches!(b, b'<' | b'>');
                    let op = if comparison { Op::Binary } else { Op::Assignment };
                    (width + 1, op)
                } else {
                    (width, Op::Binary)
                }
            }
            _ => (1, Op::Other),
        };
        self.pos += width;
        self.begin_token(false, op)?;
        let postfix_update = matches!(b, b'+' | b'-') && width == 2 && op == Op::Other;
        if !postfix_update {
            self.prev = Prev::Operator;
        }
        Ok(())
    }
}
