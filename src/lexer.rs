//! Line-oriented tokenizer with synthesized indentation tokens.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::token::{Span, Token, TokenKind};

mod error;

pub use error::{LexError, LexResult};

/// How a matched token pattern turns into a token.
#[derive(Debug, Clone, Copy)]
enum Rule {
    Fixed(TokenKind<'static>),
    Number,
    Word,
    Unknown,
}

/// Token patterns in match order. Multi-character operators come before their
/// single-character prefixes; the final catch-all flags anything else.
const TOKEN_TABLE: &[(&str, &str, Rule)] = &[
    ("EQ", r"==", Rule::Fixed(TokenKind::EqualEqual)),
    ("NEQ", r"!=", Rule::Fixed(TokenKind::NotEqual)),
    ("LE", r"<=", Rule::Fixed(TokenKind::LessEqual)),
    ("GE", r">=", Rule::Fixed(TokenKind::GreaterEqual)),
    ("LT", r"<", Rule::Fixed(TokenKind::Less)),
    ("GT", r">", Rule::Fixed(TokenKind::Greater)),
    ("NUMBER", r"\d+", Rule::Number),
    ("IDENT", r"[A-Za-z_][A-Za-z0-9_]*", Rule::Word),
    ("PLUS", r"\+", Rule::Fixed(TokenKind::Plus)),
    ("MINUS", r"-", Rule::Fixed(TokenKind::Minus)),
    ("MULT", r"\*", Rule::Fixed(TokenKind::Star)),
    ("DIV", r"/", Rule::Fixed(TokenKind::Slash)),
    ("ASSIGN", r"=", Rule::Fixed(TokenKind::Assign)),
    ("LPAREN", r"\(", Rule::Fixed(TokenKind::LParen)),
    ("RPAREN", r"\)", Rule::Fixed(TokenKind::RParen)),
    ("LBRACKET", r"\[", Rule::Fixed(TokenKind::LBracket)),
    ("RBRACKET", r"\]", Rule::Fixed(TokenKind::RBracket)),
    ("COLON", r":", Rule::Fixed(TokenKind::Colon)),
    ("COMMA", r",", Rule::Fixed(TokenKind::Comma)),
    ("DOT", r"\.", Rule::Fixed(TokenKind::Dot)),
    ("UNKNOWN", r"\S", Rule::Unknown),
];

/// One regex matching any token, built by joining the table as named groups.
static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let alternatives = TOKEN_TABLE
        .iter()
        .map(|(name, pattern, _)| format!("(?P<{name}>{pattern})"))
        .collect::<Vec<_>>();
    Regex::new(&alternatives.join("|")).expect("token table must compile")
});

pub struct Lexer<'a> {
    input: &'a str,
    indent_stack: Vec<usize>,
    tokens: Vec<Token<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            indent_stack: vec![0],
            tokens: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> LexResult<Vec<Token<'a>>> {
        let input = self.input;
        let mut last_line = 0;
        for (index, raw_line) in input.split('\n').enumerate() {
            let line = index + 1;
            last_line = line;
            self.tokenize_line(raw_line.trim_end_matches('\r'), line)?;
        }

        let span = Span {
            line: last_line + 1,
            column: 1,
        };
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, span));
        }
        self.tokens.push(Token::new(TokenKind::EOF, span));
        debug!(tokens = self.tokens.len(), "tokenized source");
        Ok(self.tokens)
    }

    fn tokenize_line(&mut self, raw_line: &'a str, line: usize) -> LexResult<()> {
        // `#` starts a comment; there are no string literals to protect.
        let code = match raw_line.find('#') {
            Some(position) => &raw_line[..position],
            None => raw_line,
        };
        if code.trim().is_empty() {
            return Ok(());
        }

        let body = code.trim_start_matches(' ');
        if body.starts_with('\t') {
            return Err(LexError::TabIndentation { line });
        }
        let indent = code.len() - body.len();
        self.adjust_indentation(indent, line)?;

        for captures in TOKEN_PATTERN.captures_iter(body) {
            // Group `n + 1` is table entry `n`; the patterns have no inner groups.
            let Some((entry, matched)) = captures
                .iter()
                .skip(1)
                .enumerate()
                .find_map(|(entry, group)| group.map(|group| (entry, group)))
            else {
                continue;
            };
            let (_, _, rule) = TOKEN_TABLE[entry];
            let text = matched.as_str();
            let span = Span {
                line,
                column: indent + matched.start() + 1,
            };
            let kind = match rule {
                Rule::Fixed(kind) => kind,
                Rule::Number => {
                    let value = text.parse::<i64>().map_err(|_| LexError::InvalidNumber {
                        literal: text.to_string(),
                        line,
                        column: span.column,
                    })?;
                    TokenKind::Number(value)
                }
                Rule::Word => TokenKind::keyword(text).unwrap_or(TokenKind::Identifier(text)),
                Rule::Unknown => {
                    return Err(LexError::UnexpectedCharacter {
                        character: text.chars().next().unwrap_or_default(),
                        line,
                        column: span.column,
                    });
                }
            };
            self.tokens.push(Token::new(kind, span));
        }

        self.tokens.push(Token::new(
            TokenKind::Newline,
            Span {
                line,
                column: code.len() + 1,
            },
        ));
        Ok(())
    }

    fn adjust_indentation(&mut self, indent: usize, line: usize) -> LexResult<()> {
        let span = Span { line, column: 1 };
        let current = self.current_indent();
        if indent > current {
            self.indent_stack.push(indent);
            self.tokens.push(Token::new(TokenKind::Indent, span));
            return Ok(());
        }
        while indent < self.current_indent() {
            self.indent_stack.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, span));
        }
        if indent != self.current_indent() {
            return Err(LexError::InconsistentDedent {
                indent_level: indent,
                line,
            });
        }
        Ok(())
    }

    fn current_indent(&self) -> usize {
        self.indent_stack.last().copied().unwrap_or(0)
    }
}

pub fn tokenize(input: &str) -> LexResult<Vec<Token<'_>>> {
    Lexer::new(input).tokenize()
}
