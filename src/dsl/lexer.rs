/// Indentation-aware tokenizer for the strategy DSL
use crate::error::{Result, TradingError};

/// Token kinds produced by the lexer
///
/// `Indent`/`Dedent` are synthetic: they mark block structure derived
/// from leading whitespace, Python-style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    Str,
    Operator,
    LeftParen,
    RightParen,
    Indent,
    Dedent,
    Eof,
}

/// One token with its 1-based source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
}

impl Token {
    fn new(kind: TokenKind, text: &str, line: u32) -> Self {
        Token {
            kind,
            text: text.to_string(),
            line,
        }
    }
}

const TAB_STOP: usize = 8;

/// Tokenize strategy source into a flat stream ending in `Eof`
pub struct Lexer<'a> {
    source: &'a str,
    indent_stack: Vec<usize>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            indent_stack: vec![0],
            tokens: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut last_line = 0u32;
        for (index, raw_line) in self.source.lines().enumerate() {
            let line = index as u32 + 1;
            last_line = line;

            let (indent, rest) = measure_indent(raw_line);
            if rest.is_empty() || rest.starts_with('#') {
                continue;
            }

            self.handle_indent(indent, line)?;
            self.scan_line(rest, line)?;
        }

        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, "", last_line));
        }
        self.tokens.push(Token::new(TokenKind::Eof, "", last_line));
        Ok(self.tokens)
    }

    fn top(&self) -> usize {
        *self.indent_stack.last().unwrap_or(&0)
    }

    fn handle_indent(&mut self, indent: usize, line: u32) -> Result<()> {
        if indent > self.top() {
            self.indent_stack.push(indent);
            self.tokens.push(Token::new(TokenKind::Indent, "", line));
            return Ok(());
        }
        while indent < self.top() {
            self.indent_stack.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, "", line));
        }
        if indent != self.top() {
            return Err(TradingError::LexError {
                message: "inconsistent dedent".to_string(),
                line,
            });
        }
        Ok(())
    }

    fn scan_line(&mut self, rest: &str, line: u32) -> Result<()> {
        let chars: Vec<char> = rest.chars().collect();
        let mut pos = 0;
        while pos < chars.len() {
            let c = chars[pos];
            match c {
                ' ' | '\t' => {
                    pos += 1;
                }
                '#' => break,
                '(' => {
                    self.tokens.push(Token::new(TokenKind::LeftParen, "(", line));
                    pos += 1;
                }
                ')' => {
                    self.tokens.push(Token::new(TokenKind::RightParen, ")", line));
                    pos += 1;
                }
                '+' | '-' | '*' | '/' | '<' | '>' => {
                    self.tokens
                        .push(Token::new(TokenKind::Operator, &c.to_string(), line));
                    pos += 1;
                }
                '=' => {
                    if pos + 1 < chars.len() && chars[pos + 1] == '=' {
                        self.tokens.push(Token::new(TokenKind::Operator, "==", line));
                        pos += 2;
                    } else {
                        return Err(TradingError::LexError {
                            message: "single '=' is not an operator, use '=='".to_string(),
                            line,
                        });
                    }
                }
                '"' => {
                    let mut end = pos + 1;
                    while end < chars.len() && chars[end] != '"' {
                        end += 1;
                    }
                    if end == chars.len() {
                        return Err(TradingError::LexError {
                            message: "unterminated string literal".to_string(),
                            line,
                        });
                    }
                    let text: String = chars[pos..=end].iter().collect();
                    self.tokens.push(Token::new(TokenKind::Str, &text, line));
                    pos = end + 1;
                }
                '0'..='9' => {
                    let mut end = pos;
                    while end < chars.len() && (chars[end].is_ascii_digit() || chars[end] == '.') {
                        end += 1;
                    }
                    let text: String = chars[pos..end].iter().collect();
                    self.tokens.push(Token::new(TokenKind::Number, &text, line));
                    pos = end;
                }
                'A'..='Z' | 'a'..='z' | '_' => {
                    let mut end = pos;
                    while end < chars.len()
                        && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                    {
                        end += 1;
                    }
                    let text: String = chars[pos..end].iter().collect();
                    self.tokens.push(Token::new(TokenKind::Identifier, &text, line));
                    pos = end;
                }
                _ => {
                    return Err(TradingError::LexError {
                        message: format!("illegal character '{}'", c),
                        line,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Count leading whitespace columns, expanding tabs to the next multiple
/// of the tab stop, and return the remainder of the line
fn measure_indent(line: &str) -> (usize, &str) {
    let mut columns = 0;
    for (offset, c) in line.char_indices() {
        match c {
            ' ' => columns += 1,
            '\t' => columns = (columns / TAB_STOP + 1) * TAB_STOP,
            _ => return (columns, &line[offset..]),
        }
    }
    (columns, "")
}
