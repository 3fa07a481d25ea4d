use crate::ast::CompareOp;
use crate::parser::ParseError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare or quoted identifier. Keywords are identifiers matched by the parser.
    Ident { name: String, quoted: bool },
    String(String),
    Number(String),
    Placeholder,
    Comma,
    Dot,
    Semicolon,
    LParen,
    RParen,
    Star,
    Minus,
    Op(CompareOp),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident { name, quoted: true } => write!(f, "\"{name}\""),
            Self::Ident { name, .. } => write!(f, "{name}"),
            Self::String(s) => write!(f, "'{s}'"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Placeholder => write!(f, "?"),
            Self::Comma => write!(f, ","),
            Self::Dot => write!(f, "."),
            Self::Semicolon => write!(f, ";"),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::Star => write!(f, "*"),
            Self::Minus => write!(f, "-"),
            Self::Op(op) => write!(f, "{}", op.as_str()),
        }
    }
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        let token = match ch {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '-' if input[offset..].starts_with("--") => {
                while chars.next_if(|&(_, c)| c != '\n').is_some() {}
                continue;
            }
            '\'' => {
                chars.next();
                Token::String(read_quoted(&mut chars, '\'', offset)?)
            }
            '"' | '`' => {
                chars.next();
                Token::Ident {
                    name: read_quoted(&mut chars, ch, offset)?,
                    quoted: true,
                }
            }
            c if c.is_ascii_digit() => {
                let mut number = String::new();
                while let Some((_, c)) = chars.next_if(|&(_, c)| c.is_ascii_digit() || c == '.') {
                    number.push(c);
                }
                Token::Number(number)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some((_, c)) = chars.next_if(|&(_, c)| c.is_alphanumeric() || c == '_') {
                    name.push(c);
                }
                Token::Ident {
                    name,
                    quoted: false,
                }
            }
            _ => {
                chars.next();
                match ch {
                    '?' => Token::Placeholder,
                    ',' => Token::Comma,
                    '.' => Token::Dot,
                    ';' => Token::Semicolon,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '*' => Token::Star,
                    '-' => Token::Minus,
                    '=' => {
                        chars.next_if(|&(_, c)| c == '=');
                        Token::Op(CompareOp::Eq)
                    }
                    '!' if chars.next_if(|&(_, c)| c == '=').is_some() => Token::Op(CompareOp::Ne),
                    '<' => {
                        if chars.next_if(|&(_, c)| c == '=').is_some() {
                            Token::Op(CompareOp::Le)
                        } else if chars.next_if(|&(_, c)| c == '>').is_some() {
                            Token::Op(CompareOp::Ne)
                        } else {
                            Token::Op(CompareOp::Lt)
                        }
                    }
                    '>' => {
                        if chars.next_if(|&(_, c)| c == '=').is_some() {
                            Token::Op(CompareOp::Ge)
                        } else {
                            Token::Op(CompareOp::Gt)
                        }
                    }
                    other => return Err(ParseError::UnexpectedCharacter { ch: other, offset }),
                }
            }
        };

        tokens.push(Spanned { token, offset });
    }

    Ok(tokens)
}

/// Reads up to the closing `quote`; a doubled quote is an escaped quote.
fn read_quoted(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
    start: usize,
) -> Result<String, ParseError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some((_, c)) if c == quote => {
                if chars.next_if(|&(_, c)| c == quote).is_some() {
                    out.push(quote);
                } else {
                    return Ok(out);
                }
            }
            Some((_, c)) => out.push(c),
            None => return Err(ParseError::UnterminatedString(start)),
        }
    }
}
