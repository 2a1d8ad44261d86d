//! Tokenizer for infix expression text.

use crate::error::ParseError;
use crate::expr::BinaryOp;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Ident(String),
    Op(BinaryOp),
    LParen,
    RParen,
}

/// Splits expression text into tokens.
///
/// `-` and `+` are always emitted as binary operators; the parser decides
/// whether they act as prefix signs.
pub(crate) fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let starts_number =
            c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()));
        if starts_number {
            let end = scan_number(&chars, i);
            let literal: String = chars[i..end].iter().collect();
            let value = literal.parse::<f64>().map_err(|_| ParseError::InvalidNumber {
                text: text.to_string(),
                literal: literal.clone(),
            })?;
            tokens.push(Token::Number(value));
            i = end;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        if c == '.' {
            // Fortran-style operator such as `.gt.`
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && chars[end].is_ascii_alphabetic() {
                end += 1;
            }
            if end == start || chars.get(end) != Some(&'.') {
                return Err(ParseError::UnexpectedChar {
                    text: text.to_string(),
                    ch: c,
                    pos: i,
                });
            }
            let name: String = chars[start..end].iter().collect();
            let op = BinaryOp::from_dotted(&name.to_ascii_lowercase()).ok_or_else(|| {
                ParseError::UnknownOperator {
                    text: text.to_string(),
                    op: format!(".{name}."),
                }
            })?;
            tokens.push(Token::Op(op));
            i = end + 1;
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('+', _) => (Token::Op(BinaryOp::Add), 1),
            ('-', _) => (Token::Op(BinaryOp::Sub), 1),
            ('*', _) => (Token::Op(BinaryOp::Mul), 1),
            ('/', _) => (Token::Op(BinaryOp::Div), 1),
            ('^', _) => (Token::Op(BinaryOp::Pow), 1),
            ('<', Some('=')) => (Token::Op(BinaryOp::Le), 2),
            ('<', _) => (Token::Op(BinaryOp::Lt), 1),
            ('>', Some('=')) => (Token::Op(BinaryOp::Ge), 2),
            ('>', _) => (Token::Op(BinaryOp::Gt), 1),
            ('=', Some('=')) => (Token::Op(BinaryOp::Eq), 2),
            ('!', Some('=')) => (Token::Op(BinaryOp::Ne), 2),
            ('&', Some('&')) => (Token::Op(BinaryOp::And), 2),
            ('|', Some('|')) => (Token::Op(BinaryOp::Or), 2),
            _ => {
                return Err(ParseError::UnexpectedChar {
                    text: text.to_string(),
                    ch: c,
                    pos: i,
                })
            }
        };
        tokens.push(token);
        i += width;
    }

    Ok(tokens)
}

/// Returns the end index of the numeric literal starting at `start`.
///
/// An exponent is only consumed when `e`/`E` is followed by a digit or by a
/// sign and a digit, so `2e` followed by an identifier stays two tokens.
pub(crate) fn scan_number(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    i
}
