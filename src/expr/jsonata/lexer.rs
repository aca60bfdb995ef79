//! Tokenizer for the JSONata expression subset.

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    /// `$` → `Var("")`, `$$` → `Var("$")`, `$name` → `Var(name)`.
    Var(String),
    True,
    False,
    Null,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Ident(s) => write!(f, "{s}"),
            Token::Var(s) => write!(f, "${s}"),
            other => {
                let sym = match other {
                    Token::True => "true",
                    Token::False => "false",
                    Token::Null => "null",
                    Token::LParen => "(",
                    Token::RParen => ")",
                    Token::LBracket => "[",
                    Token::RBracket => "]",
                    Token::LBrace => "{",
                    Token::RBrace => "}",
                    Token::Comma => ",",
                    Token::Colon => ":",
                    Token::Dot => ".",
                    Token::Question => "?",
                    Token::Plus => "+",
                    Token::Minus => "-",
                    Token::Star => "*",
                    Token::Slash => "/",
                    Token::Percent => "%",
                    Token::Amp => "&",
                    Token::Eq => "=",
                    Token::Ne => "!=",
                    Token::Lt => "<",
                    Token::Le => "<=",
                    Token::Gt => ">",
                    Token::Ge => ">=",
                    Token::And => "and",
                    Token::Or => "or",
                    Token::In => "in",
                    _ => unreachable!(),
                };
                write!(f, "{sym}")
            }
        }
    }
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '(' => push(&mut tokens, &mut chars, Token::LParen),
            ')' => push(&mut tokens, &mut chars, Token::RParen),
            '[' => push(&mut tokens, &mut chars, Token::LBracket),
            ']' => push(&mut tokens, &mut chars, Token::RBracket),
            '{' => push(&mut tokens, &mut chars, Token::LBrace),
            '}' => push(&mut tokens, &mut chars, Token::RBrace),
            ',' => push(&mut tokens, &mut chars, Token::Comma),
            ':' => push(&mut tokens, &mut chars, Token::Colon),
            '.' => push(&mut tokens, &mut chars, Token::Dot),
            '?' => push(&mut tokens, &mut chars, Token::Question),
            '+' => push(&mut tokens, &mut chars, Token::Plus),
            '-' => push(&mut tokens, &mut chars, Token::Minus),
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    return Err("descendant wildcard '**' is not supported".into());
                }
                tokens.push(Token::Star);
            }
            '%' => push(&mut tokens, &mut chars, Token::Percent),
            '&' => push(&mut tokens, &mut chars, Token::Amp),
            '=' => push(&mut tokens, &mut chars, Token::Eq),
            '/' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    skip_comment(&mut chars)?;
                } else {
                    tokens.push(Token::Slash);
                }
            }
            '!' => {
                chars.next();
                if chars.next() == Some('=') {
                    tokens.push(Token::Ne);
                } else {
                    return Err("unexpected character '!'".into());
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                tokens.push(Token::Str(read_string(&mut chars, quote)?));
            }
            '$' => {
                chars.next();
                if chars.peek() == Some(&'$') {
                    chars.next();
                    tokens.push(Token::Var("$".into()));
                } else {
                    let name = read_ident(&mut chars);
                    tokens.push(Token::Var(name));
                }
            }
            '0'..='9' => {
                tokens.push(Token::Number(read_number(&mut chars)?));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let name = read_ident(&mut chars);
                tokens.push(match name.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "in" => Token::In,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(name),
                });
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

fn push(
    tokens: &mut Vec<Token>,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    token: Token,
) {
    chars.next();
    tokens.push(token);
}

fn skip_comment(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<(), String> {
    let mut prev = '\0';
    for c in chars.by_ref() {
        if prev == '*' && c == '/' {
            return Ok(());
        }
        prev = c;
    }
    Err("unterminated comment".into())
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    quote: char,
) -> Result<String, String> {
    let mut out = String::new();
    while let Some(c) = chars.next() {
        if c == quote {
            return Ok(out);
        }
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some(q) if q == quote => out.push(q),
                Some('u') => {
                    let code: String = chars.by_ref().take(4).collect();
                    let n = u32::from_str_radix(&code, 16)
                        .map_err(|_| format!("invalid unicode escape '\\u{code}'"))?;
                    out.push(char::from_u32(n).unwrap_or('\u{FFFD}'));
                }
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return Err("unterminated string".into()),
            }
        } else {
            out.push(c);
        }
    }
    Err("unterminated string".into())
}

fn read_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
            chars.next();
        } else {
            break;
        }
    }
    out
}

fn read_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<f64, String> {
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            out.push(c);
            chars.next();
        } else {
            break;
        }
    }
    // Fractional part only when the dot is followed by a digit, so that
    // `items.0` style paths never reach this branch by accident.
    let mut look = chars.clone();
    if look.next() == Some('.') && look.peek().is_some_and(char::is_ascii_digit) {
        out.push('.');
        chars.next();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                chars.next();
            } else {
                break;
            }
        }
    }
    if let Some(&c) = chars.peek() {
        if c == 'e' || c == 'E' {
            out.push(c);
            chars.next();
            if let Some(&sign) = chars.peek() {
                if sign == '+' || sign == '-' {
                    out.push(sign);
                    chars.next();
                }
            }
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    out.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
        }
    }
    out.parse::<f64>().map_err(|e| e.to_string())
}
