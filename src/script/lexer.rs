//! Tokenizer for the script dialect

use super::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Str(String),
    Num(f64),

    // Keywords (`let`, `const` and `var` all declare)
    Let,
    If,
    Else,
    While,
    Return,
    Throw,
    True,
    False,
    Null,
    Undefined,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Dot,
    Question,
    Colon,

    Assign,
    PlusAssign,
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub line: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Comments
        if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && next == Some('*') {
            i += 2;
            loop {
                match (chars.get(i), chars.get(i + 1)) {
                    (Some('*'), Some('/')) => {
                        i += 2;
                        break;
                    }
                    (Some('\n'), _) => {
                        line += 1;
                        i += 1;
                    }
                    (Some(_), _) => i += 1,
                    (None, _) => return Err(ScriptError::parse(line, "unterminated comment")),
                }
            }
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, consumed) = read_string(&chars[i..], c, line)?;
            tokens.push(Spanned {
                token: Token::Str(text),
                line,
            });
            i += consumed;
            continue;
        }
        if c == '`' {
            return Err(ScriptError::parse(line, "template literals are not supported"));
        }

        if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            let value = literal
                .parse::<f64>()
                .map_err(|_| ScriptError::parse(line, format!("invalid number '{literal}'")))?;
            tokens.push(Spanned {
                token: Token::Num(value),
                line,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let token = match word.as_str() {
                "let" | "const" | "var" => Token::Let,
                "if" => Token::If,
                "else" => Token::Else,
                "while" => Token::While,
                "return" => Token::Return,
                "throw" => Token::Throw,
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                "undefined" => Token::Undefined,
                _ => Token::Ident(word),
            };
            tokens.push(Spanned { token, line });
            continue;
        }

        let third = chars.get(i + 2).copied();
        let (token, width) = match (c, next, third) {
            ('=', Some('='), Some('=')) => (Token::StrictEq, 3),
            ('!', Some('='), Some('=')) => (Token::StrictNe, 3),
            ('=', Some('='), _) => (Token::Eq, 2),
            ('!', Some('='), _) => (Token::Ne, 2),
            ('<', Some('='), _) => (Token::Le, 2),
            ('>', Some('='), _) => (Token::Ge, 2),
            ('&', Some('&'), _) => (Token::And, 2),
            ('|', Some('|'), _) => (Token::Or, 2),
            ('+', Some('='), _) => (Token::PlusAssign, 2),
            ('=', _, _) => (Token::Assign, 1),
            ('<', _, _) => (Token::Lt, 1),
            ('>', _, _) => (Token::Gt, 1),
            ('+', _, _) => (Token::Plus, 1),
            ('-', _, _) => (Token::Minus, 1),
            ('*', _, _) => (Token::Star, 1),
            ('/', _, _) => (Token::Slash, 1),
            ('%', _, _) => (Token::Percent, 1),
            ('!', _, _) => (Token::Not, 1),
            ('(', _, _) => (Token::LParen, 1),
            (')', _, _) => (Token::RParen, 1),
            ('{', _, _) => (Token::LBrace, 1),
            ('}', _, _) => (Token::RBrace, 1),
            ('[', _, _) => (Token::LBracket, 1),
            (']', _, _) => (Token::RBracket, 1),
            (',', _, _) => (Token::Comma, 1),
            (';', _, _) => (Token::Semi, 1),
            ('.', _, _) => (Token::Dot, 1),
            ('?', _, _) => (Token::Question, 1),
            (':', _, _) => (Token::Colon, 1),
            _ => return Err(ScriptError::parse(line, format!("unexpected character '{c}'"))),
        };
        tokens.push(Spanned { token, line });
        i += width;
    }

    Ok(tokens)
}

/// Returns the unescaped text and the number of chars consumed (quotes included)
fn read_string(chars: &[char], quote: char, line: usize) -> Result<(String, usize), ScriptError> {
    let mut out = String::new();
    let mut i = 1;
    while let Some(&c) = chars.get(i) {
        match c {
            c if c == quote => return Ok((out, i + 1)),
            '\n' => break,
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| ScriptError::parse(line, "unterminated string"))?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => *other,
                });
                i += 2;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(ScriptError::parse(line, "unterminated string"))
}
