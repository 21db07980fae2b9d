//! Tokenizer for ulib source units
//!
//! Line comments start with `//`. String literals support the escapes
//! `\\`, `\"`, and `\n`. Every token carries its 1-based position for
//! diagnostics.

use evolink_artifact::{Diagnostic, DiagnosticOrigin, SourceLocation};

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate)enum Tok {
    /// Identifier.
    Ident(String),
    /// Integer literal.
    Int(i64),
    /// String literal, escapes resolved.
    Str(String),
    /// `module`
    Module,
    /// `use`
    Use,
    /// `public`
    Public,
    /// `internal`
    Internal,
    /// `private`
    Private,
    /// `class`
    Class,
    /// `fun`
    Fun,
    /// `val`
    Val,
    /// `var`
    Var,
    /// `new`
    New,
    /// `open`
    Open,
    /// `abstract`
    Abstract,
    /// `inline`
    Inline,
    /// `const`
    Const,
    /// `lateinit`
    Lateinit,
    /// `infix`
    Infix,
    /// `tailrec`
    Tailrec,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `+`
    Plus,
    /// `=`
    Assign,
}

impl Tok {
    /// Display form used in "expected X, found Y" diagnostics.
    #[must_use]
    pub(crate)fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier `{name}`"),
            Self::Int(v) => format!("integer `{v}`"),
            Self::Str(_) => "string literal".to_owned(),
            Self::Module => "`module`".to_owned(),
            Self::Use => "`use`".to_owned(),
            Self::Public => "`public`".to_owned(),
            Self::Internal => "`internal`".to_owned(),
            Self::Private => "`private`".to_owned(),
            Self::Class => "`class`".to_owned(),
            Self::Fun => "`fun`".to_owned(),
            Self::Val => "`val`".to_owned(),
            Self::Var => "`var`".to_owned(),
            Self::New => "`new`".to_owned(),
            Self::Open => "`open`".to_owned(),
            Self::Abstract => "`abstract`".to_owned(),
            Self::Inline => "`inline`".to_owned(),
            Self::Const => "`const`".to_owned(),
            Self::Lateinit => "`lateinit`".to_owned(),
            Self::Infix => "`infix`".to_owned(),
            Self::Tailrec => "`tailrec`".to_owned(),
            Self::LParen => "`(`".to_owned(),
            Self::RParen => "`)`".to_owned(),
            Self::LBrace => "`{`".to_owned(),
            Self::RBrace => "`}`".to_owned(),
            Self::Colon => "`:`".to_owned(),
            Self::Comma => "`,`".to_owned(),
            Self::Dot => "`.`".to_owned(),
            Self::Plus => "`+`".to_owned(),
            Self::Assign => "`=`".to_owned(),
        }
    }
}

fn keyword(word: &str) -> Option<Tok> {
    let tok = match word {
        "module" => Tok::Module,
        "use" => Tok::Use,
        "public" => Tok::Public,
        "internal" => Tok::Internal,
        "private" => Tok::Private,
        "class" => Tok::Class,
        "fun" => Tok::Fun,
        "val" => Tok::Val,
        "var" => Tok::Var,
        "new" => Tok::New,
        "open" => Tok::Open,
        "abstract" => Tok::Abstract,
        "inline" => Tok::Inline,
        "const" => Tok::Const,
        "lateinit" => Tok::Lateinit,
        "infix" => Tok::Infix,
        "tailrec" => Tok::Tailrec,
        _ => return None,
    };
    Some(tok)
}

/// A token with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate)struct Token {
    /// The token itself.
    pub(crate)tok: Tok,
    /// 1-based line.
    pub(crate)line: u32,
    /// 1-based column.
    pub(crate)column: u32,
}

/// Tokenize a source unit.
///
/// `unit_label` names the unit in diagnostics before the `module`
/// declaration has been parsed.
///
/// # Errors
/// Returns lexical diagnostics (unterminated string, unknown character,
/// integer overflow) with `origin` filled in by the caller's stage.
pub(crate)fn tokenize(
    unit_label: &str,
    source: &str,
    origin: DiagnosticOrigin,
) -> Result<Vec<Token>, Vec<Diagnostic>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (line_idx, line) in source.lines().enumerate() {
        let line_no = u32::try_from(line_idx + 1).unwrap_or(u32::MAX);
        let mut chars = line.char_indices().peekable();

        while let Some((byte_idx, ch)) = chars.next() {
            let column = u32::try_from(byte_idx + 1).unwrap_or(u32::MAX);
            let at = || SourceLocation::new(unit_label, line_no, column);

            match ch {
                c if c.is_whitespace() => {}
                '/' if matches!(chars.peek(), Some((_, '/'))) => break,
                '(' => tokens.push(Token { tok: Tok::LParen, line: line_no, column }),
                ')' => tokens.push(Token { tok: Tok::RParen, line: line_no, column }),
                '{' => tokens.push(Token { tok: Tok::LBrace, line: line_no, column }),
                '}' => tokens.push(Token { tok: Tok::RBrace, line: line_no, column }),
                ':' => tokens.push(Token { tok: Tok::Colon, line: line_no, column }),
                ',' => tokens.push(Token { tok: Tok::Comma, line: line_no, column }),
                '.' => tokens.push(Token { tok: Tok::Dot, line: line_no, column }),
                '+' => tokens.push(Token { tok: Tok::Plus, line: line_no, column }),
                '=' => tokens.push(Token { tok: Tok::Assign, line: line_no, column }),
                '"' => {
                    let mut value = String::new();
                    let mut terminated = false;
                    while let Some((_, c)) = chars.next() {
                        match c {
                            '"' => {
                                terminated = true;
                                break;
                            }
                            '\\' => match chars.next() {
                                Some((_, 'n')) => value.push('\n'),
                                Some((_, '"')) => value.push('"'),
                                Some((_, '\\')) => value.push('\\'),
                                other => {
                                    errors.push(
                                        Diagnostic::error(
                                            origin,
                                            format!(
                                                "unknown escape `\\{}`",
                                                other.map_or(String::new(), |(_, c)| c.to_string())
                                            ),
                                        )
                                        .at(at()),
                                    );
                                }
                            },
                            c => value.push(c),
                        }
                    }
                    if terminated {
                        tokens.push(Token {
                            tok: Tok::Str(value),
                            line: line_no,
                            column,
                        });
                    } else {
                        errors.push(
                            Diagnostic::error(origin, "unterminated string literal").at(at()),
                        );
                    }
                }
                c if c.is_ascii_digit() => {
                    let mut digits = c.to_string();
                    while let Some((_, d)) = chars.peek() {
                        if d.is_ascii_digit() {
                            digits.push(*d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    match digits.parse::<i64>() {
                        Ok(v) => tokens.push(Token {
                            tok: Tok::Int(v),
                            line: line_no,
                            column,
                        }),
                        Err(_) => errors.push(
                            Diagnostic::error(origin, format!("integer literal `{digits}` overflows"))
                                .at(at()),
                        ),
                    }
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut word = c.to_string();
                    while let Some((_, w)) = chars.peek() {
                        if w.is_alphanumeric() || *w == '_' {
                            word.push(*w);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let tok = keyword(&word).unwrap_or(Tok::Ident(word));
                    tokens.push(Token {
                        tok,
                        line: line_no,
                        column,
                    });
                }
                other => {
                    errors.push(
                        Diagnostic::error(origin, format!("unexpected character `{other}`")).at(at()),
                    );
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}
