use sprig_core::{ProgramError, Span};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    /// A bare atom or a string literal. String literals keep their quotes and
    /// escapes undecoded; the classifier decides what each atom means.
    Atom(String),
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

fn is_delimiter(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '(' | ')' | ';' | '"')
}

pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, ProgramError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut line = 1;
    let mut col = 1;

    while i < chars.len() {
        let ch = chars[i];
        let span = Span::new(line, col);

        match ch {
            '\n' => {
                line += 1;
                col = 1;
                i += 1;
            }
            c if c.is_whitespace() => {
                col += 1;
                i += 1;
            }

            // Comments
            ';' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }

            '(' => {
                tokens.push(SpannedToken {
                    token: Token::LParen,
                    span,
                });
                col += 1;
                i += 1;
            }
            ')' => {
                tokens.push(SpannedToken {
                    token: Token::RParen,
                    span,
                });
                col += 1;
                i += 1;
            }

            '"' => {
                let start = i;
                i += 1;
                col += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(ProgramError::reader("unterminated string", span));
                        }
                        Some('"') => {
                            i += 1;
                            col += 1;
                            break;
                        }
                        Some('\\') if i + 1 < chars.len() => {
                            if chars[i + 1] == '\n' {
                                line += 1;
                                col = 1;
                            } else {
                                col += 2;
                            }
                            i += 2;
                        }
                        Some('\n') => {
                            line += 1;
                            col = 1;
                            i += 1;
                        }
                        Some(_) => {
                            col += 1;
                            i += 1;
                        }
                    }
                }
                tokens.push(SpannedToken {
                    token: Token::Atom(chars[start..i].iter().collect()),
                    span,
                });
            }

            _ => {
                let start = i;
                while i < chars.len() && !is_delimiter(chars[i]) {
                    i += 1;
                    col += 1;
                }
                tokens.push(SpannedToken {
                    token: Token::Atom(chars[start..i].iter().collect()),
                    span,
                });
            }
        }
    }

    Ok(tokens)
}

/// Decode the body of a string literal token (quotes included).
pub fn unescape(literal: &str) -> Result<String, String> {
    let body = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| format!("malformed string literal {literal}"))?;
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => return Err(format!("unknown escape \\{other}")),
            None => return Err("dangling backslash".to_string()),
        }
    }
    Ok(out)
}
