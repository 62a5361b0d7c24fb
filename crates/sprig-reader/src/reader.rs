use sprig_core::{ProgramError, Span, TokenTree};

use crate::lexer::{tokenize, SpannedToken, Token};

/// How many lists may be open at once. Every later stage walks forms
/// recursively, so deeper input is refused here.
pub const MAX_NESTING: usize = 256;

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<SpannedToken>) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or(Span::new(0, 0))
    }

    fn advance(&mut self) -> Option<&SpannedToken> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn parse_tree(&mut self) -> Result<TokenTree, ProgramError> {
        let span = self.span();
        match self.advance().map(|t| t.token.clone()) {
            None => Err(ProgramError::reader("unexpected end of input", span)),
            Some(Token::RParen) => Err(ProgramError::reader("unexpected ')'", span)),
            Some(Token::Atom(text)) => Ok(TokenTree::Leaf(text)),
            Some(Token::LParen) => {
                if self.depth >= MAX_NESTING {
                    return Err(ProgramError::reader(
                        format!("nesting too deep (more than {MAX_NESTING} levels)"),
                        span,
                    ));
                }
                self.depth += 1;
                let list = self.parse_list(span);
                self.depth -= 1;
                list
            }
        }
    }

    fn parse_list(&mut self, open_span: Span) -> Result<TokenTree, ProgramError> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None => return Err(ProgramError::reader("unterminated list", open_span)),
                Some(Token::RParen) => {
                    self.advance();
                    return Ok(TokenTree::List(items));
                }
                Some(_) => items.push(self.parse_tree()?),
            }
        }
    }
}

/// Read every top-level form in `input` as a token tree.
pub fn read_many(input: &str) -> Result<Vec<TokenTree>, ProgramError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser::new(tokens);
    let mut trees = Vec::new();
    while parser.peek().is_some() {
        trees.push(parser.parse_tree()?);
    }
    Ok(trees)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(s: &str) -> TokenTree {
        TokenTree::leaf(s)
    }

    #[test]
    fn test_read_nested() {
        let trees = read_many("(set x (+ 1 2))").unwrap();
        assert_eq!(
            trees,
            vec![TokenTree::List(vec![
                leaf("set"),
                leaf("x"),
                TokenTree::List(vec![leaf("+"), leaf("1"), leaf("2")]),
            ])]
        );
    }

    #[test]
    fn test_read_many_forms() {
        let trees = read_many("a (b) ()").unwrap();
        assert_eq!(
            trees,
            vec![
                leaf("a"),
                TokenTree::List(vec![leaf("b")]),
                TokenTree::List(vec![])
            ]
        );
    }

    #[test]
    fn test_read_empty_input() {
        assert!(read_many("  ; nothing\n").unwrap().is_empty());
    }

    #[test]
    fn test_unterminated_list() {
        let err = read_many("(a (b c)").unwrap_err();
        assert!(matches!(err, ProgramError::Reader { span, .. } if span == Span::new(1, 1)));
    }

    #[test]
    fn test_nesting_limit() {
        let at_limit = format!("{}{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(read_many(&at_limit).unwrap().len(), 1);

        let deep = format!("{}x{}", "(f ".repeat(20_000), ")".repeat(20_000));
        let err = read_many(&deep).unwrap_err();
        assert!(matches!(
            err,
            ProgramError::Reader { ref message, span } if message.starts_with("nesting too deep")
                && span == Span::new(1, 3 * MAX_NESTING + 1)
        ));
    }

    #[test]
    fn test_stray_close() {
        let err = read_many("a)").unwrap_err();
        assert!(err.to_string().contains("unexpected ')'"));
    }
}
