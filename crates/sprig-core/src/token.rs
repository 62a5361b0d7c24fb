use std::fmt;

/// Reader output: leaves are raw token strings (string literals keep their
/// quotes), lists are ordered children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenTree {
    Leaf(String),
    List(Vec<TokenTree>),
}

impl TokenTree {
    pub fn leaf(s: impl Into<String>) -> Self {
        TokenTree::Leaf(s.into())
    }

    pub fn as_leaf(&self) -> Option<&str> {
        match self {
            TokenTree::Leaf(s) => Some(s),
            TokenTree::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[TokenTree]> {
        match self {
            TokenTree::List(items) => Some(items),
            TokenTree::Leaf(_) => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, TokenTree::List(_))
    }
}

impl fmt::Display for TokenTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenTree::Leaf(s) => f.write_str(s),
            TokenTree::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}
