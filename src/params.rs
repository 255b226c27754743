//! AMI parameter trees.
//!
//! The host simulator passes the AMI parameters to the model as a single
//! string of nested parenthesized nodes, such as
//! `(example_tx (tx_tap_units 27) (tx_tap_np1 2))`. This module parses that
//! string into a [`ParamTree`] and resolves integer parameters from it by
//! hierarchical path, falling back to defaults for parameters that are missing
//! or that cannot be converted.

use anyhow::Result;
use std::iter::Peekable;

/// Maximum nesting depth accepted by the parser.
const MAX_DEPTH: usize = 64;

/// Source of integer parameters addressed by hierarchical path.
///
/// A path is an ordered sequence of node names, from the outermost to the
/// innermost node. The root node is not part of the path.
pub trait ParameterSource {
    /// Looks up the integer value found at `path`.
    ///
    /// Returns `None` if the path does not exist or if its value cannot be
    /// converted to an integer.
    fn lookup_int(&self, path: &[&str]) -> Option<i64>;
}

/// Resolves an integer parameter.
///
/// Returns the value found at `path` in `source`, or `default` if there is no
/// such value. Missing or malformed parameters are not errors.
pub fn resolve_int<S: ParameterSource + ?Sized>(source: &S, path: &[&str], default: i64) -> i64 {
    source.lookup_int(path).unwrap_or(default)
}

/// Parameter tree expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Bare atom, such as a number, a symbol or a boolean.
    Atom(String),
    /// Quoted string, without the quotes.
    Str(String),
    /// Nested node.
    Node(Node),
}

/// Parameter tree node.
///
/// A node has a name and a list of values, each of which can be an atom or
/// another node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Node name.
    pub name: String,
    /// Node values.
    pub values: Vec<Expr>,
}

impl Node {
    /// Returns the first child node with the given name.
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.values.iter().find_map(|value| match value {
            Expr::Node(node) if node.name == name => Some(node),
            _ => None,
        })
    }

    /// Returns the value of the node as an integer.
    ///
    /// This is only `Some` if the node holds exactly one bare atom and that
    /// atom is a signed decimal integer.
    pub fn as_int(&self) -> Option<i64> {
        match self.values.as_slice() {
            [Expr::Atom(atom)] => atom.parse().ok(),
            _ => None,
        }
    }
}

/// Parsed AMI parameter tree.
///
/// # Examples
/// ```
/// use ibisami_tx::params::{resolve_int, ParamTree};
/// let tree: ParamTree = "(example_tx (tx_tap_units 20) (tx_tap_np1 2))".parse()?;
/// assert_eq!(tree.root_name(), "example_tx");
/// assert_eq!(resolve_int(&tree, &["tx_tap_units"], 27), 20);
/// assert_eq!(resolve_int(&tree, &["tx_tap_nm1"], 0), 0);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamTree {
    root: Node,
}

impl ParamTree {
    /// Parses an AMI parameter string.
    ///
    /// Whitespace and `|` comments are ignored. The root node may be
    /// anonymous, but any other node must have a name. Atoms are not allowed
    /// directly under the root node.
    pub fn parse(s: &str) -> Result<ParamTree> {
        let mut tokens = tokenize(s)?.into_iter().peekable();
        match tokens.next() {
            Some(Token::Open) => (),
            Some(token) => anyhow::bail!("parameter string must start with '(', found {token}"),
            None => anyhow::bail!("empty parameter string"),
        }
        let root = parse_node(&mut tokens, 0)?;
        if let Some(token) = tokens.next() {
            anyhow::bail!("unexpected {token} after the end of the root node");
        }
        Ok(ParamTree { root })
    }

    /// Returns the name of the root node.
    pub fn root_name(&self) -> &str {
        &self.root.name
    }

    /// Returns the node found by following `path` from the root.
    pub fn get(&self, path: &[&str]) -> Option<&Node> {
        path.iter()
            .try_fold(&self.root, |node, &name| node.child(name))
    }
}

impl std::str::FromStr for ParamTree {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<ParamTree> {
        ParamTree::parse(s)
    }
}

impl ParameterSource for ParamTree {
    fn lookup_int(&self, path: &[&str]) -> Option<i64> {
        self.get(path).and_then(Node::as_int)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Word(String),
    Quoted(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Token::Open => write!(f, "'('"),
            Token::Close => write!(f, "')'"),
            Token::Word(word) => write!(f, "`{word}`"),
            Token::Quoted(text) => write!(f, "\"{text}\""),
        }
    }
}

fn tokenize(s: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = s.char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        match c {
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            '|' => {
                // comment runs to end of line
                for (_, c) in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '"' => {
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, c)) => text.push(c),
                        None => anyhow::bail!("unterminated string starting at offset {offset}"),
                    }
                }
                tokens.push(Token::Quoted(text));
            }
            c if c.is_whitespace() => (),
            c => {
                let mut word = String::from(c);
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '|') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

// Parses the remainder of a node whose opening parenthesis has already been
// consumed. Depth 0 is the root node.
fn parse_node<I: Iterator<Item = Token>>(tokens: &mut Peekable<I>, depth: usize) -> Result<Node> {
    if depth >= MAX_DEPTH {
        anyhow::bail!("parameter tree nested deeper than {MAX_DEPTH} levels");
    }
    let name = match tokens.next_if(|token| matches!(token, Token::Word(_))) {
        Some(Token::Word(name)) => name,
        _ if depth == 0 => String::new(),
        _ => anyhow::bail!("parameter node without a name"),
    };
    let mut values = Vec::new();
    loop {
        match tokens.next() {
            Some(Token::Open) => values.push(Expr::Node(parse_node(tokens, depth + 1)?)),
            Some(Token::Close) => return Ok(Node { name, values }),
            Some(token) if depth == 0 => {
                anyhow::bail!("unexpected {token} directly under the root node")
            }
            Some(Token::Word(atom)) => values.push(Expr::Atom(atom)),
            Some(Token::Quoted(text)) => values.push(Expr::Str(text)),
            None => anyhow::bail!("missing ')' closing node `{name}`"),
        }
    }
}
