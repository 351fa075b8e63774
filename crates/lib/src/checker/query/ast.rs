//! Query syntax tree.

use serde_json::Value;

/// Built-in functions. The set is closed; anything else is a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
  Select,
  Map,
  SortBy,
  First,
  Last,
  Reverse,
  Length,
  ToString,
  Not,
  LtrimStr,
  RtrimStr,
  Test,
  Sub,
  Gsub,
  Split,
  Join,
}

impl Func {
  /// Look up a function by name and argument count.
  pub fn resolve(name: &str, arity: usize) -> Option<Self> {
    let func = match (name, arity) {
      ("select", 1) => Self::Select,
      ("map", 1) => Self::Map,
      ("sort_by", 1) => Self::SortBy,
      ("first", 0 | 1) => Self::First,
      ("last", 0 | 1) => Self::Last,
      ("reverse", 0) => Self::Reverse,
      ("length", 0) => Self::Length,
      ("tostring", 0) => Self::ToString,
      ("not", 0) => Self::Not,
      ("ltrimstr", 1) => Self::LtrimStr,
      ("rtrimstr", 1) => Self::RtrimStr,
      ("test", 1) => Self::Test,
      ("sub", 2) => Self::Sub,
      ("gsub", 2) => Self::Gsub,
      ("split", 1) => Self::Split,
      ("join", 1) => Self::Join,
      _ => return None,
    };
    Some(func)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
  Eq,
  Ne,
}

/// Piece of a string literal.
#[derive(Debug, Clone, PartialEq)]
pub enum StrPart {
  Lit(String),
  /// `\( expr )`
  Interp(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  /// `.`
  Identity,
  /// `target.name` / `target."name"` / `target["name"]`
  Field(Box<Expr>, String),
  /// `target[N]`, negative counts from the end
  Index(Box<Expr>, i64),
  /// `target[]`
  Iterate(Box<Expr>),
  /// `a | b`
  Pipe(Box<Expr>, Box<Expr>),
  Literal(Value),
  Str(Vec<StrPart>),
  /// `$version`
  Version,
  /// `a + b`
  Add(Box<Expr>, Box<Expr>),
  Compare(Box<Expr>, CmpOp, Box<Expr>),
  And(Box<Expr>, Box<Expr>),
  Or(Box<Expr>, Box<Expr>),
  /// `[ expr ]`, or `[]` for an empty array
  Array(Option<Box<Expr>>),
  Call(Func, Vec<Expr>),
}
