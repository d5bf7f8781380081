/*!

Structured errors and source locations.

A failed check raises a `TypeError` carrying the offending term, the typing context at the
failure site, and the source location when one is known. Unsolved holes are not errors; they are
reported through the session's diagnostic sink after the top-level check completes.

*/

use std::fmt::{Display, Formatter};

use ontic_abs::IString;

use crate::{api::term::Term, core::typing::context::Context};

/// A source span: `idx`/`len` are byte offsets into the source text, `row`/`col` are the
/// 1-based line and column of the span's start.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Loc {
  pub file: IString,
  pub row : u32,
  pub col : u32,
  pub idx : u32,
  pub len : u32,
}

#[derive(Clone, Debug)]
pub enum TypeErrorKind {
  /// A de-Bruijn index without a matching context frame.
  UnboundVariable { index: usize },
  /// A proof-erased variable used in a computationally relevant position.
  ErasedUse { name: IString },
  /// An application whose erasure annotation disagrees with the function type's.
  ErasureMismatch,
  /// The head of an application is not a function.
  NonFunction { ty: Term },
  /// A lambda with no domain annotation checked without an expected function type.
  UntypedLambda,
  /// A dependent function type checked against an expected type other than `Type`.
  NonTypeInForall { expected: Term },
  /// A conditional whose scrutinee is not a machine word.
  IfCondNotNumeric { ty: Term },
  /// A self-type introduction whose declared type is not a self type.
  NewOfNonSelf { ty: Term },
  /// A self-type elimination of a value whose type is not a self type.
  UseOfNonSelf { ty: Term },
  /// A reference to a name with no definition.
  UnknownReference { name: IString },
  /// The inferred type does not equal the expected type. Both sides are normalized.
  Mismatch { expected: Term, actual: Term },
}

impl Display for TypeErrorKind {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      TypeErrorKind::UnboundVariable { index } => {
        write!(f, "unbound variable #{}", index)
      }
      TypeErrorKind::ErasedUse { name } => {
        write!(f, "erased variable `{}` used in a relevant position", name)
      }
      TypeErrorKind::ErasureMismatch => {
        write!(f, "mismatched erasure on application")
      }
      TypeErrorKind::NonFunction { ty } => {
        write!(f, "non-function of type `{}` applied to an argument", ty)
      }
      TypeErrorKind::UntypedLambda => {
        write!(f, "lambda needs an annotation")
      }
      TypeErrorKind::NonTypeInForall { expected } => {
        write!(f, "function type where `{}` was expected", expected)
      }
      TypeErrorKind::IfCondNotNumeric { ty } => {
        write!(f, "conditional on a non-numeric value of type `{}`", ty)
      }
      TypeErrorKind::NewOfNonSelf { ty } => {
        write!(f, "`new` of non-self type `{}`", ty)
      }
      TypeErrorKind::UseOfNonSelf { ty } => {
        write!(f, "`use` of a value of non-self type `{}`", ty)
      }
      TypeErrorKind::UnknownReference { name } => {
        write!(f, "unknown reference `{}`", name)
      }
      TypeErrorKind::Mismatch { expected, actual } => {
        write!(f, "type mismatch: expected `{}`, found `{}`", expected, actual)
      }
    }
  }
}

#[derive(Clone, Debug)]
pub struct TypeError {
  pub kind   : TypeErrorKind,
  pub term   : Term,
  pub context: Context,
  pub loc    : Option<Loc>,
}

impl TypeError {
  pub fn new(kind: TypeErrorKind, term: &Term, context: &Context) -> TypeError {
    TypeError {
      kind,
      term:    term.clone(),
      context: context.clone(),
      loc:     term.loc().cloned(),
    }
  }

  /// Renders the error with its context and, when source text is available, the offending span
  /// underlined in its surrounding lines.
  pub fn pretty(&self, source: Option<&str>) -> String {
    let mut out = format!("Type error: {}\nIn term: {}\n", self.kind, self.term);
    if !self.context.is_empty() {
      out.push_str("Context:\n");
      out.push_str(&self.context.to_string());
    }
    if let (Some(source), Some(loc)) = (source, self.loc.as_ref()) {
      out.push_str(&highlight_source(source, loc));
    }
    out
  }
}

impl Display for TypeError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.kind)
  }
}

/// Errors raised while compiling terms for either runtime.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RuntimeError {
  /// A node kind that does not decode to a primitive operator.
  UnknownOperator { code: u16 },
  /// A definition that expands through itself; neither runtime can finitely unfold it.
  RecursiveReference { name: IString },
  /// A reference to a name with no definition.
  UnknownReference { name: IString },
  /// A term outside the fragment the target runtime can represent.
  UnsupportedTerm { found: String },
}

impl Display for RuntimeError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      RuntimeError::UnknownOperator { code } => {
        write!(f, "unknown primitive operator code {}", code)
      }
      RuntimeError::RecursiveReference { name } => {
        write!(f, "reference `{}` recurs through its own definition", name)
      }
      RuntimeError::UnknownReference { name } => {
        write!(f, "unknown reference `{}`", name)
      }
      RuntimeError::UnsupportedTerm { found } => {
        write!(f, "term `{}` is not representable in this runtime", found)
      }
    }
  }
}

impl std::error::Error for TypeError {}
impl std::error::Error for RuntimeError {}

/// Underlines the span of `loc` within its surrounding source lines, one line of context on
/// each side.
pub fn highlight_source(source: &str, loc: &Loc) -> String {
  let start = loc.idx as usize;
  let end = (loc.idx + loc.len.max(1)) as usize;

  // (start offset, text) per line.
  let mut lines = Vec::new();
  let mut offset = 0usize;
  for line in source.split('\n') {
    lines.push((offset, line));
    offset += line.len() + 1;
  }

  let overlaps = |(line_start, line): &(usize, &str)| -> bool {
    start < line_start + line.len() + 1 && end > *line_start
  };
  let first = match lines.iter().position(overlaps) {
    Some(first) => first,
    None => return String::new(),
  };
  let last = lines.iter().rposition(overlaps).unwrap_or(first);

  let mut out = String::new();
  for line_idx in first.saturating_sub(1)..(last + 2).min(lines.len()) {
    let (line_start, line) = lines[line_idx];
    out.push_str(&format!("{:>4} | {}\n", line_idx + 1, line));

    if start < line_start + line.len() && end > line_start {
      let from = start.max(line_start) - line_start;
      let to = end.min(line_start + line.len()) - line_start;
      let mut marker = String::from("     | ");
      marker.push_str(&" ".repeat(from));
      marker.push_str(&"^".repeat((to - from).max(1)));
      out.push_str(&marker);
      out.push('\n');
    }
  }

  out
}
