/*!

The term algebra.

A term is a tree of the seventeen constructors below. Bound variables are addressed by de-Bruijn
index; binder names are carried for display only and never participate in equality or hashing.
Every term caches an alpha-stable structural hash at construction time (leaf hashes from
immediate content, compound hashes from the children's hashes plus the erased flag), which the
equality engine uses as a fast path. `Ann` and `Log` are definitionally transparent, so they
hash as their underlying expression.

Terms are immutable after construction except for the `done` flag on `Ann`, which memoizes a
successful type check and is rolled back when a check below it fails.

*/

use std::cell::Cell;

use ontic_abs::{
  hash::{fnv1a, hash_tagged},
  IString,
};

use crate::{
  api::{error::Loc, operator::BinOp},
  core::format::{impl_display_via_format, FormatStyle, Formattable, NameStack},
  HashType,
};

pub type BxTerm    = Box<Term>;
pub type MaybeTerm = Option<Term>;

// Hash tags, one per constructor.
const TAG_VAR: u8 = 0;
const TAG_TYP: u8 = 1;
const TAG_ALL: u8 = 2;
const TAG_LAM: u8 = 3;
const TAG_APP: u8 = 4;
const TAG_SLF: u8 = 5;
const TAG_NEW: u8 = 6;
const TAG_USE: u8 = 7;
const TAG_NUM: u8 = 8;
const TAG_VAL: u8 = 9;
const TAG_OP1: u8 = 10;
const TAG_OP2: u8 = 11;
const TAG_ITE: u8 = 12;
const TAG_HOL: u8 = 13;
const TAG_REF: u8 = 14;

#[derive(Clone)]
pub enum TermKind {
  /// A bound variable, addressed by how many binders to cross outward to reach its binder.
  Var {
    index: usize,
  },
  /// The type of types.
  Typ,
  /// Dependent function type.
  All {
    name  : IString,
    bind  : BxTerm,
    body  : BxTerm,
    erased: bool,
  },
  /// Lambda abstraction. The domain annotation is optional; checking fills it in from the
  /// expected type when absent.
  Lam {
    name  : IString,
    bind  : Option<BxTerm>,
    body  : BxTerm,
    erased: bool,
  },
  /// Application.
  App {
    func  : BxTerm,
    argm  : BxTerm,
    erased: bool,
  },
  /// Self type. The body may mention the eventual inhabitant through the bound self variable.
  Slf {
    name: IString,
    ty  : BxTerm,
  },
  /// Self-type introduction.
  New {
    ty  : BxTerm,
    expr: BxTerm,
  },
  /// Self-type elimination.
  Use {
    expr: BxTerm,
  },
  /// The type of machine words.
  Num,
  /// A word literal.
  Val {
    numb: u32,
  },
  /// A binary operator whose right operand has already reduced to a literal.
  Op1 {
    op  : BinOp,
    num0: BxTerm,
    num1: u32,
  },
  /// A binary operator on two terms.
  Op2 {
    op  : BinOp,
    num0: BxTerm,
    num1: BxTerm,
  },
  /// Numeric conditional; any non-zero condition selects the first branch.
  Ite {
    cond    : BxTerm,
    if_true : BxTerm,
    if_false: BxTerm,
  },
  /// Type ascription. `done` memoizes a successful check of `expr` against `ty`.
  Ann {
    ty  : BxTerm,
    expr: BxTerm,
    done: Cell<bool>,
  },
  /// Reduction-time log annotation.
  Log {
    msge: BxTerm,
    expr: BxTerm,
  },
  /// A named metavariable. Two occurrences of the same name are the same metavariable.
  Hol {
    name: IString,
  },
  /// A reference to a top-level definition.
  Ref {
    name  : IString,
    erased: bool,
  },
}

#[derive(Clone)]
pub struct Term {
  kind: TermKind,
  loc : Option<Loc>,
  hash: HashType,
}

impl Term {
  pub fn new(kind: TermKind, loc: Option<Loc>) -> Term {
    let hash = Term::compute_hash(&kind);
    Term { kind, loc, hash }
  }

  fn compute_hash(kind: &TermKind) -> HashType {
    match kind {
      TermKind::Var { index } => hash_tagged(TAG_VAR, &[*index as u64]),
      TermKind::Typ => hash_tagged(TAG_TYP, &[]),
      TermKind::All { bind, body, erased, .. } => {
        hash_tagged(TAG_ALL, &[bind.hash, body.hash, *erased as u64])
      }
      TermKind::Lam { bind, body, erased, .. } => {
        let bind_hash = bind.as_ref().map_or(0, |b| b.hash);
        hash_tagged(TAG_LAM, &[bind_hash, body.hash, *erased as u64])
      }
      TermKind::App { func, argm, erased } => {
        hash_tagged(TAG_APP, &[func.hash, argm.hash, *erased as u64])
      }
      TermKind::Slf { ty, .. } => hash_tagged(TAG_SLF, &[ty.hash]),
      TermKind::New { ty, expr } => hash_tagged(TAG_NEW, &[ty.hash, expr.hash]),
      TermKind::Use { expr } => hash_tagged(TAG_USE, &[expr.hash]),
      TermKind::Num => hash_tagged(TAG_NUM, &[]),
      TermKind::Val { numb } => hash_tagged(TAG_VAL, &[*numb as u64]),
      TermKind::Op1 { op, num0, num1 } => {
        hash_tagged(TAG_OP1, &[op.code() as u64, num0.hash, *num1 as u64])
      }
      TermKind::Op2 { op, num0, num1 } => {
        hash_tagged(TAG_OP2, &[op.code() as u64, num0.hash, num1.hash])
      }
      TermKind::Ite { cond, if_true, if_false } => {
        hash_tagged(TAG_ITE, &[cond.hash, if_true.hash, if_false.hash])
      }
      // Ascriptions and logs are definitionally transparent.
      TermKind::Ann { expr, .. } => expr.hash,
      TermKind::Log { expr, .. } => expr.hash,
      TermKind::Hol { name } => hash_tagged(TAG_HOL, &[fnv1a(name.as_bytes())]),
      TermKind::Ref { name, erased } => {
        hash_tagged(TAG_REF, &[fnv1a(name.as_bytes()), *erased as u64])
      }
    }
  }

  // region Constructors

  #[inline(always)]
  pub fn var(index: usize) -> Term {
    Term::new(TermKind::Var { index }, None)
  }

  #[inline(always)]
  pub fn typ() -> Term {
    Term::new(TermKind::Typ, None)
  }

  pub fn all(name: impl Into<IString>, bind: Term, body: Term, erased: bool) -> Term {
    Term::new(
      TermKind::All {
        name: name.into(),
        bind: Box::new(bind),
        body: Box::new(body),
        erased,
      },
      None,
    )
  }

  pub fn lam(name: impl Into<IString>, bind: Option<Term>, body: Term, erased: bool) -> Term {
    Term::new(
      TermKind::Lam {
        name: name.into(),
        bind: bind.map(Box::new),
        body: Box::new(body),
        erased,
      },
      None,
    )
  }

  pub fn app(func: Term, argm: Term, erased: bool) -> Term {
    Term::new(
      TermKind::App {
        func: Box::new(func),
        argm: Box::new(argm),
        erased,
      },
      None,
    )
  }

  pub fn slf(name: impl Into<IString>, ty: Term) -> Term {
    Term::new(
      TermKind::Slf {
        name: name.into(),
        ty:   Box::new(ty),
      },
      None,
    )
  }

  pub fn new_self(ty: Term, expr: Term) -> Term {
    Term::new(
      TermKind::New {
        ty:   Box::new(ty),
        expr: Box::new(expr),
      },
      None,
    )
  }

  pub fn use_self(expr: Term) -> Term {
    Term::new(TermKind::Use { expr: Box::new(expr) }, None)
  }

  #[inline(always)]
  pub fn num() -> Term {
    Term::new(TermKind::Num, None)
  }

  #[inline(always)]
  pub fn val(numb: u32) -> Term {
    Term::new(TermKind::Val { numb }, None)
  }

  pub fn op1(op: BinOp, num0: Term, num1: u32) -> Term {
    Term::new(
      TermKind::Op1 {
        op,
        num0: Box::new(num0),
        num1,
      },
      None,
    )
  }

  pub fn op2(op: BinOp, num0: Term, num1: Term) -> Term {
    Term::new(
      TermKind::Op2 {
        op,
        num0: Box::new(num0),
        num1: Box::new(num1),
      },
      None,
    )
  }

  pub fn ite(cond: Term, if_true: Term, if_false: Term) -> Term {
    Term::new(
      TermKind::Ite {
        cond:     Box::new(cond),
        if_true:  Box::new(if_true),
        if_false: Box::new(if_false),
      },
      None,
    )
  }

  pub fn ann(ty: Term, expr: Term, done: bool) -> Term {
    Term::new(
      TermKind::Ann {
        ty:   Box::new(ty),
        expr: Box::new(expr),
        done: Cell::new(done),
      },
      None,
    )
  }

  pub fn log(msge: Term, expr: Term) -> Term {
    Term::new(
      TermKind::Log {
        msge: Box::new(msge),
        expr: Box::new(expr),
      },
      None,
    )
  }

  pub fn hol(name: impl Into<IString>) -> Term {
    Term::new(TermKind::Hol { name: name.into() }, None)
  }

  pub fn reference(name: impl Into<IString>, erased: bool) -> Term {
    Term::new(
      TermKind::Ref {
        name: name.into(),
        erased,
      },
      None,
    )
  }

  /// Attaches a source location.
  pub fn with_loc(mut self, loc: Loc) -> Term {
    self.loc = Some(loc);
    self
  }

  // endregion Constructors

  // region Accessors

  #[inline(always)]
  pub fn kind(&self) -> &TermKind {
    &self.kind
  }

  #[inline(always)]
  pub fn hash(&self) -> HashType {
    self.hash
  }

  #[inline(always)]
  pub fn loc(&self) -> Option<&Loc> {
    self.loc.as_ref()
  }

  #[inline(always)]
  pub fn is_typ(&self) -> bool {
    matches!(self.kind, TermKind::Typ)
  }

  #[inline(always)]
  pub fn is_num(&self) -> bool {
    matches!(self.kind, TermKind::Num)
  }

  /// The literal payload, when the term is a word literal.
  #[inline(always)]
  pub fn as_val(&self) -> Option<u32> {
    if let TermKind::Val { numb } = &self.kind {
      Some(*numb)
    } else {
      None
    }
  }

  // endregion Accessors
}

// Structural equality via the cached alpha-stable hash.
impl PartialEq for Term {
  fn eq(&self, other: &Self) -> bool {
    self.hash == other.hash
  }
}

impl Eq for Term {}

impl std::hash::Hash for Term {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    state.write_u64(self.hash)
  }
}

impl Formattable for Term {
  fn write_styled(
    &self,
    out: &mut dyn std::fmt::Write,
    style: FormatStyle,
    names: &mut NameStack,
  ) -> std::fmt::Result {
    match &self.kind {
      TermKind::Var { index } => names.write_var(out, *index, style),
      TermKind::Typ => write!(out, "Type"),
      TermKind::Num => write!(out, "Word"),
      TermKind::Val { numb } => write!(out, "{}", numb),
      TermKind::All { name, bind, body, erased } => {
        write!(out, "({} : ", name)?;
        bind.write_styled(out, style, names)?;
        if *erased {
          write!(out, ";")?;
        }
        write!(out, ") -> ")?;
        names.push(name.clone());
        body.write_styled(out, style, names)?;
        names.pop();
        Ok(())
      }
      TermKind::Lam { name, bind, body, erased } => {
        write!(out, "({}", name)?;
        if let Some(bind) = bind {
          write!(out, " : ")?;
          bind.write_styled(out, style, names)?;
        }
        if *erased {
          write!(out, ";")?;
        }
        write!(out, ") => ")?;
        names.push(name.clone());
        body.write_styled(out, style, names)?;
        names.pop();
        Ok(())
      }
      TermKind::App { func, argm, erased } => {
        func.write_styled(out, style, names)?;
        write!(out, "(")?;
        argm.write_styled(out, style, names)?;
        if *erased {
          write!(out, ";")?;
        }
        write!(out, ")")
      }
      TermKind::Slf { name, ty } => {
        write!(out, "${{{}}} ", name)?;
        names.push(name.clone());
        ty.write_styled(out, style, names)?;
        names.pop();
        Ok(())
      }
      TermKind::New { ty, expr } => {
        write!(out, "new(")?;
        ty.write_styled(out, style, names)?;
        write!(out, ") ")?;
        expr.write_styled(out, style, names)
      }
      TermKind::Use { expr } => {
        write!(out, "use(")?;
        expr.write_styled(out, style, names)?;
        write!(out, ")")
      }
      TermKind::Op1 { op, num0, num1 } => {
        write!(out, "(")?;
        num0.write_styled(out, style, names)?;
        write!(out, " {} {})", op, num1)
      }
      TermKind::Op2 { op, num0, num1 } => {
        write!(out, "(")?;
        num0.write_styled(out, style, names)?;
        write!(out, " {} ", op)?;
        num1.write_styled(out, style, names)?;
        write!(out, ")")
      }
      TermKind::Ite { cond, if_true, if_false } => {
        write!(out, "if ")?;
        cond.write_styled(out, style, names)?;
        write!(out, " then ")?;
        if_true.write_styled(out, style, names)?;
        write!(out, " else ")?;
        if_false.write_styled(out, style, names)
      }
      TermKind::Ann { ty, expr, .. } => {
        if style == FormatStyle::Bare {
          return expr.write_styled(out, style, names);
        }
        write!(out, "(")?;
        expr.write_styled(out, style, names)?;
        write!(out, " :: ")?;
        ty.write_styled(out, style, names)?;
        write!(out, ")")
      }
      TermKind::Log { msge, expr } => {
        if style == FormatStyle::Bare {
          return expr.write_styled(out, style, names);
        }
        write!(out, "log(")?;
        msge.write_styled(out, style, names)?;
        write!(out, ") ")?;
        expr.write_styled(out, style, names)
      }
      TermKind::Hol { name } => write!(out, "?{}", name),
      TermKind::Ref { name, erased } => {
        if *erased && style == FormatStyle::Debug {
          write!(out, "{};", name)
        } else {
          write!(out, "{}", name)
        }
      }
    }
  }
}

impl_display_via_format!(Term);
