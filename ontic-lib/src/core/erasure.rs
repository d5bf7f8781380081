/*!

Erasure of computational irrelevance.

Erasure strips everything that was annotated as proof-only: an erased lambda is replaced by its
body with the bound variable substituted by the `<erased>` sentinel hole, an erased application
by its function, and `new`/`use`/ascriptions/logs by their underlying expressions. `All` and
`Slf` survive for the type-level language. References are re-flagged so that delta expansion
pulls the erased form of the definition.

Both runtimes and the equality engine operate on erased terms only. Erasure is idempotent.

*/

use once_cell::sync::Lazy;

use ontic_abs::IString;

use crate::{
  api::term::{Term, TermKind},
  core::substitution::subst,
};

static ERASED_NAME: Lazy<IString> = Lazy::new(|| IString::from("<erased>"));

/// The sentinel hole standing in for a variable whose binder was erased.
#[inline(always)]
pub fn erased_marker() -> Term {
  Term::hol(ERASED_NAME.clone())
}

/// Is this hole name the erasure sentinel? Such holes are rigid: they are never registered in
/// the hole registry and never unified.
#[inline(always)]
pub fn is_erased_marker(name: &IString) -> bool {
  *name == *ERASED_NAME
}

pub fn erase(term: &Term) -> Term {
  let kind = match term.kind() {
    TermKind::Var { index } => TermKind::Var { index: *index },
    TermKind::Typ => TermKind::Typ,
    TermKind::Num => TermKind::Num,
    TermKind::Val { numb } => TermKind::Val { numb: *numb },
    TermKind::All { name, bind, body, erased } => TermKind::All {
      name:   name.clone(),
      bind:   Box::new(erase(bind)),
      body:   Box::new(erase(body)),
      erased: *erased,
    },
    TermKind::Lam { body, erased: true, .. } => {
      return erase(&subst(body, &erased_marker(), 0));
    }
    TermKind::Lam { name, body, erased: false, .. } => TermKind::Lam {
      name:   name.clone(),
      bind:   None,
      body:   Box::new(erase(body)),
      erased: false,
    },
    TermKind::App { func, erased: true, .. } => {
      return erase(func);
    }
    TermKind::App { func, argm, erased: false } => TermKind::App {
      func:   Box::new(erase(func)),
      argm:   Box::new(erase(argm)),
      erased: false,
    },
    TermKind::Slf { name, ty } => TermKind::Slf {
      name: name.clone(),
      ty:   Box::new(erase(ty)),
    },
    TermKind::New { expr, .. } => return erase(expr),
    TermKind::Use { expr } => return erase(expr),
    TermKind::Op1 { op, num0, num1 } => TermKind::Op1 {
      op:   *op,
      num0: Box::new(erase(num0)),
      num1: *num1,
    },
    TermKind::Op2 { op, num0, num1 } => TermKind::Op2 {
      op:   *op,
      num0: Box::new(erase(num0)),
      num1: Box::new(erase(num1)),
    },
    TermKind::Ite { cond, if_true, if_false } => TermKind::Ite {
      cond:     Box::new(erase(cond)),
      if_true:  Box::new(erase(if_true)),
      if_false: Box::new(erase(if_false)),
    },
    TermKind::Ann { expr, .. } => return erase(expr),
    // Log annotations have no runtime content.
    TermKind::Log { expr, .. } => return erase(expr),
    TermKind::Hol { name } => TermKind::Hol { name: name.clone() },
    TermKind::Ref { name, .. } => TermKind::Ref {
      name:   name.clone(),
      erased: true,
    },
  };

  Term::new(kind, term.loc().cloned())
}
