/*!

Capture-avoiding shift and substitution over de-Bruijn indices.

`shift` adjusts every free index at or above a cutoff; `subst` replaces one index by a value,
pre-shifting the value for the depth under which each occurrence lives and decrementing the
indices above the substituted one; `subst_many` applies a block of independent substitutions
right-to-left with rolling shifts so that the bindings compose correctly.

All three rebuild terms through the ordinary constructors, so the cached structural hashes stay
consistent without any extra bookkeeping.

*/

use crate::api::term::{Term, TermKind};

/// Increases every `Var` with index `≥ cutoff` by `inc`, recursing under binders with
/// `cutoff + 1`. Negative increments are used when relocating hole solutions to a shallower
/// depth; the caller guarantees no index underflows.
pub fn shift(term: &Term, inc: i64, cutoff: usize) -> Term {
  if inc == 0 {
    return term.clone();
  }

  let kind = match term.kind() {
    TermKind::Var { index } => {
      if *index < cutoff {
        TermKind::Var { index: *index }
      } else {
        let shifted = *index as i64 + inc;
        debug_assert!(shifted >= 0, "shift underflowed a de-Bruijn index");
        TermKind::Var { index: shifted as usize }
      }
    }
    TermKind::Typ => TermKind::Typ,
    TermKind::Num => TermKind::Num,
    TermKind::Val { numb } => TermKind::Val { numb: *numb },
    TermKind::All { name, bind, body, erased } => TermKind::All {
      name:   name.clone(),
      bind:   Box::new(shift(bind, inc, cutoff)),
      body:   Box::new(shift(body, inc, cutoff + 1)),
      erased: *erased,
    },
    TermKind::Lam { name, bind, body, erased } => TermKind::Lam {
      name:   name.clone(),
      bind:   bind.as_ref().map(|b| Box::new(shift(b, inc, cutoff))),
      body:   Box::new(shift(body, inc, cutoff + 1)),
      erased: *erased,
    },
    TermKind::App { func, argm, erased } => TermKind::App {
      func:   Box::new(shift(func, inc, cutoff)),
      argm:   Box::new(shift(argm, inc, cutoff)),
      erased: *erased,
    },
    TermKind::Slf { name, ty } => TermKind::Slf {
      name: name.clone(),
      ty:   Box::new(shift(ty, inc, cutoff + 1)),
    },
    TermKind::New { ty, expr } => TermKind::New {
      ty:   Box::new(shift(ty, inc, cutoff)),
      expr: Box::new(shift(expr, inc, cutoff)),
    },
    TermKind::Use { expr } => TermKind::Use {
      expr: Box::new(shift(expr, inc, cutoff)),
    },
    TermKind::Op1 { op, num0, num1 } => TermKind::Op1 {
      op:   *op,
      num0: Box::new(shift(num0, inc, cutoff)),
      num1: *num1,
    },
    TermKind::Op2 { op, num0, num1 } => TermKind::Op2 {
      op:   *op,
      num0: Box::new(shift(num0, inc, cutoff)),
      num1: Box::new(shift(num1, inc, cutoff)),
    },
    TermKind::Ite { cond, if_true, if_false } => TermKind::Ite {
      cond:     Box::new(shift(cond, inc, cutoff)),
      if_true:  Box::new(shift(if_true, inc, cutoff)),
      if_false: Box::new(shift(if_false, inc, cutoff)),
    },
    TermKind::Ann { ty, expr, done } => TermKind::Ann {
      ty:   Box::new(shift(ty, inc, cutoff)),
      expr: Box::new(shift(expr, inc, cutoff)),
      done: done.clone(),
    },
    TermKind::Log { msge, expr } => TermKind::Log {
      msge: Box::new(shift(msge, inc, cutoff)),
      expr: Box::new(shift(expr, inc, cutoff)),
    },
    TermKind::Hol { name } => TermKind::Hol { name: name.clone() },
    TermKind::Ref { name, erased } => TermKind::Ref {
      name:   name.clone(),
      erased: *erased,
    },
  };

  Term::new(kind, term.loc().cloned())
}

/// Replaces `Var depth` by `value` and decrements the indices strictly greater than `depth`.
/// The value is pre-shifted for each binder crossed, so occurrences at any depth receive a
/// correctly relocated copy.
pub fn subst(term: &Term, value: &Term, depth: usize) -> Term {
  let kind = match term.kind() {
    TermKind::Var { index } => {
      return if *index == depth {
        value.clone()
      } else if *index > depth {
        Term::new(TermKind::Var { index: *index - 1 }, term.loc().cloned())
      } else {
        term.clone()
      };
    }
    TermKind::Typ => TermKind::Typ,
    TermKind::Num => TermKind::Num,
    TermKind::Val { numb } => TermKind::Val { numb: *numb },
    TermKind::All { name, bind, body, erased } => TermKind::All {
      name:   name.clone(),
      bind:   Box::new(subst(bind, value, depth)),
      body:   Box::new(subst(body, &shift(value, 1, 0), depth + 1)),
      erased: *erased,
    },
    TermKind::Lam { name, bind, body, erased } => TermKind::Lam {
      name:   name.clone(),
      bind:   bind.as_ref().map(|b| Box::new(subst(b, value, depth))),
      body:   Box::new(subst(body, &shift(value, 1, 0), depth + 1)),
      erased: *erased,
    },
    TermKind::App { func, argm, erased } => TermKind::App {
      func:   Box::new(subst(func, value, depth)),
      argm:   Box::new(subst(argm, value, depth)),
      erased: *erased,
    },
    TermKind::Slf { name, ty } => TermKind::Slf {
      name: name.clone(),
      ty:   Box::new(subst(ty, &shift(value, 1, 0), depth + 1)),
    },
    TermKind::New { ty, expr } => TermKind::New {
      ty:   Box::new(subst(ty, value, depth)),
      expr: Box::new(subst(expr, value, depth)),
    },
    TermKind::Use { expr } => TermKind::Use {
      expr: Box::new(subst(expr, value, depth)),
    },
    TermKind::Op1 { op, num0, num1 } => TermKind::Op1 {
      op:   *op,
      num0: Box::new(subst(num0, value, depth)),
      num1: *num1,
    },
    TermKind::Op2 { op, num0, num1 } => TermKind::Op2 {
      op:   *op,
      num0: Box::new(subst(num0, value, depth)),
      num1: Box::new(subst(num1, value, depth)),
    },
    TermKind::Ite { cond, if_true, if_false } => TermKind::Ite {
      cond:     Box::new(subst(cond, value, depth)),
      if_true:  Box::new(subst(if_true, value, depth)),
      if_false: Box::new(subst(if_false, value, depth)),
    },
    TermKind::Ann { ty, expr, done } => TermKind::Ann {
      ty:   Box::new(subst(ty, value, depth)),
      expr: Box::new(subst(expr, value, depth)),
      done: done.clone(),
    },
    TermKind::Log { msge, expr } => TermKind::Log {
      msge: Box::new(subst(msge, value, depth)),
      expr: Box::new(subst(expr, value, depth)),
    },
    TermKind::Hol { name } => TermKind::Hol { name: name.clone() },
    TermKind::Ref { name, erased } => TermKind::Ref {
      name:   name.clone(),
      erased: *erased,
    },
  };

  Term::new(kind, term.loc().cloned())
}

/// Substitutes a block of values right-to-left with rolling shifts, so that independent
/// bindings compose: `values[0]` binds the outermost (highest) index of the block.
pub fn subst_many(term: &Term, values: &[Term], depth: usize) -> Term {
  let len = values.len();
  let mut term = term.clone();
  for (i, value) in values.iter().enumerate() {
    let slide = (len - i - 1) as i64;
    term = subst(&term, &shift(value, slide, 0), depth + len - i - 1);
  }
  term
}
