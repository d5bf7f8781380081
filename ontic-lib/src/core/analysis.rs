/*!

Advisory analyses: variable-use counting, affinity, and a conservative recursion check.

These are not invoked by the type checker; a front-end can run them to warn about or reject
definitions the graph runtime cannot execute faithfully (non-affine terms) or that delta
expansion cannot finitely unfold (recursive references).

*/

use ontic_abs::{HashSet, IString};

use crate::{
  api::term::{Term, TermKind},
  core::session::Defs,
};

/// Counts the free occurrences of `Var depth` in `term`. Erased arguments and type-level
/// positions contribute zero.
pub fn uses(term: &Term, depth: usize) -> usize {
  match term.kind() {
    TermKind::Var { index } => (*index == depth) as usize,
    TermKind::Typ
    | TermKind::Num
    | TermKind::Val { .. }
    | TermKind::Hol { .. }
    | TermKind::Ref { .. }
    | TermKind::All { .. }
    | TermKind::Slf { .. } => 0,
    TermKind::Lam { body, .. } => uses(body, depth + 1),
    TermKind::App { func, argm, erased } => {
      uses(func, depth) + if *erased { 0 } else { uses(argm, depth) }
    }
    TermKind::New { expr, .. } => uses(expr, depth),
    TermKind::Use { expr } => uses(expr, depth),
    TermKind::Op1 { num0, .. } => uses(num0, depth),
    TermKind::Op2 { num0, num1, .. } => uses(num0, depth) + uses(num1, depth),
    TermKind::Ite { cond, if_true, if_false } => {
      uses(cond, depth) + uses(if_true, depth) + uses(if_false, depth)
    }
    TermKind::Ann { expr, .. } => uses(expr, depth),
    TermKind::Log { expr, .. } => uses(expr, depth),
  }
}

/// Does every non-erased lambda use its bound variable at most once? References are followed
/// once each, so mutual and self recursion terminate.
pub fn is_affine(term: &Term, defs: &Defs) -> bool {
  let mut seen = HashSet::default();
  affine_walk(term, defs, &mut seen)
}

fn affine_walk(term: &Term, defs: &Defs, seen: &mut HashSet<IString>) -> bool {
  match term.kind() {
    TermKind::Var { .. }
    | TermKind::Typ
    | TermKind::Num
    | TermKind::Val { .. }
    | TermKind::Hol { .. }
    | TermKind::All { .. }
    | TermKind::Slf { .. } => true,
    TermKind::Lam { body, erased, .. } => {
      (*erased || uses(body, 0) <= 1) && affine_walk(body, defs, seen)
    }
    TermKind::App { func, argm, erased } => {
      affine_walk(func, defs, seen) && (*erased || affine_walk(argm, defs, seen))
    }
    TermKind::New { expr, .. } => affine_walk(expr, defs, seen),
    TermKind::Use { expr } => affine_walk(expr, defs, seen),
    TermKind::Op1 { num0, .. } => affine_walk(num0, defs, seen),
    TermKind::Op2 { num0, num1, .. } => {
      affine_walk(num0, defs, seen) && affine_walk(num1, defs, seen)
    }
    TermKind::Ite { cond, if_true, if_false } => {
      affine_walk(cond, defs, seen)
          && affine_walk(if_true, defs, seen)
          && affine_walk(if_false, defs, seen)
    }
    TermKind::Ann { expr, .. } => affine_walk(expr, defs, seen),
    TermKind::Log { expr, .. } => affine_walk(expr, defs, seen),
    TermKind::Ref { name, .. } => {
      if seen.insert(name.clone()) {
        defs.get(name).map_or(true, |def| affine_walk(def, defs, seen))
      } else {
        true
      }
    }
  }
}

/// A conservative termination check: false as soon as any reference recurs within its own
/// transitive expansion. Pure lambda terms are considered terminating.
pub fn is_terminating(term: &Term, defs: &Defs) -> bool {
  let mut stack = Vec::new();
  terminating_walk(term, defs, &mut stack)
}

fn terminating_walk(term: &Term, defs: &Defs, stack: &mut Vec<IString>) -> bool {
  match term.kind() {
    TermKind::Var { .. }
    | TermKind::Typ
    | TermKind::Num
    | TermKind::Val { .. }
    | TermKind::Hol { .. } => true,
    TermKind::All { bind, body, .. } => {
      terminating_walk(bind, defs, stack) && terminating_walk(body, defs, stack)
    }
    TermKind::Lam { bind, body, .. } => {
      bind.as_ref().map_or(true, |b| terminating_walk(b, defs, stack))
          && terminating_walk(body, defs, stack)
    }
    TermKind::App { func, argm, .. } => {
      terminating_walk(func, defs, stack) && terminating_walk(argm, defs, stack)
    }
    TermKind::Slf { ty, .. } => terminating_walk(ty, defs, stack),
    TermKind::New { ty, expr } => {
      terminating_walk(ty, defs, stack) && terminating_walk(expr, defs, stack)
    }
    TermKind::Use { expr } => terminating_walk(expr, defs, stack),
    TermKind::Op1 { num0, .. } => terminating_walk(num0, defs, stack),
    TermKind::Op2 { num0, num1, .. } => {
      terminating_walk(num0, defs, stack) && terminating_walk(num1, defs, stack)
    }
    TermKind::Ite { cond, if_true, if_false } => {
      terminating_walk(cond, defs, stack)
          && terminating_walk(if_true, defs, stack)
          && terminating_walk(if_false, defs, stack)
    }
    TermKind::Ann { ty, expr, .. } => {
      terminating_walk(ty, defs, stack) && terminating_walk(expr, defs, stack)
    }
    TermKind::Log { expr, .. } => terminating_walk(expr, defs, stack),
    TermKind::Ref { name, .. } => {
      if stack.contains(name) {
        return false;
      }
      match defs.get(name) {
        None => true,
        Some(def) => {
          stack.push(name.clone());
          let result = terminating_walk(def, defs, stack);
          stack.pop();
          result
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::operator::BinOp;

  #[test]
  fn counts_occurrences_under_binders() {
    // (x) => x .+. x uses its binder twice.
    let body = Term::op2(BinOp::Add, Term::var(0), Term::var(0));
    assert_eq!(uses(&body, 0), 2);
    let lam = Term::lam("x", None, body, false);
    assert_eq!(uses(&lam, 0), 0);
  }

  #[test]
  fn erased_arguments_count_for_nothing() {
    let term = Term::app(Term::var(0), Term::var(0), true);
    assert_eq!(uses(&term, 0), 1);
  }

  #[test]
  fn duplication_is_not_affine() {
    let defs = Defs::default();
    let dup = Term::lam(
      "x",
      Some(Term::num()),
      Term::op2(BinOp::Add, Term::var(0), Term::var(0)),
      false,
    );
    assert!(!is_affine(&dup, &defs));

    let id = Term::lam("x", None, Term::var(0), false);
    assert!(is_affine(&id, &defs));
  }

  #[test]
  fn references_are_followed_once() {
    let mut defs = Defs::default();
    defs.insert(
      IString::from("dup"),
      Term::lam("x", None, Term::app(Term::var(0), Term::var(0), false), false),
    );
    defs.insert(
      IString::from("loop"),
      Term::reference("loop", false),
    );
    assert!(!is_affine(&Term::reference("dup", false), &defs));
    // Self-recursive references terminate the walk rather than looping.
    assert!(is_affine(&Term::reference("loop", false), &defs));
  }

  #[test]
  fn recursion_through_a_reference_is_not_terminating() {
    let mut defs = Defs::default();
    defs.insert(
      IString::from("loop"),
      Term::app(Term::reference("loop", false), Term::val(0), false),
    );
    assert!(!is_terminating(&Term::reference("loop", false), &defs));

    let pure = Term::lam("x", None, Term::app(Term::var(0), Term::var(0), false), false);
    assert!(is_terminating(&pure, &defs));
  }
}
