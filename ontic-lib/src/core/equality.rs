/*!

Definitional equality and hole unification.

Equality of two (erased) terms is organized as a search tree: `Val` leaves, `Eqs` obligations at
a binder depth, and short-circuiting `Bop` connectives. Evaluating an obligation reduces both
sides twice — once without delta and once with it — and then tries, in order: the structural
hash shortcut on the three pairs, identical reference heads, hole assignment, an
application-decomposition hint branch OR'd with the structural branch, and finally structural
comparison of the delta-reduced heads, descending under binders with `depth + 1`.

Hole assignment is first-order: an unsolved hole takes the other side, shifted from the current
depth to the hole's recorded depth. An already-solved hole requires its solution to equal the
new candidate; a contradiction downgrades the hole to its conflicted state, which removes no
other assignment.

*/

use ontic_abs::IString;

use crate::{
  api::term::{Term, TermKind},
  core::{
    erasure::{erase, is_erased_marker},
    session::Session,
    substitution::shift,
    typing::context::Context,
  },
};

enum EqTree {
  Val(bool),
  Eqs {
    a:     Term,
    b:     Term,
    depth: usize,
  },
  Bop {
    /// The value that short-circuits this connective: `true` makes it an OR, `false` an AND.
    short_circuit: bool,
    lhs: Box<EqTree>,
    rhs: Box<EqTree>,
  },
}

impl EqTree {
  fn and(lhs: EqTree, rhs: EqTree) -> EqTree {
    EqTree::Bop {
      short_circuit: false,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  fn or(lhs: EqTree, rhs: EqTree) -> EqTree {
    EqTree::Bop {
      short_circuit: true,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  fn eqs(a: &Term, b: &Term, depth: usize) -> EqTree {
    EqTree::Eqs {
      a: a.clone(),
      b: b.clone(),
      depth,
    }
  }
}

/// Are `a` and `b` definitionally equal at the given binder depth? Both sides are erased before
/// comparison so that proof-irrelevant parts cannot affect the outcome.
pub fn equal(session: &mut Session, a: &Term, b: &Term, depth: usize) -> bool {
  let tree = EqTree::eqs(&erase(a), &erase(b), depth);
  evaluate(session, tree)
}

/// Steps the tree until it collapses to a leaf.
fn evaluate(session: &mut Session, tree: EqTree) -> bool {
  match tree {
    EqTree::Val(value) => value,
    EqTree::Eqs { a, b, depth } => {
      let expanded = expand(session, &a, &b, depth);
      evaluate(session, expanded)
    }
    EqTree::Bop { short_circuit, lhs, rhs } => {
      if evaluate(session, *lhs) == short_circuit {
        short_circuit
      } else {
        evaluate(session, *rhs)
      }
    }
  }
}

fn expand(session: &mut Session, a: &Term, b: &Term, depth: usize) -> EqTree {
  let ax = session.reduce_with(a, session.rules_without_delta(), depth);
  let bx = session.reduce_with(b, session.rules_without_delta(), depth);
  let ay = session.reduce_with(a, session.rules_with_delta(), depth);
  let by = session.reduce_with(b, session.rules_with_delta(), depth);

  // 1. Hash shortcut on the input pair and both reduced pairs.
  if session.hash_shortcuts
      && (a.hash() == b.hash() || ax.hash() == bx.hash() || ay.hash() == by.hash())
  {
    return EqTree::Val(true);
  }

  // 2. Identical reference heads are equal without unfolding.
  if let (TermKind::Ref { name: a_name, .. }, TermKind::Ref { name: b_name, .. }) =
      (ax.kind(), bx.kind())
  {
    if a_name == b_name {
      return EqTree::Val(true);
    }
  }

  // 3. Hole assignment, on whichever side exposes an unsolved metavariable. The erasure
  // sentinel stands for many dropped binders and is never unified.
  if let TermKind::Hol { name } = ax.kind() {
    if !is_erased_marker(name) {
      return EqTree::Val(unify(session, name, &bx, depth));
    }
  }
  if let TermKind::Hol { name } = bx.kind() {
    if !is_erased_marker(name) {
      return EqTree::Val(unify(session, name, &ax, depth));
    }
  }

  // 4. When both undeltaed heads are applications, decomposing them is a cheap hint that can
  // prove equality without unfolding definitions; fall back to the structural branch on the
  // deltaed heads otherwise.
  if let (
    TermKind::App { func: a_func, argm: a_argm, .. },
    TermKind::App { func: b_func, argm: b_argm, .. },
  ) = (ax.kind(), bx.kind())
  {
    let hint = EqTree::and(
      EqTree::eqs(a_func, b_func, depth),
      EqTree::eqs(a_argm, b_argm, depth),
    );
    return EqTree::or(hint, structural(&ay, &by, depth));
  }

  // 5. Structural comparison of the delta-reduced heads.
  structural(&ay, &by, depth)
}

fn structural(a: &Term, b: &Term, depth: usize) -> EqTree {
  match (a.kind(), b.kind()) {
    (TermKind::Typ, TermKind::Typ) | (TermKind::Num, TermKind::Num) => EqTree::Val(true),
    (TermKind::Var { index: a_index }, TermKind::Var { index: b_index }) => {
      EqTree::Val(a_index == b_index)
    }
    (TermKind::Val { numb: a_numb }, TermKind::Val { numb: b_numb }) => {
      EqTree::Val(a_numb == b_numb)
    }
    (
      TermKind::All { bind: a_bind, body: a_body, erased: a_erased, .. },
      TermKind::All { bind: b_bind, body: b_body, erased: b_erased, .. },
    ) => {
      if a_erased != b_erased {
        return EqTree::Val(false);
      }
      EqTree::and(
        EqTree::eqs(a_bind, b_bind, depth),
        EqTree::eqs(a_body, b_body, depth + 1),
      )
    }
    (
      TermKind::Lam { body: a_body, erased: a_erased, .. },
      TermKind::Lam { body: b_body, erased: b_erased, .. },
    ) => {
      if a_erased != b_erased {
        return EqTree::Val(false);
      }
      EqTree::eqs(a_body, b_body, depth + 1)
    }
    (
      TermKind::App { func: a_func, argm: a_argm, erased: a_erased },
      TermKind::App { func: b_func, argm: b_argm, erased: b_erased },
    ) => {
      if a_erased != b_erased {
        return EqTree::Val(false);
      }
      EqTree::and(
        EqTree::eqs(a_func, b_func, depth),
        EqTree::eqs(a_argm, b_argm, depth),
      )
    }
    (TermKind::Slf { ty: a_ty, .. }, TermKind::Slf { ty: b_ty, .. }) => {
      EqTree::eqs(a_ty, b_ty, depth + 1)
    }
    (
      TermKind::Op1 { op: a_op, num0: a_num0, num1: a_num1 },
      TermKind::Op1 { op: b_op, num0: b_num0, num1: b_num1 },
    ) => {
      // Both sides must agree on the literal operand, not just on the operator.
      if a_op != b_op || a_num1 != b_num1 {
        return EqTree::Val(false);
      }
      EqTree::eqs(a_num0, b_num0, depth)
    }
    (
      TermKind::Op2 { op: a_op, num0: a_num0, num1: a_num1 },
      TermKind::Op2 { op: b_op, num0: b_num0, num1: b_num1 },
    ) => {
      if a_op != b_op {
        return EqTree::Val(false);
      }
      EqTree::and(
        EqTree::eqs(a_num0, b_num0, depth),
        EqTree::eqs(a_num1, b_num1, depth),
      )
    }
    (
      TermKind::Ite { cond: a_cond, if_true: a_true, if_false: a_false },
      TermKind::Ite { cond: b_cond, if_true: b_true, if_false: b_false },
    ) => EqTree::and(
      EqTree::eqs(a_cond, b_cond, depth),
      EqTree::and(
        EqTree::eqs(a_true, b_true, depth),
        EqTree::eqs(a_false, b_false, depth),
      ),
    ),
    (TermKind::Hol { name: a_name }, TermKind::Hol { name: b_name }) => {
      EqTree::Val(a_name == b_name)
    }
    (TermKind::Ref { name: a_name, .. }, TermKind::Ref { name: b_name, .. }) => {
      EqTree::Val(a_name == b_name)
    }
    _ => EqTree::Val(false),
  }
}

/// Resolves an obligation whose head is the hole `name` against `other`.
fn unify(session: &mut Session, name: &IString, other: &Term, depth: usize) -> bool {
  if let TermKind::Hol { name: other_name } = other.kind() {
    if other_name == name {
      return true;
    }
  }

  if !session.holes.contains(name) {
    // A hole first seen by the equality engine is anchored at the current depth.
    session.holes.register(name, None, Context::new(), depth);
  }
  let hole_depth = session.holes.depth_of(name).unwrap_or(depth);

  match session.holes.solution(name) {
    None => {
      if matches!(
        session.holes.entry(name).map(|entry| &entry.value),
        Some(crate::core::typing::holes::HoleValue::Conflicted)
      ) {
        return false;
      }
      let solution = shift(other, hole_depth as i64 - depth as i64, 0);
      session.holes.assign(name, solution);
      true
    }
    Some((existing, _)) => {
      let prior = shift(&existing, depth as i64 - hole_depth as i64, 0);
      if evaluate(session, EqTree::eqs(&prior, other, depth)) {
        true
      } else {
        session.holes.conflict(name);
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    api::operator::BinOp,
    core::{session::Session, typing::holes::HoleValue},
  };
  use ontic_abs::IString;

  #[test]
  fn alpha_equivalent_lambdas_are_equal() {
    let mut session = Session::new();
    let a = Term::lam("x", None, Term::var(0), false);
    let b = Term::lam("y", None, Term::var(0), false);
    assert!(session.equal(&a, &b, 0));
  }

  #[test]
  fn delta_expansion_equates_a_reference_with_its_body() {
    let mut session = Session::new();
    session.define("id", Term::lam("x", None, Term::var(0), false));
    let reference = Term::reference("id", false);
    let body = Term::lam("z", None, Term::var(0), false);
    assert!(session.equal(&reference, &body, 0));
  }

  #[test]
  fn beta_equivalence_holds() {
    let mut session = Session::new();
    let redex = Term::app(Term::lam("x", None, Term::var(0), false), Term::val(4), false);
    assert!(session.equal(&redex, &Term::val(4), 0));
    assert!(!session.equal(&redex, &Term::val(5), 0));
  }

  #[test]
  fn op1_literals_must_agree() {
    let mut session = Session::new();
    let five = Term::op1(BinOp::Add, Term::var(0), 5);
    let six = Term::op1(BinOp::Add, Term::var(0), 6);
    assert!(session.equal(&five, &five.clone(), 1));
    assert!(!session.equal(&five, &six, 1));
  }

  #[test]
  fn unsolved_holes_take_the_other_side() {
    let mut session = Session::new();
    let hole = Term::hol("a");
    assert!(session.equal(&hole, &Term::num(), 0));
    let name = IString::from("a");
    assert_eq!(session.holes.solution(&name), Some((Term::num(), 0)));

    // The assignment is monotone: a consistent later obligation agrees...
    assert!(session.equal(&hole, &Term::num(), 0));
    // ...and an inconsistent one downgrades the hole without unseating others.
    assert!(!session.equal(&hole, &Term::typ(), 0));
    assert!(matches!(
      session.holes.entry(&name).unwrap().value,
      HoleValue::Conflicted
    ));
  }

  #[test]
  fn conflicts_leave_other_assignments_alone() {
    let mut session = Session::new();
    assert!(session.equal(&Term::hol("keep"), &Term::num(), 0));
    assert!(session.equal(&Term::hol("clash"), &Term::num(), 0));
    assert!(!session.equal(&Term::hol("clash"), &Term::typ(), 0));
    assert_eq!(
      session.holes.solution(&IString::from("keep")),
      Some((Term::num(), 0))
    );
  }

  #[test]
  fn erased_markers_are_rigid() {
    let mut session = Session::new();
    // Both sides erase to the bare sentinel hole.
    let a = Term::lam("A", None, Term::var(0), true);
    let b = Term::lam("B", None, Term::var(0), true);
    assert!(session.equal(&a, &b, 0));
    // The sentinel must not be unified with arbitrary terms.
    assert!(!session.equal(&a, &Term::val(2), 0));
    assert!(!session.equal(&Term::val(2), &a, 0));
  }

  #[test]
  fn erased_arguments_do_not_affect_equality() {
    let mut session = Session::new();
    let a = Term::app(Term::reference("f", false), Term::typ(), true);
    let b = Term::app(Term::reference("f", false), Term::num(), true);
    assert!(session.equal(&a, &b, 0));
  }
}
