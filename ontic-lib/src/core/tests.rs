/*!

Scenario tests exercising the kernel end to end: checking, equality, both runtimes, and the
agreement between all three reducers. Smaller unit tests live next to the modules they cover.

*/

use rand::Rng;

use ontic_abs::IString;

use crate::{
  api::{
    error::TypeErrorKind,
    operator::BinOp,
    term::Term,
  },
  core::{
    analysis::{is_affine, uses},
    erasure::erase,
    graph,
    inet,
    session::{CollectSink, Diagnostic, Session},
    substitution::{shift, subst},
    typing::holes::HoleValue,
  },
};

fn name(text: &str) -> IString {
  IString::from(text)
}

// region Random terms

/// Builds a random redex-free term with `free` variables in scope. Applications and
/// references are excluded so every generated term is strongly normalizing.
fn random_term(rng: &mut impl Rng, free: usize, fuel: usize) -> Term {
  if fuel == 0 {
    return match rng.random_range(0..3u32) {
      0 if free > 0 => Term::var(rng.random_range(0..free)),
      1 => Term::val(rng.random_range(0..100u32)),
      _ => Term::typ(),
    };
  }
  match rng.random_range(0..6u32) {
    0 if free > 0 => Term::var(rng.random_range(0..free)),
    1 => Term::val(rng.random_range(0..100u32)),
    2 => Term::lam(
      "x",
      None,
      random_term(rng, free + 1, fuel - 1),
      rng.random_bool(0.2),
    ),
    3 => Term::op2(
      BinOp::Add,
      random_term(rng, free, fuel - 1),
      random_term(rng, free, fuel - 1),
    ),
    4 => Term::ite(
      random_term(rng, free, fuel - 1),
      random_term(rng, free, fuel - 1),
      random_term(rng, free, fuel - 1),
    ),
    _ => Term::all(
      "a",
      random_term(rng, free, fuel - 1),
      random_term(rng, free + 1, fuel - 1),
      false,
    ),
  }
}

#[test]
fn shift_composes_on_random_terms() {
  let mut rng = rand::rng();
  for _ in 0..200 {
    let term = random_term(&mut rng, 3, 4);
    let composed = shift(&shift(&term, 2, 1), 3, 1);
    assert_eq!(composed, shift(&term, 5, 1));
  }
}

#[test]
fn substituting_a_fresh_binder_is_the_identity_on_random_terms() {
  let mut rng = rand::rng();
  for _ in 0..200 {
    let term = random_term(&mut rng, 3, 4);
    let value = random_term(&mut rng, 0, 2);
    assert_eq!(subst(&shift(&term, 1, 0), &value, 0), term);
  }
}

#[test]
fn erasure_is_idempotent_on_random_terms() {
  let mut rng = rand::rng();
  for _ in 0..200 {
    let term = random_term(&mut rng, 3, 4);
    let once = erase(&term);
    assert_eq!(erase(&once), once);
  }
}

#[test]
fn normalization_is_idempotent_on_random_terms() {
  let mut rng = rand::rng();
  let session = Session::new();
  for _ in 0..100 {
    let term = random_term(&mut rng, 0, 4);
    let normal = session.normalize(&term);
    assert_eq!(session.normalize(&normal), normal);
  }
}

// endregion Random terms

// region Scenario 1: identity application

#[test]
fn identity_application_checks_and_reduces() {
  let mut session = Session::new();
  let term = Term::app(
    Term::lam("x", Some(Term::typ()), Term::var(0), false),
    Term::typ(),
    false,
  );
  let ty = session.check(&term, Some(Term::typ())).unwrap();
  assert_eq!(ty, Term::typ());
  assert_eq!(session.reduce(&term), Term::typ());
}

// endregion

// region Scenario 2: dependent apply

fn define_dependent_id(session: &mut Session) {
  // id : (A : Type;) -> (x : A) -> A := (A;) => (x) => x
  let id_ty = Term::all(
    "A",
    Term::typ(),
    Term::all("x", Term::var(0), Term::var(1), false),
    true,
  );
  let id = Term::lam(
    "A",
    Some(Term::typ()),
    Term::lam("x", Some(Term::var(0)), Term::var(0), false),
    true,
  );
  session.define("id", Term::ann(id_ty, id, false));
}

#[test]
fn dependent_apply_checks_and_normalizes_everywhere() {
  let mut session = Session::new();
  define_dependent_id(&mut session);
  // id<Word>(5)
  let term = Term::app(
    Term::app(Term::reference("id", false), Term::num(), true),
    Term::val(5),
    false,
  );
  let ty = session.check(&term, Some(Term::num())).unwrap();
  assert_eq!(ty, Term::num());
  assert_eq!(session.normalize(&erase(&term)), Term::val(5));

  // The interaction-net runtime agrees.
  session.define("main", term);
  let mut net = inet::compile_defs(&session.defs, &name("main")).unwrap();
  net.reduce_strict().unwrap();
  assert_eq!(inet::decompile(&net).unwrap(), Term::val(5));
}

// endregion

// region Scenario 3: numeric fold

#[test]
fn numeric_fold_checks_and_normalizes() {
  let mut session = Session::new();
  // ((n : Word) => (n .+. 1) .*. 2)(3) = 8
  let body = Term::op2(
    BinOp::Mul,
    Term::op2(BinOp::Add, Term::var(0), Term::val(1)),
    Term::val(2),
  );
  let term = Term::app(
    Term::lam("n", Some(Term::num()), body, false),
    Term::val(3),
    false,
  );
  let ty = session.check(&term, Some(Term::num())).unwrap();
  assert_eq!(ty, Term::num());
  assert_eq!(session.normalize(&term), Term::val(8));
}

// endregion

// region Scenario 4: self-type round trip

/// The standard self-encoded natural numbers:
/// `Nat = ${n} (P : Nat -> Type;) -> (z : P(zero)) -> (s : (k : Nat) -> P(k) -> P(succ(k))) -> P(n)`
fn define_nat(session: &mut Session) {
  // Binder stack inside the self type, outermost first: n, P, z, s.
  let motive_ty = Term::all("_", Term::reference("Nat", false), Term::typ(), false);
  let z_ty = Term::app(Term::var(0), Term::reference("zero", false), false);
  let s_ty = Term::all(
    "k",
    Term::reference("Nat", false),
    Term::all(
      "_",
      Term::app(Term::var(2), Term::var(0), false),
      Term::app(
        Term::var(3),
        Term::app(Term::reference("succ", false), Term::var(1), false),
        false,
      ),
      false,
    ),
    false,
  );
  let nat = Term::slf(
    "n",
    Term::all(
      "P",
      motive_ty,
      Term::all(
        "z",
        z_ty,
        Term::all("s", s_ty, Term::app(Term::var(2), Term::var(3), false), false),
        false,
      ),
      true,
    ),
  );
  session.define("Nat", Term::ann(Term::typ(), nat, false));

  // zero = new(Nat) (P;) => (z) => (s) => z
  let zero = Term::new_self(
    Term::reference("Nat", false),
    Term::lam(
      "P",
      None,
      Term::lam("z", None, Term::lam("s", None, Term::var(1), false), false),
      true,
    ),
  );
  session.define("zero", Term::ann(Term::reference("Nat", false), zero, false));

  // succ = (m) => new(Nat) (P;) => (z) => (s) => s(m)(use(m)(P;)(z)(s))
  let succ_body = Term::new_self(
    Term::reference("Nat", false),
    Term::lam(
      "P",
      None,
      Term::lam(
        "z",
        None,
        Term::lam(
          "s",
          None,
          Term::app(
            Term::app(Term::var(0), Term::var(3), false),
            Term::app(
              Term::app(
                Term::app(Term::use_self(Term::var(3)), Term::var(2), true),
                Term::var(1),
                false,
              ),
              Term::var(0),
              false,
            ),
            false,
          ),
          false,
        ),
        false,
      ),
      true,
    ),
  );
  let succ = Term::lam("m", Some(Term::reference("Nat", false)), succ_body, false);
  let succ_ty = Term::all(
    "m",
    Term::reference("Nat", false),
    Term::reference("Nat", false),
    false,
  );
  session.define("succ", Term::ann(succ_ty, succ, false));
}

#[test]
fn self_encoded_naturals_typecheck() {
  let mut session = Session::new();
  define_nat(&mut session);
  let ty = session.typecheck(&name("Nat"), Some(Term::typ())).unwrap();
  assert_eq!(ty, Term::typ());
  session.typecheck(&name("zero"), None).unwrap();
  session.typecheck(&name("succ"), None).unwrap();
}

#[test]
fn eliminating_a_successor_steps_the_induction() {
  let mut session = Session::new();
  define_nat(&mut session);
  session.typecheck(&name("Nat"), Some(Term::typ())).unwrap();

  // At depth 3 with P = #2, z = #1, s = #0:
  // use(succ(zero))(P;)(z)(s) == s(zero)(z) ... since use(zero)(P;)(z)(s) == z.
  let lhs = Term::app(
    Term::app(
      Term::app(
        Term::use_self(Term::app(
          Term::reference("succ", false),
          Term::reference("zero", false),
          false,
        )),
        Term::var(2),
        true,
      ),
      Term::var(1),
      false,
    ),
    Term::var(0),
    false,
  );
  let rhs = Term::app(
    Term::app(Term::var(0), Term::reference("zero", false), false),
    Term::var(1),
    false,
  );
  assert!(session.equal(&lhs, &rhs, 3));
  // And the base case collapses to z itself.
  let base = Term::app(
    Term::app(
      Term::app(Term::use_self(Term::reference("zero", false)), Term::var(2), true),
      Term::var(1),
      false,
    ),
    Term::var(0),
    false,
  );
  assert!(session.equal(&base, &Term::var(1), 3));
}

// endregion

// region Scenario 5: hole inference

#[test]
fn holes_solve_against_the_demanded_function_type() {
  let mut session = Session::new();
  // ((x) => x) :: (x : ?A) -> ?A, demanded at (x : Word) -> Word.
  let holey_ty = Term::all("x", Term::hol("A"), Term::hol("A"), false);
  let term = Term::ann(holey_ty, Term::lam("x", None, Term::var(0), false), false);
  session.define("f", term);

  let expected = Term::all("x", Term::num(), Term::num(), false);
  let ty = session.typecheck(&name("f"), Some(expected.clone())).unwrap();
  assert_eq!(ty, expected);
  assert_eq!(session.holes.solution(&name("A")), Some((Term::num(), 0)));
}

#[test]
fn unsolved_named_holes_are_reported() {
  let sink = std::rc::Rc::new(CollectSink::new());
  let mut session = Session::with_sink(Box::new(sink.clone()));
  session.define("g", Term::ann(Term::typ(), Term::hol("goal"), false));
  session.define("h", Term::ann(Term::typ(), Term::hol("_anon"), false));
  session.typecheck(&name("g"), None).unwrap();
  session.typecheck(&name("h"), None).unwrap();

  let entry = session.holes.entry(&name("goal")).cloned().unwrap();
  assert!(matches!(entry.value, HoleValue::Unset));
  assert_eq!(entry.expected, Some(Term::typ()));

  let records = sink.take();
  assert!(records.iter().any(|record| matches!(
    record,
    Diagnostic::UnsolvedHole { name, .. } if name.as_ref() == "goal"
  )));
  // Unresolved anonymous holes are not reported.
  assert!(!records.iter().any(|record| matches!(
    record,
    Diagnostic::UnsolvedHole { name, .. } if name.as_ref() == "_anon"
  )));
}

// endregion

// region Scenario 6: linearity

#[test]
fn duplication_typechecks_but_is_not_affine() {
  let mut session = Session::new();
  let dup = Term::lam(
    "x",
    Some(Term::num()),
    Term::op2(BinOp::Add, Term::var(0), Term::var(0)),
    false,
  );
  let expected = Term::all("x", Term::num(), Term::num(), false);
  let ty = session.check(&dup, Some(expected)).unwrap();
  assert_eq!(ty, Term::all("x", Term::num(), Term::num(), false));

  assert_eq!(uses(&Term::op2(BinOp::Add, Term::var(0), Term::var(0)), 0), 2);
  assert!(!is_affine(&dup, &session.defs));
}

// endregion

// region Reducer agreement

/// All three reducers agree on closed, terminating, erased lambda terms.
#[test]
fn reducers_agree_on_the_affine_fragment() {
  let mut session = Session::new();
  session.define("id", Term::lam("x", None, Term::var(0), false));
  session.define(
    "konst",
    Term::lam("a", None, Term::lam("b", None, Term::var(1), true), false),
  );
  // main = id(id(konst((c) => c)))   (konst's second binder is erased)
  let main = Term::app(
    Term::reference("id", false),
    Term::app(
      Term::reference("id", false),
      Term::app(
        Term::reference("konst", false),
        Term::lam("c", None, Term::var(0), false),
        false,
      ),
      false,
    ),
    false,
  );
  session.define("main", main);

  let reference = session.normalize(&erase(&Term::reference("main", false)));

  let (graph_normal, _, _) = {
    let entry = name("main");
    let book = graph::compile(&session.defs, &entry).unwrap();
    let mut runtime = graph::GraphRuntime::new(book, &entry).unwrap();
    runtime.normalize();
    (runtime.decompile(), runtime.stats, 0)
  };
  assert_eq!(graph_normal, reference);

  let mut net = inet::compile_defs(&session.defs, &name("main")).unwrap();
  net.reduce_strict().unwrap();
  assert_eq!(inet::decompile(&net).unwrap(), reference);
}

#[test]
fn graph_decompilation_round_trips_erasure() {
  let mut session = Session::new();
  let term = Term::lam(
    "f",
    None,
    Term::lam("x", None, Term::app(Term::var(1), Term::var(0), false), false),
    false,
  );
  session.define("main", term.clone());
  let entry = name("main");
  let book = graph::compile(&session.defs, &entry).unwrap();
  let runtime = graph::GraphRuntime::new(book, &entry).unwrap();
  // No reduction: decompilation inverts compilation up to alpha.
  assert_eq!(runtime.decompile(), erase(&term));
}

// endregion

// region Errors and memoization

#[test]
fn error_kinds_surface_from_checking() {
  let mut session = Session::new();

  let unbound = Term::var(3);
  assert!(matches!(
    session.check(&unbound, None).unwrap_err().kind,
    TypeErrorKind::UnboundVariable { index: 3 }
  ));

  let untyped = Term::lam("x", None, Term::var(0), false);
  assert!(matches!(
    session.check(&untyped, None).unwrap_err().kind,
    TypeErrorKind::UntypedLambda
  ));

  let non_function = Term::app(Term::val(1), Term::val(2), false);
  assert!(matches!(
    session.check(&non_function, None).unwrap_err().kind,
    TypeErrorKind::NonFunction { .. }
  ));

  let bad_cond = Term::ite(Term::typ(), Term::val(1), Term::val(0));
  assert!(matches!(
    session.check(&bad_cond, None).unwrap_err().kind,
    TypeErrorKind::IfCondNotNumeric { .. }
  ));

  let mismatch = Term::ann(Term::num(), Term::typ(), false);
  assert!(matches!(
    session.check(&mismatch, None).unwrap_err().kind,
    TypeErrorKind::Mismatch { .. }
  ));

  let unknown = Term::reference("nowhere", false);
  assert!(matches!(
    session.check(&unknown, None).unwrap_err().kind,
    TypeErrorKind::UnknownReference { .. }
  ));

  let new_of_num = Term::new_self(Term::num(), Term::val(1));
  assert!(matches!(
    session.check(&new_of_num, None).unwrap_err().kind,
    TypeErrorKind::NewOfNonSelf { .. }
  ));

  let use_of_num = Term::use_self(Term::val(1));
  assert!(matches!(
    session.check(&use_of_num, None).unwrap_err().kind,
    TypeErrorKind::UseOfNonSelf { .. }
  ));
}

#[test]
fn erased_variables_cannot_be_used_relevantly() {
  let mut session = Session::new();
  // (A : Type;) => A  uses its erased binder in a relevant position.
  let term = Term::lam("A", Some(Term::typ()), Term::var(0), true);
  assert!(matches!(
    session.check(&term, None).unwrap_err().kind,
    TypeErrorKind::ErasedUse { .. }
  ));
}

#[test]
fn erasure_flags_must_agree_on_application() {
  let mut session = Session::new();
  define_dependent_id(&mut session);
  // id applied relevantly where its first argument is erased.
  let term = Term::app(Term::reference("id", false), Term::num(), false);
  assert!(matches!(
    session.check(&term, None).unwrap_err().kind,
    TypeErrorKind::ErasureMismatch
  ));
}

#[test]
fn ascription_memoization_rolls_back_on_failure() {
  let mut session = Session::new();
  let bad = Term::ann(Term::num(), Term::typ(), false);
  assert!(session.check(&bad, None).is_err());
  if let crate::api::term::TermKind::Ann { done, .. } = bad.kind() {
    assert!(!done.get(), "failed check must reset the memo flag");
  } else {
    unreachable!();
  }

  let good = Term::ann(Term::num(), Term::val(1), false);
  session.check(&good, None).unwrap();
  if let crate::api::term::TermKind::Ann { done, .. } = good.kind() {
    assert!(done.get(), "successful check memoizes");
  } else {
    unreachable!();
  }
}

#[test]
fn checked_definitions_are_rewritten_into_ascriptions() {
  let mut session = Session::new();
  session.define("five", Term::val(5));
  let user = Term::op1(BinOp::Add, Term::reference("five", false), 1);
  session.check(&user, Some(Term::num())).unwrap();

  assert_eq!(session.types.get(&name("five")), Some(&Term::num()));
  match session.defs.get(&name("five")).unwrap().kind() {
    crate::api::term::TermKind::Ann { done, .. } => assert!(done.get()),
    _ => panic!("definition was not rewritten into a checked ascription"),
  }
}

// endregion

// region Diagnostics

#[test]
fn reduction_logs_flow_through_the_sink() {
  let session = Session::with_sink(Box::new(CollectSink::new()));
  let term = Term::log(
    Term::op2(BinOp::Add, Term::val(1), Term::val(2)),
    Term::val(9),
  );
  assert_eq!(session.reduce(&term), Term::val(9));
}

#[test]
fn collect_sink_retains_log_records() {
  let sink = CollectSink::new();
  let mut defs = ontic_abs::HashMap::default();
  defs.insert(name("unused"), Term::val(0));
  let cfg = crate::core::reduce::EvalCfg {
    defs:         &defs,
    holes:        None,
    rules:        crate::core::reduce::ReduceRules::all(),
    sink:         Some(&sink),
    erased_cache: None,
    depth:        0,
  };
  let term = Term::log(
    Term::op2(BinOp::Add, Term::val(1), Term::val(2)),
    Term::val(9),
  );
  assert_eq!(crate::core::reduce::reduce(&cfg, &term), Term::val(9));
  let records = sink.take();
  assert_eq!(records.len(), 1);
  match &records[0] {
    Diagnostic::Log { message } => assert_eq!(message, &Term::val(3)),
    other => panic!("unexpected diagnostic {:?}", other),
  }
}

// endregion
