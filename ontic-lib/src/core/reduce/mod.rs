/*!

The reducer: normalization by evaluation.

`unquote` (here `eval`) turns a de-Bruijn term into a semantic `Value` whose binders are
closures over environments; `quote` turns a value back into a term at an integer depth. Between
the two sits weak-head reduction: with `weak = true` the quote phase reads closures back by
substitution without further evaluation, with `weak = false` it forces evaluation under every
binder, producing the full normal form.

Each reduction class is gated by a `ReduceRule` flag so callers can disable delta, beta, the
numeric rules, and so on independently; the equality engine in particular reduces each side once
with and once without `Delta`.

*/

pub mod value;

use std::cell::RefCell;

use enumflags2::{bitflags, BitFlags};

use ontic_abs::{HashMap, IString};

use crate::{
  api::term::{Term, TermKind},
  core::{
    erasure::erase,
    reduce::value::{Closure, Env, Thunk, ThunkState, Value},
    session::{Diagnostic, DiagnosticSink},
    substitution::{shift, subst_many},
    typing::holes::HoleRegistry,
  },
};

#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ReduceRule {
  /// Contract `(λx. b) a` through the closure.
  Beta,
  /// Expand references through the definition map.
  Delta,
  /// Select a conditional branch once the scrutinee is a literal.
  Iota,
  /// Fold operators whose operands are literals.
  Numeric,
  /// Replace holes by their current solutions.
  Holes,
  /// Cancel `use(new(T) e)` to `e`.
  UseNew,
  /// Emit `log` messages to the diagnostic sink while reducing.
  Logs,
}

pub type ReduceRules = BitFlags<ReduceRule>;

/// Everything the evaluator needs from its session: definitions, hole solutions, rule gates,
/// the diagnostic sink, the erased-definition cache, and the ambient binder depth of the term
/// being reduced.
pub struct EvalCfg<'a> {
  pub defs        : &'a HashMap<IString, Term>,
  pub holes       : Option<&'a HoleRegistry>,
  pub rules       : ReduceRules,
  pub sink        : Option<&'a dyn DiagnosticSink>,
  pub erased_cache: Option<&'a RefCell<HashMap<(IString, bool), Term>>>,
  pub depth       : usize,
}

impl<'a> EvalCfg<'a> {
  pub fn new(defs: &'a HashMap<IString, Term>) -> EvalCfg<'a> {
    EvalCfg {
      defs,
      holes: None,
      rules: ReduceRules::all(),
      sink: None,
      erased_cache: None,
      depth: 0,
    }
  }

  pub fn with_rules(mut self, rules: ReduceRules) -> EvalCfg<'a> {
    self.rules = rules;
    self
  }

  pub fn at_depth(mut self, depth: usize) -> EvalCfg<'a> {
    self.depth = depth;
    self
  }
}

/// Weak-head reduction: the outermost constructor is exposed, binders are read back by
/// substitution without evaluating beneath them.
pub fn reduce(cfg: &EvalCfg, term: &Term) -> Term {
  let value = eval(cfg, term, &Env::nil(), cfg.depth);
  quote(cfg, &value, 0, true)
}

/// Full normalization: reduction proceeds under binders and into arguments.
pub fn normalize(cfg: &EvalCfg, term: &Term) -> Term {
  let value = eval(cfg, term, &Env::nil(), cfg.depth);
  quote(cfg, &value, 0, false)
}

/// The erased form of a definition, memoized by name. Recursive references can blow up during
/// repeated delta expansion without this cache.
fn erased_def(cfg: &EvalCfg, name: &IString, def: &Term) -> Term {
  if let Some(cache) = cfg.erased_cache {
    if let Some(hit) = cache.borrow().get(&(name.clone(), true)) {
      return hit.clone();
    }
    let computed = erase(def);
    cache.borrow_mut().insert((name.clone(), true), computed.clone());
    computed
  } else {
    erase(def)
  }
}

pub(crate) fn eval(cfg: &EvalCfg, term: &Term, env: &Env, depth: usize) -> Value {
  match term.kind() {
    TermKind::Var { index } => match env.get(*index) {
      Some(thunk) => force(cfg, &thunk),
      None => Value::Free { index: *index - env.len() },
    },
    TermKind::Typ => Value::Typ,
    TermKind::Num => Value::Num,
    TermKind::Val { numb } => Value::Val { numb: *numb },
    TermKind::All { name, bind, body, erased } => Value::All {
      name:   name.clone(),
      bind:   Thunk::suspend((**bind).clone(), env.clone(), depth),
      body:   Closure {
        name: name.clone(),
        body: (**body).clone(),
        env:  env.clone(),
      },
      erased: *erased,
    },
    TermKind::Lam { name, bind, body, erased } => Value::Lam {
      name:   name.clone(),
      bind:   bind
          .as_ref()
          .map(|b| Thunk::suspend((**b).clone(), env.clone(), depth)),
      body:   Closure {
        name: name.clone(),
        body: (**body).clone(),
        env:  env.clone(),
      },
      erased: *erased,
    },
    TermKind::App { func, argm, erased } => {
      let func_value = eval(cfg, func, env, depth);
      let argm_thunk = Thunk::suspend((**argm).clone(), env.clone(), depth);
      if cfg.rules.contains(ReduceRule::Beta) {
        if let Value::Lam { body, .. } = &func_value {
          return eval(cfg, &body.body, &body.env.cons(argm_thunk), depth);
        }
      }
      Value::App {
        func:   Box::new(func_value),
        argm:   argm_thunk,
        erased: *erased,
      }
    }
    TermKind::Slf { name, ty } => Value::Slf {
      name: name.clone(),
      ty:   Closure {
        name: name.clone(),
        body: (**ty).clone(),
        env:  env.clone(),
      },
    },
    TermKind::New { ty, expr } => Value::New {
      ty:   Thunk::suspend((**ty).clone(), env.clone(), depth),
      expr: Thunk::suspend((**expr).clone(), env.clone(), depth),
    },
    TermKind::Use { expr } => {
      let expr_value = eval(cfg, expr, env, depth);
      if cfg.rules.contains(ReduceRule::UseNew) {
        if let Value::New { expr: inner, .. } = &expr_value {
          return force(cfg, inner);
        }
      }
      Value::Use {
        expr: Box::new(expr_value),
      }
    }
    TermKind::Op1 { op, num0, num1 } => {
      let num0_value = eval(cfg, num0, env, depth);
      if cfg.rules.contains(ReduceRule::Numeric) {
        if let Value::Val { numb: a } = num0_value {
          return Value::Val { numb: op.eval(a, *num1) };
        }
      }
      Value::Op1 {
        op:   *op,
        num0: Box::new(num0_value),
        num1: *num1,
      }
    }
    TermKind::Op2 { op, num0, num1 } => {
      if cfg.rules.contains(ReduceRule::Numeric) {
        // The right operand reduces first; a literal demotes the node to a partial
        // application, which then commutes to a native computation.
        let num1_value = eval(cfg, num1, env, depth);
        if let Value::Val { numb: b } = num1_value {
          let num0_value = eval(cfg, num0, env, depth);
          if let Value::Val { numb: a } = num0_value {
            return Value::Val { numb: op.eval(a, b) };
          }
          return Value::Op1 {
            op:   *op,
            num0: Box::new(num0_value),
            num1: b,
          };
        }
        let num0_value = eval(cfg, num0, env, depth);
        Value::Op2 {
          op:   *op,
          num0: Box::new(num0_value),
          num1: Box::new(num1_value),
        }
      } else {
        Value::Op2 {
          op:   *op,
          num0: Box::new(eval(cfg, num0, env, depth)),
          num1: Box::new(eval(cfg, num1, env, depth)),
        }
      }
    }
    TermKind::Ite { cond, if_true, if_false } => {
      let cond_value = eval(cfg, cond, env, depth);
      if cfg.rules.contains(ReduceRule::Iota) {
        if let Value::Val { numb } = cond_value {
          let branch = if numb != 0 { if_true } else { if_false };
          return eval(cfg, branch, env, depth);
        }
      }
      Value::Ite {
        cond:     Box::new(cond_value),
        if_true:  Thunk::suspend((**if_true).clone(), env.clone(), depth),
        if_false: Thunk::suspend((**if_false).clone(), env.clone(), depth),
      }
    }
    // Ascriptions only drive checking; reduction sees through them.
    TermKind::Ann { expr, .. } => eval(cfg, expr, env, depth),
    TermKind::Log { msge, expr } => {
      if cfg.rules.contains(ReduceRule::Logs) {
        if let Some(sink) = cfg.sink {
          let message_value = eval(cfg, msge, env, depth);
          let message = quote(cfg, &message_value, 0, false);
          sink.emit(&Diagnostic::Log { message });
        }
      }
      eval(cfg, expr, env, depth)
    }
    TermKind::Hol { name } => {
      if cfg.rules.contains(ReduceRule::Holes) {
        if let Some(holes) = cfg.holes {
          if let Some((value, hole_depth)) = holes.solution(name) {
            let inc = depth as i64 - hole_depth as i64;
            return eval(cfg, &shift(&value, inc, 0), env, depth);
          }
        }
      }
      Value::Hol { name: name.clone() }
    }
    TermKind::Ref { name, erased } => {
      if cfg.rules.contains(ReduceRule::Delta) {
        if let Some(def) = cfg.defs.get(name) {
          let body = if *erased {
            erased_def(cfg, name, def)
          } else {
            def.clone()
          };
          // Definitions are closed; they evaluate in the empty environment.
          return eval(cfg, &body, &Env::nil(), depth);
        }
      }
      Value::Ref {
        name:   name.clone(),
        erased: *erased,
      }
    }
  }
}

pub(crate) fn force(cfg: &EvalCfg, thunk: &Thunk) -> Value {
  let (term, env, depth) = match &*thunk.0.borrow() {
    ThunkState::Forced(value) => return value.clone(),
    ThunkState::Suspended { term, env, depth } => (term.clone(), env.clone(), *depth),
  };
  let value = eval(cfg, &term, &env, depth);
  *thunk.0.borrow_mut() = ThunkState::Forced(value.clone());
  value
}

/// Reconstructs a term from a value. `depth` counts the binders crossed in the output; with
/// `weak` set, closures and suspensions are read back by substitution instead of evaluation.
pub(crate) fn quote(cfg: &EvalCfg, value: &Value, depth: usize, weak: bool) -> Term {
  match value {
    Value::Var { level } => {
      debug_assert!(*level < depth, "quoted a variable above its binder");
      Term::var(depth - 1 - level)
    }
    Value::Free { index } => Term::var(depth + index),
    Value::Typ => Term::typ(),
    Value::Num => Term::num(),
    Value::Val { numb } => Term::val(*numb),
    Value::All { name, bind, body, erased } => Term::all(
      name.clone(),
      readback_thunk(cfg, bind, depth, weak),
      quote_closure(cfg, body, depth, weak),
      *erased,
    ),
    Value::Lam { name, bind, body, erased } => Term::lam(
      name.clone(),
      bind.as_ref().map(|b| readback_thunk(cfg, b, depth, weak)),
      quote_closure(cfg, body, depth, weak),
      *erased,
    ),
    Value::App { func, argm, erased } => Term::app(
      quote(cfg, func, depth, weak),
      readback_thunk(cfg, argm, depth, weak),
      *erased,
    ),
    Value::Slf { name, ty } => Term::slf(name.clone(), quote_closure(cfg, ty, depth, weak)),
    Value::New { ty, expr } => Term::new_self(
      readback_thunk(cfg, ty, depth, weak),
      readback_thunk(cfg, expr, depth, weak),
    ),
    Value::Use { expr } => Term::use_self(quote(cfg, expr, depth, weak)),
    Value::Op1 { op, num0, num1 } => Term::op1(*op, quote(cfg, num0, depth, weak), *num1),
    Value::Op2 { op, num0, num1 } => Term::op2(
      *op,
      quote(cfg, num0, depth, weak),
      quote(cfg, num1, depth, weak),
    ),
    Value::Ite { cond, if_true, if_false } => Term::ite(
      quote(cfg, cond, depth, weak),
      readback_thunk(cfg, if_true, depth, weak),
      readback_thunk(cfg, if_false, depth, weak),
    ),
    Value::Hol { name } => Term::hol(name.clone()),
    Value::Ref { name, erased } => Term::reference(name.clone(), *erased),
  }
}

fn quote_closure(cfg: &EvalCfg, closure: &Closure, depth: usize, weak: bool) -> Term {
  if weak {
    subst_closure(cfg, closure, depth)
  } else {
    let fresh = Thunk::forced(Value::Var { level: depth });
    let body_value = eval(
      cfg,
      &closure.body,
      &closure.env.cons(fresh),
      cfg.depth + depth + 1,
    );
    quote(cfg, &body_value, depth + 1, false)
  }
}

fn readback_thunk(cfg: &EvalCfg, thunk: &Thunk, depth: usize, weak: bool) -> Term {
  if weak {
    let (term, env) = match &*thunk.0.borrow() {
      ThunkState::Forced(value) => {
        let value = value.clone();
        return quote(cfg, &value, depth, true);
      }
      ThunkState::Suspended { term, env, .. } => (term.clone(), env.clone()),
    };
    subst_env(cfg, &term, &env, depth)
  } else {
    let value = force(cfg, thunk);
    quote(cfg, &value, depth, false)
  }
}

/// Reads a suspension back as a term: the environment is substituted in (each binding read back
/// in the suspension's own scope) and the result is relocated under `depth` output binders.
fn subst_env(cfg: &EvalCfg, term: &Term, env: &Env, depth: usize) -> Term {
  if env.is_empty() {
    return shift(term, depth as i64, 0);
  }
  let thunks = env.thunks();
  let values: Vec<Term> = thunks
      .iter()
      .rev()
      .map(|t| readback_thunk(cfg, t, 0, true))
      .collect();
  shift(&subst_many(term, &values, 0), depth as i64, 0)
}

/// As `subst_env`, but for a closure body that keeps its own binder at index 0.
fn subst_closure(cfg: &EvalCfg, closure: &Closure, depth: usize) -> Term {
  if closure.env.is_empty() {
    return shift(&closure.body, depth as i64, 1);
  }
  let thunks = closure.env.thunks();
  let values: Vec<Term> = thunks
      .iter()
      .rev()
      .map(|t| readback_thunk(cfg, t, 1, true))
      .collect();
  shift(&subst_many(&closure.body, &values, 1), depth as i64, 1)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{operator::BinOp, term::Term};

  fn defs() -> HashMap<IString, Term> {
    HashMap::default()
  }

  #[test]
  fn identity_application_reduces() {
    let defs = defs();
    let cfg = EvalCfg::new(&defs);
    let term = Term::app(
      Term::lam("x", Some(Term::typ()), Term::var(0), false),
      Term::typ(),
      false,
    );
    assert_eq!(reduce(&cfg, &term), Term::typ());
  }

  #[test]
  fn weak_reduction_stops_at_binders() {
    let defs = defs();
    let cfg = EvalCfg::new(&defs);
    // (x) => ((y) => y)(x) is already in weak head normal form.
    let redex_under_binder = Term::lam(
      "x",
      None,
      Term::app(Term::lam("y", None, Term::var(0), false), Term::var(0), false),
      false,
    );
    assert_eq!(reduce(&cfg, &redex_under_binder), redex_under_binder);
    assert_eq!(
      normalize(&cfg, &redex_under_binder),
      Term::lam("x", None, Term::var(0), false)
    );
  }

  #[test]
  fn numeric_fold_normalizes() {
    let defs = defs();
    let cfg = EvalCfg::new(&defs);
    // ((n : Word) => (n .+. 1) .*. 2)(3) = 8
    let body = Term::op2(
      BinOp::Mul,
      Term::op2(BinOp::Add, Term::var(0), Term::val(1)),
      Term::val(2),
    );
    let term = Term::app(Term::lam("n", Some(Term::num()), body, false), Term::val(3), false);
    assert_eq!(normalize(&cfg, &term), Term::val(8));
  }

  #[test]
  fn op2_demotes_to_op1_on_a_literal_right_operand() {
    let defs = defs();
    let cfg = EvalCfg::new(&defs);
    let term = Term::op2(BinOp::Sub, Term::var(0), Term::val(2));
    assert_eq!(reduce(&cfg, &term), Term::op1(BinOp::Sub, Term::var(0), 2));
  }

  #[test]
  fn conditional_selects_on_nonzero() {
    let defs = defs();
    let cfg = EvalCfg::new(&defs);
    let ite = Term::ite(Term::val(2), Term::val(10), Term::val(20));
    assert_eq!(reduce(&cfg, &ite), Term::val(10));
    let ite = Term::ite(Term::val(0), Term::val(10), Term::val(20));
    assert_eq!(reduce(&cfg, &ite), Term::val(20));
  }

  #[test]
  fn use_of_new_cancels() {
    let defs = defs();
    let cfg = EvalCfg::new(&defs);
    let term = Term::use_self(Term::new_self(Term::reference("Nat", false), Term::val(1)));
    assert_eq!(reduce(&cfg, &term), Term::val(1));
  }

  #[test]
  fn delta_expansion_respects_its_gate() {
    let mut defs = defs();
    defs.insert(IString::from("two"), Term::val(2));
    let term = Term::reference("two", false);

    let cfg = EvalCfg::new(&defs);
    assert_eq!(reduce(&cfg, &term), Term::val(2));

    let cfg = EvalCfg::new(&defs).with_rules(ReduceRules::all() & !ReduceRule::Delta);
    assert_eq!(reduce(&cfg, &term), term);
  }

  #[test]
  fn reduction_is_idempotent_on_normal_forms() {
    let defs = defs();
    let cfg = EvalCfg::new(&defs);
    let term = Term::app(
      Term::lam(
        "f",
        None,
        Term::lam("x", None, Term::app(Term::var(1), Term::var(0), false), false),
        false,
      ),
      Term::lam("y", None, Term::var(0), false),
      false,
    );
    let normal = normalize(&cfg, &term);
    assert_eq!(normalize(&cfg, &normal), normal);
  }

  #[test]
  fn free_variables_survive_round_trips() {
    let defs = defs();
    let cfg = EvalCfg::new(&defs);
    // (x) => y x, with y free at index 1 under the binder.
    let term = Term::lam("x", None, Term::app(Term::var(1), Term::var(0), false), false);
    assert_eq!(normalize(&cfg, &term), term);
  }
}
