/*!

A checking session.

The `Session` owns everything that was global mutable state in a classic implementation: the
definition map, the cache of checked reference types, the hole registry, the erased-definition
cache, the default reduction rules, and the diagnostic sink. `Defs` is read-many and rewritten
at most once per entry (a successfully checked definition becomes an ascription that caches its
type); `Types` is write-once per name; the hole registry settles monotonically.

Diagnostics (reduction-time logs, checker hole reports) are structured records delivered to a
single `DiagnosticSink`. The default sink forwards to the logging facade; `CollectSink` retains
records for inspection, which the tests use.

*/

use std::cell::RefCell;

use ontic_abs::{info, log::set_global_logging_threshold, HashMap, IString};

use crate::{
  api::{
    error::TypeError,
    term::Term,
  },
  core::{
    equality,
    format::{impl_display_via_format, FormatStyle, Formattable, NameStack},
    reduce::{self, EvalCfg, ReduceRule, ReduceRules},
    typing::{self, context::Context, holes::HoleRegistry},
  },
};

pub type Defs = HashMap<IString, Term>;

// region Diagnostics

#[derive(Clone)]
pub enum Diagnostic {
  /// A `log(msge) expr` annotation fired during reduction; the message is fully normalized.
  Log { message: Term },
  /// The type of a logged expression, emitted while checking.
  LogType { ty: Term },
  /// A named hole that survived the top-level check without a solution.
  UnsolvedHole {
    name   : IString,
    goal   : Option<Term>,
    context: Context,
  },
  /// A named hole together with the solution unification found for it.
  SolvedHole { name: IString, value: Term },
}

impl Formattable for Diagnostic {
  fn write_styled(
    &self,
    out: &mut dyn std::fmt::Write,
    style: FormatStyle,
    names: &mut NameStack,
  ) -> std::fmt::Result {
    match self {
      Diagnostic::Log { message } => {
        write!(out, "[log] ")?;
        message.write_styled(out, style, names)
      }
      Diagnostic::LogType { ty } => {
        write!(out, "[log] :: ")?;
        ty.write_styled(out, style, names)
      }
      Diagnostic::UnsolvedHole { name, goal, context } => {
        writeln!(out, "hole ?{} unsolved", name)?;
        if !context.is_empty() {
          context.write_styled(out, style, names)?;
        }
        if let Some(goal) = goal {
          write!(out, "goal: ")?;
          // The goal is scoped at the hole's context: render it under those binder names.
          let frames = context.names();
          for frame_name in &frames {
            names.push(frame_name.clone());
          }
          goal.write_styled(out, style, names)?;
          for _ in &frames {
            names.pop();
          }
        }
        Ok(())
      }
      Diagnostic::SolvedHole { name, value } => {
        write!(out, "hole ?{} = ", name)?;
        value.write_styled(out, style, names)
      }
    }
  }
}

impl_display_via_format!(Diagnostic);

pub trait DiagnosticSink {
  fn emit(&self, diagnostic: &Diagnostic);
}

/// The default sink: diagnostics go to the logging facade.
pub struct LogSink;

impl DiagnosticSink for LogSink {
  fn emit(&self, diagnostic: &Diagnostic) {
    info!(1, "{}", diagnostic);
  }
}

/// A sink that retains every record, for tests and embedding front-ends.
#[derive(Default)]
pub struct CollectSink {
  records: RefCell<Vec<Diagnostic>>,
}

impl CollectSink {
  pub fn new() -> CollectSink {
    CollectSink::default()
  }

  pub fn take(&self) -> Vec<Diagnostic> {
    self.records.take()
  }

  pub fn len(&self) -> usize {
    self.records.borrow().len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.borrow().is_empty()
  }
}

impl DiagnosticSink for CollectSink {
  fn emit(&self, diagnostic: &Diagnostic) {
    self.records.borrow_mut().push(diagnostic.clone());
  }
}

// Sharing a sink between a session and its caller (tests inspect what was emitted).
impl<T: DiagnosticSink> DiagnosticSink for std::rc::Rc<T> {
  fn emit(&self, diagnostic: &Diagnostic) {
    (**self).emit(diagnostic);
  }
}

// endregion Diagnostics

pub struct Session {
  pub defs : Defs,
  pub types: HashMap<IString, Term>,
  pub holes: HoleRegistry,
  /// Default rule set for reduction requests made on behalf of the checker.
  pub rules: ReduceRules,
  /// Enables the structural-hash fast paths in the equality engine.
  pub hash_shortcuts: bool,
  pub(crate) erased_cache: RefCell<HashMap<(IString, bool), Term>>,
  sink: Box<dyn DiagnosticSink>,
}

impl Session {
  pub fn new() -> Session {
    Session::with_sink(Box::new(LogSink))
  }

  pub fn with_sink(sink: Box<dyn DiagnosticSink>) -> Session {
    Session {
      defs:           Defs::default(),
      types:          HashMap::default(),
      holes:          HoleRegistry::new(),
      rules:          ReduceRules::all(),
      hash_shortcuts: true,
      erased_cache:   RefCell::new(HashMap::default()),
      sink,
    }
  }

  /// Sets the logging verbosity for this process. Convenience passthrough.
  pub fn set_log_threshold(threshold: usize) {
    set_global_logging_threshold(threshold);
  }

  pub fn define(&mut self, name: impl Into<IString>, term: Term) {
    self.defs.insert(name.into(), term);
  }

  #[inline(always)]
  pub fn sink(&self) -> &dyn DiagnosticSink {
    self.sink.as_ref()
  }

  /// An evaluator configuration borrowing this session's state.
  pub(crate) fn eval_cfg(&self, rules: ReduceRules, depth: usize) -> EvalCfg<'_> {
    EvalCfg {
      defs:         &self.defs,
      holes:        Some(&self.holes),
      rules,
      sink:         Some(self.sink.as_ref()),
      erased_cache: Some(&self.erased_cache),
      depth,
    }
  }

  // region Reduction

  /// Weak-head reduction with the session's default rules, at depth zero.
  pub fn reduce(&self, term: &Term) -> Term {
    self.reduce_with(term, self.rules, 0)
  }

  pub fn reduce_at(&self, term: &Term, depth: usize) -> Term {
    self.reduce_with(term, self.rules, depth)
  }

  pub fn reduce_with(&self, term: &Term, rules: ReduceRules, depth: usize) -> Term {
    reduce::reduce(&self.eval_cfg(rules, depth), term)
  }

  /// Full normalization with the session's default rules, at depth zero.
  pub fn normalize(&self, term: &Term) -> Term {
    self.normalize_with(term, self.rules, 0)
  }

  pub fn normalize_at(&self, term: &Term, depth: usize) -> Term {
    self.normalize_with(term, self.rules, depth)
  }

  pub fn normalize_with(&self, term: &Term, rules: ReduceRules, depth: usize) -> Term {
    reduce::normalize(&self.eval_cfg(rules, depth), term)
  }

  // endregion Reduction

  /// Definitional equality at the given binder depth. May assign holes.
  pub fn equal(&mut self, a: &Term, b: &Term, depth: usize) -> bool {
    equality::equal(self, a, b, depth)
  }

  /// Checks the named top-level definition against an expected type, reporting holes through
  /// the sink afterwards.
  pub fn typecheck(&mut self, name: &IString, expected: Option<Term>) -> Result<Term, TypeError> {
    typing::typecheck(self, name, expected)
  }

  /// Checks an arbitrary term in the empty context.
  pub fn check(&mut self, term: &Term, expected: Option<Term>) -> Result<Term, TypeError> {
    typing::check(self, term, expected.as_ref(), &Context::new(), false)
  }

  /// The session rules with `Delta` masked out, for the equality engine.
  pub(crate) fn rules_without_delta(&self) -> ReduceRules {
    self.rules & !ReduceRule::Delta
  }

  /// The session rules with `Delta` forced on.
  pub(crate) fn rules_with_delta(&self) -> ReduceRules {
    self.rules | ReduceRule::Delta
  }
}

impl Default for Session {
  fn default() -> Self {
    Session::new()
  }
}
