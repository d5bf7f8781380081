/*!

Semantic values for normalization by evaluation.

Binders are represented by `Closure`s, a bound name plus a body term and the environment it was
unquoted in; environments are singly-linked frames of lazily forced `Thunk`s. Two flavors of
stuck variable exist: `Var` is a fresh variable introduced while quoting under a binder (its
`level` counts binders from the output root), and `Free` is a variable of the input term that
was never bound (its `index` counts outward from the input root's scope).

*/

use std::{cell::RefCell, rc::Rc};

use ontic_abs::IString;

use crate::api::{operator::BinOp, term::Term};

// region Environments

#[derive(Clone, Default)]
pub struct Env(Option<Rc<EnvNode>>);

struct EnvNode {
  thunk: Thunk,
  rest : Env,
  len  : usize,
}

impl Env {
  #[inline(always)]
  pub fn nil() -> Env {
    Env(None)
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.0.as_ref().map_or(0, |node| node.len)
  }

  #[inline(always)]
  pub fn is_empty(&self) -> bool {
    self.0.is_none()
  }

  /// Extends the environment with one more binding. The receiver is shared, not copied.
  pub fn cons(&self, thunk: Thunk) -> Env {
    let len = self.len() + 1;
    Env(Some(Rc::new(EnvNode {
      thunk,
      rest: self.clone(),
      len,
    })))
  }

  /// The binding for de-Bruijn index `index`; `0` is the most recent.
  pub fn get(&self, index: usize) -> Option<Thunk> {
    let mut node = self.0.as_ref()?;
    let mut remaining = index;
    loop {
      if remaining == 0 {
        return Some(node.thunk.clone());
      }
      remaining -= 1;
      node = node.rest.0.as_ref()?;
    }
  }

  /// All bindings, innermost first.
  pub fn thunks(&self) -> Vec<Thunk> {
    let mut out = Vec::with_capacity(self.len());
    let mut cursor = self.0.as_ref();
    while let Some(node) = cursor {
      out.push(node.thunk.clone());
      cursor = node.rest.0.as_ref();
    }
    out
  }
}

// endregion Environments

// region Thunks

/// A lazily forced computation. `depth` records the absolute binder depth of the suspension
/// point so that hole solutions can be relocated correctly when the thunk is finally forced.
#[derive(Clone)]
pub struct Thunk(pub(crate) Rc<RefCell<ThunkState>>);

pub(crate) enum ThunkState {
  Suspended { term: Term, env: Env, depth: usize },
  Forced(Value),
}

impl Thunk {
  pub fn suspend(term: Term, env: Env, depth: usize) -> Thunk {
    Thunk(Rc::new(RefCell::new(ThunkState::Suspended { term, env, depth })))
  }

  pub fn forced(value: Value) -> Thunk {
    Thunk(Rc::new(RefCell::new(ThunkState::Forced(value))))
  }

  /// The value, if this thunk has already been forced.
  pub fn forced_value(&self) -> Option<Value> {
    match &*self.0.borrow() {
      ThunkState::Forced(value) => Some(value.clone()),
      ThunkState::Suspended { .. } => None,
    }
  }
}

// endregion Thunks

/// A suspended binder body: the bound name, the body term, and the captured environment.
#[derive(Clone)]
pub struct Closure {
  pub name: IString,
  pub body: Term,
  pub env : Env,
}

#[derive(Clone)]
pub enum Value {
  /// A variable introduced while quoting under a binder, as a level from the output root.
  Var { level: usize },
  /// A variable free in the input term, indexed into the scope surrounding the input root.
  Free { index: usize },
  Typ,
  All {
    name  : IString,
    bind  : Thunk,
    body  : Closure,
    erased: bool,
  },
  Lam {
    name  : IString,
    bind  : Option<Thunk>,
    body  : Closure,
    erased: bool,
  },
  /// A stuck application.
  App {
    func  : Box<Value>,
    argm  : Thunk,
    erased: bool,
  },
  Slf {
    name: IString,
    ty  : Closure,
  },
  New {
    ty  : Thunk,
    expr: Thunk,
  },
  /// A stuck elimination.
  Use { expr: Box<Value> },
  Num,
  Val { numb: u32 },
  /// A stuck partially applied operator.
  Op1 {
    op  : BinOp,
    num0: Box<Value>,
    num1: u32,
  },
  /// A stuck operator.
  Op2 {
    op  : BinOp,
    num0: Box<Value>,
    num1: Box<Value>,
  },
  /// A stuck conditional; the branches stay suspended until the scrutinee is known.
  Ite {
    cond    : Box<Value>,
    if_true : Thunk,
    if_false: Thunk,
  },
  Hol { name: IString },
  Ref { name: IString, erased: bool },
}
