/*!

Typing contexts.

A context is a stack of frames, one per binder crossed. Retrieving the `i`-th frame from the top
shifts its type (and cached value, when present) by `i + 1` so that the result is well scoped at
the current depth.

*/

use ontic_abs::{IString, SmallVec};

use crate::{
  api::term::Term,
  core::{
    format::{impl_display_via_format, FormatStyle, Formattable, NameStack},
    substitution::shift,
  },
};

#[derive(Clone)]
pub struct Frame {
  pub name  : IString,
  pub value : Option<Term>,
  pub ty    : Term,
  pub erased: bool,
}

#[derive(Clone, Default)]
pub struct Context {
  frames: SmallVec<[Frame; 8]>,
}

impl Context {
  #[inline(always)]
  pub fn new() -> Context {
    Context::default()
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.frames.len()
  }

  #[inline(always)]
  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  /// A copy of this context with one more frame on top.
  pub fn extended(
    &self,
    name: impl Into<IString>,
    value: Option<Term>,
    ty: Term,
    erased: bool,
  ) -> Context {
    let mut frames = self.frames.clone();
    frames.push(Frame {
      name: name.into(),
      value,
      ty,
      erased,
    });
    Context { frames }
  }

  /// The `index`-th frame from the top, with its type and value shifted to the current depth.
  pub fn get(&self, index: usize) -> Option<Frame> {
    if index >= self.frames.len() {
      return None;
    }
    let frame = &self.frames[self.frames.len() - 1 - index];
    let inc = (index + 1) as i64;
    Some(Frame {
      name:   frame.name.clone(),
      value:  frame.value.as_ref().map(|v| shift(v, inc, 0)),
      ty:     shift(&frame.ty, inc, 0),
      erased: frame.erased,
    })
  }

  /// Binder names, outermost first.
  pub fn names(&self) -> Vec<IString> {
    self.frames.iter().map(|frame| frame.name.clone()).collect()
  }
}

impl Formattable for Context {
  fn write_styled(
    &self,
    out: &mut dyn std::fmt::Write,
    style: FormatStyle,
    names: &mut NameStack,
  ) -> std::fmt::Result {
    // Outermost first, so each type renders under exactly the binders it can see. Frames are
    // stored at their own depth; no shifting is needed here.
    for frame in &self.frames {
      write!(out, "- {} : ", frame.name)?;
      frame.ty.write_styled(out, style, names)?;
      if frame.erased {
        write!(out, " (erased)")?;
      }
      writeln!(out)?;
      names.push(frame.name.clone());
    }
    for _ in &self.frames {
      names.pop();
    }
    Ok(())
  }
}

impl_display_via_format!(Context);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn retrieval_shifts_to_the_current_depth() {
    // ctx: A : Type, x : A. Reading frame 1 (A) shifts its type by 2; reading frame 0 (x)
    // shifts `Var 0` (pointing at A) by 1, yielding `Var 1`.
    let ctx = Context::new()
        .extended("A", None, Term::typ(), true)
        .extended("x", None, Term::var(0), false);

    let x = ctx.get(0).unwrap();
    assert_eq!(x.ty, Term::var(1));

    let a = ctx.get(1).unwrap();
    assert_eq!(a.ty, Term::typ());
    assert!(a.erased);

    assert!(ctx.get(2).is_none());
  }
}
