/*!

Text output for terms, contexts, and diagnostics.

Binders in this kernel are de-Bruijn indices with display names carried on the side, so a
renderer needs a scope of binder names that grows and shrinks as it walks under binders.
`NameStack` is that scope: renderable types thread it through `Formattable::write_styled`,
pushing a name when they enter a binder and resolving variable indices against it on the way
out. A variable free beyond the rendered scope falls back to a bare `#index`.

`impl_display_via_format!` bridges a `Formattable` type into `Display` (default style) and
`Debug` (debug style), each starting from an empty scope.

*/

use std::fmt::Write;

use ontic_abs::{IString, SmallVec};

/// How much detail the renderer emits.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum FormatStyle {
  /// Full surface rendering.
  #[default]
  Default,
  /// Suppress ascriptions and log annotations, showing only computational content.
  Bare,
  /// Append de-Bruijn indices to variable names.
  Debug,
}

/// The binder names in scope at the current point of the walk, innermost last.
#[derive(Default)]
pub struct NameStack {
  names: SmallVec<[IString; 8]>,
}

impl NameStack {
  pub fn new() -> NameStack {
    NameStack::default()
  }

  #[inline(always)]
  pub fn push(&mut self, name: IString) {
    self.names.push(name);
  }

  #[inline(always)]
  pub fn pop(&mut self) {
    self.names.pop();
  }

  /// The display name bound at de-Bruijn index `index`, when the variable is in scope.
  pub fn resolve(&self, index: usize) -> Option<&IString> {
    self.names.iter().rev().nth(index)
  }

  /// Writes the variable at `index`: its binder name when in scope (with the index appended
  /// in debug style), a bare `#index` otherwise.
  pub fn write_var(
    &self,
    out: &mut dyn Write,
    index: usize,
    style: FormatStyle,
  ) -> std::fmt::Result {
    match self.resolve(index) {
      Some(name) if style == FormatStyle::Debug => write!(out, "{}#{}", name, index),
      Some(name) => write!(out, "{}", name),
      None => write!(out, "#{}", index),
    }
  }
}

pub trait Formattable {
  /// Writes a rendering of `self` under the given binder scope. Implementations must leave
  /// the scope as they found it.
  fn write_styled(
    &self,
    out: &mut dyn Write,
    style: FormatStyle,
    names: &mut NameStack,
  ) -> std::fmt::Result;
}

#[macro_export]
macro_rules! impl_display_via_format {
  ($t:ty) => {
    impl std::fmt::Display for $t {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = $crate::core::format::NameStack::new();
        <$t as $crate::core::format::Formattable>::write_styled(
          self,
          f,
          $crate::core::format::FormatStyle::Default,
          &mut names,
        )
      }
    }

    impl std::fmt::Debug for $t {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = $crate::core::format::NameStack::new();
        <$t as $crate::core::format::Formattable>::write_styled(
          self,
          f,
          $crate::core::format::FormatStyle::Debug,
          &mut names,
        )
      }
    }
  };
}
pub use impl_display_via_format;
