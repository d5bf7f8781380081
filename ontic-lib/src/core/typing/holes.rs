/*!

The hole registry.

Holes are metavariables identified globally by name; two occurrences of the same name are the
same hole. Each entry remembers the expected type (when one was known), the context and binder
depth at first sighting, and the current solution state. Settlement is monotone: `Unset` may
become `Solved`, and a `Solved` entry that is contradicted downgrades to `Conflicted`; no
transition ever removes another hole's assignment.

The `<erased>` sentinel produced by erasure is a hole name too, but it stands for many distinct
dropped binders, so it is never registered nor assigned.

*/

use ontic_abs::{HashMap, IString};

use crate::{api::term::Term, core::typing::context::Context};

#[derive(Clone, Debug, Default)]
pub enum HoleValue {
  #[default]
  Unset,
  Solved(Term),
  /// Two incompatible solutions were demanded; the hole is unresolvable.
  Conflicted,
}

#[derive(Clone)]
pub struct HoleEntry {
  pub expected: Option<Term>,
  pub context : Context,
  pub depth   : usize,
  pub value   : HoleValue,
}

#[derive(Default)]
pub struct HoleRegistry {
  entries: HashMap<IString, HoleEntry>,
  /// Registration order, for deterministic reporting.
  order: Vec<IString>,
}

impl HoleRegistry {
  pub fn new() -> HoleRegistry {
    HoleRegistry::default()
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.order.len()
  }

  #[inline(always)]
  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  /// Records a hole at first sighting. Later sightings keep the original entry.
  pub fn register(&mut self, name: &IString, expected: Option<Term>, context: Context, depth: usize) {
    if self.entries.contains_key(name) {
      return;
    }
    self.entries.insert(
      name.clone(),
      HoleEntry {
        expected,
        context,
        depth,
        value: HoleValue::Unset,
      },
    );
    self.order.push(name.clone());
  }

  #[inline(always)]
  pub fn contains(&self, name: &IString) -> bool {
    self.entries.contains_key(name)
  }

  pub fn entry(&self, name: &IString) -> Option<&HoleEntry> {
    self.entries.get(name)
  }

  pub fn depth_of(&self, name: &IString) -> Option<usize> {
    self.entries.get(name).map(|entry| entry.depth)
  }

  /// The current solution together with the depth it was recorded at.
  pub fn solution(&self, name: &IString) -> Option<(Term, usize)> {
    let entry = self.entries.get(name)?;
    match &entry.value {
      HoleValue::Solved(term) => Some((term.clone(), entry.depth)),
      _ => None,
    }
  }

  /// Assigns a solution. Only an `Unset` entry accepts one.
  pub fn assign(&mut self, name: &IString, value: Term) {
    if let Some(entry) = self.entries.get_mut(name) {
      debug_assert!(
        matches!(entry.value, HoleValue::Unset),
        "reassigned hole `{}`",
        name
      );
      if matches!(entry.value, HoleValue::Unset) {
        entry.value = HoleValue::Solved(value);
      }
    }
  }

  /// Downgrades a contradicted entry to `Conflicted`.
  pub fn conflict(&mut self, name: &IString) {
    if let Some(entry) = self.entries.get_mut(name) {
      entry.value = HoleValue::Conflicted;
    }
  }

  /// Entries in registration order.
  pub fn iter(&self) -> impl Iterator<Item = (&IString, &HoleEntry)> {
    self.order.iter().filter_map(|name| {
      self.entries.get(name).map(|entry| (name, entry))
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn first_sighting_wins() {
    let mut registry = HoleRegistry::new();
    let name = IString::from("a");
    registry.register(&name, Some(Term::num()), Context::new(), 1);
    registry.register(&name, Some(Term::typ()), Context::new(), 5);
    let entry = registry.entry(&name).unwrap();
    assert_eq!(entry.depth, 1);
    assert_eq!(entry.expected, Some(Term::num()));
  }

  #[test]
  fn settlement_is_monotone() {
    let mut registry = HoleRegistry::new();
    let name = IString::from("a");
    registry.register(&name, None, Context::new(), 0);
    assert!(registry.solution(&name).is_none());

    registry.assign(&name, Term::val(3));
    assert_eq!(registry.solution(&name), Some((Term::val(3), 0)));

    registry.conflict(&name);
    assert!(registry.solution(&name).is_none());
    assert!(matches!(
      registry.entry(&name).unwrap().value,
      HoleValue::Conflicted
    ));
  }
}
