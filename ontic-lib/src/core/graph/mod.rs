/*!

The graph runtime: compilation of erased terms into a flat memory of packed 32-bit cells, a
lazy reducer driven by a back-stack, and decompilation of normal forms back into terms.

The runtime covers the reference-and-lambda fragment of the erased language (`VAR`, `LAM`,
`APP`, `REF`); it requires affine binders, since beta substitutes through a single backref per
binder. The companion affinity analysis tells a front-end which definitions qualify. Numeric
terms run on the interaction-net runtime instead.

*/

pub mod memory;
pub mod reduce;

use ontic_abs::{HashMap, IString};

use crate::{
  api::{
    error::RuntimeError,
    term::{Term, TermKind},
  },
  core::{
    analysis::uses,
    erasure::erase,
    graph::memory::{ptr, Ptr, Tag, NIL},
    session::Defs,
  },
};

pub use reduce::{GraphRuntime, GraphStats};

/// One compiled definition: a self-contained memory image with addresses relative to its own
/// start, and the entry pointer into it.
pub struct RtDef {
  pub name: IString,
  pub mem : Vec<u32>,
  pub head: Ptr,
}

/// The table of compiled definitions, indexed by definition id.
pub struct RtBook {
  pub defs: Vec<RtDef>,
  pub ids : HashMap<IString, u32>,
}

impl RtBook {
  pub fn id_of(&self, name: &IString) -> Option<u32> {
    self.ids.get(name).copied()
  }
}

/// Compiles every definition reachable from `entry` (after erasure) into runtime form. The
/// entry definition receives id 0.
pub fn compile(defs: &Defs, entry: &IString) -> Result<RtBook, RuntimeError> {
  let mut book = RtBook {
    defs: Vec::new(),
    ids:  HashMap::default(),
  };
  compile_def(defs, entry, &mut book)?;
  Ok(book)
}

fn compile_def(defs: &Defs, name: &IString, book: &mut RtBook) -> Result<u32, RuntimeError> {
  if let Some(&id) = book.ids.get(name) {
    return Ok(id);
  }
  let def = defs.get(name).ok_or_else(|| RuntimeError::UnknownReference {
    name: name.clone(),
  })?;

  // Allocate the id before compiling the body so self references resolve.
  let id = book.defs.len() as u32;
  book.ids.insert(name.clone(), id);
  book.defs.push(RtDef {
    name: name.clone(),
    mem:  Vec::new(),
    head: NIL,
  });

  let erased = erase(def);
  let mut mem = Vec::new();
  let mut binders = Vec::new();
  let head = compile_term(defs, &erased, &mut mem, &mut binders, book)?;

  book.defs[id as usize].mem = mem;
  book.defs[id as usize].head = head;
  Ok(id)
}

fn compile_term(
  defs: &Defs,
  term: &Term,
  mem: &mut Vec<u32>,
  binders: &mut Vec<u32>,
  book: &mut RtBook,
) -> Result<Ptr, RuntimeError> {
  match term.kind() {
    TermKind::Var { index } => {
      let lam = binders
          .iter()
          .rev()
          .nth(*index)
          .copied()
          .ok_or_else(|| unsupported(term))?;
      Ok(ptr(Tag::Var, lam))
    }
    TermKind::Lam { body, .. } => {
      if uses(body, 0) > 1 {
        // A binder cell holds at most one occurrence backref.
        return Err(unsupported(term));
      }
      let a = alloc(mem, 2);
      mem[a as usize] = NIL;
      binders.push(a);
      let body_ptr = compile_term(defs, body, mem, binders, book)?;
      binders.pop();
      memory::link(mem, a + 1, body_ptr);
      Ok(ptr(Tag::Lam, a))
    }
    TermKind::App { func, argm, .. } => {
      let a = alloc(mem, 2);
      let func_ptr = compile_term(defs, func, mem, binders, book)?;
      memory::link(mem, a, func_ptr);
      let argm_ptr = compile_term(defs, argm, mem, binders, book)?;
      memory::link(mem, a + 1, argm_ptr);
      Ok(ptr(Tag::App, a))
    }
    TermKind::Ref { name, .. } => {
      let id = compile_def(defs, name, book)?;
      Ok(ptr(Tag::Ref, id))
    }
    _ => Err(unsupported(term)),
  }
}

fn unsupported(term: &Term) -> RuntimeError {
  RuntimeError::UnsupportedTerm {
    found: term.to_string(),
  }
}

fn alloc(mem: &mut Vec<u32>, cells: u32) -> u32 {
  let at = mem.len() as u32;
  mem.resize(mem.len() + cells as usize, NIL);
  at
}
