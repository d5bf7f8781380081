/*!

The lazy graph reducer.

A back-stack of frames drives a walk from the root cell. Applications descend into their
function; an application whose function is a lambda contracts in place, substituting the
argument through the binder's single backref and splicing the body over the redex cell.
References copy their definition's memory image to the end of memory, offsetting its internal
pointers. A lambda reached in head position is committed to: its variable cell receives a depth
marker and the walk continues into the body. Reaching a variable unwinds the stack, entering
the arguments of pending applications on demand.

When memory grows past a configurable multiple of the size measured at the last collection, the
live graph is retraced from the root into a fresh compact memory and the stack is rewritten to
the new addresses.

*/

use ontic_abs::{debug, HashMap, IString};

use crate::{
  api::{error::RuntimeError, term::Term},
  core::graph::{
    memory::{
      addr_of, depth_marker, is_depth_marker, link, ptr, relocate, tag_of, Ptr, Tag, NIL,
    },
    RtBook,
  },
};

#[derive(Copy, Clone, Default, Debug)]
pub struct GraphStats {
  pub beta   : usize,
  pub copy   : usize,
  pub max_len: usize,
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum FrameKind {
  /// Inside the body of an entered lambda.
  LamBody,
  /// Inside the function of an application.
  AppFunc,
  /// Inside the argument of an application whose function is already normal.
  AppArgm,
}

struct Frame {
  cell: u32,
  kind: FrameKind,
}

pub struct GraphRuntime {
  book: RtBook,
  mem : Vec<u32>,
  pub stats: GraphStats,
  /// Live size measured at the last collection.
  collect_floor: usize,
  /// Collection triggers when memory exceeds `collect_factor * collect_floor`.
  pub collect_factor: usize,
  pub collections: usize,
}

impl GraphRuntime {
  /// Loads the entry definition into a fresh memory whose cell 0 holds the root pointer.
  pub fn new(book: RtBook, entry: &IString) -> Result<GraphRuntime, RuntimeError> {
    let id = book
        .id_of(entry)
        .ok_or_else(|| RuntimeError::UnknownReference { name: entry.clone() })?;
    let mut mem = vec![NIL];
    let head = copy_def_into(&book, id, &mut mem);
    link(&mut mem, 0, head);
    let floor = mem.len();
    Ok(GraphRuntime {
      book,
      mem,
      stats: GraphStats {
        beta:    0,
        copy:    0,
        max_len: floor,
      },
      collect_floor:  floor,
      collect_factor: 8,
      collections:    0,
    })
  }

  /// Reduces the loaded term to normal form.
  pub fn normalize(&mut self) -> &GraphStats {
    let mut stack: Vec<Frame> = Vec::new();
    let mut loc: u32 = 0;
    let mut depth: u32 = 0;

    'walk: loop {
      let p = self.mem[loc as usize];
      match tag_of(p) {
        Tag::Lam => {
          // A lambda exposed in function position contracts at its application instead of
          // being entered.
          if let Some(frame) = stack.last() {
            if frame.kind == FrameKind::AppFunc
                && addr_of(self.mem[frame.cell as usize]) == loc
            {
              loc = frame.cell;
              stack.pop();
              continue 'walk;
            }
          }
          let a = addr_of(p);
          self.mem[a as usize] = depth_marker(depth);
          stack.push(Frame {
            cell: loc,
            kind: FrameKind::LamBody,
          });
          depth += 1;
          loc = a + 1;
        }
        Tag::App => {
          let a = addr_of(p);
          let func = self.mem[a as usize];
          if tag_of(func) == Tag::Lam {
            self.stats.beta += 1;
            let lam = addr_of(func);
            let var_cell = self.mem[lam as usize];
            debug_assert!(!is_depth_marker(var_cell), "beta through an entered binder");
            if var_cell != NIL {
              let argm = self.mem[(a + 1) as usize];
              link(&mut self.mem, addr_of(var_cell), argm);
            }
            let body = self.mem[(lam + 1) as usize];
            link(&mut self.mem, loc, body);
            self.maybe_collect(&mut stack, &mut loc);
          } else {
            stack.push(Frame {
              cell: loc,
              kind: FrameKind::AppFunc,
            });
            loc = a;
          }
        }
        Tag::Ref => {
          self.stats.copy += 1;
          let id = addr_of(p);
          let head = copy_def_into(&self.book, id, &mut self.mem);
          link(&mut self.mem, loc, head);
          self.stats.max_len = self.stats.max_len.max(self.mem.len());
          self.maybe_collect(&mut stack, &mut loc);
        }
        Tag::Var => {
          // Normal head: unwind, entering pending arguments on demand.
          loop {
            let enter = match stack.last() {
              None => break 'walk,
              Some(frame) => match frame.kind {
                FrameKind::LamBody => {
                  depth -= 1;
                  stack.pop();
                  continue;
                }
                FrameKind::AppArgm => {
                  stack.pop();
                  continue;
                }
                FrameKind::AppFunc => frame.cell,
              },
            };
            if let Some(frame) = stack.last_mut() {
              frame.kind = FrameKind::AppArgm;
            }
            loc = addr_of(self.mem[enter as usize]) + 1;
            break;
          }
        }
      }
    }

    self.stats.max_len = self.stats.max_len.max(self.mem.len());
    &self.stats
  }

  fn maybe_collect(&mut self, stack: &mut Vec<Frame>, loc: &mut u32) {
    if self.mem.len() > self.collect_factor * self.collect_floor.max(1) {
      self.collect(stack, loc);
    }
  }

  /// Retraces the live graph from the root into a fresh compact memory, rewriting variable
  /// cells and the walk state to the new addresses.
  fn collect(&mut self, stack: &mut [Frame], loc: &mut u32) {
    let mut new_mem: Vec<u32> = vec![NIL];
    let mut lam_map: HashMap<u32, u32> = HashMap::default();
    let mut cell_map: HashMap<u32, u32> = HashMap::default();

    self.copy_cell(0, 0, &mut new_mem, &mut lam_map, &mut cell_map);

    for frame in stack.iter_mut() {
      frame.cell = cell_map[&frame.cell];
    }
    *loc = cell_map[loc];

    debug!(
      2,
      "graph collection: {} -> {} cells",
      self.mem.len(),
      new_mem.len()
    );
    self.mem = new_mem;
    self.collect_floor = self.mem.len().max(1);
    self.collections += 1;
  }

  fn copy_cell(
    &self,
    old_cell: u32,
    dst_cell: u32,
    new_mem: &mut Vec<u32>,
    lam_map: &mut HashMap<u32, u32>,
    cell_map: &mut HashMap<u32, u32>,
  ) {
    cell_map.insert(old_cell, dst_cell);
    let word = self.mem[old_cell as usize];
    if word == NIL || is_depth_marker(word) {
      new_mem[dst_cell as usize] = word;
      return;
    }
    match tag_of(word) {
      Tag::Ref => {
        new_mem[dst_cell as usize] = word;
      }
      Tag::Var => {
        // The binder was copied before any occurrence inside its body.
        let new_lam = lam_map[&addr_of(word)];
        new_mem[dst_cell as usize] = ptr(Tag::Var, new_lam);
        if !is_depth_marker(new_mem[new_lam as usize]) {
          new_mem[new_lam as usize] = ptr(Tag::Var, dst_cell);
        }
      }
      Tag::Lam => {
        let a = addr_of(word);
        let n = new_mem.len() as u32;
        new_mem.push(NIL);
        new_mem.push(NIL);
        lam_map.insert(a, n);
        cell_map.insert(a, n);
        let var_cell = self.mem[a as usize];
        if is_depth_marker(var_cell) {
          new_mem[n as usize] = var_cell;
        }
        new_mem[dst_cell as usize] = ptr(Tag::Lam, n);
        self.copy_cell(a + 1, n + 1, new_mem, lam_map, cell_map);
      }
      Tag::App => {
        let a = addr_of(word);
        let n = new_mem.len() as u32;
        new_mem.push(NIL);
        new_mem.push(NIL);
        new_mem[dst_cell as usize] = ptr(Tag::App, n);
        self.copy_cell(a, n, new_mem, lam_map, cell_map);
        self.copy_cell(a + 1, n + 1, new_mem, lam_map, cell_map);
      }
    }
  }

  /// Reads the graph back as a term, naming binders freshly by depth.
  pub fn decompile(&self) -> Term {
    let mut binders = Vec::new();
    self.decompile_at(self.mem[0], &mut binders)
  }

  fn decompile_at(&self, p: Ptr, binders: &mut Vec<u32>) -> Term {
    match tag_of(p) {
      Tag::Lam => {
        let a = addr_of(p);
        let name = format!("x{}", binders.len());
        binders.push(a);
        let body = self.decompile_at(self.mem[(a + 1) as usize], binders);
        binders.pop();
        Term::lam(name, None, body, false)
      }
      Tag::App => {
        let a = addr_of(p);
        let func = self.decompile_at(self.mem[a as usize], binders);
        let argm = self.decompile_at(self.mem[(a + 1) as usize], binders);
        Term::app(func, argm, false)
      }
      Tag::Var => {
        let cell = addr_of(p);
        match binders.iter().rev().position(|&binder| binder == cell) {
          Some(index) => Term::var(index),
          None => {
            // Entered binders carry their depth in the variable cell.
            let word = self.mem[cell as usize];
            if is_depth_marker(word) {
              let level = crate::core::graph::memory::marker_depth(word) as usize;
              Term::var(binders.len() - 1 - level)
            } else {
              panic!("dangling variable occurrence at cell {}", cell);
            }
          }
        }
      }
      Tag::Ref => {
        let def = &self.book.defs[addr_of(p) as usize];
        Term::reference(def.name.clone(), false)
      }
    }
  }
}

/// Appends a definition's memory image, offsetting its internal pointers, and returns the
/// relocated entry pointer.
fn copy_def_into(book: &RtBook, id: u32, mem: &mut Vec<u32>) -> Ptr {
  let def = &book.defs[id as usize];
  let offset = mem.len() as u32;
  for &word in &def.mem {
    mem.push(relocate(word, offset));
  }
  relocate(def.head, offset)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::{graph::compile, session::Defs};

  fn define(defs: &mut Defs, name: &str, term: Term) {
    defs.insert(IString::from(name), term);
  }

  fn run(defs: &Defs, entry: &str) -> (Term, GraphStats, usize) {
    let entry = IString::from(entry);
    let book = compile(defs, &entry).unwrap();
    let mut runtime = GraphRuntime::new(book, &entry).unwrap();
    runtime.normalize();
    (runtime.decompile(), runtime.stats, runtime.collections)
  }

  #[test]
  fn identity_application_normalizes() {
    let mut defs = Defs::default();
    define(
      &mut defs,
      "main",
      Term::app(
        Term::lam("x", None, Term::var(0), false),
        Term::lam("y", None, Term::var(0), false),
        false,
      ),
    );
    let (normal, stats, _) = run(&defs, "main");
    assert_eq!(normal, Term::lam("y", None, Term::var(0), false));
    assert_eq!(stats.beta, 1);
  }

  #[test]
  fn references_copy_on_use() {
    let mut defs = Defs::default();
    define(&mut defs, "id", Term::lam("x", None, Term::var(0), false));
    define(
      &mut defs,
      "main",
      Term::app(
        Term::reference("id", false),
        Term::app(Term::reference("id", false), Term::lam("y", None, Term::var(0), false), false),
        false,
      ),
    );
    let (normal, stats, _) = run(&defs, "main");
    assert_eq!(normal, Term::lam("y", None, Term::var(0), false));
    assert_eq!(stats.copy, 2);
    assert_eq!(stats.beta, 2);
  }

  #[test]
  fn normalization_proceeds_under_binders() {
    let mut defs = Defs::default();
    // (f) => (x) => ((y) => y)(x), which normalizes to (f) => (x) => x.
    define(
      &mut defs,
      "main",
      Term::lam(
        "f",
        None,
        Term::lam(
          "x",
          None,
          Term::app(Term::lam("y", None, Term::var(0), false), Term::var(0), false),
          false,
        ),
        false,
      ),
    );
    let (normal, ..) = run(&defs, "main");
    assert_eq!(
      normal,
      Term::lam("f", None, Term::lam("x", None, Term::var(0), false), false)
    );
  }

  #[test]
  fn arguments_reduce_on_demand() {
    let mut defs = Defs::default();
    // (x) => x (((a) => a)((b) => b)): the argument only normalizes after the head variable.
    define(
      &mut defs,
      "main",
      Term::lam(
        "x",
        None,
        Term::app(
          Term::var(0),
          Term::app(
            Term::lam("a", None, Term::var(0), false),
            Term::lam("b", None, Term::var(0), false),
            false,
          ),
          false,
        ),
        false,
      ),
    );
    let (normal, stats, _) = run(&defs, "main");
    assert_eq!(
      normal,
      Term::lam(
        "x",
        None,
        Term::app(Term::var(0), Term::lam("b", None, Term::var(0), false), false),
        false
      )
    );
    assert_eq!(stats.beta, 1);
  }

  #[test]
  fn collection_compacts_and_preserves_the_result() {
    let mut defs = Defs::default();
    define(&mut defs, "id", Term::lam("x", None, Term::var(0), false));
    // id(id(...(id((y) => y))...)), deep enough to outgrow a tight collection threshold.
    let mut main = Term::lam("y", None, Term::var(0), false);
    for _ in 0..24 {
      main = Term::app(Term::reference("id", false), main, false);
    }
    define(&mut defs, "main", main);

    let entry = IString::from("main");
    let book = compile(&defs, &entry).unwrap();
    let mut runtime = GraphRuntime::new(book, &entry).unwrap();
    runtime.collect_factor = 1;
    runtime.normalize();

    assert!(runtime.collections > 0, "expected at least one collection");
    assert_eq!(
      runtime.decompile(),
      Term::lam("y", None, Term::var(0), false)
    );
  }
}
