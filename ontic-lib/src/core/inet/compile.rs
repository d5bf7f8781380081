/*!

Compilation of erased terms into nets, and readback of nets into terms.

Every lambda and every application becomes a label-0 constructor (principal = the lambda itself
/ the function side, aux 1 = variable / argument, aux 2 = body / result). A binder whose
variable occurs more than once fans out through a chain of uniquely-labelled duplicators; an
unused binder is capped by an eraser (a constructor whose auxiliary ports are looped together).
Numeric literals inline into ports, operators and conditionals map onto their node types, and
the conditional's branches ride a `PAIR_KIND` constructor on its auxiliary port.

References are expanded through a shared duplicator chain per name, so multiple uses of the
same definition share structure; a definition used once is built directly at its use site.
Recursive references cannot be finitely unfolded into a net and are rejected.

Readback walks from the root, tracking the duplicator-exit path so that each traversal resolves
duplicators to a consistent side.

*/

use ontic_abs::{HashMap, IString};

use crate::{
  api::{
    error::RuntimeError,
    operator::BinOp,
    term::{Term, TermKind},
  },
  core::{
    erasure::erase,
    inet::{node_of, port, slot_of, INet, NodeType, PortAddr, KIND_FLIP, PAIR_KIND, ROOT_NODE},
    session::Defs,
  },
};

/// Compiles a closed erased term (references not allowed) into a net.
pub fn compile_term(term: &Term) -> Result<INet, RuntimeError> {
  let erased_defs = HashMap::default();
  let mut builder = Builder {
    net:    INet::new(),
    erased: &erased_defs,
    fans:   HashMap::default(),
  };
  let body = erase(term);
  let mut scope = Vec::new();
  builder.build(&body, port(ROOT_NODE, 0), &mut scope)?;
  Ok(builder.net)
}

/// Compiles the definition `entry` and everything it reaches into one net with per-name
/// structure sharing.
pub fn compile_defs(defs: &Defs, entry: &IString) -> Result<INet, RuntimeError> {
  let mut counts: HashMap<IString, usize> = HashMap::default();
  let mut erased: HashMap<IString, Term> = HashMap::default();
  let mut stack = Vec::new();
  reach(defs, entry, &mut counts, &mut erased, &mut stack)?;

  let mut builder = Builder {
    net:    INet::new(),
    erased: &erased,
    fans:   HashMap::default(),
  };

  // Reserve a duplicator chain for every definition used more than once.
  let mut shared = Vec::new();
  for (name, &count) in &counts {
    if count >= 2 {
      let (input, outputs) = builder.reserve_fan(count);
      builder.fans.insert(
        name.clone(),
        Fan::Shared {
          input,
          outputs,
          cursor: 0,
        },
      );
      shared.push(name.clone());
    } else if count == 1 {
      builder.fans.insert(name.clone(), Fan::Single);
    }
  }

  let entry_body = erased[entry].clone();
  let mut scope = Vec::new();
  builder.build(&entry_body, port(ROOT_NODE, 0), &mut scope)?;

  for name in shared {
    let body = erased[&name].clone();
    let input = match &builder.fans[&name] {
      Fan::Shared { input, .. } => *input,
      Fan::Single => unreachable!(),
    };
    let mut scope = Vec::new();
    builder.build(&body, input, &mut scope)?;
  }

  Ok(builder.net)
}

enum Fan {
  /// Built directly at the one use site.
  Single,
  /// Pre-reserved duplicator chain: uses claim `outputs` in order, the body is built into
  /// `input` afterwards.
  Shared {
    input  : PortAddr,
    outputs: Vec<PortAddr>,
    cursor : usize,
  },
}

struct Builder<'a> {
  net   : INet,
  erased: &'a HashMap<IString, Term>,
  fans  : HashMap<IString, Fan>,
}

impl<'a> Builder<'a> {
  fn build(
    &mut self,
    term: &Term,
    up: PortAddr,
    scope: &mut Vec<Vec<PortAddr>>,
  ) -> Result<(), RuntimeError> {
    match term.kind() {
      TermKind::Var { index } => {
        if *index >= scope.len() {
          return Err(unsupported(term));
        }
        let frame = scope.len() - 1 - index;
        scope[frame].push(up);
        Ok(())
      }
      TermKind::Lam { body, .. } => {
        let lam = self.net.alloc(NodeType::Nod, 0);
        self.net.link(up, port(lam, 0));
        scope.push(Vec::new());
        self.build(body, port(lam, 2), scope)?;
        let uses = scope.pop().unwrap();
        let input = self.fan_out(&uses);
        self.net.link(port(lam, 1), input);
        Ok(())
      }
      TermKind::App { func, argm, .. } => {
        let app = self.net.alloc(NodeType::Nod, 0);
        self.build(func, port(app, 0), scope)?;
        self.build(argm, port(app, 1), scope)?;
        self.net.link(up, port(app, 2));
        Ok(())
      }
      TermKind::Val { numb } => {
        self.net.link_num(up, *numb);
        Ok(())
      }
      TermKind::Op1 { op, num0, num1 } => {
        let node = self.net.alloc(NodeType::Op1, op.code() as u16);
        self.build(num0, port(node, 0), scope)?;
        self.net.link_num(port(node, 1), *num1);
        self.net.link(up, port(node, 2));
        Ok(())
      }
      TermKind::Op2 { op, num0, num1 } => {
        let node = self.net.alloc(NodeType::Op2, op.code() as u16);
        self.build(num0, port(node, 0), scope)?;
        self.build(num1, port(node, 1), scope)?;
        self.net.link(up, port(node, 2));
        Ok(())
      }
      TermKind::Ite { cond, if_true, if_false } => {
        let ite = self.net.alloc(NodeType::Ite, 0);
        let pair = self.net.alloc(NodeType::Nod, PAIR_KIND);
        self.build(cond, port(ite, 0), scope)?;
        self.net.link(port(ite, 1), port(pair, 0));
        self.build(if_true, port(pair, 1), scope)?;
        self.build(if_false, port(pair, 2), scope)?;
        self.net.link(up, port(ite, 2));
        Ok(())
      }
      TermKind::Ref { name, .. } => match self.fans.get_mut(name) {
        Some(Fan::Single) => {
          let body = match self.erased.get(name) {
            Some(body) => body.clone(),
            None => {
              return Err(RuntimeError::UnknownReference { name: name.clone() });
            }
          };
          let mut fresh_scope = Vec::new();
          self.build(&body, up, &mut fresh_scope)
        }
        Some(Fan::Shared { outputs, cursor, .. }) => {
          let claimed = outputs[*cursor];
          *cursor += 1;
          self.net.link(up, claimed);
          Ok(())
        }
        None => Err(RuntimeError::UnknownReference { name: name.clone() }),
      },
      // Type-level and proof-level residue has no runtime representation.
      _ => Err(unsupported(term)),
    }
  }

  /// Wires a binder (or shared definition) to its use sites: none (eraser), one (direct), or
  /// many (a chain of uniquely-labelled duplicators). Returns the input port.
  fn fan_out(&mut self, uses: &[PortAddr]) -> PortAddr {
    match uses.len() {
      0 => {
        let era = self.net.alloc(NodeType::Nod, 0);
        self.net.link(port(era, 1), port(era, 2));
        port(era, 0)
      }
      1 => uses[0],
      _ => {
        let label = self.net.fresh_label();
        let dup = self.net.alloc(NodeType::Nod, label);
        self.net.link(port(dup, 1), uses[0]);
        let rest = self.fan_out(&uses[1..]);
        self.net.link(port(dup, 2), rest);
        port(dup, 0)
      }
    }
  }

  /// Pre-allocates a duplicator chain with `count` dangling outputs to be claimed later.
  fn reserve_fan(&mut self, count: usize) -> (PortAddr, Vec<PortAddr>) {
    debug_assert!(count >= 2);
    let mut outputs = Vec::with_capacity(count);
    let label = self.net.fresh_label();
    let first = self.net.alloc(NodeType::Nod, label);
    let mut current = first;
    outputs.push(port(current, 1));
    for _ in 2..count {
      let label = self.net.fresh_label();
      let next = self.net.alloc(NodeType::Nod, label);
      self.net.link(port(current, 2), port(next, 0));
      current = next;
      outputs.push(port(current, 1));
    }
    outputs.push(port(current, 2));
    (port(first, 0), outputs)
  }
}

fn unsupported(term: &Term) -> RuntimeError {
  RuntimeError::UnsupportedTerm {
    found: term.to_string(),
  }
}

/// Collects the erased bodies and reference-occurrence counts of everything reachable from
/// `name`, rejecting recursion.
fn reach(
  defs: &Defs,
  name: &IString,
  counts: &mut HashMap<IString, usize>,
  erased: &mut HashMap<IString, Term>,
  stack: &mut Vec<IString>,
) -> Result<(), RuntimeError> {
  if stack.contains(name) {
    return Err(RuntimeError::RecursiveReference { name: name.clone() });
  }
  if erased.contains_key(name) {
    return Ok(());
  }
  let def = defs.get(name).ok_or_else(|| RuntimeError::UnknownReference {
    name: name.clone(),
  })?;
  let body = erase(def);
  erased.insert(name.clone(), body.clone());
  counts.entry(name.clone()).or_insert(0);
  stack.push(name.clone());
  count_refs(&body, defs, counts, erased, stack)?;
  stack.pop();
  Ok(())
}

fn count_refs(
  term: &Term,
  defs: &Defs,
  counts: &mut HashMap<IString, usize>,
  erased: &mut HashMap<IString, Term>,
  stack: &mut Vec<IString>,
) -> Result<(), RuntimeError> {
  match term.kind() {
    TermKind::Ref { name, .. } => {
      *counts.entry(name.clone()).or_insert(0) += 1;
      reach(defs, name, counts, erased, stack)
    }
    TermKind::Lam { body, .. } => count_refs(body, defs, counts, erased, stack),
    TermKind::App { func, argm, .. } => {
      count_refs(func, defs, counts, erased, stack)?;
      count_refs(argm, defs, counts, erased, stack)
    }
    TermKind::Op1 { num0, .. } => count_refs(num0, defs, counts, erased, stack),
    TermKind::Op2 { num0, num1, .. } => {
      count_refs(num0, defs, counts, erased, stack)?;
      count_refs(num1, defs, counts, erased, stack)
    }
    TermKind::Ite { cond, if_true, if_false } => {
      count_refs(cond, defs, counts, erased, stack)?;
      count_refs(if_true, defs, counts, erased, stack)?;
      count_refs(if_false, defs, counts, erased, stack)
    }
    _ => Ok(()),
  }
}

/// Reads the net back as a term from port 0 of the root, resolving duplicators through an
/// exit stack and naming binders freshly by depth.
pub fn decompile(net: &INet) -> Result<Term, RuntimeError> {
  let mut exit = Vec::new();
  let mut binders = HashMap::default();
  read(net, port(ROOT_NODE, 0), &mut exit, 0, &mut binders)
}

fn read(
  net: &INet,
  from: PortAddr,
  exit: &mut Vec<u32>,
  depth: usize,
  binders: &mut HashMap<u32, usize>,
) -> Result<Term, RuntimeError> {
  if net.is_numeric(from) {
    return Ok(Term::val(net.get(from)));
  }
  let next = net.get(from);
  let node = node_of(next);
  let slot = slot_of(next);

  match net.node_type(node) {
    NodeType::Nod => {
      let kind = net.kind(node);
      if kind == 0 {
        match slot {
          0 => {
            binders.insert(node, depth);
            let body = read(net, port(node, 2), exit, depth + 1, binders)?;
            Ok(Term::lam(format!("x{}", depth), None, body, false))
          }
          1 => match binders.get(&node) {
            Some(level) => Ok(Term::var(depth - 1 - level)),
            None => panic!("variable occurrence without an enclosing binder"),
          },
          _ => {
            let func = read(net, port(node, 0), exit, depth, binders)?;
            let argm = read(net, port(node, 1), exit, depth, binders)?;
            Ok(Term::app(func, argm, false))
          }
        }
      } else if kind == PAIR_KIND {
        panic!("branch pair outside a conditional")
      } else {
        // Duplicator: resolve to the side this path entered through.
        match slot {
          0 => {
            let side = exit.pop().expect("unmatched duplicator on readback path");
            let term = read(net, port(node, side), exit, depth, binders)?;
            exit.push(side);
            Ok(term)
          }
          _ => {
            exit.push(slot);
            let term = read(net, port(node, 0), exit, depth, binders)?;
            exit.pop();
            Ok(term)
          }
        }
      }
    }
    NodeType::Op1 => {
      let kind = net.kind(node);
      let code = kind & !KIND_FLIP;
      let op = BinOp::try_from(code).map_err(|code| RuntimeError::UnknownOperator { code })?;
      let operand = read(net, port(node, 0), exit, depth, binders)?;
      debug_assert!(net.is_numeric(port(node, 1)), "unary operator without a literal");
      let literal = net.get(port(node, 1));
      if kind & KIND_FLIP != 0 {
        Ok(Term::op2(op, Term::val(literal), operand))
      } else {
        Ok(Term::op1(op, operand, literal))
      }
    }
    NodeType::Op2 => {
      let op = BinOp::try_from(net.kind(node))
          .map_err(|code| RuntimeError::UnknownOperator { code })?;
      let num0 = read(net, port(node, 0), exit, depth, binders)?;
      let num1 = read(net, port(node, 1), exit, depth, binders)?;
      Ok(Term::op2(op, num0, num1))
    }
    NodeType::Ite => {
      let cond = read(net, port(node, 0), exit, depth, binders)?;
      let pair = node_of(net.get(port(node, 1)));
      debug_assert_eq!(net.kind(pair), PAIR_KIND, "conditional branches not paired");
      let if_true = read(net, port(pair, 1), exit, depth, binders)?;
      let if_false = read(net, port(pair, 2), exit, depth, binders)?;
      Ok(Term::ite(cond, if_true, if_false))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn strict(term: &Term) -> Term {
    let mut net = compile_term(term).unwrap();
    net.reduce_strict().unwrap();
    decompile(&net).unwrap()
  }

  fn lazy(term: &Term) -> Term {
    let mut net = compile_term(term).unwrap();
    net.reduce_lazy().unwrap();
    decompile(&net).unwrap()
  }

  #[test]
  fn identity_application_reduces_in_both_schedulers() {
    let term = Term::app(
      Term::lam("x", None, Term::var(0), false),
      Term::lam("y", None, Term::var(0), false),
    false,
    );
    let expected = Term::lam("y", None, Term::var(0), false);
    assert_eq!(strict(&term), expected);
    assert_eq!(lazy(&term), expected);
  }

  #[test]
  fn duplicated_binders_round_trip() {
    // two = (s) => (z) => s(s(z)) exercises the duplicator readback.
    let two = Term::lam(
      "s",
      None,
      Term::lam(
        "z",
        None,
        Term::app(
          Term::var(1),
          Term::app(Term::var(1), Term::var(0), false),
          false,
        ),
        false,
      ),
      false,
    );
    let net = compile_term(&two).unwrap();
    assert_eq!(decompile(&net).unwrap(), two);
  }

  #[test]
  fn numeric_redexes_compute() {
    // ((n) => (n .+. 1) .*. 2)(3) = 8
    let body = Term::op2(
      BinOp::Mul,
      Term::op2(BinOp::Add, Term::var(0), Term::val(1)),
      Term::val(2),
    );
    let term = Term::app(Term::lam("n", None, body, false), Term::val(3), false);
    assert_eq!(strict(&term), Term::val(8));
    assert_eq!(lazy(&term), Term::val(8));
  }

  #[test]
  fn scalars_copy_through_constructors() {
    // ((x) => x .+. x)(5) duplicates the scalar through a duplicator.
    let term = Term::app(
      Term::lam("x", None, Term::op2(BinOp::Add, Term::var(0), Term::var(0)), false),
      Term::val(5),
      false,
    );
    assert_eq!(strict(&term), Term::val(10));
  }

  #[test]
  fn conditionals_select_branches() {
    let ite = |cond: u32| {
      Term::app(
        Term::lam(
          "c",
          None,
          Term::ite(Term::var(0), Term::val(10), Term::val(20)),
          false,
        ),
        Term::val(cond),
        false,
      )
    };
    assert_eq!(strict(&ite(1)), Term::val(10));
    assert_eq!(strict(&ite(0)), Term::val(20));
    assert_eq!(lazy(&ite(1)), Term::val(10));
  }

  #[test]
  fn shared_references_expand_through_duplicators() {
    let mut defs = Defs::default();
    defs.insert(
      IString::from("id"),
      Term::lam("x", None, Term::var(0), false),
    );
    defs.insert(
      IString::from("main"),
      Term::app(
        Term::reference("id", false),
        Term::app(
          Term::reference("id", false),
          Term::val(7),
          false,
        ),
        false,
      ),
    );
    let mut net = compile_defs(&defs, &IString::from("main")).unwrap();
    net.reduce_strict().unwrap();
    assert_eq!(decompile(&net).unwrap(), Term::val(7));
  }

  #[test]
  fn recursive_references_are_rejected() {
    let mut defs = Defs::default();
    defs.insert(
      IString::from("loop"),
      Term::app(Term::reference("loop", false), Term::val(0), false),
    );
    let result = compile_defs(&defs, &IString::from("loop"));
    assert!(matches!(
      result,
      Err(RuntimeError::RecursiveReference { .. })
    ));
  }

  #[test]
  fn annihilation_and_stats_accumulate() {
    let term = Term::app(
      Term::lam("x", None, Term::var(0), false),
      Term::val(9),
      false,
    );
    let mut net = compile_term(&term).unwrap();
    let stats = net.reduce_strict().unwrap();
    assert!(stats.rewrites >= 1);
    assert!(stats.max_len >= 2);
    assert_eq!(decompile(&net).unwrap(), Term::val(9));
  }
}
