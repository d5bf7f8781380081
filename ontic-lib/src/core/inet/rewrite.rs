/*!

Local rewrites of active pairs, and the two schedulers.

Two nodes connected through their principal ports interact: equal-typed (and, for constructors,
equal-labelled) nodes annihilate, linking their auxiliary sides pairwise; differently-labelled
constructors and constructor/operator pairs commute, duplicating each node across the other. A
numeric scalar arriving on a principal port interacts with its node alone: unary operators
compute, binary operators demote to unary ones with the literal rotated onto the auxiliary
port, constructors copy the scalar to both auxiliary sides, and the conditional selects a
branch from its paired constructor.

The strict scheduler drains the redex list to a fixpoint. The lazy scheduler performs a
principal-port walk from the root with a warp/back stack, firing only redexes on the needed
paths, which matches the graph runtime's call-by-need behavior.

*/

use crate::{
  api::{error::RuntimeError, operator::BinOp},
  core::inet::{
    node_of, port, slot_of, INet, NetStats, NodeType, PortAddr, KIND_FLIP, PAIR_KIND,
    ROOT_NODE,
  },
};

impl INet {
  /// Fires the active pair `(x, y)`. A self-pair `(x, x)` is a numeric redex: a scalar
  /// sitting on `x`'s principal port.
  pub fn rewrite(&mut self, x: u32, y: u32) -> Result<(), RuntimeError> {
    self.stats.rewrites += 1;
    if x == y {
      return self.rewrite_numeric(x);
    }
    match (self.node_type(x), self.node_type(y)) {
      (NodeType::Nod, NodeType::Nod) => {
        if self.kind(x) == self.kind(y) {
          self.annihilate(x, y);
        } else {
          self.commute(x, y);
        }
        Ok(())
      }
      (NodeType::Op1, NodeType::Op1)
      | (NodeType::Op2, NodeType::Op2)
      | (NodeType::Ite, NodeType::Ite) => {
        self.annihilate(x, y);
        Ok(())
      }
      (NodeType::Nod, _) => {
        self.commute(x, y);
        Ok(())
      }
      (_, NodeType::Nod) => {
        self.commute(y, x);
        Ok(())
      }
      (tx, ty) => panic!("no interaction rule for {:?} and {:?}", tx, ty),
    }
  }

  /// Links the auxiliary sides pairwise and frees both nodes. Wires that land in the dying
  /// pair's own cells resolve on the second pass, since `splice` re-reads live cell contents.
  fn annihilate(&mut self, x: u32, y: u32) {
    self.splice(port(x, 1), port(y, 1));
    self.splice(port(x, 2), port(y, 2));
    self.free_node(x);
    self.free_node(y);
  }

  /// Duplicates each node of the pair across the other: two copies of `y` face `x`'s
  /// auxiliary sides, two copies of `x` face `y`'s, joined crosswise. Scalars on auxiliary
  /// ports flow onto the copies' principal ports and fire as numeric redexes.
  fn commute(&mut self, x: u32, y: u32) {
    let (x_ty, x_kind) = (self.node_type(x), self.kind(x));
    let (y_ty, y_kind) = (self.node_type(y), self.kind(y));

    let y_a = self.alloc(y_ty, y_kind);
    let y_b = self.alloc(y_ty, y_kind);
    let x_c = self.alloc(x_ty, x_kind);
    let x_d = self.alloc(x_ty, x_kind);

    self.link(port(y_a, 1), port(x_c, 1));
    self.link(port(y_a, 2), port(x_d, 1));
    self.link(port(y_b, 1), port(x_c, 2));
    self.link(port(y_b, 2), port(x_d, 2));

    self.relink(port(x, 1), port(y_a, 0));
    self.relink(port(x, 2), port(y_b, 0));
    self.relink(port(y, 1), port(x_c, 0));
    self.relink(port(y, 2), port(x_d, 0));

    self.free_node(x);
    self.free_node(y);
  }

  /// Connects whatever is attached at ports `a` and `b` (wires or scalars) to each other.
  fn splice(&mut self, a: PortAddr, b: PortAddr) {
    match (self.is_numeric(a), self.is_numeric(b)) {
      (false, false) => {
        let peer_a = self.get(a);
        let peer_b = self.get(b);
        self.link(peer_a, peer_b);
      }
      (true, false) => {
        let value = self.get(a);
        let peer_b = self.get(b);
        self.link_num(peer_b, value);
      }
      (false, true) => {
        let peer_a = self.get(a);
        let value = self.get(b);
        self.link_num(peer_a, value);
      }
      // Two scalars meeting carry no observable wire; drop them.
      (true, true) => {}
    }
  }

  fn rewrite_numeric(&mut self, node: u32) -> Result<(), RuntimeError> {
    debug_assert!(self.is_numeric(port(node, 0)), "numeric rewrite without a scalar");
    let value = self.get(port(node, 0));
    match self.node_type(node) {
      NodeType::Op1 => {
        let kind = self.kind(node);
        let code = kind & !KIND_FLIP;
        let op = BinOp::try_from(code)
            .map_err(|code| RuntimeError::UnknownOperator { code })?;
        let literal = self.get(port(node, 1));
        debug_assert!(self.is_numeric(port(node, 1)), "unary operator lost its literal");
        let result = if kind & KIND_FLIP != 0 {
          op.eval(literal, value)
        } else {
          op.eval(value, literal)
        };
        self.deliver(port(node, 2), result);
        self.free_node(node);
        Ok(())
      }
      NodeType::Op2 => {
        // Demote: the second operand becomes the principal input, the received scalar is
        // stored as the (first-operand) literal.
        self.set_node_type(node, NodeType::Op1);
        let kind = self.kind(node);
        self.set_kind(node, kind | KIND_FLIP);
        self.relink(port(node, 1), port(node, 0));
        self.link_num(port(node, 1), value);
        Ok(())
      }
      NodeType::Nod => {
        // Copy the scalar to both auxiliary sides.
        for slot in 1..=2 {
          if !self.is_numeric(port(node, slot)) {
            let target = self.get(port(node, slot));
            if node_of(target) != node {
              self.link_num(target, value);
            }
          }
        }
        self.free_node(node);
        Ok(())
      }
      NodeType::Ite => {
        let pair_port = self.get(port(node, 1));
        debug_assert!(!self.is_numeric(port(node, 1)), "conditional without branches");
        let pair = node_of(pair_port);
        debug_assert_eq!(self.kind(pair), PAIR_KIND, "conditional branches not paired");
        let (selected, discarded) = if value != 0 { (1, 2) } else { (2, 1) };

        self.splice(port(node, 2), port(pair, selected));

        if !self.is_numeric(port(pair, discarded)) {
          let target = self.get(port(pair, discarded));
          if node_of(target) != pair && node_of(target) != node {
            let era = self.alloc(NodeType::Nod, 0);
            self.link(port(era, 1), port(era, 2));
            self.link(port(era, 0), target);
          }
        }

        self.free_node(node);
        self.free_node(pair);
        Ok(())
      }
    }
  }

  /// Writes a computed scalar to the peer of an output port, unless the output loops back
  /// into the dying node itself.
  fn deliver(&mut self, out: PortAddr, value: u32) {
    if self.is_numeric(out) {
      return;
    }
    let target = self.get(out);
    if node_of(target) != node_of(out) {
      self.link_num(target, value);
    }
  }

  /// Drains the redex list to a fixpoint.
  pub fn reduce_strict(&mut self) -> Result<NetStats, RuntimeError> {
    while let Some((x, y)) = self.redexes.pop() {
      self.stats.loops += 1;
      // Entries can go stale: earlier rewrites may have freed or relinked the nodes.
      if x == y {
        if self.is_freed(x) || !self.is_numeric(port(x, 0)) {
          continue;
        }
      } else {
        if self.is_freed(x) || self.is_freed(y) {
          continue;
        }
        if self.is_numeric(port(x, 0)) || self.get(port(x, 0)) != port(y, 0) {
          continue;
        }
      }
      self.rewrite(x, y)?;
    }
    Ok(self.stats)
  }

  /// Principal-port walk from the root: only redexes on the paths demanded by the result are
  /// fired. `warp` queues auxiliary branches for later traversal; `back` records the path so
  /// the walk can resume above a fired redex.
  pub fn reduce_lazy(&mut self) -> Result<NetStats, RuntimeError> {
    let mut warp: Vec<PortAddr> = Vec::new();
    let mut back: Vec<PortAddr> = Vec::new();
    let mut prev: PortAddr = port(ROOT_NODE, 0);

    loop {
      self.stats.loops += 1;

      // Queued branches may have been consumed by rewrites in the meantime.
      if self.is_freed(node_of(prev)) {
        match warp.pop() {
          Some(p) => {
            prev = p;
            continue;
          }
          None => break,
        }
      }

      if self.is_numeric(prev) {
        if slot_of(prev) == 0 && node_of(prev) != ROOT_NODE {
          // A scalar reached this node's principal port: fire the numeric rule.
          self.rewrite(node_of(prev), node_of(prev))?;
          prev = back.pop().unwrap_or(port(ROOT_NODE, 0));
          continue;
        }
        // A normal number; take the next queued branch.
        match warp.pop() {
          Some(p) => prev = p,
          None => break,
        }
        continue;
      }

      let next = self.get(prev);
      if node_of(next) == ROOT_NODE {
        match warp.pop() {
          Some(p) => prev = p,
          None => break,
        }
        continue;
      }

      if slot_of(next) == 0 {
        if slot_of(prev) == 0 && node_of(prev) != ROOT_NODE {
          // Principal met principal: an active pair on the needed path.
          self.rewrite(node_of(prev), node_of(next))?;
          prev = back.pop().unwrap_or(port(ROOT_NODE, 0));
        } else {
          // A head constructor: queue one auxiliary side, walk the other.
          warp.push(port(node_of(next), 2));
          prev = port(node_of(next), 1);
        }
      } else {
        // Arrived at an auxiliary port: its node's principal must resolve first.
        back.push(prev);
        prev = port(node_of(next), 0);
      }
    }

    Ok(self.stats)
  }
}
