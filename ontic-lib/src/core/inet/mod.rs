/*!

The symmetric interaction-net runtime.

A net is an arena of 4-word nodes (three ports and a metadata word), a free-list, and a list of
active pairs. Each node has a principal port (0) and two auxiliary ports (1 and 2); ports link
pairwise, and a port may hold an inlined numeric scalar instead of a wire, flagged in the
metadata word. The 3-bit node type distinguishes constructors/duplicators (`Nod`, whose 16-bit
kind discriminates labels), unary and binary operators (kind is the operator code), and the
numeric conditional.

Node 0 is the root interface: its principal port holds the wire to the net's result and is
never part of a redex.

*/

pub mod compile;
pub mod rewrite;

use enumflags2::{bitflags, BitFlags};

pub use compile::{compile_defs, compile_term, decompile};

/// A port address: node index in the high bits, slot (0..3) in the low two.
pub type PortAddr = u32;

pub const ROOT_NODE: u32 = 0;

/// Metadata word of a freed node.
const FREED: u32 = 0xFFFF_FFFF;

/// Kind bit marking a demoted binary operator whose stored literal is the *first* operand.
pub const KIND_FLIP: u16 = 0x8000;

/// The kind of the branch-pair constructor consumed by a numeric conditional.
pub const PAIR_KIND: u16 = 0xFFFF;

#[inline(always)]
pub fn port(node: u32, slot: u32) -> PortAddr {
  (node << 2) | slot
}

#[inline(always)]
pub fn node_of(p: PortAddr) -> u32 {
  p >> 2
}

#[inline(always)]
pub fn slot_of(p: PortAddr) -> u32 {
  p & 3
}

#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum PortFlag {
  /// Port 0 holds a numeric scalar.
  Num0,
  /// Port 1 holds a numeric scalar.
  Num1,
  /// Port 2 holds a numeric scalar.
  Num2,
}

pub type PortFlags = BitFlags<PortFlag>;

#[inline(always)]
fn flag_of(slot: u32) -> PortFlag {
  match slot {
    0 => PortFlag::Num0,
    1 => PortFlag::Num1,
    _ => PortFlag::Num2,
  }
}

#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum NodeType {
  Nod = 0,
  Op1 = 1,
  Op2 = 2,
  Ite = 3,
}

impl NodeType {
  #[inline(always)]
  fn from_bits(bits: u32) -> NodeType {
    match bits {
      0 => NodeType::Nod,
      1 => NodeType::Op1,
      2 => NodeType::Op2,
      3 => NodeType::Ite,
      other => panic!("invalid node type {}", other),
    }
  }
}

#[derive(Copy, Clone, Default, Debug)]
pub struct NetStats {
  pub rewrites: usize,
  pub loops   : usize,
  pub max_len : usize,
}

// Metadata word layout: bits 0..=2 per-port numeric flags, bits 4..=6 node type,
// bits 16..=31 kind.
const TYPE_SHIFT: u32 = 4;
const KIND_SHIFT: u32 = 16;

pub struct INet {
  pub nodes  : Vec<u32>,
  pub free   : Vec<u32>,
  pub redexes: Vec<(u32, u32)>,
  /// Next fresh duplicator label; label 0 is the constructor kind.
  next_label: u16,
  pub stats: NetStats,
}

impl INet {
  /// A net containing only the root interface node.
  pub fn new() -> INet {
    let mut net = INet {
      nodes:      Vec::new(),
      free:       Vec::new(),
      redexes:    Vec::new(),
      next_label: 1,
      stats:      NetStats::default(),
    };
    let root = net.alloc(NodeType::Nod, 0);
    debug_assert_eq!(root, ROOT_NODE);
    net
  }

  pub fn alloc(&mut self, ty: NodeType, kind: u16) -> u32 {
    let node = match self.free.pop() {
      Some(node) => node,
      None => {
        let node = (self.nodes.len() / 4) as u32;
        self.nodes.resize(self.nodes.len() + 4, 0);
        node
      }
    };
    // Fresh ports are self-looped.
    for slot in 0..3 {
      self.nodes[(node * 4 + slot) as usize] = port(node, slot);
    }
    self.nodes[(node * 4 + 3) as usize] =
        ((ty as u32) << TYPE_SHIFT) | ((kind as u32) << KIND_SHIFT);
    self.stats.max_len = self.stats.max_len.max(self.live_count());
    node
  }

  pub fn free_node(&mut self, node: u32) {
    debug_assert_ne!(node, ROOT_NODE, "freed the root interface");
    self.nodes[(node * 4 + 3) as usize] = FREED;
    self.free.push(node);
  }

  #[inline(always)]
  pub fn is_freed(&self, node: u32) -> bool {
    self.nodes[(node * 4 + 3) as usize] == FREED
  }

  pub fn live_count(&self) -> usize {
    self.nodes.len() / 4 - self.free.len()
  }

  pub fn fresh_label(&mut self) -> u16 {
    let label = self.next_label;
    self.next_label += 1;
    debug_assert!(label < PAIR_KIND, "duplicator labels exhausted");
    label
  }

  // region Port access

  #[inline(always)]
  pub fn get(&self, p: PortAddr) -> u32 {
    self.nodes[(node_of(p) * 4 + slot_of(p)) as usize]
  }

  #[inline(always)]
  fn set(&mut self, p: PortAddr, value: u32) {
    self.nodes[(node_of(p) * 4 + slot_of(p)) as usize] = value;
  }

  #[inline(always)]
  fn meta(&self, node: u32) -> u32 {
    self.nodes[(node * 4 + 3) as usize]
  }

  #[inline(always)]
  pub fn node_type(&self, node: u32) -> NodeType {
    NodeType::from_bits((self.meta(node) >> TYPE_SHIFT) & 0b111)
  }

  pub fn set_node_type(&mut self, node: u32, ty: NodeType) {
    let meta = self.meta(node) & !(0b111 << TYPE_SHIFT);
    self.nodes[(node * 4 + 3) as usize] = meta | ((ty as u32) << TYPE_SHIFT);
  }

  #[inline(always)]
  pub fn kind(&self, node: u32) -> u16 {
    (self.meta(node) >> KIND_SHIFT) as u16
  }

  pub fn set_kind(&mut self, node: u32, kind: u16) {
    let meta = self.meta(node) & 0x0000_FFFF;
    self.nodes[(node * 4 + 3) as usize] = meta | ((kind as u32) << KIND_SHIFT);
  }

  #[inline(always)]
  pub fn port_flags(&self, node: u32) -> PortFlags {
    PortFlags::from_bits_truncate((self.meta(node) & 0b111) as u8)
  }

  /// Does this port hold an inlined numeric scalar?
  #[inline(always)]
  pub fn is_numeric(&self, p: PortAddr) -> bool {
    self.port_flags(node_of(p)).contains(flag_of(slot_of(p)))
  }

  fn set_numeric_flag(&mut self, p: PortAddr, on: bool) {
    let mut flags = self.port_flags(node_of(p));
    if on {
      flags.insert(flag_of(slot_of(p)));
    } else {
      flags.remove(flag_of(slot_of(p)));
    }
    let meta = (self.meta(node_of(p)) & !0b111) | flags.bits() as u32;
    self.nodes[(node_of(p) * 4 + 3) as usize] = meta;
  }

  // endregion Port access

  /// Wires two ports together. A principal-principal wire is a new active pair.
  pub fn link(&mut self, a: PortAddr, b: PortAddr) {
    self.set(a, b);
    self.set(b, a);
    self.set_numeric_flag(a, false);
    self.set_numeric_flag(b, false);
    if slot_of(a) == 0
        && slot_of(b) == 0
        && node_of(a) != ROOT_NODE
        && node_of(b) != ROOT_NODE
    {
      self.redexes.push((node_of(a), node_of(b)));
    }
  }

  /// Inlines a numeric scalar into a port. A scalar on a principal port is an active
  /// (numeric) redex, recorded as a self-pair.
  pub fn link_num(&mut self, p: PortAddr, value: u32) {
    self.set(p, value);
    self.set_numeric_flag(p, true);
    if slot_of(p) == 0 && node_of(p) != ROOT_NODE {
      self.redexes.push((node_of(p), node_of(p)));
    }
  }

  /// Moves whatever `from` holds (wire or scalar) onto `to`. A wire landing in a cell of a
  /// node that is mid-rewrite is re-read when that cell's own slot is processed, so chains
  /// through dying nodes resolve.
  pub fn relink(&mut self, from: PortAddr, to: PortAddr) {
    if self.is_numeric(from) {
      self.link_num(to, self.get(from));
    } else {
      let peer = self.get(from);
      self.link(to, peer);
    }
  }
}

impl Default for INet {
  fn default() -> Self {
    INet::new()
  }
}
