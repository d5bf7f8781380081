#![allow(dead_code)]
/*!

Kernel of a dependently typed language: a small uniform term language (dependent functions,
self types for data encodings, machine-word numerics, holes, and named global references)
together with

 - capture-avoiding substitution and normalization by evaluation,
 - definitional equality modulo delta/beta/numeric reduction with unification of holes,
 - bidirectional type checking,
 - affinity and recursion analyses,
 - a compact pointer-graph runtime reducing by lazy copy-on-use rewriting, and
 - a symmetric interaction-net runtime reducing by local rewrite rules.

The `api` module is the public surface; `core` holds the machinery.

*/

pub mod api;
pub mod core;

// Configuration

/// Indentation used by multi-line debug formatting.
pub(crate) const DISPLAY_INDENT: usize = 2;

pub use ontic_abs::hash::HashType;
