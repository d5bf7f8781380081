#![allow(unused_imports)]
/*!

The public API of the library.

*/

pub mod error;
pub mod operator;
pub mod term;

pub use error::{Loc, RuntimeError, TypeError, TypeErrorKind};
pub use operator::BinOp;
pub use term::{BxTerm, MaybeTerm, Term, TermKind};

pub use crate::core::{
  analysis::{is_affine, is_terminating, uses},
  equality::equal,
  erasure::erase,
  reduce::{normalize, reduce, ReduceRule, ReduceRules},
  session::{CollectSink, Diagnostic, DiagnosticSink, LogSink, Session},
  substitution::{shift, subst, subst_many},
};
