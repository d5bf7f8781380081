/*!

Threshold-based logging facade.

The (crate) public interface consists of `set_global_logging_threshold()`/
`get_global_logging_threshold()` and the macros `critical!`, `error!`, `warning!`, `info!`,
`debug!`, and `trace!`. Each macro takes a numeric verbosity level as its first argument; the
message is emitted only when the level does not exceed the global threshold. The backing
implementation is [`tracing`], installed lazily by `init_logging()` (or on first use of
`set_global_logging_threshold`).

*/

use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

use once_cell::sync::OnceCell;

static LOGGING_THRESHOLD: AtomicUsize = AtomicUsize::new(1);
static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();

/// Installs the global `tracing` subscriber. Idempotent; safe to call from tests that race.
pub fn init_logging() {
  SUBSCRIBER_INSTALLED.get_or_init(|| {
    // A second subscriber may already be installed by the embedding application. That is fine;
    // we just keep whatever is there.
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::level_filters::LevelFilter::TRACE)
        .with_target(false)
        .try_init();
  });
}

#[inline(always)]
pub fn set_global_logging_threshold(threshold: usize) {
  init_logging();
  LOGGING_THRESHOLD.store(threshold, Relaxed);
}

#[inline(always)]
pub fn get_global_logging_threshold() -> usize {
  LOGGING_THRESHOLD.load(Relaxed)
}

#[macro_export]
macro_rules! critical {
  ($level:expr, $($arg:tt)*) => {
    if $level <= $crate::log::get_global_logging_threshold() {
      $crate::tracing::error!(target: "ontic", $($arg)*);
    }
  };
}

#[macro_export]
macro_rules! error {
  ($level:expr, $($arg:tt)*) => {
    if $level <= $crate::log::get_global_logging_threshold() {
      $crate::tracing::error!(target: "ontic", $($arg)*);
    }
  };
}

#[macro_export]
macro_rules! warning {
  ($level:expr, $($arg:tt)*) => {
    if $level <= $crate::log::get_global_logging_threshold() {
      $crate::tracing::warn!(target: "ontic", $($arg)*);
    }
  };
}

#[macro_export]
macro_rules! info {
  ($level:expr, $($arg:tt)*) => {
    if $level <= $crate::log::get_global_logging_threshold() {
      $crate::tracing::info!(target: "ontic", $($arg)*);
    }
  };
}

#[macro_export]
macro_rules! debug {
  ($level:expr, $($arg:tt)*) => {
    if $level <= $crate::log::get_global_logging_threshold() {
      $crate::tracing::debug!(target: "ontic", $($arg)*);
    }
  };
}

#[macro_export]
macro_rules! trace {
  ($level:expr, $($arg:tt)*) => {
    if $level <= $crate::log::get_global_logging_threshold() {
      $crate::tracing::trace!(target: "ontic", $($arg)*);
    }
  };
}

// The macros are exported at the crate root by `#[macro_export]`; re-export them here so both
// `ontic_abs::debug!` and `ontic_abs::log::debug!` resolve.
pub use crate::{critical, debug, error, info, trace, warning};
