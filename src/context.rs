//! Shared per-file state: the most recent error and the logger.
//!
//! A `Context` is reference-counted with [`std::rc::Rc`] rather than
//! [`std::sync::Arc`] because sharing is confined to the single-owner tree
//! rooted at one [`crate::file::File`] (see the concurrency notes in the
//! design document): the parser, the block catalog, and every derived
//! value view hold a clone of the same `Rc` without ever crossing a thread
//! boundary.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::log::{LogLevel, Logger};

#[derive(Debug, Default)]
struct Inner {
    last_error: Option<String>,
    logger: Logger,
}

/// Shared error slot and logger threaded through a file and everything
/// derived from it.
#[derive(Clone)]
pub struct Context(Rc<RefCell<Inner>>);

impl Context {
    pub fn new() -> Context {
        Context(Rc::new(RefCell::new(Inner::default())))
    }

    /// Record the most recent error, overwriting any previous one.
    pub fn set_error(&self, message: impl fmt::Display) {
        let text = message.to_string();
        self.log(LogLevel::Error, &text);
        self.0.borrow_mut().last_error = Some(text);
    }

    /// Clear the most recent error.
    pub fn clear_error(&self) {
        self.0.borrow_mut().last_error = None;
    }

    /// The most recent error recorded on this context, if any.
    pub fn last_error(&self) -> Option<String> {
        self.0.borrow().last_error.clone()
    }

    pub fn log(&self, level: LogLevel, message: impl fmt::Display) {
        self.0.borrow().logger.log(level, message);
    }

    pub fn log_level(&self) -> LogLevel {
        self.0.borrow().logger.level()
    }

    pub fn set_log_level(&self, level: LogLevel) {
        self.0.borrow_mut().logger.set_level(level);
    }

    pub fn set_log_sink(&self, sink: Box<dyn crate::log::LogSink>) {
        self.0.borrow_mut().logger.set_sink(sink);
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("last_error", &self.0.borrow().last_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_round_trips() {
        let ctx = Context::new();
        assert!(ctx.last_error().is_none());
        ctx.set_error("boom");
        assert_eq!(ctx.last_error().as_deref(), Some("boom"));
        ctx.clear_error();
        assert!(ctx.last_error().is_none());
    }

    #[test]
    fn clones_share_state() {
        let ctx = Context::new();
        let clone = ctx.clone();
        clone.set_error("shared");
        assert_eq!(ctx.last_error().as_deref(), Some("shared"));
    }
}
