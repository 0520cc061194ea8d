//! Diagnostics sink for blueprint resolution.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// One recorded resolution problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub location: String,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.location, self.message)
        }
    }
}

/// Shared log that any number of collectors write into.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    errors: Arc<Mutex<Vec<SyntaxError>>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A collector that tags its messages with `location`.
    pub fn collector(&self, location: impl Into<String>) -> SyntaxErrorCollector {
        SyntaxErrorCollector {
            location: location.into(),
            log: self.clone(),
        }
    }

    pub fn errors(&self) -> Vec<SyntaxError> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SyntaxError>> {
        match self.errors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Attached to a textual blueprint node; receives the messages of every
/// failure detected while resolving that node.
#[derive(Debug, Clone)]
pub struct SyntaxErrorCollector {
    location: String,
    log: ErrorLog,
}

impl SyntaxErrorCollector {
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn add_error_message(&self, message: impl Into<String>) {
        self.log.lock().push(SyntaxError {
            location: self.location.clone(),
            message: message.into(),
        });
    }
}
