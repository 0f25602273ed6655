//! Circular presence-status rotation.

/// Cycles through a fixed list of status strings.
#[derive(Debug, Clone)]
pub struct StatusRotation {
    messages: Vec<String>,
    index: usize,
}

impl StatusRotation {
    pub fn new(messages: Vec<String>) -> Self {
        Self { messages, index: 0 }
    }

    /// Returns `true` when there is nothing to rotate.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the current status.
    pub fn current(&self) -> Option<&str> {
        self.messages.get(self.index).map(String::as_str)
    }

    /// Moves to the next status, wrapping after the last one.
    pub fn advance(&mut self) -> Option<&str> {
        if self.messages.is_empty() {
            return None;
        }
        self.index = (self.index + 1) % self.messages.len();
        self.current()
    }

    /// Restarts from the first status.
    pub fn reset(&mut self) {
        self.index = 0;
    }
}
