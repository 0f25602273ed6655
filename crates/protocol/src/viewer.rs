use std::fmt;

/// Opaque handle of one connected viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewerId(uuid::Uuid);

impl ViewerId {
    /// Creates a fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ViewerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct() {
        assert_ne!(ViewerId::new(), ViewerId::new());
    }

    #[test]
    fn display_is_short() {
        assert_eq!(ViewerId::new().to_string().len(), 8);
    }
}
