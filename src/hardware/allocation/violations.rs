//! Violations
//!
//! Ordered list of user-correctable constraint failures produced while
//! validating a request or searching the inventory for it.

use serde::{Deserialize, Serialize};

/// Accumulated constraint failures; empty means valid
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Violations {
    messages: Vec<String>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding exactly one message
    pub fn of(message: impl Into<String>) -> Self {
        let mut violations = Self::new();
        violations.add_violation(message);
        violations
    }

    pub fn add_violation(&mut self, message: impl Into<String>) -> &mut Self {
        self.messages.push(message.into());
        self
    }

    pub fn add_missing_property_violation(&mut self, property: &str) -> &mut Self {
        self.add_violation(format!("Missing required property: {}", property))
    }

    pub fn has_violations(&self) -> bool {
        !self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(String::as_str)
    }

    /// Append all messages of `other`, keeping order
    pub fn extend(&mut self, other: Violations) -> &mut Self {
        self.messages.extend(other.messages);
        self
    }

    /// `Ok` when empty, otherwise the violations themselves
    pub fn into_result(self) -> Result<(), Violations> {
        if self.has_violations() {
            Err(self)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Display for Violations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, message) in self.messages.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "- {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for Violations {}

impl IntoIterator for Violations {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}
