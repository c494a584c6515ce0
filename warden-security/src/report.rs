use serde::{Deserialize, Serialize};

/// Outcome of one [`crate::SecurityValidator::validate_code`] call.
///
/// `risks` flip `safe` to false; `warnings` are advisory only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityReport {
    pub safe: bool,
    pub risks: Vec<String>,
    pub warnings: Vec<String>,
}

impl SecurityReport {
    pub(crate) fn new() -> Self {
        Self {
            safe: true,
            risks: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn risk(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.risks.contains(&message) {
            self.risks.push(message);
        }
        self.safe = false;
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }
}
