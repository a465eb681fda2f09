//! Speech session state types.

/// The current state of the speech session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Permission has not been resolved yet
    #[default]
    NoPermission,
    /// Ready to start recording
    Available,
    /// Recognition can not be used (denied, restricted or failed to start)
    NotAvailable,
    /// Capturing audio and streaming it into the recognizer
    Recording,
    /// Capture halted, waiting for the recognizer to deliver its result
    Stopping,
}

/// Outcome of asking the platform for speech recognition permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Denied,
    Restricted,
    Undetermined,
}

impl Authorization {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Authorization::Authorized)
    }
}
