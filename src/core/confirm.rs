//! Confirmation gate - Two-phase approval for destructive commands

/// Operator answer to a confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Confirmed,
    Cancelled,
}

/// Asks the operator before a command runs. Implemented by the UI layer.
pub trait ConfirmationGate {
    fn request_confirmation(&self, message: &str) -> Decision;
}

/// Gate that approves everything, for headless hosts
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl ConfirmationGate for AlwaysConfirm {
    fn request_confirmation(&self, _message: &str) -> Decision {
        Decision::Confirmed
    }
}

impl<F> ConfirmationGate for F
where
    F: Fn(&str) -> Decision,
{
    fn request_confirmation(&self, message: &str) -> Decision {
        self(message)
    }
}
