use thiserror::Error;

/// A registry error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The address has no record in the registry.
    #[error("allocation at {0:#x} is not tracked by this registry")]
    Untracked(usize),
    /// A slice does not have the length required by an array handle.
    #[error("expected an array of {expected} elements, found {found}")]
    LengthMismatch { expected: usize, found: usize },
}
