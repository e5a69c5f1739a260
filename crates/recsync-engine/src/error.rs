//! Engine error categorisation.

use recsync_state::StateError;
use recsync_store::StoreError;

use crate::dispatch::DispatchError;
use crate::registry::RegistryError;

/// Error raised while synchronizing.
///
/// Store and dispatch errors fail the current record type only; the rest
/// end the orchestration.
#[derive(Debug)]
pub enum SyncError {
    /// Run request names something the registry does not know.
    Registry(RegistryError),
    /// Source store read or write failure.
    Store(StoreError),
    /// Bulk tool invocation failure.
    Dispatch(DispatchError),
    /// Status backend failure.
    State(StateError),
    /// Infrastructure error (task join, runtime, etc.)
    Infrastructure(anyhow::Error),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registry(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "source store error: {e}"),
            Self::Dispatch(e) => write!(f, "{e}"),
            Self::State(e) => write!(f, "status backend error: {e}"),
            Self::Infrastructure(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<anyhow::Error> for SyncError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}

impl From<RegistryError> for SyncError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<DispatchError> for SyncError {
    fn from(e: DispatchError) -> Self {
        Self::Dispatch(e)
    }
}

impl From<StateError> for SyncError {
    fn from(e: StateError) -> Self {
        Self::State(e)
    }
}

impl SyncError {
    /// Returns `true` if the whole orchestration must stop.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::Dispatch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_level_errors_are_not_fatal() {
        assert!(!SyncError::Store(StoreError::SheetNotFound("Product2".into())).is_fatal());
        assert!(!SyncError::Dispatch(DispatchError::CommandTimeout { secs: 5 }).is_fatal());
        assert!(SyncError::State(StateError::LockPoisoned).is_fatal());
        assert!(SyncError::from(anyhow::anyhow!("join failed")).is_fatal());
    }

    #[test]
    fn display_prefixes_origin() {
        let err = SyncError::Store(StoreError::SheetNotFound("Product2".into()));
        assert_eq!(err.to_string(), "source store error: sheet 'Product2' not found");
        let err = SyncError::from(anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), "boom");
    }
}
