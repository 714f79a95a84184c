//! Error types for the relay subsystem.
//!
//! Only two conditions ever reach the caller: a fatal configuration problem
//! and a submission that failed on both RPC endpoints. Everything else is
//! absorbed with compensating policy inside the owning component.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("HTTP transport error: {0}")]
    Transport(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Unexpected RPC response: {0}")]
    BadResponse(String),
    #[error("Timed out waiting for transaction receipt: {0}")]
    ReceiptTimeout(String),
}

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Derived address {derived} does not match configured address {configured}")]
    AddressMismatch { configured: String, derived: String },
    #[error("Invalid key material: {0}")]
    InvalidKey(String),
    #[error("Failed to sign transaction: {0}")]
    Signing(String),
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Entry already exists: {0}")]
    AlreadyExists(String),
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Repository error: {0}")]
    Other(String),
}

/// Top-level error surfaced by the relay orchestrator.
#[derive(Error, Debug)]
pub enum RelayerError {
    /// Fatal and never retried: misconfigured wallet pool, malformed request.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Both endpoints rejected the transaction.
    #[error("Submission failed on primary ({primary}) and secondary ({secondary}) endpoints")]
    Submission { primary: String, secondary: String },

    /// A relayer wallet is underfunded and auto-funding is not allowed.
    #[error("Relayer wallet {address} balance {balance} is below the minimum {minimum}")]
    FundingShortfall {
        address: String,
        balance: String,
        minimum: String,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<SignerError> for RelayerError {
    fn from(error: SignerError) -> Self {
        // Any signing failure means the pool was misconfigured; never retried.
        RelayerError::Configuration(error.to_string())
    }
}

impl RelayerError {
    /// Whether the secondary endpoint may still be attempted.
    pub fn is_transient(&self) -> bool {
        matches!(self, RelayerError::Provider(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signer_errors_become_configuration_errors() {
        let err: RelayerError = SignerError::AddressMismatch {
            configured: "0xaa".into(),
            derived: "0xbb".into(),
        }
        .into();
        assert!(matches!(err, RelayerError::Configuration(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn provider_errors_are_transient() {
        let err: RelayerError = ProviderError::Rpc("nonce too low".into()).into();
        assert!(err.is_transient());
    }

    #[test]
    fn submission_error_is_terminal() {
        let err = RelayerError::Submission {
            primary: "timeout".into(),
            secondary: "rejected".into(),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("primary"));
    }
}
