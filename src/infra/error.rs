use std::net::SocketAddr;

use thiserror::Error;

use crate::cache::StoreError;

/// Failures while wiring the process together: listeners, pools, stores and logging.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("failed to bind listener on {addr}: {source}")]
    Listener {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("database error: {message}")]
    Database { message: String },
    #[error("cache store error: {0}")]
    CacheStore(#[from] StoreError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn listener(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Listener { addr, source }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_error_names_address() {
        let addr: SocketAddr = "127.0.0.1:8000".parse().expect("addr");
        let err = InfraError::listener(
            addr,
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        );
        assert_eq!(
            err.to_string(),
            "failed to bind listener on 127.0.0.1:8000: address in use"
        );
    }

    #[test]
    fn store_errors_convert() {
        let err = InfraError::from(StoreError::unavailable("connection refused"));
        assert!(matches!(err, InfraError::CacheStore(StoreError::Unavailable(_))));
    }
}
