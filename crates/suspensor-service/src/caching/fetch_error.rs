use thiserror::Error;

/// An error that happens when a resource fetch settles unsuccessfully.
///
/// This error is handed to every reader awaiting the same in-flight operation, so it
/// must be cheap to clone. Rich source errors are flattened into their message when
/// they are converted. Logging happens once, where the fetch settles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The fetch function reported that nothing exists for the request.
    #[error("not found")]
    NotFound,
    /// The fetch function failed for another reason.
    ///
    /// The attached string contains the rendered source error.
    #[error("fetch failed: {0}")]
    Failed(String),
}

impl From<anyhow::Error> for FetchError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{err:#}"))
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound;
        }
        Self::Failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_anyhow_keeps_context() {
        let err = anyhow::anyhow!("connection reset").context("loading quote for aapl");
        assert_eq!(
            FetchError::from(err),
            FetchError::Failed("loading quote for aapl: connection reset".into())
        );
    }

    #[test]
    fn test_from_io_not_found() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(FetchError::from(err), FetchError::NotFound);
    }
}
