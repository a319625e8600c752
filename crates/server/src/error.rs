use kolflow_common::error::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("database error: {0}")]
    Database(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for ServerError {
    fn from(e: rusqlite::Error) -> Self {
        ServerError::Database(e.to_string())
    }
}

impl From<ServerError> for ApiError {
    fn from(e: ServerError) -> Self {
        match e {
            // Store failures are retryable; never report partial state.
            ServerError::Database(msg) => {
                tracing::error!(error = %msg, "data store unavailable");
                ApiError::unavailable("data store unavailable")
            }
            ServerError::Other(err) => {
                tracing::error!(?err, "internal error");
                ApiError::internal("internal server error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ServerError;
    use kolflow_common::error::ApiError;

    #[test]
    fn database_errors_map_to_unavailable() {
        let api: ApiError = ServerError::Database("locked".to_string()).into();
        assert_eq!(api.status, 503);
    }
}
