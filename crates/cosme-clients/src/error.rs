use cosme_pipeline::CollaboratorError;
use thiserror::Error;

/// Errors returned by the external service adapters.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The response was well-formed but carried nothing usable.
    #[error("{0}")]
    EmptyResponse(String),

    /// No access token could be obtained for the storage API.
    #[error("storage authentication failed: {0}")]
    Auth(String),

    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("render process failed: {0}")]
    Process(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ClientError> for CollaboratorError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Io(e) => CollaboratorError::Io(e),
            e @ (ClientError::Http(_) | ClientError::Status { .. } | ClientError::Auth(_)) => {
                CollaboratorError::Request(e.to_string())
            }
            e => CollaboratorError::InvalidResponse(e.to_string()),
        }
    }
}

/// Reads a non-success response into [`ClientError::Status`], keeping at
/// most the first 500 bytes of the body.
pub(crate) async fn status_error(service: &'static str, response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > 500 {
        let mut cut = 500;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    ClientError::Status {
        service,
        status,
        body,
    }
}
