use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("{method} {url}: {source}")]
    Transport {
        method: String,
        url:    String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url}: unexpected status {status}: {code}: {message}")]
    UnexpectedStatus {
        method:  String,
        url:     String,
        status:  u16,
        code:    String,
        message: String,
    },

    #[error("bad API response from {url}: {message}")]
    BadResponse { url: String, message: String },

    #[error("encoding request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("cannot {operation} {entity} with nil ID")]
    MissingId {
        operation: &'static str,
        entity:    &'static str,
    },

    #[error("acquiring access token: {0}")]
    Auth(String),

    #[error("{entity} with ID {id:?} has unrecognized type {odata_type:?}")]
    UnrecognizedType {
        entity:     &'static str,
        id:         String,
        odata_type: Option<String>,
    },
}

impl GraphError {
    /// HTTP status of the response that caused this error, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            GraphError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
