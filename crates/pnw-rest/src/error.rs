#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("request timed out or failed to connect: {0}")]
    Transient(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Http4xx { status: u16, body: String },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("GraphQL errors: {0:?}")]
    GraphQl(Vec<String>),
}
