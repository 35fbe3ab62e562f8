#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("REST: {0}")]
    Rest(#[from] pnw_rest::RestError),
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("REST: {0}")]
    Rest(#[from] pnw_rest::RestError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("configuration: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("wire: {0}")]
    Wire(#[from] pnw_wire::WireError),
    #[error("REST: {0}")]
    Rest(#[from] pnw_rest::RestError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("reconcile: {0}")]
    Reconcile(#[from] ReconcileError),
}
