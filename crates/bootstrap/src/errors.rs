use sqlx::error::ErrorKind;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Connection error: {0}")]
    Connection(#[source] sqlx::Error),

    /// Carries the store's message unmodified.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

/// `invalid_column_reference`: no unique index matches an `ON CONFLICT` target.
const NO_MATCHING_CONFLICT_TARGET: &str = "42P10";

impl From<sqlx::Error> for BootstrapError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db)
                if db.code().as_deref() == Some(NO_MATCHING_CONFLICT_TARGET) =>
            {
                BootstrapError::InvalidConfiguration(format!(
                    "layer natural key does not match the schema revision of the store: {}",
                    db.message()
                ))
            }
            sqlx::Error::Database(db) => match db.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    debug!(code = ?db.code(), constraint = ?db.constraint(), "constraint violated");
                    BootstrapError::ConstraintViolation(db.message().to_string())
                }
                _ => BootstrapError::Database(err),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => BootstrapError::Connection(err),
            _ => BootstrapError::Database(err),
        }
    }
}
