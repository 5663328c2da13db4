use thiserror::Error;

/// Errors that can occur when interacting with the stock ledger.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored quantity does not fit the ledger's quantity type.
    #[error("Stored quantity for '{sku}' is out of range: {value}")]
    QuantityOutOfRange { sku: String, value: i64 },
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
