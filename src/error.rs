use thiserror::Error;

/// Rejections raised while constructing a [`Listing`](crate::model::Listing).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListingError {
    #[error("price must not be negative, got {price}")]
    NegativePrice { price: i64 },

    #[error("quantity must be positive, got {quantity}")]
    NonPositiveQuantity { quantity: i64 },

    #[error("quantity {quantity} exceeds the largest stack a listing can hold")]
    QuantityTooLarge { quantity: i64 },

    #[error("listing carries neither a unit price nor a total price")]
    MissingPrice,
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid listing: {0}")]
    InvalidListing(#[from] ListingError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown purchase purpose '{0}' (expected flip, hold or use)")]
    UnknownPurpose(String),
}

pub type Result<T> = std::result::Result<T, Error>;
