use crate::repositories::api::ApiError;
use crate::repositories::storage::StoreError;

pub mod account;
pub mod budget;
pub mod events;
pub mod expenses;
pub mod location;
pub mod months;
pub mod notifications;
pub mod session;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please fill in all fields")]
    EmptyFields,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Value must not be empty")]
    EmptyValue,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Not signed in")]
    NotSignedIn,
    #[error("Logout failed: {0}")]
    Logout(String),
}
