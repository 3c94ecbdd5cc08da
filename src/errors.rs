use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Machine-readable error payload handed to the API/UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error code (e.g. "insufficient_stock")
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Whether the caller may retry the same request unchanged
    pub retryable: bool,
    /// Offending columns for import failures
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub missing_columns: Vec<String>,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Reservation conflict: {0}")]
    ReservationConflict(String),

    #[error("Duplicate SKU: {0}")]
    DuplicateSku(String),

    #[error("Duplicate variant axis: {0}")]
    DuplicateVariantAxis(String),

    #[error("Missing image selection: {0}")]
    MissingImageSelection(String),

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("CSV error: {0}")]
    Csv(
        #[from]
        #[serde(skip)]
        csv::Error,
    ),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Stable code for each error kind. This is the single source of truth
    /// for error-to-code mapping.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidQuantity(_) => "invalid_quantity",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::ReservationConflict(_) => "reservation_conflict",
            Self::DuplicateSku(_) => "duplicate_sku",
            Self::DuplicateVariantAxis(_) => "duplicate_variant_axis",
            Self::MissingImageSelection(_) => "missing_image_selection",
            Self::MissingColumns(_) => "missing_columns",
            Self::ValidationError(_) => "validation_error",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::Csv(_) => "csv_error",
            Self::EventError(_) => "event_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Concurrency conflicts can be retried against freshly read state.
    /// Business-rule violations need the caller to change the request first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }

    /// Returns the message suitable for end users.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::InternalError(_) | Self::EventError(_) => "Internal error".to_string(),
            Self::ConcurrentModification(id) => {
                format!("Variant {} was modified concurrently, please retry", id)
            }
            Self::MissingColumns(columns) => {
                format!("Missing required columns: {}", columns.join(", "))
            }
            _ => self.to_string(),
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.response_message(),
            retryable: self.is_retryable(),
            missing_columns: match self {
                Self::MissingColumns(columns) => columns.clone(),
                _ => Vec::new(),
            },
        }
    }
}
