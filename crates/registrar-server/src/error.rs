use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use registrar_core::{CatalogError, RegistrationError, StorageError};

/// Error response: a status code and a JSON body `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn storage(e: StorageError) -> Self {
        match e {
            StorageError::ConstraintViolation(_) => Self::new(StatusCode::CONFLICT, e.to_string()),
            StorageError::Database(_) => {
                tracing::error!("{}", e);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<RegistrationError> for ApiError {
    fn from(e: RegistrationError) -> Self {
        let status = match &e {
            RegistrationError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RegistrationError::UnknownStudent(_) | RegistrationError::UnknownCourse(_) => {
                StatusCode::NOT_FOUND
            }
            RegistrationError::DuplicateRegistration { .. } => StatusCode::CONFLICT,
            RegistrationError::NotRegistered { .. } | RegistrationError::NotWaitlisted { .. } => {
                StatusCode::BAD_REQUEST
            }
            RegistrationError::Storage(storage) => return Self::storage(storage.clone()),
        };
        Self::new(status, e.to_string())
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        let status = match &e {
            CatalogError::CourseNotFound(_)
            | CatalogError::StudentNotFound(_)
            | CatalogError::PrerequisiteNotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::CourseExists(_)
            | CatalogError::StudentExists(_)
            | CatalogError::PrerequisiteCycle { .. }
            | CatalogError::CourseInUse(_)
            | CatalogError::CapacityBelowEnrollment { .. } => StatusCode::CONFLICT,
            CatalogError::InvalidCourse(_)
            | CatalogError::InvalidStudent(_)
            | CatalogError::InvalidPlan(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CatalogError::Storage(storage) => return Self::storage(storage.clone()),
        };
        Self::new(status, e.to_string())
    }
}
