use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use registrar_core::{CourseCode, Student, StudentId, StudentRemoval};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/students", post(add_student))
        .route("/api/students/{id}", get(get_student).delete(delete_student))
        .route("/api/students/{id}/completed", post(record_completion))
}

/// POST /api/students - Create a student record.
async fn add_student(
    State(state): State<AppState>,
    Json(student): Json<Student>,
) -> Result<(StatusCode, Json<Student>), ApiError> {
    let student = state.catalog.add_student(student)?;
    Ok((StatusCode::CREATED, Json(student)))
}

async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Student>, ApiError> {
    Ok(Json(state.catalog.student(&StudentId::new(id))?))
}

/// DELETE /api/students/{id} - Delete a student, handing their seats to the
/// waitlist.
async fn delete_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StudentRemoval>, ApiError> {
    Ok(Json(state.catalog.delete_student(&StudentId::new(id))?))
}

#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    pub course: CourseCode,
}

/// POST /api/students/{id}/completed - Mark a course as completed.
async fn record_completion(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CompletionRequest>,
) -> Result<Json<Student>, ApiError> {
    let student = state
        .catalog
        .record_completion(&StudentId::new(id), &req.course)?;
    Ok(Json(student))
}
