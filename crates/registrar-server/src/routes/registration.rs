use std::collections::{BTreeSet, HashMap};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use registrar_core::{CourseCode, StudentId, Timetable, ValidationReport};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/registrations/validate", post(validate))
        .route(
            "/api/students/{id}/registrations",
            get(registered_courses).post(register),
        )
        .route("/api/students/{id}/registrations/{code}", delete(drop_course))
        .route(
            "/api/students/{id}/waitlist/{code}",
            get(waitlist_position).delete(withdraw),
        )
        .route("/api/students/{id}/timetable", get(timetable))
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub courses: Vec<CourseCode>,
    #[serde(default)]
    pub completed: BTreeSet<CourseCode>,
    pub program: String,
    pub level: u32,
    #[serde(default)]
    pub enrollments: HashMap<CourseCode, u32>,
}

/// POST /api/registrations/validate - Check a course set without registering.
async fn validate(
    State(state): State<AppState>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ValidationReport>, ApiError> {
    let report = state.coordinator.validate_registration(
        &req.courses,
        &req.completed,
        &req.program,
        req.level,
        &req.enrollments,
    )?;
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
struct RegisteredCoursesResponse {
    student: StudentId,
    courses: Vec<CourseCode>,
}

async fn registered_courses(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RegisteredCoursesResponse>, ApiError> {
    let student = StudentId::new(id);
    let courses = state.coordinator.get_registered_courses(&student)?;
    Ok(Json(RegisteredCoursesResponse { student, courses }))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub courses: Vec<CourseCode>,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    message: String,
    registered: Vec<CourseCode>,
    waitlisted: Vec<CourseCode>,
}

/// POST /api/students/{id}/registrations - Register for a batch of courses.
async fn register(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let outcome = state
        .coordinator
        .register_courses(&StudentId::new(id), &req.courses)?;

    Ok(Json(RegisterResponse {
        message: outcome.to_string(),
        registered: outcome.registered,
        waitlisted: outcome.waitlisted,
    }))
}

#[derive(Debug, Serialize)]
struct DropResponse {
    message: String,
    dropped: CourseCode,
    promoted: Option<StudentId>,
}

/// DELETE /api/students/{id}/registrations/{code} - Drop a course.
async fn drop_course(
    State(state): State<AppState>,
    Path((id, code)): Path<(String, String)>,
) -> Result<Json<DropResponse>, ApiError> {
    let outcome = state
        .coordinator
        .drop_course(&StudentId::new(id), &CourseCode::new(code))?;

    Ok(Json(DropResponse {
        message: outcome.to_string(),
        dropped: outcome.dropped,
        promoted: outcome.promoted,
    }))
}

#[derive(Debug, Serialize)]
struct PositionResponse {
    course: CourseCode,
    position: usize,
}

async fn waitlist_position(
    State(state): State<AppState>,
    Path((id, code)): Path<(String, String)>,
) -> Result<Json<PositionResponse>, ApiError> {
    let course = CourseCode::new(code);
    let position = state
        .coordinator
        .get_waitlist_position(&StudentId::new(id), &course)?;
    Ok(Json(PositionResponse { course, position }))
}

async fn withdraw(
    State(state): State<AppState>,
    Path((id, code)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .coordinator
        .withdraw_from_waitlist(&StudentId::new(id), &CourseCode::new(code))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn timetable(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Timetable>, ApiError> {
    Ok(Json(state.coordinator.timetable(&StudentId::new(id))?))
}
