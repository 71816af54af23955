use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use registrar_core::{Course, CourseCode, CoursePatch, CourseStatus, CourseUpdate};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/courses", get(list_courses).post(add_course))
        .route(
            "/api/courses/{code}",
            get(course_status).patch(update_course).delete(delete_course),
        )
        .route("/api/courses/{code}/prerequisites", post(add_prerequisite))
        .route(
            "/api/courses/{code}/prerequisites/{prerequisite}",
            delete(remove_prerequisite),
        )
        .route(
            "/api/programs/{program}/levels/{level}",
            get(program_plan).put(assign_to_plan),
        )
        .route(
            "/api/programs/{program}/levels/{level}/courses/{code}",
            delete(remove_from_plan),
        )
}

async fn list_courses(State(state): State<AppState>) -> Result<Json<Vec<Course>>, ApiError> {
    Ok(Json(state.catalog.courses()?))
}

/// POST /api/courses - Add a course to the catalog.
async fn add_course(
    State(state): State<AppState>,
    Json(course): Json<Course>,
) -> Result<(StatusCode, Json<Course>), ApiError> {
    let course = state.catalog.add_course(course)?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// GET /api/courses/{code} - Course with its current seat usage.
async fn course_status(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<CourseStatus>, ApiError> {
    Ok(Json(state.coordinator.course_status(&CourseCode::new(code))?))
}

async fn update_course(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(patch): Json<CoursePatch>,
) -> Result<Json<CourseUpdate>, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Patch contains no changes",
        ));
    }
    Ok(Json(
        state.catalog.update_course(&CourseCode::new(code), &patch)?,
    ))
}

async fn delete_course(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete_course(&CourseCode::new(code))?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PrerequisiteRequest {
    pub prerequisite: CourseCode,
}

async fn add_prerequisite(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<PrerequisiteRequest>,
) -> Result<Json<Course>, ApiError> {
    let course = state
        .catalog
        .add_prerequisite(&CourseCode::new(code), &req.prerequisite)?;
    Ok(Json(course))
}

async fn remove_prerequisite(
    State(state): State<AppState>,
    Path((code, prerequisite)): Path<(String, String)>,
) -> Result<Json<Course>, ApiError> {
    let course = state
        .catalog
        .remove_prerequisite(&CourseCode::new(code), &CourseCode::new(prerequisite))?;
    Ok(Json(course))
}

#[derive(Debug, Serialize)]
struct PlanResponse {
    program: String,
    level: u32,
    courses: BTreeSet<CourseCode>,
}

async fn program_plan(
    State(state): State<AppState>,
    Path((program, level)): Path<(String, u32)>,
) -> Result<Json<PlanResponse>, ApiError> {
    let courses = state.catalog.program_plan(&program, level)?;
    Ok(Json(PlanResponse {
        program,
        level,
        courses,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub courses: Vec<CourseCode>,
}

/// PUT /api/programs/{program}/levels/{level} - Add courses to a plan level.
async fn assign_to_plan(
    State(state): State<AppState>,
    Path((program, level)): Path<(String, u32)>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<PlanResponse>, ApiError> {
    let courses = state.catalog.assign_to_plan(&program, level, &req.courses)?;
    Ok(Json(PlanResponse {
        program,
        level,
        courses,
    }))
}

async fn remove_from_plan(
    State(state): State<AppState>,
    Path((program, level, code)): Path<(String, u32, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .catalog
        .remove_from_plan(&program, level, &CourseCode::new(code))?;
    Ok(StatusCode::NO_CONTENT)
}
