use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedPerson;
use crate::care::{workflow, PersonType};
use crate::error::{AppError, AppResult};
use crate::routes::PersonSummary;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AssignPatientRequest {
    pub patient_id: i32,
}

#[derive(Serialize)]
pub struct AssignPatientResponse {
    pub caregiver_id: i32,
    pub patient_id: i32,
}

#[derive(Serialize)]
pub struct PrimaryCaregiverResponse {
    pub caregiver: Option<PersonSummary>,
}

pub async fn list_caregiver_patients(
    State(state): State<AppState>,
    caller: AuthenticatedPerson,
    Path(caregiver_id): Path<i32>,
) -> AppResult<Json<Vec<PersonSummary>>> {
    if caller.role != PersonType::Caregiver || caller.person_id != caregiver_id {
        return Err(AppError::forbidden());
    }

    let mut conn = state.db()?;
    let patients = workflow::list_my_patients(&mut conn, caregiver_id)?;
    Ok(Json(patients.into_iter().map(PersonSummary::from).collect()))
}

pub async fn list_patient_caregivers(
    State(state): State<AppState>,
    caller: AuthenticatedPerson,
    Path(patient_id): Path<i32>,
) -> AppResult<Json<Vec<PersonSummary>>> {
    let mut conn = state.db()?;
    if !workflow::can_view_patient(&mut conn, caller.person(), patient_id)? {
        return Err(AppError::forbidden());
    }

    let caregivers = workflow::list_my_caregivers(&mut conn, patient_id)?;
    Ok(Json(caregivers.into_iter().map(PersonSummary::from).collect()))
}

pub async fn primary_caregiver(
    State(state): State<AppState>,
    caller: AuthenticatedPerson,
    Path(patient_id): Path<i32>,
) -> AppResult<Json<PrimaryCaregiverResponse>> {
    let mut conn = state.db()?;
    if !workflow::can_view_patient(&mut conn, caller.person(), patient_id)? {
        return Err(AppError::forbidden());
    }

    let caregiver = workflow::primary_caregiver(&mut conn, patient_id)?;
    Ok(Json(PrimaryCaregiverResponse {
        caregiver: caregiver.map(PersonSummary::from),
    }))
}

pub async fn assign_patient(
    State(state): State<AppState>,
    caller: AuthenticatedPerson,
    Json(payload): Json<AssignPatientRequest>,
) -> AppResult<(StatusCode, Json<AssignPatientResponse>)> {
    let caregiver_id = caller.require_caregiver()?;

    let mut conn = state.db()?;
    workflow::assign(&mut conn, caregiver_id, payload.patient_id)?;

    Ok((
        StatusCode::CREATED,
        Json(AssignPatientResponse {
            caregiver_id,
            patient_id: payload.patient_id,
        }),
    ))
}
