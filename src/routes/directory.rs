use axum::{
    extract::{Path, State},
    Json,
};

use crate::auth::AuthenticatedPerson;
use crate::care::{directory, PersonType};
use crate::error::{AppError, AppResult};
use crate::routes::PersonSummary;
use crate::state::AppState;

/// Patient contact details are only browsable by caregivers.
pub async fn list_patients(
    State(state): State<AppState>,
    caller: AuthenticatedPerson,
) -> AppResult<Json<Vec<PersonSummary>>> {
    caller.require_caregiver()?;
    list_people(&state, PersonType::Patient)
}

pub async fn list_caregivers(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<PersonSummary>>> {
    list_people(&state, PersonType::Caregiver)
}

pub async fn get_patient(
    State(state): State<AppState>,
    caller: AuthenticatedPerson,
    Path(patient_id): Path<i32>,
) -> AppResult<Json<PersonSummary>> {
    if caller.role == PersonType::Patient && caller.person_id != patient_id {
        return Err(AppError::forbidden());
    }
    get_person(&state, PersonType::Patient, patient_id)
}

pub async fn get_caregiver(
    State(state): State<AppState>,
    Path(caregiver_id): Path<i32>,
) -> AppResult<Json<PersonSummary>> {
    get_person(&state, PersonType::Caregiver, caregiver_id)
}

fn list_people(state: &AppState, person_type: PersonType) -> AppResult<Json<Vec<PersonSummary>>> {
    let mut conn = state.db()?;
    let people = directory::list(&mut conn, person_type)?;
    Ok(Json(people.into_iter().map(PersonSummary::from).collect()))
}

fn get_person(state: &AppState, person_type: PersonType, id: i32) -> AppResult<Json<PersonSummary>> {
    let mut conn = state.db()?;
    let person = directory::require(&mut conn, person_type, id)?;
    Ok(Json(PersonSummary::from(person)))
}
