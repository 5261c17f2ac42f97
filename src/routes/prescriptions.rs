use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedPerson;
use crate::care::prescriptions::{self, PrescriptionInput};
use crate::care::{directory, workflow, PersonType};
use crate::error::{AppError, AppResult};
use crate::models::Prescription;
use crate::routes::{ensure_max_len, to_iso};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PrescriptionItem {
    pub name: String,
    pub amount: String,
    pub frequency: String,
}

#[derive(Deserialize)]
pub struct AddPrescriptionsRequest {
    pub prescriptions: Vec<PrescriptionItem>,
}

#[derive(Serialize)]
pub struct PrescriptionResponse {
    pub id: i32,
    pub patient_id: i32,
    pub name: String,
    pub amount: String,
    pub frequency: String,
    pub prescribed_by: Option<i32>,
    pub created_at: String,
}

impl From<Prescription> for PrescriptionResponse {
    fn from(row: Prescription) -> Self {
        Self {
            id: row.id,
            patient_id: row.patient_id,
            name: row.name,
            amount: row.amount,
            frequency: row.frequency,
            prescribed_by: row.prescribed_by,
            created_at: to_iso(row.created_at),
        }
    }
}

pub async fn list_prescriptions(
    State(state): State<AppState>,
    caller: AuthenticatedPerson,
    Path(patient_id): Path<i32>,
) -> AppResult<Json<Vec<PrescriptionResponse>>> {
    let mut conn = state.db()?;
    directory::require(&mut conn, PersonType::Patient, patient_id)?;
    if !workflow::can_view_patient(&mut conn, caller.person(), patient_id)? {
        return Err(AppError::forbidden());
    }

    let rows = prescriptions::list_for_patient(&mut conn, patient_id)?;
    Ok(Json(rows.into_iter().map(PrescriptionResponse::from).collect()))
}

pub async fn add_prescriptions(
    State(state): State<AppState>,
    caller: AuthenticatedPerson,
    Path(patient_id): Path<i32>,
    Json(payload): Json<AddPrescriptionsRequest>,
) -> AppResult<(StatusCode, Json<Vec<PrescriptionResponse>>)> {
    validate_items(&payload.prescriptions)?;

    let mut conn = state.db()?;
    directory::require(&mut conn, PersonType::Patient, patient_id)?;
    if !workflow::can_view_patient(&mut conn, caller.person(), patient_id)? {
        return Err(AppError::forbidden());
    }

    let prescribed_by = match caller.role {
        PersonType::Caregiver => Some(caller.person_id),
        PersonType::Patient => None,
    };
    let items: Vec<PrescriptionInput<'_>> = payload
        .prescriptions
        .iter()
        .map(|item| PrescriptionInput {
            name: &item.name,
            amount: &item.amount,
            frequency: &item.frequency,
        })
        .collect();

    let inserted = prescriptions::add_for_patient(&mut conn, patient_id, prescribed_by, &items)?;
    tracing::info!(
        patient_id,
        count = inserted.len(),
        "prescriptions added"
    );

    Ok((
        StatusCode::CREATED,
        Json(inserted.into_iter().map(PrescriptionResponse::from).collect()),
    ))
}

fn validate_items(items: &[PrescriptionItem]) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::bad_request("prescriptions must not be empty"));
    }
    if items.iter().any(|item| item.name.trim().is_empty()) {
        return Err(AppError::bad_request("prescription name must not be empty"));
    }
    for item in items {
        ensure_max_len("name", item.name.trim(), prescriptions::MAX_NAME_LEN)?;
        ensure_max_len("amount", item.amount.trim(), prescriptions::MAX_DOSE_LEN)?;
        ensure_max_len("frequency", item.frequency.trim(), prescriptions::MAX_DOSE_LEN)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_items, PrescriptionItem};

    fn item(name: &str) -> PrescriptionItem {
        PrescriptionItem {
            name: name.to_string(),
            amount: "10mg".to_string(),
            frequency: "daily".to_string(),
        }
    }

    #[test]
    fn rejects_empty_batches() {
        assert!(validate_items(&[]).is_err());
    }

    #[test]
    fn rejects_blank_names_anywhere_in_batch() {
        assert!(validate_items(&[item("Aspirin"), item("  ")]).is_err());
        assert!(validate_items(&[item("Aspirin"), item("Metformin")]).is_ok());
    }

    #[test]
    fn rejects_fields_wider_than_their_columns() {
        assert!(validate_items(&[item(&"n".repeat(256))]).is_err());
        assert!(validate_items(&[item(&"n".repeat(255))]).is_ok());

        let mut long_amount = item("Aspirin");
        long_amount.amount = "9".repeat(101);
        assert!(validate_items(&[item("Metformin"), long_amount]).is_err());

        let mut long_frequency = item("Aspirin");
        long_frequency.frequency = "d".repeat(101);
        assert!(validate_items(&[long_frequency]).is_err());
    }
}
