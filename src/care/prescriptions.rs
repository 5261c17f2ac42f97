use diesel::pg::PgConnection;
use diesel::prelude::*;

use crate::models::{NewPrescription, Prescription};
use crate::schema::prescriptions;

use super::CareResult;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_DOSE_LEN: usize = 100;

#[derive(Debug, Clone)]
pub struct PrescriptionInput<'a> {
    pub name: &'a str,
    pub amount: &'a str,
    pub frequency: &'a str,
}

pub fn list_for_patient(conn: &mut PgConnection, patient_id: i32) -> CareResult<Vec<Prescription>> {
    let rows = prescriptions::table
        .filter(prescriptions::patient_id.eq(patient_id))
        .order((prescriptions::name.asc(), prescriptions::id.asc()))
        .select(Prescription::as_select())
        .load::<Prescription>(conn)?;
    Ok(rows)
}

/// Inserts every item or none of them: one multi-row statement. Callers
/// validate the inputs.
pub fn add_for_patient(
    conn: &mut PgConnection,
    patient_id: i32,
    prescribed_by: Option<i32>,
    items: &[PrescriptionInput<'_>],
) -> CareResult<Vec<Prescription>> {
    let rows: Vec<NewPrescription<'_>> = items
        .iter()
        .map(|item| NewPrescription {
            patient_id,
            name: item.name.trim(),
            amount: item.amount.trim(),
            frequency: item.frequency.trim(),
            prescribed_by,
        })
        .collect();

    let inserted = diesel::insert_into(prescriptions::table)
        .values(&rows)
        .returning(Prescription::as_returning())
        .get_results::<Prescription>(conn)?;
    Ok(inserted)
}
