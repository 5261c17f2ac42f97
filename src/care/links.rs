use diesel::dsl::exists as sql_exists;
use diesel::pg::PgConnection;
use diesel::prelude::*;

use crate::models::{Caregiver, NewCareLink, Patient};
use crate::schema::{caregiver_patients, caregivers, patients};

use super::{is_unique_violation, CareError, CareResult, Person};

pub fn exists(conn: &mut PgConnection, caregiver_id: i32, patient_id: i32) -> CareResult<bool> {
    let linked = diesel::select(sql_exists(
        caregiver_patients::table
            .filter(caregiver_patients::caregiver_id.eq(caregiver_id))
            .filter(caregiver_patients::patient_id.eq(patient_id)),
    ))
    .get_result::<bool>(conn)?;
    Ok(linked)
}

/// Inserts a link, failing with `AlreadyLinked` when the pair exists.
/// The primary key on the pair decides; the pre-check is a fast path.
pub fn create(conn: &mut PgConnection, caregiver_id: i32, patient_id: i32) -> CareResult<()> {
    if exists(conn, caregiver_id, patient_id)? {
        return Err(CareError::AlreadyLinked);
    }

    match diesel::insert_into(caregiver_patients::table)
        .values(&NewCareLink {
            caregiver_id,
            patient_id,
        })
        .execute(conn)
    {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => Err(CareError::AlreadyLinked),
        Err(err) => Err(CareError::from(err)),
    }
}

/// Inserts the link unless it already exists. Returns whether a row was
/// written. Safe inside a transaction because the conflict never raises.
pub fn ensure(conn: &mut PgConnection, caregiver_id: i32, patient_id: i32) -> CareResult<bool> {
    let inserted = diesel::insert_into(caregiver_patients::table)
        .values(&NewCareLink {
            caregiver_id,
            patient_id,
        })
        .on_conflict((caregiver_patients::caregiver_id, caregiver_patients::patient_id))
        .do_nothing()
        .execute(conn)?;
    Ok(inserted > 0)
}

pub fn list_patients_for_caregiver(
    conn: &mut PgConnection,
    caregiver_id: i32,
) -> CareResult<Vec<Person>> {
    let rows = patients::table
        .inner_join(caregiver_patients::table)
        .filter(caregiver_patients::caregiver_id.eq(caregiver_id))
        .order((
            patients::last_name.asc(),
            patients::first_name.asc(),
            patients::patient_id.asc(),
        ))
        .select(Patient::as_select())
        .load::<Patient>(conn)?;
    Ok(rows.into_iter().map(Person::from).collect())
}

pub fn list_caregivers_for_patient(
    conn: &mut PgConnection,
    patient_id: i32,
) -> CareResult<Vec<Person>> {
    let rows = caregivers::table
        .inner_join(caregiver_patients::table)
        .filter(caregiver_patients::patient_id.eq(patient_id))
        .order((
            caregivers::last_name.asc(),
            caregivers::first_name.asc(),
            caregivers::caregiver_id.asc(),
        ))
        .select(Caregiver::as_select())
        .load::<Caregiver>(conn)?;
    Ok(rows.into_iter().map(Person::from).collect())
}

/// The caregiver a single-caregiver view should show: earliest link wins,
/// lowest caregiver id breaks ties.
pub fn primary_caregiver(conn: &mut PgConnection, patient_id: i32) -> CareResult<Option<Person>> {
    let row = caregivers::table
        .inner_join(caregiver_patients::table)
        .filter(caregiver_patients::patient_id.eq(patient_id))
        .order((
            caregiver_patients::linked_at.asc(),
            caregivers::caregiver_id.asc(),
        ))
        .select(Caregiver::as_select())
        .first::<Caregiver>(conn)
        .optional()?;
    Ok(row.map(Person::from))
}
