use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;

use crate::models::{CareRequestRow, NewCareRequest};
use crate::schema::caregiver_requests;

use super::{
    is_unique_violation, links, CareError, CareRequest, CareResult, Person, PersonRef,
    PersonType, RequestDirection, RequestStatus,
};

pub fn get(conn: &mut PgConnection, request_id: i32) -> CareResult<Option<CareRequest>> {
    caregiver_requests::table
        .find(request_id)
        .select(CareRequestRow::as_select())
        .first::<CareRequestRow>(conn)
        .optional()?
        .map(CareRequest::try_from)
        .transpose()
}

/// The pending request for a pair in one direction, if any.
pub fn find_pending(
    conn: &mut PgConnection,
    caregiver_id: i32,
    patient_id: i32,
    direction: RequestDirection,
) -> CareResult<Option<CareRequest>> {
    caregiver_requests::table
        .filter(caregiver_requests::caregiver_id.eq(caregiver_id))
        .filter(caregiver_requests::patient_id.eq(patient_id))
        .filter(caregiver_requests::request_type.eq(direction.as_str()))
        .filter(caregiver_requests::status.eq(RequestStatus::PENDING))
        .select(CareRequestRow::as_select())
        .first::<CareRequestRow>(conn)
        .optional()?
        .map(CareRequest::try_from)
        .transpose()
}

/// Records a new pending request from `initiator` to `target`, snapshotting
/// both emails. The partial unique index on pending requests turns a
/// concurrent duplicate into `DuplicateRequest`.
pub fn create(
    conn: &mut PgConnection,
    initiator: &Person,
    target: &Person,
) -> CareResult<CareRequest> {
    let (patient, caregiver) = match initiator.person_type {
        PersonType::Patient => (initiator, target),
        PersonType::Caregiver => (target, initiator),
    };
    debug_assert_eq!(patient.person_type, PersonType::Patient);
    debug_assert_eq!(caregiver.person_type, PersonType::Caregiver);

    let direction = RequestDirection::initiated_by(initiator.person_type);
    let new_request = NewCareRequest {
        patient_id: patient.id,
        caregiver_id: caregiver.id,
        patient_email: &patient.email,
        caregiver_email: &caregiver.email,
        request_type: direction.as_str(),
        status: RequestStatus::PENDING,
    };

    match diesel::insert_into(caregiver_requests::table)
        .values(&new_request)
        .returning(CareRequestRow::as_returning())
        .get_result::<CareRequestRow>(conn)
    {
        Ok(row) => CareRequest::try_from(row),
        Err(err) if is_unique_violation(&err) => Err(CareError::DuplicateRequest),
        Err(err) => Err(CareError::from(err)),
    }
}

/// Locks a pending request row for the rest of the enclosing transaction.
pub fn lock_pending(conn: &mut PgConnection, request_id: i32) -> CareResult<Option<CareRequest>> {
    caregiver_requests::table
        .find(request_id)
        .filter(caregiver_requests::status.eq(RequestStatus::PENDING))
        .select(CareRequestRow::as_select())
        .for_update()
        .first::<CareRequestRow>(conn)
        .optional()?
        .map(CareRequest::try_from)
        .transpose()
}

/// Moves a pending request to its terminal state. Accepting also writes the
/// link, tolerating one that already exists. Must run inside a transaction
/// so the link and the status change land together.
pub fn resolve(
    conn: &mut PgConnection,
    request: &CareRequest,
    accept: bool,
) -> CareResult<CareRequest> {
    let next = if accept {
        links::ensure(conn, request.caregiver_id, request.patient_id)?;
        RequestStatus::Accepted
    } else {
        RequestStatus::Declined
    };

    let updated = diesel::update(
        caregiver_requests::table
            .find(request.id)
            .filter(caregiver_requests::status.eq(RequestStatus::PENDING)),
    )
    .set((
        caregiver_requests::status.eq(next.as_str()),
        caregiver_requests::responded_at.eq(Some(Utc::now().naive_utc())),
    ))
    .returning(CareRequestRow::as_returning())
    .get_result::<CareRequestRow>(conn)
    .optional()?;

    match updated {
        Some(row) => CareRequest::try_from(row),
        None => Err(CareError::RequestNotFound),
    }
}

/// `pending -> accepted | declined` for any pending request, atomically.
pub fn respond(conn: &mut PgConnection, request_id: i32, accept: bool) -> CareResult<CareRequest> {
    conn.transaction::<CareRequest, CareError, _>(|conn| {
        let request = lock_pending(conn, request_id)?.ok_or(CareError::RequestNotFound)?;
        resolve(conn, &request, accept)
    })
}

/// Pending requests this person sent, most recent first.
pub fn list_pending_initiated_by(
    conn: &mut PgConnection,
    person: PersonRef,
) -> CareResult<Vec<CareRequest>> {
    let direction = RequestDirection::initiated_by(person.person_type);
    list_pending_for(conn, person, direction)
}

/// Pending requests addressed to this person, most recent first.
pub fn list_pending_targeting(
    conn: &mut PgConnection,
    person: PersonRef,
) -> CareResult<Vec<CareRequest>> {
    let direction = RequestDirection::initiated_by(person.person_type.counterpart());
    list_pending_for(conn, person, direction)
}

fn list_pending_for(
    conn: &mut PgConnection,
    person: PersonRef,
    direction: RequestDirection,
) -> CareResult<Vec<CareRequest>> {
    let mut query = caregiver_requests::table
        .filter(caregiver_requests::status.eq(RequestStatus::PENDING))
        .filter(caregiver_requests::request_type.eq(direction.as_str()))
        .into_boxed();

    query = match person.person_type {
        PersonType::Patient => query.filter(caregiver_requests::patient_id.eq(person.id)),
        PersonType::Caregiver => query.filter(caregiver_requests::caregiver_id.eq(person.id)),
    };

    let rows = query
        .order((
            caregiver_requests::created_at.desc(),
            caregiver_requests::id.desc(),
        ))
        .select(CareRequestRow::as_select())
        .load::<CareRequestRow>(conn)?;

    rows.into_iter().map(CareRequest::try_from).collect()
}
