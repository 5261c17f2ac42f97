//! Client-facing linking operations. Each function that mutates more than
//! one row opens its own transaction; callers pass a plain connection.

use chrono::NaiveDateTime;
use diesel::pg::PgConnection;
use diesel::Connection;
use tracing::{debug, info};

use super::directory::{self, NewPerson};
use super::{
    links, requests, CareError, CareRequest, CareResult, Person, PersonRef, PersonType,
    RequestDirection,
};

pub fn register(
    conn: &mut PgConnection,
    person_type: PersonType,
    fields: &NewPerson<'_>,
) -> CareResult<Person> {
    let person = directory::create(conn, person_type, fields)?;
    info!(
        person_id = person.id,
        person_type = %person.person_type,
        "registered person"
    );
    Ok(person)
}

/// Resolves a login. With no role, caregivers are consulted before patients;
/// a wrong password for the first match does not fall through.
pub fn login(
    conn: &mut PgConnection,
    role: Option<PersonType>,
    email: &str,
    password: &str,
) -> CareResult<Person> {
    match role {
        Some(person_type) => directory::authenticate(conn, person_type, email, password),
        None => match directory::authenticate(conn, PersonType::Caregiver, email, password) {
            Err(CareError::PersonNotFound(_)) => {
                directory::authenticate(conn, PersonType::Patient, email, password)
            }
            other => other,
        },
    }
}

/// `initiateLink`: proposes a link from `initiator` to the counterpart
/// registered under `target_email`.
pub fn initiate_link(
    conn: &mut PgConnection,
    initiator: PersonRef,
    target_email: &str,
) -> CareResult<CareRequest> {
    let request = conn.transaction::<CareRequest, CareError, _>(|conn| {
        let initiator = directory::require(conn, initiator.person_type, initiator.id)?;
        let target_type = initiator.person_type.counterpart();
        let target = directory::find_by_email(conn, target_type, target_email)?
            .ok_or(CareError::TargetNotFound(target_type))?;

        let (caregiver_id, patient_id) = pair(&initiator, &target);
        if links::exists(conn, caregiver_id, patient_id)? {
            return Err(CareError::AlreadyLinked);
        }

        let direction = RequestDirection::initiated_by(initiator.person_type);
        if requests::find_pending(conn, caregiver_id, patient_id, direction)?.is_some() {
            return Err(CareError::DuplicateRequest);
        }

        requests::create(conn, &initiator, &target)
    })?;

    info!(
        request_id = request.id,
        caregiver_id = request.caregiver_id,
        patient_id = request.patient_id,
        direction = request.direction.as_str(),
        "link request created"
    );
    Ok(request)
}

/// `respondToLink`: only the request's target may answer it; for anyone
/// else the request does not exist.
pub fn respond_to_link(
    conn: &mut PgConnection,
    responder: PersonRef,
    request_id: i32,
    accept: bool,
) -> CareResult<CareRequest> {
    let resolved = conn.transaction::<CareRequest, CareError, _>(|conn| {
        let request = requests::lock_pending(conn, request_id)?
            .filter(|request| request.target() == responder)
            .ok_or(CareError::RequestNotFound)?;
        requests::resolve(conn, &request, accept)
    })?;

    info!(
        request_id = resolved.id,
        caregiver_id = resolved.caregiver_id,
        patient_id = resolved.patient_id,
        status = resolved.status.as_str(),
        "link request resolved"
    );
    Ok(resolved)
}

/// Direct assignment: a caregiver links a patient without a request.
pub fn assign(conn: &mut PgConnection, caregiver_id: i32, patient_id: i32) -> CareResult<()> {
    conn.transaction::<(), CareError, _>(|conn| {
        directory::require(conn, PersonType::Caregiver, caregiver_id)?;
        directory::require(conn, PersonType::Patient, patient_id)?;
        links::create(conn, caregiver_id, patient_id)
    })?;

    info!(caregiver_id, patient_id, "patient assigned to caregiver");
    Ok(())
}

pub fn list_my_patients(conn: &mut PgConnection, caregiver_id: i32) -> CareResult<Vec<Person>> {
    links::list_patients_for_caregiver(conn, caregiver_id)
}

pub fn list_my_caregivers(conn: &mut PgConnection, patient_id: i32) -> CareResult<Vec<Person>> {
    links::list_caregivers_for_patient(conn, patient_id)
}

pub fn primary_caregiver(conn: &mut PgConnection, patient_id: i32) -> CareResult<Option<Person>> {
    links::primary_caregiver(conn, patient_id)
}

pub fn list_pending_sent(
    conn: &mut PgConnection,
    person: PersonRef,
) -> CareResult<Vec<CareRequest>> {
    requests::list_pending_initiated_by(conn, person)
}

pub fn list_pending_received(
    conn: &mut PgConnection,
    person: PersonRef,
) -> CareResult<Vec<CareRequest>> {
    requests::list_pending_targeting(conn, person)
}

/// Whether `caller` may see data belonging to `patient_id`: the patient
/// themselves or one of their linked caregivers.
pub fn can_view_patient(
    conn: &mut PgConnection,
    caller: PersonRef,
    patient_id: i32,
) -> CareResult<bool> {
    match caller.person_type {
        PersonType::Patient => Ok(caller.id == patient_id),
        PersonType::Caregiver => links::exists(conn, caller.id, patient_id),
    }
}

/// A pending received request, rendered for a notification inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub request_id: i32,
    pub sender: PersonRef,
    pub sender_email: String,
    pub receiver: PersonRef,
    pub message: String,
    pub created_at: NaiveDateTime,
}

impl From<&CareRequest> for Notification {
    fn from(request: &CareRequest) -> Self {
        let sender = request.initiator();
        let message = format!(
            "{} {} would like to link with you as your {}",
            sender.person_type,
            request.initiator_email(),
            sender.person_type
        );
        Self {
            request_id: request.id,
            sender,
            sender_email: request.initiator_email().to_string(),
            receiver: request.target(),
            message,
            created_at: request.created_at,
        }
    }
}

/// Notifications are a view over pending received requests; answering the
/// request removes its entry.
pub fn list_notifications(
    conn: &mut PgConnection,
    person: PersonRef,
) -> CareResult<Vec<Notification>> {
    let pending = requests::list_pending_targeting(conn, person)?;
    debug!(
        person_id = person.id,
        person_type = %person.person_type,
        count = pending.len(),
        "loaded notifications"
    );
    Ok(pending.iter().map(Notification::from).collect())
}

fn pair(a: &Person, b: &Person) -> (i32, i32) {
    match a.person_type {
        PersonType::Caregiver => (a.id, b.id),
        PersonType::Patient => (b.id, a.id),
    }
}
