use diesel::pg::PgConnection;
use diesel::prelude::*;

use crate::auth::password;
use crate::models::{Caregiver, NewCaregiver, NewPatient, Patient};
use crate::schema::{caregivers, patients};

use super::{is_unique_violation, CareError, CareResult, Person, PersonType};

/// Column widths of the person tables; inputs are checked against these in characters.
pub const MAX_EMAIL_LEN: usize = 255;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_PHONE_LEN: usize = 32;

/// Profile fields supplied at registration.
#[derive(Debug, Clone)]
pub struct NewPerson<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone_number: Option<&'a str>,
}

/// Emails are stored and compared trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn find_by_email(
    conn: &mut PgConnection,
    person_type: PersonType,
    email: &str,
) -> CareResult<Option<Person>> {
    let email = normalize_email(email);
    let person = match person_type {
        PersonType::Patient => patients::table
            .filter(patients::email.eq(&email))
            .select(Patient::as_select())
            .first::<Patient>(conn)
            .optional()?
            .map(Person::from),
        PersonType::Caregiver => caregivers::table
            .filter(caregivers::email.eq(&email))
            .select(Caregiver::as_select())
            .first::<Caregiver>(conn)
            .optional()?
            .map(Person::from),
    };
    Ok(person)
}

pub fn get_by_id(
    conn: &mut PgConnection,
    person_type: PersonType,
    id: i32,
) -> CareResult<Option<Person>> {
    let person = match person_type {
        PersonType::Patient => patients::table
            .find(id)
            .select(Patient::as_select())
            .first::<Patient>(conn)
            .optional()?
            .map(Person::from),
        PersonType::Caregiver => caregivers::table
            .find(id)
            .select(Caregiver::as_select())
            .first::<Caregiver>(conn)
            .optional()?
            .map(Person::from),
    };
    Ok(person)
}

/// Like [`get_by_id`] but a missing record is an error.
pub fn require(conn: &mut PgConnection, person_type: PersonType, id: i32) -> CareResult<Person> {
    get_by_id(conn, person_type, id)?.ok_or(CareError::PersonNotFound(person_type))
}

/// Loads several people of one type, ordered by last name, first name, id.
pub fn get_many(
    conn: &mut PgConnection,
    person_type: PersonType,
    ids: &[i32],
) -> CareResult<Vec<Person>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let people = match person_type {
        PersonType::Patient => patients::table
            .filter(patients::patient_id.eq_any(ids))
            .order((
                patients::last_name.asc(),
                patients::first_name.asc(),
                patients::patient_id.asc(),
            ))
            .select(Patient::as_select())
            .load::<Patient>(conn)?
            .into_iter()
            .map(Person::from)
            .collect(),
        PersonType::Caregiver => caregivers::table
            .filter(caregivers::caregiver_id.eq_any(ids))
            .order((
                caregivers::last_name.asc(),
                caregivers::first_name.asc(),
                caregivers::caregiver_id.asc(),
            ))
            .select(Caregiver::as_select())
            .load::<Caregiver>(conn)?
            .into_iter()
            .map(Person::from)
            .collect(),
    };
    Ok(people)
}

pub fn list(conn: &mut PgConnection, person_type: PersonType) -> CareResult<Vec<Person>> {
    let people = match person_type {
        PersonType::Patient => patients::table
            .order((
                patients::last_name.asc(),
                patients::first_name.asc(),
                patients::patient_id.asc(),
            ))
            .select(Patient::as_select())
            .load::<Patient>(conn)?
            .into_iter()
            .map(Person::from)
            .collect(),
        PersonType::Caregiver => caregivers::table
            .order((
                caregivers::last_name.asc(),
                caregivers::first_name.asc(),
                caregivers::caregiver_id.asc(),
            ))
            .select(Caregiver::as_select())
            .load::<Caregiver>(conn)?
            .into_iter()
            .map(Person::from)
            .collect(),
    };
    Ok(people)
}

/// Registers a person. The unique index on email is authoritative; the
/// lookup beforehand only avoids hashing a password for a doomed insert.
pub fn create(
    conn: &mut PgConnection,
    person_type: PersonType,
    fields: &NewPerson<'_>,
) -> CareResult<Person> {
    let email = normalize_email(fields.email);
    if find_by_email(conn, person_type, &email)?.is_some() {
        return Err(CareError::DuplicateEmail(person_type));
    }

    let password_hash = password::hash_password(fields.password)
        .map_err(|err| CareError::Credential(err.to_string()))?;

    let inserted = match person_type {
        PersonType::Patient => diesel::insert_into(patients::table)
            .values(&NewPatient {
                email: &email,
                password_hash: &password_hash,
                first_name: fields.first_name,
                last_name: fields.last_name,
                phone_number: fields.phone_number,
            })
            .returning(Patient::as_returning())
            .get_result::<Patient>(conn)
            .map(Person::from),
        PersonType::Caregiver => diesel::insert_into(caregivers::table)
            .values(&NewCaregiver {
                email: &email,
                password_hash: &password_hash,
                first_name: fields.first_name,
                last_name: fields.last_name,
                phone_number: fields.phone_number,
            })
            .returning(Caregiver::as_returning())
            .get_result::<Caregiver>(conn)
            .map(Person::from),
    };

    match inserted {
        Ok(person) => Ok(person),
        Err(err) if is_unique_violation(&err) => Err(CareError::DuplicateEmail(person_type)),
        Err(err) => Err(CareError::from(err)),
    }
}

/// Checks a plaintext password against the stored hash. Unknown emails
/// simply fail verification.
pub fn verify_credential(
    conn: &mut PgConnection,
    person_type: PersonType,
    email: &str,
    plain_password: &str,
) -> CareResult<bool> {
    match load_credential(conn, person_type, email)? {
        Some((_, hash)) => check_password(plain_password, &hash),
        None => Ok(false),
    }
}

/// Resolves a login: `PersonNotFound` when the email is unknown for this
/// type, `BadCredential` when the password does not match.
pub fn authenticate(
    conn: &mut PgConnection,
    person_type: PersonType,
    email: &str,
    plain_password: &str,
) -> CareResult<Person> {
    let (person, hash) = load_credential(conn, person_type, email)?
        .ok_or(CareError::PersonNotFound(person_type))?;

    if !check_password(plain_password, &hash)? {
        return Err(CareError::BadCredential);
    }

    Ok(person)
}

fn check_password(plain_password: &str, hash: &str) -> CareResult<bool> {
    password::verify_password(plain_password, hash)
        .map_err(|err| CareError::Credential(err.to_string()))
}

fn load_credential(
    conn: &mut PgConnection,
    person_type: PersonType,
    email: &str,
) -> CareResult<Option<(Person, String)>> {
    let email = normalize_email(email);
    let found = match person_type {
        PersonType::Patient => patients::table
            .filter(patients::email.eq(&email))
            .select(Patient::as_select())
            .first::<Patient>(conn)
            .optional()?
            .map(|mut row| {
                let hash = std::mem::take(&mut row.password_hash);
                (Person::from(row), hash)
            }),
        PersonType::Caregiver => caregivers::table
            .filter(caregivers::email.eq(&email))
            .select(Caregiver::as_select())
            .first::<Caregiver>(conn)
            .optional()?
            .map(|mut row| {
                let hash = std::mem::take(&mut row.password_hash);
                (Person::from(row), hash)
            }),
    };
    Ok(found)
}
