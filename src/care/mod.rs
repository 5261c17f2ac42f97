//! Caregiver/patient linking core.
//!
//! The directory, link table and request ledger are plain functions over a
//! `PgConnection`; [`workflow`] composes them and owns the transaction
//! boundaries.

pub mod directory;
pub mod links;
pub mod prescriptions;
pub mod requests;
pub mod workflow;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CareRequestRow, Caregiver, Patient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonType {
    Patient,
    Caregiver,
}

impl PersonType {
    pub fn as_str(self) -> &'static str {
        match self {
            PersonType::Patient => "patient",
            PersonType::Caregiver => "caregiver",
        }
    }

    /// The type a person of this type links with.
    pub fn counterpart(self) -> Self {
        match self {
            PersonType::Patient => PersonType::Caregiver,
            PersonType::Caregiver => PersonType::Patient,
        }
    }
}

impl fmt::Display for PersonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "patient" => Ok(PersonType::Patient),
            "caregiver" => Ok(PersonType::Caregiver),
            other => Err(format!(
                "invalid role '{other}', expected 'patient' or 'caregiver'"
            )),
        }
    }
}

/// Identity of a person: ids are only unique within their own type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonRef {
    pub id: i32,
    pub person_type: PersonType,
}

impl PersonRef {
    pub fn patient(id: i32) -> Self {
        Self {
            id,
            person_type: PersonType::Patient,
        }
    }

    pub fn caregiver(id: i32) -> Self {
        Self {
            id,
            person_type: PersonType::Caregiver,
        }
    }
}

/// A directory record without its credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub id: i32,
    pub person_type: PersonType,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Person {
    pub fn person_ref(&self) -> PersonRef {
        PersonRef {
            id: self.id,
            person_type: self.person_type,
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl From<Patient> for Person {
    fn from(row: Patient) -> Self {
        Self {
            id: row.patient_id,
            person_type: PersonType::Patient,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            phone_number: row.phone_number,
            created_at: row.created_at,
        }
    }
}

impl From<Caregiver> for Person {
    fn from(row: Caregiver) -> Self {
        Self {
            id: row.caregiver_id,
            person_type: PersonType::Caregiver,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            phone_number: row.phone_number,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestDirection {
    PatientToCaregiver,
    CaregiverToPatient,
}

impl RequestDirection {
    pub const PATIENT_TO_CAREGIVER: &'static str = "patient_to_caregiver";
    pub const CAREGIVER_TO_PATIENT: &'static str = "caregiver_to_patient";

    pub fn initiated_by(initiator: PersonType) -> Self {
        match initiator {
            PersonType::Patient => RequestDirection::PatientToCaregiver,
            PersonType::Caregiver => RequestDirection::CaregiverToPatient,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestDirection::PatientToCaregiver => Self::PATIENT_TO_CAREGIVER,
            RequestDirection::CaregiverToPatient => Self::CAREGIVER_TO_PATIENT,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            Self::PATIENT_TO_CAREGIVER => Some(RequestDirection::PatientToCaregiver),
            Self::CAREGIVER_TO_PATIENT => Some(RequestDirection::CaregiverToPatient),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl RequestStatus {
    pub const PENDING: &'static str = "pending";
    pub const ACCEPTED: &'static str = "accepted";
    pub const DECLINED: &'static str = "declined";

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => Self::PENDING,
            RequestStatus::Accepted => Self::ACCEPTED,
            RequestStatus::Declined => Self::DECLINED,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            Self::PENDING => Some(RequestStatus::Pending),
            Self::ACCEPTED => Some(RequestStatus::Accepted),
            Self::DECLINED => Some(RequestStatus::Declined),
            _ => None,
        }
    }
}

/// A linking proposal. The email fields are snapshots taken when the
/// request was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CareRequest {
    pub id: i32,
    pub patient_id: i32,
    pub caregiver_id: i32,
    pub patient_email: String,
    pub caregiver_email: String,
    pub direction: RequestDirection,
    pub status: RequestStatus,
    pub created_at: NaiveDateTime,
    pub responded_at: Option<NaiveDateTime>,
}

impl CareRequest {
    pub fn patient(&self) -> PersonRef {
        PersonRef::patient(self.patient_id)
    }

    pub fn caregiver(&self) -> PersonRef {
        PersonRef::caregiver(self.caregiver_id)
    }

    pub fn initiator(&self) -> PersonRef {
        match self.direction {
            RequestDirection::PatientToCaregiver => self.patient(),
            RequestDirection::CaregiverToPatient => self.caregiver(),
        }
    }

    pub fn target(&self) -> PersonRef {
        match self.direction {
            RequestDirection::PatientToCaregiver => self.caregiver(),
            RequestDirection::CaregiverToPatient => self.patient(),
        }
    }

    pub fn initiator_email(&self) -> &str {
        match self.direction {
            RequestDirection::PatientToCaregiver => &self.patient_email,
            RequestDirection::CaregiverToPatient => &self.caregiver_email,
        }
    }

    pub fn target_email(&self) -> &str {
        match self.direction {
            RequestDirection::PatientToCaregiver => &self.caregiver_email,
            RequestDirection::CaregiverToPatient => &self.patient_email,
        }
    }
}

impl TryFrom<CareRequestRow> for CareRequest {
    type Error = CareError;

    fn try_from(row: CareRequestRow) -> Result<Self, Self::Error> {
        let direction = RequestDirection::parse(&row.request_type).ok_or_else(|| {
            CareError::Corrupted(format!(
                "request {} has unknown request_type '{}'",
                row.id, row.request_type
            ))
        })?;
        let status = RequestStatus::parse(&row.status).ok_or_else(|| {
            CareError::Corrupted(format!(
                "request {} has unknown status '{}'",
                row.id, row.status
            ))
        })?;

        Ok(Self {
            id: row.id,
            patient_id: row.patient_id,
            caregiver_id: row.caregiver_id,
            patient_email: row.patient_email,
            caregiver_email: row.caregiver_email,
            direction,
            status,
            created_at: row.created_at,
            responded_at: row.responded_at,
        })
    }
}

#[derive(Debug, Error)]
pub enum CareError {
    #[error("{0} not found")]
    PersonNotFound(PersonType),
    #[error("no {0} is registered with that email")]
    TargetNotFound(PersonType),
    #[error("request not found or already processed")]
    RequestNotFound,
    #[error("a {0} with that email already exists")]
    DuplicateEmail(PersonType),
    #[error("caregiver and patient are already linked")]
    AlreadyLinked,
    #[error("a pending request already exists for this pair")]
    DuplicateRequest,
    #[error("invalid credentials")]
    BadCredential,
    #[error("rejected by the store: {0}")]
    Rejected(String),
    #[error("database error: {0}")]
    Store(DieselError),
    #[error("credential error: {0}")]
    Credential(String),
    #[error("corrupted record: {0}")]
    Corrupted(String),
}

impl CareError {
    /// Stable machine-readable kind reported to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            CareError::PersonNotFound(_) => "person_not_found",
            CareError::TargetNotFound(_) => "target_not_found",
            CareError::RequestNotFound => "request_not_found",
            CareError::DuplicateEmail(_) => "duplicate_email",
            CareError::AlreadyLinked => "already_linked",
            CareError::DuplicateRequest => "duplicate_request",
            CareError::BadCredential => "bad_credential",
            CareError::Rejected(_) => "invalid_input",
            CareError::Store(_) => "transient_store_error",
            CareError::Credential(_) | CareError::Corrupted(_) => "internal",
        }
    }
}

/// Constraint violations are rejected input; everything else from the store is transient.
impl From<DieselError> for CareError {
    fn from(err: DieselError) -> Self {
        match &err {
            DieselError::DatabaseError(kind, info)
                if matches!(
                    kind,
                    DatabaseErrorKind::UniqueViolation
                        | DatabaseErrorKind::ForeignKeyViolation
                        | DatabaseErrorKind::NotNullViolation
                        | DatabaseErrorKind::CheckViolation
                ) =>
            {
                CareError::Rejected(info.message().to_string())
            }
            _ => CareError::Store(err),
        }
    }
}

pub type CareResult<T> = Result<T, CareError>;

pub(crate) fn is_unique_violation(err: &DieselError) -> bool {
    matches!(
        err,
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)
    )
}
