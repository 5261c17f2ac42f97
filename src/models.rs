use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = patients)]
#[diesel(primary_key(patient_id))]
pub struct Patient {
    pub patient_id: i32,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = patients)]
pub struct NewPatient<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone_number: Option<&'a str>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = caregivers)]
#[diesel(primary_key(caregiver_id))]
pub struct Caregiver {
    pub caregiver_id: i32,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = caregivers)]
pub struct NewCaregiver<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone_number: Option<&'a str>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = caregiver_patients)]
pub struct NewCareLink {
    pub caregiver_id: i32,
    pub patient_id: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = caregiver_requests)]
pub struct CareRequestRow {
    pub id: i32,
    pub patient_id: i32,
    pub caregiver_id: i32,
    pub patient_email: String,
    pub caregiver_email: String,
    pub request_type: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub responded_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = caregiver_requests)]
pub struct NewCareRequest<'a> {
    pub patient_id: i32,
    pub caregiver_id: i32,
    pub patient_email: &'a str,
    pub caregiver_email: &'a str,
    pub request_type: &'a str,
    pub status: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = prescriptions)]
pub struct Prescription {
    pub id: i32,
    pub patient_id: i32,
    pub name: String,
    pub amount: String,
    pub frequency: String,
    pub prescribed_by: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = prescriptions)]
pub struct NewPrescription<'a> {
    pub patient_id: i32,
    pub name: &'a str,
    pub amount: &'a str,
    pub frequency: &'a str,
    pub prescribed_by: Option<i32>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = refresh_tokens)]
pub struct RefreshToken {
    pub id: Uuid,
    pub person_id: i32,
    pub person_type: String,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub person_id: i32,
    pub person_type: String,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
