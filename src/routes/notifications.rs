use axum::{extract::State, Json};
use serde::Serialize;

use crate::auth::AuthenticatedPerson;
use crate::care::workflow::{self, Notification};
use crate::care::PersonType;
use crate::error::AppResult;
use crate::routes::to_iso;
use crate::state::AppState;

#[derive(Serialize)]
pub struct NotificationEntry {
    pub request_id: i32,
    pub sender_id: i32,
    pub sender_type: PersonType,
    pub sender_email: String,
    pub receiver_id: i32,
    pub receiver_type: PersonType,
    pub message: String,
    pub created_at: String,
}

impl From<Notification> for NotificationEntry {
    fn from(notification: Notification) -> Self {
        Self {
            request_id: notification.request_id,
            sender_id: notification.sender.id,
            sender_type: notification.sender.person_type,
            sender_email: notification.sender_email,
            receiver_id: notification.receiver.id,
            receiver_type: notification.receiver.person_type,
            message: notification.message,
            created_at: to_iso(notification.created_at),
        }
    }
}

pub async fn list_notifications(
    State(state): State<AppState>,
    caller: AuthenticatedPerson,
) -> AppResult<Json<Vec<NotificationEntry>>> {
    let mut conn = state.db()?;
    let notifications = workflow::list_notifications(&mut conn, caller.person())?;
    Ok(Json(
        notifications
            .into_iter()
            .map(NotificationEntry::from)
            .collect(),
    ))
}
