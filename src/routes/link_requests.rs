use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::PgConnection;
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedPerson;
use crate::care::{directory, workflow, CareRequest, PersonRef};
use crate::error::{AppError, AppResult};
use crate::routes::{ensure_max_len, LinkRequestResponse};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct InitiateLinkRequest {
    pub target_email: String,
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub accept: bool,
}

/// A pending request as listed for one side, with the other side's name.
#[derive(Serialize)]
pub struct PendingRequestEntry {
    #[serde(flatten)]
    pub request: LinkRequestResponse,
    pub counterpart_name: Option<String>,
}

pub async fn initiate_link(
    State(state): State<AppState>,
    caller: AuthenticatedPerson,
    Json(payload): Json<InitiateLinkRequest>,
) -> AppResult<(StatusCode, Json<LinkRequestResponse>)> {
    let target_email = payload.target_email.trim();
    if target_email.is_empty() {
        return Err(AppError::bad_request("target_email must not be empty"));
    }
    ensure_max_len("target_email", target_email, directory::MAX_EMAIL_LEN)?;

    let mut conn = state.db()?;
    let request = workflow::initiate_link(&mut conn, caller.person(), &payload.target_email)?;
    Ok((
        StatusCode::CREATED,
        Json(LinkRequestResponse::from(&request)),
    ))
}

pub async fn respond_to_link(
    State(state): State<AppState>,
    caller: AuthenticatedPerson,
    Path(request_id): Path<i32>,
    Json(payload): Json<RespondRequest>,
) -> AppResult<Json<LinkRequestResponse>> {
    let mut conn = state.db()?;
    let request = workflow::respond_to_link(&mut conn, caller.person(), request_id, payload.accept)?;
    Ok(Json(LinkRequestResponse::from(&request)))
}

pub async fn list_sent(
    State(state): State<AppState>,
    caller: AuthenticatedPerson,
) -> AppResult<Json<Vec<PendingRequestEntry>>> {
    let mut conn = state.db()?;
    let me = caller.person();
    let requests = workflow::list_pending_sent(&mut conn, me)?;
    let entries = with_counterpart_names(&mut conn, me, &requests)?;
    Ok(Json(entries))
}

pub async fn list_received(
    State(state): State<AppState>,
    caller: AuthenticatedPerson,
) -> AppResult<Json<Vec<PendingRequestEntry>>> {
    let mut conn = state.db()?;
    let me = caller.person();
    let requests = workflow::list_pending_received(&mut conn, me)?;
    let entries = with_counterpart_names(&mut conn, me, &requests)?;
    Ok(Json(entries))
}

fn with_counterpart_names(
    conn: &mut PgConnection,
    me: PersonRef,
    requests: &[CareRequest],
) -> AppResult<Vec<PendingRequestEntry>> {
    let counterpart_type = me.person_type.counterpart();
    let counterpart_of = |request: &CareRequest| {
        if request.initiator() == me {
            request.target().id
        } else {
            request.initiator().id
        }
    };

    let ids: Vec<i32> = requests.iter().map(|request| counterpart_of(request)).collect();
    let names: HashMap<i32, String> = directory::get_many(conn, counterpart_type, &ids)?
        .into_iter()
        .map(|person| (person.id, person.display_name()))
        .collect();

    let entries = requests
        .iter()
        .map(|request| PendingRequestEntry {
            request: LinkRequestResponse::from(request),
            counterpart_name: names.get(&counterpart_of(request)).cloned(),
        })
        .collect();
    Ok(entries)
}
