use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{
    auth::AuthenticatedPerson,
    care::{CareRequest, Person, PersonType, RequestDirection, RequestStatus},
    error::{AppError, AppResult},
    state::AppState,
};

pub mod auth;
pub mod directory;
pub mod health;
pub mod link_requests;
pub mod links;
pub mod notifications;
pub mod prescriptions;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return None;
                }
                match trimmed.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(err) => {
                        tracing::warn!(
                            origin = %trimmed,
                            error = %err,
                            "ignoring invalid CORS origin"
                        );
                        None
                    }
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let patients_routes = Router::new()
        .route("/", get(directory::list_patients))
        .route("/:id", get(directory::get_patient))
        .route("/:id/caregivers", get(links::list_patient_caregivers))
        .route("/:id/caregiver", get(links::primary_caregiver))
        .route(
            "/:id/prescriptions",
            get(prescriptions::list_prescriptions).post(prescriptions::add_prescriptions),
        );

    let caregivers_routes = Router::new()
        .route("/", get(directory::list_caregivers))
        .route("/:id", get(directory::get_caregiver))
        .route("/:id/patients", get(links::list_caregiver_patients));

    let link_request_routes = Router::new()
        .route("/", post(link_requests::initiate_link))
        .route("/sent", get(link_requests::list_sent))
        .route("/received", get(link_requests::list_received))
        .route("/:id/respond", post(link_requests::respond_to_link));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/patients", patients_routes)
        .nest("/api/caregivers", caregivers_routes)
        .nest("/api/link-requests", link_request_routes)
        .route("/api/links", post(links::assign_patient))
        .route("/api/notifications", get(notifications::list_notifications))
        .layer(middleware::from_extractor_with_state::<AuthenticatedPerson, _>(
            protected_state,
        ));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub(crate) fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

/// Rejects values wider than their column; widths are counted in characters like VARCHAR.
pub(crate) fn ensure_max_len(field: &str, value: &str, max: usize) -> AppResult<()> {
    if value.chars().count() > max {
        return Err(AppError::bad_request(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

#[derive(Serialize)]
pub struct PersonSummary {
    pub id: i32,
    pub role: PersonType,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
}

impl From<Person> for PersonSummary {
    fn from(person: Person) -> Self {
        Self {
            id: person.id,
            role: person.person_type,
            email: person.email,
            first_name: person.first_name,
            last_name: person.last_name,
            phone_number: person.phone_number,
        }
    }
}

#[derive(Serialize)]
pub struct RequestParty {
    pub id: i32,
    pub role: PersonType,
    pub email: String,
}

#[derive(Serialize)]
pub struct LinkRequestResponse {
    pub id: i32,
    pub initiator: RequestParty,
    pub target: RequestParty,
    pub direction: RequestDirection,
    pub status: RequestStatus,
    pub created_at: String,
    pub responded_at: Option<String>,
}

impl From<&CareRequest> for LinkRequestResponse {
    fn from(request: &CareRequest) -> Self {
        let initiator = request.initiator();
        let target = request.target();
        Self {
            id: request.id,
            initiator: RequestParty {
                id: initiator.id,
                role: initiator.person_type,
                email: request.initiator_email().to_string(),
            },
            target: RequestParty {
                id: target.id,
                role: target.person_type,
                email: request.target_email().to_string(),
            },
            direction: request.direction,
            status: request.status,
            created_at: to_iso(request.created_at),
            responded_at: request.responded_at.map(to_iso),
        }
    }
}
