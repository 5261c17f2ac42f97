pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};

use crate::{
    care::{PersonRef, PersonType},
    error::AppError,
    state::AppState,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedPerson {
    pub person_id: i32,
    pub role: PersonType,
    pub email: String,
}

impl AuthenticatedPerson {
    pub fn person(&self) -> PersonRef {
        PersonRef {
            id: self.person_id,
            person_type: self.role,
        }
    }

    pub fn require_caregiver(&self) -> Result<i32, AppError> {
        match self.role {
            PersonType::Caregiver => Ok(self.person_id),
            PersonType::Patient => Err(AppError::forbidden()),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedPerson {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        Ok(AuthenticatedPerson {
            person_id: claims.sub,
            role: claims.role,
            email: claims.email,
        })
    }
}
