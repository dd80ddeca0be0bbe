use axum::{
    extract::{FromRequest, Request},
    response::{IntoResponse, Response},
    Json,
};
use validator::Validate;

use crate::handlers::error::ApiError;

/// JSON body extractor that rejects with a JSON error and runs `validator` rules.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            let message = format!("Failed to parse JSON request body: {}", rejection);
            tracing::warn!("{}", message);
            ApiError::bad_request(message).into_response()
        })?;

        value
            .validate()
            .map_err(|errors| ApiError::from(errors).into_response())?;

        Ok(AppJson(value))
    }
}
