use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

const USER_ID_HEADER: &str = "x-user-id";
const MAX_USER_ID_LEN: usize = 128;

/// Caller identity, resolved by the upstream auth layer into `X-User-Id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing user header `X-User-Id`".into()))?;

        if value.len() > MAX_USER_ID_LEN {
            return Err(AppError::BadRequest(format!(
                "user id must not exceed {MAX_USER_ID_LEN} characters"
            )));
        }

        Ok(UserId(value.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(request: Request<()>) -> Result<UserId, AppError> {
        let (mut parts, _) = request.into_parts();
        UserId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_trimmed_header() {
        let request = Request::builder()
            .header("X-User-Id", "  user-42 ")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap(), UserId("user-42".into()));
    }

    #[tokio::test]
    async fn missing_or_blank_header_is_unauthorized() {
        let missing = Request::builder().body(()).unwrap();
        assert!(matches!(extract(missing).await, Err(AppError::Unauthorized(_))));

        let blank = Request::builder().header("X-User-Id", "  ").body(()).unwrap();
        assert!(matches!(extract(blank).await, Err(AppError::Unauthorized(_))));
    }
}
