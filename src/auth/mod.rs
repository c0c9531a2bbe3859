//! Single-credential HTTP Basic gate for the analytics routes

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::prelude::*;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::config::Credentials;

const REALM: &str = r#"Basic realm="analytics", charset="UTF-8""#;

pub struct AuthService {
    credentials: Option<Credentials>,
}

impl AuthService {
    /// `None` disables the check
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self { credentials }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Validate an `Authorization` header value
    pub fn validate_header(&self, authorization: Option<&str>) -> bool {
        let Some(expected) = &self.credentials else {
            return true;
        };

        let Some((username, password)) = authorization.and_then(decode_basic) else {
            return false;
        };

        // Evaluate both halves so timing does not reveal which one failed
        let user_ok = username.as_bytes().ct_eq(expected.username.as_bytes());
        let pass_ok = password.as_bytes().ct_eq(expected.password.as_bytes());
        bool::from(user_ok & pass_ok)
    }
}

fn decode_basic(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

pub async fn auth_middleware(
    auth_service: Arc<AuthService>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    if auth_service.validate_header(authorization) {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, HeaderValue::from_static(REALM))],
            "Unauthorized",
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(Some(Credentials {
            username: "admin".into(),
            password: "pa:ss".into(),
        }))
    }

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", BASE64_STANDARD.encode(format!("{user}:{pass}")))
    }

    #[test]
    fn test_disabled_allows_everything() {
        let auth = AuthService::new(None);
        assert!(!auth.is_enabled());
        assert!(auth.validate_header(None));
    }

    #[test]
    fn test_correct_credentials() {
        // Only the first ':' separates user from password
        assert!(service().validate_header(Some(&basic("admin", "pa:ss"))));
    }

    #[test]
    fn test_wrong_or_missing_credentials() {
        let auth = service();
        assert!(!auth.validate_header(None));
        assert!(!auth.validate_header(Some(&basic("admin", "nope"))));
        assert!(!auth.validate_header(Some(&basic("root", "pa:ss"))));
        assert!(!auth.validate_header(Some("Bearer abc")));
        assert!(!auth.validate_header(Some("Basic !!!not-base64")));
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let header = basic("admin", "pa:ss").replacen("Basic", "basic", 1);
        assert!(service().validate_header(Some(&header)));
    }
}
