use axum::{
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::{models::CurrentUser, AppState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    // user id as hex string
    pub sub: String,
    // expiry (unix timestamp seconds)
    pub exp: usize,
}

fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;

    for part in raw.split(';') {
        let part = part.trim();
        let Some((k, v)) = part.split_once('=') else {
            continue;
        };
        if k.trim() == name {
            return Some(v.trim().to_string());
        }
    }
    None
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim().to_string())
    } else {
        None
    }
}

/// Resolves the caller from a signed token. Anything invalid is treated as anonymous.
pub fn current_user(headers: &HeaderMap, secret: &str, cookie_name: &str) -> Option<CurrentUser> {
    let token = bearer_token(headers).or_else(|| get_cookie(headers, cookie_name))?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let data = decode::<Claims>(&token, &DecodingKey::from_secret(secret.as_bytes()), &validation).ok()?;
    let id = ObjectId::parse_str(&data.claims.sub).ok()?;

    Some(CurrentUser { id })
}

pub async fn inject_current_user(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let user = current_user(
        req.headers(),
        &state.settings.jwt_secret,
        &state.settings.jwt_cookie_name,
    );

    if let Some(user) = user {
        // Store user in request extensions so handlers can access it
        req.extensions_mut().insert(user);
    }

    next.run(req).await
}
