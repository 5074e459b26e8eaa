//! Bearer token extraction for the film routes.

use crate::database::UserDb;
use crate::error::ApiError;
use crate::token::TokenService;
use actix_web::{dev::Payload, http::header::AUTHORIZATION, web, FromRequest, HttpRequest};
use log::debug;
use std::future::{ready, Ready};

/// Caller identity, available to any handler that takes it as an argument.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub username: String,
}

fn forbidden(message: &str) -> ApiError {
    ApiError::Forbidden(message.to_owned())
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, ApiError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| forbidden("Token is invalid"))?;
    let token = header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| forbidden("Invalid authorization format, expected `Bearer <token>`"))?;

    let tokens = req
        .app_data::<web::Data<TokenService>>()
        .ok_or_else(|| ApiError::Internal("token service not configured".to_owned()))?;
    let db = req
        .app_data::<web::Data<sled::Db>>()
        .ok_or_else(|| ApiError::Internal("database not configured".to_owned()))?;

    let username = tokens.key_id(token)?;
    let (_user_id, user) = db
        .get_user_by_username(&username)?
        .ok_or_else(|| forbidden("Token is invalid"))?;
    let key = TokenService::derive_secret(&user.signing_secret);
    let claims = tokens.verify(token, &key)?;
    debug!("Authenticated request for user {}", claims.user.username);
    Ok(AuthenticatedUser {
        username: claims.user.username,
    })
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;
    use actix_web::test::TestRequest;

    fn setup() -> (web::Data<sled::Db>, web::Data<TokenService>, User) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let user = User {
            username: "alice".to_owned(),
            password: "pw".to_owned(),
            signing_secret: TokenService::generate_secret(),
        };
        db.add_user(&user).unwrap().unwrap();
        (web::Data::new(db), web::Data::new(TokenService::new()), user)
    }

    #[test]
    fn missing_header_is_forbidden() {
        let (db, tokens, _) = setup();
        let req = TestRequest::default()
            .app_data(db)
            .app_data(tokens)
            .to_http_request();
        assert!(matches!(authenticate(&req), Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn non_bearer_header_is_forbidden() {
        let (db, tokens, _) = setup();
        let req = TestRequest::default()
            .app_data(db)
            .app_data(tokens)
            .insert_header((AUTHORIZATION, "Basic YWxpY2U6cHc="))
            .to_http_request();
        assert!(matches!(authenticate(&req), Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn missing_app_data_is_internal_error() {
        let (_, tokens, user) = setup();
        let token = tokens.issue(&user).unwrap();
        let header = (AUTHORIZATION, format!("Bearer {}", token));
        let req = TestRequest::default()
            .insert_header(header.clone())
            .to_http_request();
        assert!(matches!(authenticate(&req), Err(ApiError::Internal(_))));
        let req = TestRequest::default()
            .app_data(tokens)
            .insert_header(header)
            .to_http_request();
        assert!(matches!(authenticate(&req), Err(ApiError::Internal(_))));
    }

    #[test]
    fn valid_token_yields_username() {
        let (db, tokens, user) = setup();
        let token = tokens.issue(&user).unwrap();
        let req = TestRequest::default()
            .app_data(db)
            .app_data(tokens)
            .insert_header((AUTHORIZATION, format!("Bearer {}", token)))
            .to_http_request();
        assert_eq!(authenticate(&req).unwrap().username, "alice");
    }

    #[test]
    fn token_for_unknown_user_is_forbidden() {
        let (db, tokens, _) = setup();
        let stranger = User {
            username: "mallory".to_owned(),
            password: "pw".to_owned(),
            signing_secret: TokenService::generate_secret(),
        };
        let token = tokens.issue(&stranger).unwrap();
        let req = TestRequest::default()
            .app_data(db)
            .app_data(tokens)
            .insert_header((AUTHORIZATION, format!("Bearer {}", token)))
            .to_http_request();
        assert!(matches!(authenticate(&req), Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn token_signed_with_guessed_secret_is_forbidden() {
        let (db, tokens, user) = setup();
        let forged = User {
            signing_secret: b"pw".to_vec(),
            ..user
        };
        let token = tokens.issue(&forged).unwrap();
        let req = TestRequest::default()
            .app_data(db)
            .app_data(tokens)
            .insert_header((AUTHORIZATION, format!("Bearer {}", token)))
            .to_http_request();
        assert!(matches!(authenticate(&req), Err(ApiError::Forbidden(_))));
    }
}
