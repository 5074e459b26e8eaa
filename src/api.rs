use crate::auth::AuthenticatedUser;
use crate::database::{FilmDb, UserDb};
use crate::error::ApiError;
use crate::model::*;
use crate::token::TokenService;
use actix_web::{error, web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

pub const BASE_PATH: &str = "/api/v1";
const DEFAULT_LIMIT: usize = 10;

type Db = web::Data<sled::Db>;
type Tokens = web::Data<TokenService>;

#[derive(Serialize)]
struct StatusMessage {
    status: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

impl StatusMessage {
    fn new(status: u16, message: impl Into<String>) -> Self {
        StatusMessage {
            status,
            message: message.into(),
            id: None,
        }
    }

    fn with_id(mut self, id: FilmId) -> Self {
        self.id = Some(id.to_string());
        self
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(StatusMessage::new(200, "Films service is up and running"))
}

#[derive(Deserialize)]
struct LoginParams {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginQuery {
    #[serde(default)]
    is_new: bool,
}

#[derive(Serialize)]
struct TokenResponse {
    status: u16,
    token: String,
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    match value {
        Some(value) if !is_blank(&value) => Ok(value),
        _ => Err(ApiError::BadRequest(format!("`{}` is required", field))),
    }
}

async fn login(
    params: web::Json<LoginParams>,
    query: web::Query<LoginQuery>,
    db: Db,
    tokens: Tokens,
) -> Result<HttpResponse, ApiError> {
    let params = params.into_inner();
    let username = required(params.username, "username")?;
    let password = required(params.password, "password")?;

    if query.is_new {
        let user = User {
            username,
            password,
            signing_secret: TokenService::generate_secret(),
        };
        let user_id = db.add_user(&user)?.ok_or_else(|| {
            info!("User {} already exists", user.username);
            ApiError::BadRequest(format!("User {} already exists", user.username))
        })?;
        info!("User {} created with id {}", user.username, user_id);
        let token = tokens.issue(&user)?;
        return Ok(HttpResponse::Created().json(TokenResponse { status: 201, token }));
    }

    match db.get_user_by_username(&username)? {
        Some((_user_id, user)) if user.password == password => {
            info!("User {} has access, issuing token", username);
            let token = tokens.issue(&user)?;
            Ok(HttpResponse::Ok().json(TokenResponse { status: 200, token }))
        }
        _ => {
            info!("User {} not found or wrong password", username);
            Err(ApiError::Forbidden(format!(
                "User {} does not exist or password is incorrect",
                username
            )))
        }
    }
}

/// Film as returned to clients; absent optional fields are omitted.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FilmDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    rating: Rating,
    #[serde(skip_serializing_if = "Option::is_none")]
    release_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    poster_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    added_by: String,
    inserted_on: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_on: Option<DateTime<Utc>>,
}

impl FilmDocument {
    fn new(id: FilmId, film: Film) -> Self {
        FilmDocument {
            id: id.to_string(),
            name: film.name,
            rating: film.rating,
            release_year: film.release_year,
            poster_url: film.poster_url,
            notes: film.notes,
            added_by: film.added_by,
            inserted_on: film.inserted_on,
            updated_on: film.updated_on,
        }
    }
}

/// Body of create and update requests. Every field is optional here so that
/// missing or malformed values become validation errors with a clear message.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilmParams {
    name: Option<String>,
    rating: Option<String>,
    release_year: Option<i32>,
    poster_url: Option<String>,
    notes: Option<String>,
}

fn validate_optional(value: Option<String>, field: &str) -> Result<Option<String>, ApiError> {
    match value {
        Some(value) if is_blank(&value) => {
            Err(ApiError::BadRequest(format!("`{}` must not be blank", field)))
        }
        value => Ok(value),
    }
}

impl FilmParams {
    fn into_update(self) -> Result<FilmUpdate, ApiError> {
        let rating = self
            .rating
            .map(|rating| rating.parse::<Rating>())
            .transpose()
            .map_err(ApiError::BadRequest)?;
        if let Some(year) = self.release_year {
            if year < MIN_RELEASE_YEAR {
                return Err(ApiError::BadRequest(format!(
                    "`releaseYear` must be at least {}",
                    MIN_RELEASE_YEAR
                )));
            }
        }
        Ok(FilmUpdate {
            name: validate_optional(self.name, "name")?,
            rating,
            release_year: self.release_year,
            poster_url: validate_optional(self.poster_url, "posterUrl")?,
            notes: validate_optional(self.notes, "notes")?,
        })
    }

    fn into_new_film(self) -> Result<NewFilm, ApiError> {
        let update = self.into_update()?;
        Ok(NewFilm {
            name: update
                .name
                .ok_or_else(|| ApiError::BadRequest("`name` is required".to_owned()))?,
            rating: update.rating.unwrap_or_default(),
            release_year: update.release_year,
            poster_url: update.poster_url,
            notes: update.notes,
        })
    }
}

fn parse_id(id: &str) -> Result<FilmId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest("Invalid ID".to_owned()))
}

fn film_not_found() -> ApiError {
    ApiError::NotFound("Film not found for user".to_owned())
}

#[derive(Deserialize)]
struct Page {
    offset: Option<usize>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct FilmList {
    total: usize,
    data: Vec<FilmDocument>,
}

async fn list_films(
    user: AuthenticatedUser,
    page: web::Query<Page>,
    db: Db,
) -> Result<HttpResponse, ApiError> {
    let limit = page.limit.unwrap_or(DEFAULT_LIMIT);
    let offset = page.offset.unwrap_or(0);
    let films = db.list_films(&user.username, limit, offset)?;
    info!("Returning {} films for user {}", films.len(), user.username);
    let data: Vec<_> = films
        .into_iter()
        .map(|(id, film)| FilmDocument::new(id, film))
        .collect();
    Ok(HttpResponse::Ok().json(FilmList {
        total: data.len(),
        data,
    }))
}

async fn get_film(
    user: AuthenticatedUser,
    id: web::Path<String>,
    db: Db,
) -> Result<HttpResponse, ApiError> {
    let id = parse_id(&id)?;
    let film = db.get_film(&user.username, id)?.ok_or_else(film_not_found)?;
    Ok(HttpResponse::Ok().json(FilmDocument::new(id, film)))
}

async fn create_film(
    user: AuthenticatedUser,
    params: web::Json<FilmParams>,
    db: Db,
) -> Result<HttpResponse, ApiError> {
    let film = params.into_inner().into_new_film()?;
    let (name, rating) = (film.name.clone(), film.rating);
    let id = db.insert_film(&user.username, film)?;
    info!("Film '{}' ({}) was created with ID {}", name, rating.as_str(), id);
    Ok(HttpResponse::Created()
        .json(StatusMessage::new(201, "Film was successfully added.").with_id(id)))
}

async fn update_film(
    user: AuthenticatedUser,
    id: web::Path<String>,
    params: web::Json<FilmParams>,
    db: Db,
) -> Result<HttpResponse, ApiError> {
    let id = parse_id(&id)?;
    let update = params.into_inner().into_update()?;
    if update.is_empty() {
        return Err(ApiError::BadRequest(
            "Please supply a name, rating, releaseYear, posterUrl or notes value to update for the film."
                .to_owned(),
        ));
    }
    db.update_film(&user.username, id, update)?
        .ok_or_else(film_not_found)?;
    info!("Film with ID {} was updated", id);
    Ok(HttpResponse::Ok()
        .json(StatusMessage::new(200, format!("Film with ID {} was updated", id)).with_id(id)))
}

async fn clear_films(user: AuthenticatedUser, db: Db) -> Result<HttpResponse, ApiError> {
    let removed = db.clear_films(&user.username)?;
    info!("{} films were cleared for user {}", removed, user.username);
    Ok(HttpResponse::Ok().json(StatusMessage::new(200, "Films were cleared")))
}

async fn remove_film(
    user: AuthenticatedUser,
    id: web::Path<String>,
    db: Db,
) -> Result<HttpResponse, ApiError> {
    let id = parse_id(&id)?;
    db.remove_film(&user.username, id)?
        .ok_or_else(film_not_found)?;
    info!("Film with ID {} was removed", id);
    Ok(HttpResponse::Ok().json(StatusMessage::new(200, "Film was removed")))
}

fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> error::Error {
    ApiError::BadRequest(err.to_string()).into()
}

fn query_error(err: error::QueryPayloadError, _req: &HttpRequest) -> error::Error {
    ApiError::BadRequest(err.to_string()).into()
}

fn path_error(err: error::PathError, _req: &HttpRequest) -> error::Error {
    ApiError::BadRequest(err.to_string()).into()
}

/// Registers the routes and the extractor configuration that keeps every
/// rejection in the `{status, message}` shape.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .route("/", web::get().to(health))
        .service(
            web::scope(BASE_PATH)
                .route("/", web::get().to(health))
                .route("/login", web::post().to(login))
                .route("/films", web::get().to(list_films))
                .route("/films", web::post().to(create_film))
                .route("/films", web::delete().to(clear_films))
                .route("/films/{id}", web::get().to(get_film))
                .route("/films/{id}", web::put().to(update_film))
                .route("/films/{id}", web::delete().to(remove_film)),
        );
}
