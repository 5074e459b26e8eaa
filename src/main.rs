mod api;
mod auth;
mod config;
mod database;
mod error;
mod model;
mod token;

use actix_web::{middleware::Logger, web, App, HttpServer};
use log::info;
use std::io;
use token::TokenService;

fn startup_error<E: std::fmt::Display>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

#[actix_rt::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("filmshelf=debug,actix_web=info"),
    )
    .init();

    let config = config::Config::from_env().map_err(startup_error)?;
    let db = web::Data::new(config.open_db().map_err(startup_error)?);
    let tokens = web::Data::new(TokenService::new());
    info!("Opened film store at {}", config.db_uri);

    info!("Running on {}", config.bind_address);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(db.clone())
            .app_data(tokens.clone())
            .configure(api::configure)
    })
    .bind(config.bind_address)?
    .run()
    .await
}
