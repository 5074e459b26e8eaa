use log::info;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_DB_URI: &str = "films.db";
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:3001";
/// `DB_URI` value selecting a store that is discarded on exit.
pub const IN_MEMORY: &str = "memory";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid BIND_ADDRESS `{0}`: {1}")]
    BindAddress(String, std::net::AddrParseError),
    #[error("failed to load .env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

/// Only a missing `.env` file is tolerated; a malformed one is an error.
fn load_env_file(result: dotenvy::Result<PathBuf>) -> Result<(), ConfigError> {
    match result {
        Ok(path) => {
            info!("Loaded environment from {}", path.display());
            Ok(())
        }
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_uri: String,
    pub bind_address: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        load_env_file(dotenvy::dotenv())?;
        Self::from_vars(env::var("DB_URI").ok(), env::var("BIND_ADDRESS").ok())
    }

    fn from_vars(db_uri: Option<String>, bind_address: Option<String>) -> Result<Self, ConfigError> {
        let bind_address = bind_address.unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_owned());
        Ok(Config {
            db_uri: db_uri.unwrap_or_else(|| DEFAULT_DB_URI.to_owned()),
            bind_address: bind_address
                .parse()
                .map_err(|err| ConfigError::BindAddress(bind_address.clone(), err))?,
        })
    }

    pub fn open_db(&self) -> sled::Result<sled::Db> {
        if self.db_uri == IN_MEMORY {
            sled::Config::new().temporary(true).open()
        } else {
            sled::open(&self.db_uri)
        }
    }
}
