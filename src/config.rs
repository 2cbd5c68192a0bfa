use log::{error, info, warn};
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::mongodb::ensure_indexes_exist;
use crate::service::VoteService;
use crate::store::{MemoryStore, MongoStore};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default)]
    token_leeway: u64,
    // secrets
    jwt_secret: String,
}

impl Config {
    /// Build a config directly, bypassing figment extraction.
    pub fn new(jwt_secret: impl Into<String>, token_leeway: u64) -> Self {
        Self {
            token_leeway,
            jwt_secret: jwt_secret.into(),
        }
    }

    /// Secret key shared with the identity provider, used to verify bearer JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Clock skew tolerated when checking token expiry, in seconds.
    pub fn token_leeway(&self) -> u64 {
        self.token_leeway
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Which vote store backs the service.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Mongodb,
    /// Process-local; every restart starts from an empty store.
    Memory,
}

/// Configuration for the vote store.
#[derive(Deserialize)]
struct StoreConfig {
    #[serde(default)]
    store: StoreKind,
    // secrets
    db_uri: Option<String>,
    #[serde(default = "default_db_name")]
    db_name: String,
}

fn default_db_name() -> String {
    "votingdb".to_string()
}

/// A fairing that loads the store config, connects to MongoDB if required,
/// ensures the indexes the vote service relies on, and places a
/// [`VoteService`] into managed state.
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Vote store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        let db_uri = match config.store {
            StoreKind::Memory => {
                warn!("Using the in-memory vote store; votes will not survive a restart");
                return Ok(rocket.manage(VoteService::new(MemoryStore::new())));
            }
            StoreKind::Mongodb => match config.db_uri {
                Some(uri) => uri,
                None => {
                    error!("`db_uri` must be set when `store` is \"mongodb\"");
                    return Err(rocket);
                }
            },
        };

        info!("Loaded database config, connecting...");
        let client = match MongoClient::with_uri_str(db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&config.db_name);

        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        let service = VoteService::new(MongoStore::new(client.clone(), db.clone()));
        Ok(rocket.manage(client).manage(db).manage(service))
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        pub fn example() -> Self {
            Self::new("test secret", 0)
        }
    }
}
