#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, StoreFairing};
use crate::logging::LoggerFairing;
use crate::service::VoteService;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use config::Config;

/// The server as configured by `Rocket.toml` and `ROCKET_*` environment variables.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(StoreFairing)
        .mount("/api", api::routes())
        .register("/", api::catchers())
}

/// The server over an already constructed config and service, skipping the
/// config and store fairings.
pub fn rocket_for_service(config: Config, service: VoteService) -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .manage(config)
        .manage(service)
        .mount("/api", api::routes())
        .register("/", api::catchers())
}

#[cfg(test)]
const DEFAULT_TEST_DB_URI: &str = "mongodb://127.0.0.1:27017/?replicaSet=rs0";

#[cfg(test)]
fn init_test_logging() {
    log4rs_test_utils::test_logging::init_logging_once_for(["ballot_box"], None, None);
}

/// A local client over an empty in-memory store.
#[cfg(test)]
async fn memory_client() -> rocket::local::asynchronous::Client {
    init_test_logging();
    let service = VoteService::new(store::MemoryStore::new());
    rocket::local::asynchronous::Client::tracked(rocket_for_service(Config::example(), service))
        .await
        .unwrap()
}

/// A client for the MongoDB deployment named by `TEST_DB_URI`.
/// Vote transactions need it to be a replica set.
#[cfg(test)]
async fn test_db_client() -> mongodb::Client {
    let uri = std::env::var("TEST_DB_URI").unwrap_or_else(|_| DEFAULT_TEST_DB_URI.to_string());
    mongodb::Client::with_uri_str(uri).await.unwrap()
}

/// A fresh database name, so concurrently running tests never share data.
#[cfg(test)]
fn test_database_name() -> String {
    use rand::{distributions::Alphanumeric, Rng};

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("test_{suffix}")
}

#[cfg(test)]
async fn rocket_for_db(client: mongodb::Client, db_name: &str) -> Rocket<Build> {
    init_test_logging();
    let db = client.database(db_name);
    model::mongodb::ensure_indexes_exist(&db).await.unwrap();
    let service = VoteService::new(store::MongoStore::new(client.clone(), db.clone()));
    rocket_for_service(Config::example(), service)
        .manage(client)
        .manage(db)
}
