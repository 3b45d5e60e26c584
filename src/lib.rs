#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, DatabaseFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod error;
pub mod integrity;
pub mod logging;
pub mod model;
pub mod store;

/// Build the production server, configured from `Rocket.toml` and the
/// environment and backed by MongoDB.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .register("/", error::catchers())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
}

/// Build a server over a given in-memory store.
#[cfg(test)]
pub(crate) fn rocket_for_store(store: store::MemoryStore) -> Rocket<Build> {
    use rocket::figment::Figment;

    let figment = Figment::from(rocket::Config::debug_default())
        .merge(("jwt_secret", TEST_JWT_SECRET))
        .merge(("store_timeout_ms", 500));
    rocket::custom(figment)
        .mount("/", api::routes())
        .register("/", error::catchers())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(config::StoreFairing(store))
}

#[cfg(test)]
const TEST_JWT_SECRET: &str = "test-secret";

/// An `Authorization` header carrying a freshly signed token for `identity`.
#[cfg(test)]
pub(crate) fn bearer(identity: model::common::identity::Identity) -> rocket::http::Header<'static> {
    use model::api::auth::{AnyRole, AuthToken};

    let config = config::Config::with_secret(TEST_JWT_SECRET);
    let token = AuthToken::<AnyRole>::new(identity)
        .encode(&config, chrono::Duration::minutes(10))
        .unwrap();
    rocket::http::Header::new("Authorization", format!("Bearer {token}"))
}
