use std::sync::Arc;
use std::time::Duration;

use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::mongodb::ensure_indexes_exist;
use crate::store::{Deadline, ElectionStore, MongoStore, Store};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_store_timeout_ms")]
    store_timeout_ms: u64,
    // secrets
    jwt_secret: String,
}

fn default_store_timeout_ms() -> u64 {
    5000
}

impl Config {
    /// Key shared with the auth provider, used to verify JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Upper bound on any single store call.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
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
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Wrap a store in the configured deadline and manage it as [`Store`].
/// Must run after [`ConfigFairing`].
fn manage_store<S>(rocket: Rocket<Build>, inner: S) -> rocket::fairing::Result
where
    S: ElectionStore + 'static,
{
    let Some(timeout) = rocket.state::<Config>().map(Config::store_timeout) else {
        error!("Store attached before the application config was loaded");
        return Err(rocket);
    };
    let store: Store = Arc::new(Deadline::new(inner, timeout));
    Ok(rocket.manage(store))
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: String,
}

fn default_db_name() -> String {
    "elections".to_string()
}

/// A fairing that loads the MongoDB config, connects to the database,
/// ensures the required indexes exist, and places a [`Store`] backed by it
/// into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&config.db_name);

        // The vote uniqueness constraint lives in these indexes, so refuse
        // to start without them.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        manage_store(rocket, MongoStore::new(client, &db))
    }
}

/// A fairing that places an already constructed store into managed state.
pub struct StoreFairing<S>(pub S);

#[rocket::async_trait]
impl<S> Fairing for StoreFairing<S>
where
    S: ElectionStore + Clone + 'static,
{
    fn info(&self) -> Info {
        Info {
            name: "Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        manage_store(rocket, self.0.clone())
    }
}

/// Example test data.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        pub fn example() -> Self {
            Self::with_secret("test-secret")
        }

        pub fn with_secret(secret: &str) -> Self {
            Self {
                store_timeout_ms: 500,
                jwt_secret: secret.to_string(),
            }
        }
    }
}
