pub mod config;
pub mod db;
pub mod dtos;
pub mod error;
pub mod handler;
pub mod mail;
pub mod middleware;
pub mod models;
pub mod oauth;
pub mod policy;
pub mod routes;
pub mod session;
pub mod tracing_config;
pub mod utils;

use std::sync::Arc;

use config::Config;
use db::DBClient;
use mail::sendmail::Mailer;
use oauth::GoogleClient;
use utils::storage::Storage;

/// Shared by every handler. Each field is cheap to clone: the pool and the
/// HTTP client are reference counted internally.
#[derive(Clone)]
pub struct AppState {
    pub env: Arc<Config>,
    pub db_client: DBClient,
    pub google_client: GoogleClient,
    pub mailer: Mailer,
    pub storage: Storage,
}

impl AppState {
    pub fn new(config: Config, db_client: DBClient, http_client: reqwest::Client) -> Self {
        let google_client = GoogleClient::new(http_client, config.google.clone());
        let mailer = Mailer::new(config.smtp.clone());
        let storage = Storage::new(&config.upload_folder, &config.image_base_url);

        AppState {
            env: Arc::new(config),
            db_client,
            google_client,
            mailer,
            storage,
        }
    }
}
