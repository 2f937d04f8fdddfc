#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use passkey_rp::{
    configure_services,
    handlers::SharedService,
    settings::{Settings, StorageBackend},
    store::{CredentialStore, FileCredentialStore, MemoryCredentialStore},
    webauthn::cose,
    RelyingPartyService, VERSION,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = Settings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    let store = open_store(&settings)?;
    let service: SharedService =
        RelyingPartyService::from_settings(settings.webauthn.clone(), store).map_err(|e| {
            std::io::Error::other(format!("Failed to initialize relying party: {e}"))
        })?;

    start_server(Arc::new(service), settings).await
}

/// Open the configured credential store
///
/// # Errors
///
/// Returns an error if the file store directory cannot be created or read.
fn open_store(settings: &Settings) -> std::io::Result<Arc<dyn CredentialStore>> {
    match settings.storage.backend {
        StorageBackend::Memory => {
            println!("✓ Using in-memory credential store (records are lost on restart)");
            let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
            Ok(store)
        }
        StorageBackend::File => {
            let store = FileCredentialStore::open(&settings.storage.path).map_err(|e| {
                std::io::Error::other(format!("Failed to open credential store: {e}"))
            })?;
            println!(
                "✓ Using file credential store at {} ({} records)",
                settings.storage.path,
                store.len().unwrap_or_default()
            );
            let store: Arc<dyn CredentialStore> = Arc::new(store);
            Ok(store)
        }
    }
}

/// Start the server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(service: Arc<SharedService>, settings: Settings) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    print_startup_info(&bind_address, &settings);

    // Configure CORS for SPAs
    let cors_origins = settings.get_cors_origins();
    let service = web::Data::from(service);

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                cors_origins
                    .iter()
                    .any(|allowed| allowed == origin.to_str().unwrap_or(""))
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["Content-Type", "Accept"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(service.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, settings: &Settings) {
    let webauthn = &settings.webauthn;
    println!("Starting passkey-rp {VERSION} on http://{bind_address}");
    println!(
        "Relying party: {} (id: {})",
        webauthn.rp_name,
        webauthn.rp_id.as_deref().unwrap_or("<client default>")
    );
    println!("Allowed origins: {}", webauthn.allowed_origins.join(", "));
    let algorithms: Vec<&str> = webauthn
        .supported_algorithms
        .iter()
        .map(|alg| cose::name(*alg))
        .collect();
    println!("Accepted algorithms: {}", algorithms.join(", "));
    println!("Duplicate policy: {:?}", webauthn.duplicate_policy);
    println!();
    println!("Passkey endpoints:");
    println!("  POST /auth/passkey/register/start - Start passkey registration");
    println!("  POST /auth/passkey/register/complete - Complete passkey registration");
    println!("  POST /auth/passkey/auth/start - Start passkey authentication");
    println!("  POST /auth/passkey/auth/complete - Complete passkey authentication");
    println!();
    println!("System endpoints:");
    println!("  GET  /ping            - Health check");
}
