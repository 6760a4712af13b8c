use actix_web::{middleware::Logger, web, App, HttpServer};

use datalyst::config::Config;
use datalyst::handlers::{get_history, get_profile, submit_query, upload_dataset};
use datalyst::services::{AnalystService, HttpCompletionService, SessionStore};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting AI data analyst service");

    // Load configuration from environment variables
    let config = Config::from_env();

    let completion = HttpCompletionService::new(&config).map_err(|e| {
        log::error!("Failed to initialize completion client: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?;

    let store = SessionStore::new();
    let analyst = AnalystService::new(completion, store.clone());

    let server_url = format!("http://127.0.0.1:{}", config.server_port);
    log::info!("Starting server at {}", server_url);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(analyst.clone()))
            .service(web::resource("/dataset").route(web::post().to(upload_dataset)))
            .service(
                web::resource("/query")
                    .route(web::post().to(submit_query::<HttpCompletionService>)),
            )
            .service(web::resource("/history").route(web::get().to(get_history)))
            .service(web::resource("/profile").route(web::get().to(get_profile)))
    })
    .bind(format!("127.0.0.1:{}", config.server_port))
    .map_err(|e| {
        log::error!("Failed to bind to port {}: {}", config.server_port, e);
        e
    })?
    .run()
    .await
}
