mod handlers;
mod models;
mod services;
mod utils;

#[cfg(test)]
mod test_support;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use services::seed::seed_database;
use services::upload_store::UploadStore;
use std::io;
use utils::{
    config::Config,
    db::{create_schema, establish_connection, reset_schema},
};

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    log::error!("{}: {}", context, err);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=================================================");
    println!("🗺️  Trackmapper Backend Server");
    println!("=================================================");

    let config = Config::from_env().map_err(|e| startup_error("Failed to load configuration", e))?;
    let host = config.host.clone();
    let port = config.port;

    println!("📝 Configuration loaded:");
    println!("   - Database: {}", config.redacted_database_url());
    println!("   - Host: {}", host);
    println!("   - Port: {}", port);
    println!("   - Upload folder: {}", config.upload_dir.display());
    println!("   - Map owner: user {}", config.map_owner_id);
    println!(
        "   - Log level: {}",
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    );

    print!("🔌 Connecting to database... ");
    let db = establish_connection(&config.database_url)
        .await
        .map_err(|e| startup_error("Failed to connect to database", e))?;
    println!("✅ Connected!");

    if config.reset_database || config.seed_database {
        log::warn!("Resetting database");
        reset_schema(&db)
            .await
            .map_err(|e| startup_error("Failed to reset database", e))?;
    } else {
        create_schema(&db)
            .await
            .map_err(|e| startup_error("Failed to create schema", e))?;
    }

    let store = UploadStore::new(&config.upload_dir);
    store
        .ensure_root()
        .await
        .map_err(|e| startup_error("Failed to create upload folder", e))?;

    if config.seed_database {
        let summary = seed_database(&db, &store)
            .await
            .map_err(|e| startup_error("Failed to seed database", format!("{:#}", e)))?;
        log::info!(
            "🌱 Seeded {} users, {} friendships, {} maps, {} activities",
            summary.users,
            summary.friendships,
            summary.maps,
            summary.activities
        );
    }

    println!("🌐 Starting HTTP server at http://{}:{}", host, port);
    println!("📍 Available endpoints:");
    println!("   - POST   http://{}:{}/upload", host, port);
    println!("   - GET    http://{}:{}/download/<filename>", host, port);
    println!("   - GET    http://{}:{}/maps/nearest", host, port);
    println!("   - POST   http://{}:{}/maps/upload", host, port);
    println!("   - DELETE http://{}:{}/maps/<id>", host, port);
    println!("   - POST   http://{}:{}/activities/upload", host, port);
    println!("   - GET    http://{}:{}/users/<id>[/maps|/activities]", host, port);
    println!("   - GET    http://{}:{}/users/<id>/friends/activities", host, port);
    println!("   - POST   http://{}:{}/users/<id>/friends/<friend_id>", host, port);
    println!("=================================================");

    log::info!("Server started at http://{}:{}", host, port);

    HttpServer::new(move || {
        let cors = if config.cors_allowed_origins.is_empty() {
            Cors::permissive()
        } else {
            config
                .cors_allowed_origins
                .iter()
                .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
                .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                .allowed_headers(vec![
                    actix_web::http::header::ACCEPT,
                    actix_web::http::header::CONTENT_TYPE,
                ])
                .max_age(3600)
        };

        App::new()
            .app_data(web::Data::new(db.clone()))
            .app_data(web::Data::new(config.clone()))
            .app_data(handlers::multipart_config(&config))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(handlers::configure)
    })
    .bind((host, port))?
    .run()
    .await
}
