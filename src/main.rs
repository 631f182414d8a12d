use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::io;

use taskboard::{
    config::Config,
    repository::{PgStore, Repositories},
    routes, AppState,
};

fn startup_error(context: &str, error: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, error))
}

async fn repositories(config: &Config) -> io::Result<Repositories> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .map_err(|e| startup_error("Failed to connect to database", e))?;
            PgStore::new(pool.clone())
                .migrate()
                .await
                .map_err(|e| startup_error("Failed to run migrations", e))?;
            log::info!("using PostgreSQL storage");
            Ok(Repositories::postgres(pool))
        }
        None => {
            log::warn!("DATABASE_URL is not set; data is kept in memory and lost on restart");
            Ok(Repositories::in_memory())
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| startup_error("Invalid configuration", e))?;
    let state = web::Data::new(AppState::new(repositories(&config).await?, &config));

    log::info!("Starting TaskBoard server at {}", config.server_url());
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .configure(routes::config)
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}
