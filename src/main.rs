use std::{io, sync::Arc};

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing::{error, info};

use opensplit::{
    auth::TokenSigner, config::Config, routes, service::Service, store::MongoStore, telemetry,
};

#[actix_web::main]
async fn main() -> io::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init();

    let config = Config::from_env().map_err(|err| {
        error!(error = %err, "invalid configuration");
        io::Error::new(io::ErrorKind::InvalidInput, err)
    })?;

    info!(database = %config.database, "connecting to MongoDB");
    let store = MongoStore::connect(&config.mongodb_uri, config.database.clone())
        .await
        .map_err(|err| {
            error!(error = %err, "failed to connect");
            io::Error::new(io::ErrorKind::Other, err)
        })?;
    info!("connected");

    let service = web::Data::new(Service::new(Arc::new(store)));
    let signer = web::Data::new(TokenSigner::new(&config.auth_secret));
    let allowed_origin = config.allowed_origin.clone();

    info!(host = %config.host, port = config.port, "listening");
    HttpServer::new(move || {
        let cors = match &allowed_origin {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header(),
            None => Cors::permissive(),
        };
        App::new()
            .wrap(cors)
            .app_data(service.clone())
            .app_data(signer.clone())
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
