use actix_cors::Cors;
use actix_web::{dev::Server, http::header, middleware, web, App, HttpServer};
use tokio::sync::watch;
use tracing::info;

use crate::{
    configuration::{AppState, State},
    controller::{misc, portfolio, rewards},
    error::Error,
};

/// Serves the HTTP API until `shutdown` turns true, then stops gracefully.
pub async fn server_task(
    app_state: &AppState<State>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    let app = app_state.clone();
    tokio::spawn(async move {
        let server = init_server(app)?;
        let handle = server.handle();
        let mut running = tokio::spawn(server);

        tokio::select! {
            result = &mut running => {
                result??;
                return Ok(());
            }
            _ = shutdown.wait_for(|stop| *stop) => {}
        }

        info!("Stopping HTTP server");
        handle.stop(true).await;
        running.await??;

        Ok(())
    })
    .await?
}

fn init_server(app_state: AppState<State>) -> Result<Server, Error> {
    let host = app_state.config.server_host.to_owned();
    let port = app_state.config.port;
    let address = format!("{}:{}", host, port);

    let server = HttpServer::new(move || {
        let app = app_state.clone();
        let allowed_cors = String::from("*");
        let cors_access_all =
            app.config.allowed_origins.contains(&allowed_cors);
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                if cors_access_all {
                    return true;
                }
                let allowed = &app.config.allowed_origins;
                if let Ok(origin) = origin.to_str() {
                    return allowed.contains(&origin.to_owned());
                }
                false
            })
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT])
            .allowed_header(header::CONTENT_TYPE);

        App::new()
            .wrap(cors)
            .wrap(middleware::Compress::default())
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().limit(4096))
            .service(misc::health)
            .service(misc::version)
            .service(rewards::post_reward)
            .service(rewards::revert_reward)
            .service(portfolio::today_stocks)
            .service(portfolio::stats)
            .service(portfolio::historical_inr)
            .service(portfolio::get_portfolio)
    })
    .bind((host, port))?
    .disable_signals()
    .run();

    info!("HTTP server listening on {}", address);

    Ok(server)
}
