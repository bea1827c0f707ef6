use tokio::sync::watch;
use tracing::{error, info, Level};

use reward_ledger::{
    configuration::{
        get_configuration, set_configuration, AppState, Config, State,
    },
    error::Error,
    handler::price_ticker,
    provider::DatabasePool,
    server,
};

const LOG_LEVEL: Level = Level::INFO;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let result = app_main().await;

    if let Err(err) = &result {
        error!("{}", err);
    }

    result
}

async fn app_main() -> Result<(), Error> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_level(true)
        .with_max_level(LOG_LEVEL)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let (config, database) = match init().await {
        Ok((config, database)) => (config, database),
        Err(e) => return Err(Error::ConfigurationError(e.to_string())),
    };

    let state = State::new(config, database).await?;
    let app_state = AppState::new(state);

    let (shutdown, receiver) = watch::channel(false);

    let (_, _, _) = tokio::try_join!(
        server::server_task(&app_state, receiver.clone()),
        price_ticker::price_task(app_state.clone(), receiver),
        shutdown_signal(shutdown),
    )?;

    Ok(())
}

async fn init() -> Result<(Config, DatabasePool), Error> {
    set_configuration()?;
    let config = get_configuration()?;
    let database = DatabasePool::new(&config).await?;
    Ok((config, database))
}

async fn shutdown_signal(shutdown: watch::Sender<bool>) -> Result<(), Error> {
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    shutdown
        .send(true)
        .map_err(|err| Error::ServerError(err.to_string()))?;

    Ok(())
}
