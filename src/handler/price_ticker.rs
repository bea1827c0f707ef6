use std::future::Future;

use tokio::{
    sync::watch,
    time::{self, Duration},
};
use tracing::{debug, error, info};

use crate::{
    configuration::{AppState, State},
    error::Error,
};

pub async fn refresh_prices(app_state: AppState<State>) -> Result<(), Error> {
    let symbols = app_state.database.stock.get_symbols().await?;
    let count = app_state.price_oracle.refresh(&symbols).await?;
    debug!("Refreshed {} prices", count);

    Ok(())
}

pub async fn price_task(
    app_state: AppState<State>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    let period = Duration::from_secs(app_state.config.price_update_interval);

    tokio::spawn(async move {
        let cycles = run_ticker(period, shutdown, || {
            refresh_prices(app_state.clone())
        })
        .await;
        info!("Price ticker stopped after {} cycles", cycles);
        Ok(())
    })
    .await?
}

/// Runs `tick` every `period`, skipping the immediate first tick, until
/// `shutdown` turns true or its sender goes away. Tick errors are logged and
/// do not stop the loop. Returns the number of ticks run.
pub async fn run_ticker<F, Fut>(
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> usize
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), Error>>,
{
    let mut interval = time::interval(period);
    let mut cycles = 0;
    interval.tick().await;

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = interval.tick() => {
                cycles += 1;
                if let Err(error) = tick().await {
                    error!("Task error {}", error);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    cycles
}
