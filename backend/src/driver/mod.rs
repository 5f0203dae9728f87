//! Periodic driver.
//!
//! Design principles:
//! - **Lane per instrument**: each watched instrument runs in its own task
//!   and owns its rolling state. Lanes are keyed by symbol.
//! - **Explicit backpressure**: a lane's command channel holds one message.
//!   A tick that finds the lane busy is skipped, never queued.
//! - **Clean cancellation**: `unwatch` waits for the in-flight tick before
//!   the lane's state is dropped.

pub mod lane;

pub use lane::{LaneCommand, TickOutcome};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use common::instrument_span;
use corelib::models::Instrument;
use futures::future::join_all;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Sender};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument as _, debug, error, info, info_span, warn};

use crate::error::AppError;
use crate::pipeline::PipelineContext;
use lane::Lane;

struct LaneHandle {
    tx: Sender<LaneCommand>,
    task: JoinHandle<()>,
}

impl LaneHandle {
    /// Ask the lane to stop and wait until it has.
    async fn stop(self, symbol: &str) -> Result<(), AppError> {
        let gone = || AppError::LaneGone(symbol.to_string());

        let (ack, acked) = oneshot::channel();
        self.tx
            .send(LaneCommand::Stop { ack })
            .await
            .map_err(|_| gone())?;
        acked.await.map_err(|_| gone())?;
        self.task.await.map_err(|_| gone())
    }
}

type Lanes = Arc<Mutex<HashMap<String, LaneHandle>>>;

pub struct Driver {
    ctx: Arc<PipelineContext>,
    lanes: Lanes,
    ticker: Mutex<Option<JoinHandle<()>>>,
    ticks: Arc<AtomicU64>,
    stopped: AtomicBool,
}

impl Driver {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self {
            ctx,
            lanes: Arc::new(Mutex::new(HashMap::new())),
            ticker: Mutex::new(None),
            ticks: Arc::new(AtomicU64::new(0)),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    /// Start the periodic ticker. Calling it again is a no-op.
    pub async fn start(&self) -> Result<(), AppError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(AppError::ShutDown);
        }

        let mut ticker = self.ticker.lock().await;
        if ticker.is_some() {
            return Ok(());
        }

        let period = self.ctx.config.update_interval();
        info!(component = "driver", event = "startup", period_ms = period.as_millis() as u64);

        *ticker = Some(tokio::spawn(
            run_ticker(Arc::clone(&self.lanes), Arc::clone(&self.ticks), period)
                .instrument(info_span!("ticker")),
        ));

        Ok(())
    }

    /// Spawn a lane for `instrument`.
    pub async fn watch(&self, instrument: Instrument) -> Result<(), AppError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(AppError::ShutDown);
        }

        let mut lanes = self.lanes.lock().await;
        let symbol = instrument.symbol.clone();

        if lanes.contains_key(&symbol) {
            return Err(AppError::AlreadyWatched(symbol));
        }

        let (tx, rx) = mpsc::channel(1);
        let span = instrument_span("lane", &symbol);
        let lane = Lane::new(instrument, Arc::clone(&self.ctx));
        let task = tokio::spawn(lane.run(rx).instrument(span));

        lanes.insert(symbol.clone(), LaneHandle { tx, task });
        info!(component = "driver", instrument = %symbol, "watching instrument");

        Ok(())
    }

    /// Stop the lane for `symbol` after its in-flight tick, if any, completes.
    pub async fn unwatch(&self, symbol: &str) -> Result<(), AppError> {
        let handle = self
            .lanes
            .lock()
            .await
            .remove(symbol)
            .ok_or_else(|| AppError::NotWatched(symbol.to_string()))?;

        handle.stop(symbol).await?;
        info!(component = "driver", instrument = %symbol, "stopped watching instrument");
        Ok(())
    }

    pub async fn watched(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.lanes.lock().await.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Run one tick on every lane and wait for all of them. Lanes run
    /// concurrently; results are sorted by symbol.
    pub async fn step(&self) -> Vec<(String, TickOutcome)> {
        let senders: Vec<(String, Sender<LaneCommand>)> = self
            .lanes
            .lock()
            .await
            .iter()
            .map(|(symbol, lane)| (symbol.clone(), lane.tx.clone()))
            .collect();

        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;

        let mut outcomes = join_all(senders.into_iter().map(|(symbol, tx)| async move {
            let (done, outcome) = oneshot::channel();
            if tx
                .send(LaneCommand::Tick {
                    tick,
                    done: Some(done),
                })
                .await
                .is_err()
            {
                return (symbol, TickOutcome::Stopped);
            }
            (symbol, outcome.await.unwrap_or(TickOutcome::Stopped))
        }))
        .await;

        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        outcomes
    }

    /// Stop the ticker and every lane, then flush pending deliveries.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.abort();
        }

        let lanes: Vec<(String, LaneHandle)> = self.lanes.lock().await.drain().collect();
        for (symbol, handle) in lanes {
            if let Err(e) = handle.stop(&symbol).await {
                error!(component = "driver", instrument = %symbol, error = %e, "lane did not stop cleanly");
            }
        }

        self.ctx.dispatcher.shutdown().await;
        info!(component = "driver", event = "shutdown");
    }
}

async fn run_ticker(lanes: Lanes, ticks: Arc<AtomicU64>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let tick = ticks.fetch_add(1, Ordering::SeqCst) + 1;

        for (symbol, lane) in lanes.lock().await.iter() {
            match lane.tx.try_send(LaneCommand::Tick { tick, done: None }) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    debug!(instrument = %symbol, tick, "lane busy; tick skipped");
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(instrument = %symbol, tick, "lane channel closed");
                }
            }
        }
    }
}
