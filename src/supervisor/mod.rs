use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::data_model::{DialMode, RuntimeConfig};
use crate::connectors::{DialInConnector, DialOutServer};
use crate::errors::SinkError;
use crate::parser::{self, RawRecord};
use crate::sinks::{build_sinks, Sink};

pub mod stats;

pub use stats::PipelineStats;

/// How many times a batch is re-queued after a retryable sink failure.
const MAX_BATCH_RETRIES: u32 = 3;

/// Poll interval for the drain check once the inputs have ended.
const IDLE_TICK: Duration = Duration::from_millis(200);

/// A unit of work for the pool: raw records plus retry bookkeeping.
#[derive(Debug)]
struct Batch {
    records: Vec<RawRecord>,
    attempt: u32,
    /// Sinks still owed this batch; `None` means all of them.
    pending_sinks: Option<HashSet<String>>,
}

/// Wires the configured inputs to the configured outputs.
///
/// Connectors run as independent tasks and share one bounded queue. The
/// supervisor drains that queue, accumulates batches (size or flush-tick
/// bounded), and hands each batch to a worker from a fixed-size pool. A
/// worker decodes, parses, and uploads to every sink in order.
pub struct Supervisor {
    config: RuntimeConfig,
    sinks: Vec<Arc<dyn Sink>>,
    stats: Arc<PipelineStats>,
}

impl Supervisor {
    pub fn new(config: RuntimeConfig) -> Self {
        let sinks = build_sinks(&config.outputs);
        Self {
            config,
            sinks,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    pub async fn run(self) -> Result<()> {
        let (raw_tx, raw_rx) = mpsc::channel::<RawRecord>(self.config.queue_depth);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut connector_handles = Vec::new();
        for input in &self.config.inputs {
            match input.dial {
                DialMode::Out => {
                    let server = DialOutServer::bind(
                        input,
                        raw_tx.clone(),
                        shutdown_rx.clone(),
                        Arc::clone(&self.stats),
                    )
                    .with_context(|| {
                        format!("failed to bind dial-out listener [{}]", input.name)
                    })?;
                    connector_handles.push(tokio::spawn(server.run()));
                }
                DialMode::In => {
                    let connector = DialInConnector::new(
                        input.clone(),
                        raw_tx.clone(),
                        shutdown_rx.clone(),
                        Arc::clone(&self.stats),
                    );
                    connector_handles.push(tokio::spawn(connector.run()));
                }
            }
        }
        // Only the connectors hold raw senders now; the queue closes when
        // the last of them stops.
        drop(raw_tx);

        info!(
            inputs = self.config.inputs.len(),
            sinks = self.sinks.len(),
            workers = self.config.worker_pool_size,
            "Pipeline started"
        );

        let mut dispatcher = tokio::spawn(dispatch_loop(
            raw_rx,
            self.sinks.clone(),
            Arc::clone(&self.stats),
            self.config.batch_size,
            self.config.flush_interval,
            self.config.worker_pool_size,
        ));

        let mut dispatcher_done = false;
        tokio::select! {
            _ = shutdown_signal() => {
                info!("Shutdown signal received, stopping connectors");
                let _ = shutdown_tx.send(true);
            }
            result = &mut dispatcher => {
                // All inputs ended on their own (retry disabled everywhere).
                dispatcher_done = true;
                if let Err(e) = result {
                    error!(error = %e, "Dispatcher task failed");
                }
            }
        }

        if !dispatcher_done {
            match tokio::time::timeout(self.config.drain_timeout, &mut dispatcher).await {
                Ok(Err(e)) => error!(error = %e, "Dispatcher task failed during drain"),
                Ok(Ok(())) => {}
                Err(_) => {
                    warn!(
                        timeout_s = self.config.drain_timeout.as_secs(),
                        "Drain timeout expired, abandoning in-flight batches"
                    );
                    dispatcher.abort();
                }
            }
        }

        let _ = shutdown_tx.send(true);
        for handle in connector_handles {
            if tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .is_err()
            {
                warn!("Connector did not stop in time");
            }
        }

        info!(
            enqueued = self.stats.records_enqueued(),
            dropped_records = self.stats.records_dropped(),
            batches = self.stats.batches_dispatched(),
            dropped_batches = self.stats.batches_dropped(),
            reconnects = self.stats.reconnects(),
            "Pipeline stopped"
        );
        Ok(())
    }
}

/// Drain the raw queue into batches and hand them to pool workers.
///
/// A batch goes out when it reaches `batch_size` or when `flush_interval`
/// elapses with records waiting. Retryable sink failures re-queue the batch
/// through `retry_rx` with the remaining sinks attached. The loop ends when
/// the inputs are gone and every in-flight batch has settled.
async fn dispatch_loop(
    mut raw_rx: mpsc::Receiver<RawRecord>,
    sinks: Vec<Arc<dyn Sink>>,
    stats: Arc<PipelineStats>,
    batch_size: usize,
    flush_interval: Duration,
    pool_size: usize,
) {
    let semaphore = Arc::new(Semaphore::new(pool_size));
    let (retry_tx, mut retry_rx) = mpsc::channel::<Batch>(pool_size.max(1) * 2);

    let mut pending: Vec<RawRecord> = Vec::new();
    let mut flush_deadline: Option<Instant> = None;
    let mut inputs_done = false;

    loop {
        tokio::select! {
            maybe = raw_rx.recv(), if !inputs_done => match maybe {
                Some(record) => {
                    pending.push(record);
                    if flush_deadline.is_none() {
                        flush_deadline = Some(Instant::now() + flush_interval);
                    }
                    if pending.len() >= batch_size {
                        let batch = new_batch(&mut pending, &mut flush_deadline);
                        dispatch(batch, &semaphore, &sinks, &stats, &retry_tx).await;
                    }
                }
                None => {
                    inputs_done = true;
                    if !pending.is_empty() {
                        let batch = new_batch(&mut pending, &mut flush_deadline);
                        dispatch(batch, &semaphore, &sinks, &stats, &retry_tx).await;
                    }
                }
            },

            Some(batch) = retry_rx.recv() => {
                dispatch(batch, &semaphore, &sinks, &stats, &retry_tx).await;
            }

            _ = tokio::time::sleep_until(flush_deadline.unwrap_or_else(Instant::now)),
                    if flush_deadline.is_some() => {
                info!(records = pending.len(), "Flushing partial batch on idle timeout");
                let batch = new_batch(&mut pending, &mut flush_deadline);
                dispatch(batch, &semaphore, &sinks, &stats, &retry_tx).await;
            }

            _ = tokio::time::sleep(IDLE_TICK), if inputs_done => {
                // Workers hold their permit until any retry has been
                // re-queued, so full availability means nothing is in
                // flight and no retry can still appear.
                while let Ok(batch) = retry_rx.try_recv() {
                    dispatch(batch, &semaphore, &sinks, &stats, &retry_tx).await;
                }
                if pending.is_empty() && semaphore.available_permits() == pool_size {
                    break;
                }
            }
        }
    }

    debug!("Dispatcher drained");
}

fn new_batch(pending: &mut Vec<RawRecord>, flush_deadline: &mut Option<Instant>) -> Batch {
    *flush_deadline = None;
    Batch {
        records: std::mem::take(pending),
        attempt: 0,
        pending_sinks: None,
    }
}

async fn dispatch(
    batch: Batch,
    semaphore: &Arc<Semaphore>,
    sinks: &[Arc<dyn Sink>],
    stats: &Arc<PipelineStats>,
    retry_tx: &mpsc::Sender<Batch>,
) {
    let Ok(permit) = Arc::clone(semaphore).acquire_owned().await else {
        return;
    };
    stats.note_batch_dispatched();

    let sinks = sinks.to_vec();
    let stats = Arc::clone(stats);
    let retry_tx = retry_tx.clone();
    tokio::spawn(async move {
        process_batch(batch, &sinks, &stats, &retry_tx).await;
        drop(permit);
    });
}

/// One stateless worker pass: decode, parse, upload to every owed sink.
async fn process_batch(
    batch: Batch,
    sinks: &[Arc<dyn Sink>],
    stats: &Arc<PipelineStats>,
    retry_tx: &mpsc::Sender<Batch>,
) {
    let mut parsed = Vec::new();
    for record in &batch.records {
        match parser::process_record(record) {
            Ok(mut records) => parsed.append(&mut records),
            Err(e) => {
                stats.note_dropped_record();
                warn!(peer = %record.peer, error = %e, "Dropping undecodable record");
            }
        }
    }
    if parsed.is_empty() {
        return;
    }

    let mut retry_sinks = HashSet::new();
    for sink in sinks {
        if let Some(pending) = &batch.pending_sinks {
            if !pending.contains(sink.name()) {
                continue;
            }
        }
        match sink.upload(&parsed).await {
            Ok(()) => {}
            Err(SinkError::Retryable(reason)) => {
                warn!(sink = sink.name(), %reason, attempt = batch.attempt,
                    "Retryable sink failure");
                retry_sinks.insert(sink.name().to_string());
            }
            Err(SinkError::Permanent(reason)) => {
                error!(sink = sink.name(), %reason, records = parsed.len(),
                    "Permanent sink failure, dropping batch for this sink");
            }
        }
    }

    if retry_sinks.is_empty() {
        return;
    }
    if batch.attempt >= MAX_BATCH_RETRIES {
        stats.note_batch_dropped();
        error!(
            attempts = batch.attempt,
            records = batch.records.len(),
            sinks = ?retry_sinks,
            "Dropping batch after exhausting retries"
        );
        return;
    }

    let requeued = Batch {
        records: batch.records,
        attempt: batch.attempt + 1,
        pending_sinks: Some(retry_sinks),
    };
    if retry_tx.send(requeued).await.is_err() {
        stats.note_batch_dropped();
        error!("Retry queue closed, dropping batch");
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for ctrl-c");
                }
                return;
            }
        };
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for ctrl-c");
                }
            }
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
        }
    }
}
