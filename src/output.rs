//! Remote-write output lifecycle
//!
//! [`Output`] wires the pieces together and owns everything a running
//! pipeline needs:
//!
//! - the series store and its tag cache
//! - a buffer of sample containers handed over by the load generator
//! - a collector task draining that buffer into the store every period
//! - a flusher task shipping the store to the endpoint every period
//!
//! # Lifecycle
//!
//! ```text
//! new ──► start ──► add_metric_samples* ──► stop
//!                                            │
//!                           final collect + final flush
//! ```
//!
//! Samples can also bypass the buffer through [`Output::ingest`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::flusher::{FlushOutcome, Flusher};
use crate::ingestion::{IngestReport, Ingester, PipelineMetrics, PipelineSnapshot};
use crate::remote::{HttpWriteClient, WireMapper, WriteClient};
use crate::tsdb::{InMemoryRepository, Repository, TagCache};
use crate::types::SampleContainer;

/// Buffered containers waiting for the next collection
type SampleBuffer = Mutex<Vec<Box<dyn SampleContainer>>>;

/// Handles of the background tasks
struct Tasks {
    shutdown: Vec<mpsc::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

/// Prometheus remote-write output
pub struct Output {
    config: Config,
    repository: Arc<dyn Repository>,
    ingester: Arc<Ingester>,
    flusher: Arc<Flusher>,
    buffer: Arc<SampleBuffer>,
    metrics: Arc<PipelineMetrics>,
    running: AtomicBool,
    tasks: Mutex<Option<Tasks>>,
}

impl Output {
    /// Create an output delivering through `client`
    ///
    /// The configuration is validated first.
    pub fn new(config: Config, client: Arc<dyn WriteClient>) -> Result<Self> {
        config.validate()?;

        let repository: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let metrics = Arc::new(PipelineMetrics::new());
        let ingester = Arc::new(Ingester::new(
            Arc::clone(&repository),
            Arc::new(TagCache::new()),
            Arc::clone(&metrics),
        ));
        let flusher = Arc::new(Flusher::new(
            Arc::clone(&repository),
            WireMapper::from_config(&config),
            client,
            Arc::clone(&metrics),
            config.push_interval,
        ));

        Ok(Self {
            config,
            repository,
            ingester,
            flusher,
            buffer: Arc::new(Mutex::new(Vec::new())),
            metrics,
            running: AtomicBool::new(false),
            tasks: Mutex::new(None),
        })
    }

    /// Create an output delivering over HTTP to the configured endpoint
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let client = HttpWriteClient::from_config(&config)?;
        Self::new(config, Arc::new(client))
    }

    /// Human-readable description
    pub fn description(&self) -> String {
        format!("Prometheus remote-write ({})", self.config.url)
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the background tasks are running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the collector and flusher tasks
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Lifecycle(format!("no Tokio runtime available: {}", e)))?;

        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Output already started");
            return Err(Error::Lifecycle("output already started".to_string()));
        }

        let period = self.config.push_interval;

        let (collector_tx, collector_rx) = mpsc::channel::<()>(1);
        let collector = runtime.spawn(run_collector(
            Arc::clone(&self.ingester),
            Arc::clone(&self.buffer),
            period,
            collector_rx,
        ));

        let (flusher_tx, flusher_rx) = mpsc::channel::<()>(1);
        let flusher = Arc::clone(&self.flusher);
        let flush_task = runtime.spawn(async move { flusher.run(flusher_rx).await });

        *self.tasks.lock() = Some(Tasks {
            shutdown: vec![collector_tx, flusher_tx],
            handles: vec![collector, flush_task],
        });

        info!(
            url = %self.config.url,
            push_interval = ?period,
            "Periodic collector and series flusher have started"
        );
        Ok(())
    }

    /// Stop the background tasks and push what is left
    ///
    /// Waits for an in-flight flush to finish, then runs one last collection
    /// and one last flush so buffered samples are not lost.
    pub async fn stop(&self) -> Result<()> {
        debug!("Stopping the output");

        let tasks = self.tasks.lock().take();
        let tasks = match tasks {
            Some(tasks) => tasks,
            None => return Err(Error::Lifecycle("output is not running".to_string())),
        };

        for tx in &tasks.shutdown {
            let _ = tx.send(()).await;
        }
        for handle in tasks.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        self.collect();
        let outcome = self.flusher.flush_once().await;
        self.running.store(false, Ordering::SeqCst);

        info!(
            unique_series = self.repository.len(),
            final_flush = ?outcome,
            "Output stopped"
        );
        Ok(())
    }

    /// Buffer sample containers until the next collection
    pub fn add_metric_samples(&self, containers: Vec<Box<dyn SampleContainer>>) {
        if containers.is_empty() {
            return;
        }
        self.buffer.lock().extend(containers);
    }

    /// Number of containers waiting in the buffer
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Drain the buffer into the store now
    pub fn collect(&self) -> IngestReport {
        collect_buffered(&self.ingester, &self.buffer)
    }

    /// Ingest containers directly, bypassing the buffer
    pub fn ingest<C: SampleContainer>(&self, containers: &[C]) -> IngestReport {
        self.ingester.ingest(containers)
    }

    /// Run one flush cycle now
    pub async fn flush(&self) -> FlushOutcome {
        self.flusher.flush_once().await
    }

    /// Number of distinct series aggregated so far
    pub fn series_count(&self) -> usize {
        self.repository.len()
    }

    /// Series store
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    /// Pipeline self-metrics
    pub fn stats(&self) -> PipelineSnapshot {
        self.metrics.snapshot()
    }
}

fn collect_buffered(ingester: &Ingester, buffer: &SampleBuffer) -> IngestReport {
    let containers = std::mem::take(&mut *buffer.lock());
    if containers.is_empty() {
        return IngestReport::default();
    }

    let report = ingester.ingest(&containers);
    debug!(
        containers = containers.len(),
        samples = report.accepted,
        dropped = report.dropped,
        new_series = report.series_created,
        "Collected buffered samples"
    );
    report
}

async fn run_collector(
    ingester: Arc<Ingester>,
    buffer: Arc<SampleBuffer>,
    period: Duration,
    mut shutdown: mpsc::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!("Sample collector shutting down");
                break;
            }
            _ = ticker.tick() => {
                collect_buffered(&ingester, &buffer);
            }
        }
    }
}
