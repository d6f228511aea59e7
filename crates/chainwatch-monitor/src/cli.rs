use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chainwatch_rpc::{HttpLedgerRpc, RetryingRpcClient, SnapshotComposer};
use clap::{Parser, Subcommand};

use crate::api::StatusApi;
use crate::config::MonitorConfig;
use crate::metrics::MonitorMetrics;
use crate::poller::{DashboardState, Poller, SystemClock};
use crate::status::ChainStatus;

#[derive(Parser)]
#[command(name = "chainwatch")]
#[command(about = "Resilient ledger RPC monitor", long_about = None)]
pub struct Cli {
    /// TOML or JSON configuration file.
    #[arg(short, long, global = true, env = "CHAINWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// RPC endpoint, in failover order. Replaces the configured list.
    #[arg(short = 'e', long = "endpoint", global = true)]
    pub endpoints: Vec<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Poll continuously and serve the status API.
    Serve {
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },
    /// Poll continuously and print every update.
    Watch {
        /// Exit after this many ticks.
        #[arg(short = 'n', long)]
        ticks: Option<u64>,
        #[arg(long)]
        json: bool,
    },
    /// Take one snapshot and exit.
    Status {
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Serve { bind } => self.serve(bind).await,
            Command::Watch { ticks, json } => self.watch(ticks, json).await,
            Command::Status { json } => self.status(json).await,
        }
    }

    /// Configuration file (or defaults) with command-line endpoints applied.
    pub fn load_config(&self) -> Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::from_file(path)?,
            None => MonitorConfig::default(),
        };
        if !self.endpoints.is_empty() {
            config.endpoints = self.endpoints.clone();
        }
        config.validate()?;
        Ok(config)
    }

    async fn serve(&self, bind: Option<SocketAddr>) -> Result<()> {
        let mut config = self.load_config()?;
        if bind.is_some() {
            config.bind_addr = bind;
        }

        let metrics = MonitorMetrics::new();
        let mut poller = build_poller(&config, metrics.clone())?;
        let shutdown = tokio_util::sync::CancellationToken::new();

        // Bind before polling starts so an unusable address fails the command.
        let listener = match config.bind_addr {
            Some(addr) => Some(
                tokio::net::TcpListener::bind(addr)
                    .await
                    .with_context(|| format!("failed to bind status API on {}", addr))?,
            ),
            None => None,
        };
        let mut api_task = listener.map(|listener| {
            let api = StatusApi::new(poller.subscribe(), metrics.clone());
            tokio::spawn(api.serve_on(listener, shutdown.clone()))
        });

        let mut updates = poller.subscribe();
        poller.start()?;

        let log_updates = async {
            while updates.changed().await.is_ok() {
                let state = updates.borrow_and_update().clone();
                tracing::info!(
                    sequence = state.sequence,
                    status = %state.status.status,
                    block_height = state.status.block_height,
                    tps = state.tps,
                    endpoint = state.endpoint.as_deref().unwrap_or("-"),
                    "chain status updated"
                );
            }
        };

        let api_exit = async {
            match api_task.as_mut() {
                Some(task) => task.await,
                None => std::future::pending().await,
            }
        };

        let (outcome, api_finished) = tokio::select! {
            r = tokio::signal::ctrl_c() => (r.map_err(anyhow::Error::from), false),
            r = api_exit => {
                let outcome = match r {
                    Ok(Ok(())) => Err(anyhow::anyhow!("status API stopped unexpectedly")),
                    Ok(Err(e)) => Err(anyhow::Error::from(e).context("status API failed")),
                    Err(e) => Err(anyhow::Error::from(e).context("status API task failed")),
                };
                (outcome, true)
            }
            _ = log_updates => (Ok(()), false),
        };
        tracing::info!("shutting down");

        poller.shutdown().await;
        shutdown.cancel();
        if let Some(task) = api_task.filter(|_| !api_finished) {
            if let Err(e) = task.await {
                tracing::warn!("Status API task failed: {}", e);
            }
        }
        outcome
    }

    async fn watch(&self, ticks: Option<u64>, json: bool) -> Result<()> {
        let config = self.load_config()?;
        let mut poller = build_poller(&config, MonitorMetrics::new())?;
        let mut updates = poller.subscribe();
        poller.start()?;

        let printer = async {
            while updates.changed().await.is_ok() {
                let state = updates.borrow_and_update().clone();
                print_update(&state, json)?;
                if ticks.is_some_and(|n| state.sequence >= n) {
                    break;
                }
            }
            Ok::<(), anyhow::Error>(())
        };

        let outcome = tokio::select! {
            r = printer => r,
            r = tokio::signal::ctrl_c() => r.map_err(anyhow::Error::from),
        };

        poller.shutdown().await;
        outcome
    }

    async fn status(&self, json: bool) -> Result<()> {
        let config = self.load_config()?;
        let rpc = Arc::new(HttpLedgerRpc::new(config.request_timeout())?);
        let mut composer = SnapshotComposer::new(
            rpc,
            RetryingRpcClient::new(config.retry_config()),
            config.endpoint_pool()?,
            config.commitment,
        );
        let aggregator = config.aggregator();

        let outcome = composer.fetch_snapshot().await;
        let status = aggregator.derive_status(&outcome);
        let tps = aggregator.tps(&status);
        let endpoint = outcome.as_ref().ok().map(|s| s.endpoint.as_str());

        if json {
            let body = serde_json::json!({
                "endpoint": endpoint,
                "status": status,
                "tps": tps,
                "network_health": status.network_health(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        } else {
            print_status(&status, tps, endpoint);
        }

        if let Err(e) = outcome {
            anyhow::bail!("no endpoint answered: {}", e);
        }
        Ok(())
    }
}

fn build_poller(config: &MonitorConfig, metrics: MonitorMetrics) -> Result<Poller> {
    let rpc = HttpLedgerRpc::new(config.request_timeout())?;
    let poller = Poller::from_config(config, Arc::new(rpc), metrics, Arc::new(SystemClock))?;
    Ok(poller)
}

fn print_update(state: &DashboardState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(state)?);
        return Ok(());
    }

    let at = state
        .history
        .tps
        .last()
        .map(|s| s.label.as_str())
        .unwrap_or("--:--:--");
    println!(
        "[{}] #{:<5} {:<12} height={:<12} slot={:<12} txs={:<8} tps={:<8.2} {}",
        at,
        state.sequence,
        state.status.status,
        state.status.block_height,
        state.status.current_slot,
        state.status.transaction_count,
        state.tps,
        state
            .status
            .error
            .as_deref()
            .or(state.endpoint.as_deref())
            .unwrap_or(""),
    );
    Ok(())
}

fn print_status(status: &ChainStatus, tps: f64, endpoint: Option<&str>) {
    println!("Status:        {}", status.status);
    println!("Endpoint:      {}", endpoint.unwrap_or("-"));
    println!("Block height:  {}", status.block_height);
    println!("Current slot:  {}", status.current_slot);
    println!("Storage usage: {:.3}", status.storage_usage);
    println!("Transactions:  {}", status.transaction_count);
    println!("TPS:           {:.2}", tps);
    println!("Network:       {:?}", status.network_health());
    if let Some(error) = &status.error {
        println!("Error:         {}", error);
    }
}
