use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use shared::{
    domain::{CandidateIndex, PhaseView, WorkflowPhase},
    protocol::ContractCall,
};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voting_client::{
    actions::{self, ActionKind},
    JsonRpcVotingContract, StateSynchronizer, SyncEvent, TxStatus,
};

mod config;
mod render;

use config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(name = "voting", about = "Inspect and drive the on-chain voting contract")]
struct Cli {
    #[arg(long, default_value = "voting.toml")]
    config: PathBuf,
    #[arg(long)]
    rpc_url: Option<String>,
    #[arg(long)]
    contract: Option<String>,
    /// Account the node signs transactions with.
    #[arg(long)]
    sender: Option<String>,
    #[arg(long)]
    probe_limit: Option<usize>,
    /// Send writes even when the current phase does not offer them.
    #[arg(long)]
    force: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Phase, candidates and the actions the phase allows.
    Status,
    Candidates {
        #[arg(long)]
        json: bool,
    },
    Winner,
    /// Admin: move the contract to phase 0-3.
    SetPhase {
        phase: u8,
    },
    Register {
        name: String,
        address: String,
    },
    Vote {
        index: u64,
    },
    /// Send the fixed funding payment to the candidates.
    Fund,
    Withdraw,
    /// Keep refreshing and print every change until interrupted.
    Watch {
        #[arg(long)]
        interval: Option<u64>,
    },
}

impl Cli {
    fn settings(&self) -> Settings {
        let mut settings = load_settings(&self.config);
        if let Some(rpc_url) = &self.rpc_url {
            settings.rpc_url = rpc_url.clone();
        }
        if let Some(contract) = &self.contract {
            settings.contract_address = contract.clone();
        }
        if let Some(sender) = &self.sender {
            settings.sender = Some(sender.clone());
        }
        if let Some(limit) = self.probe_limit {
            settings.probe_limit = limit;
        }
        settings
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings();
    let contract = Arc::new(JsonRpcVotingContract::new(settings.rpc_settings()?)?);
    info!(
        rpc_url = %contract.settings().rpc_url,
        contract = %contract.settings().contract,
        "voting: connected"
    );
    check_chain(&contract, &settings).await;

    let sync = StateSynchronizer::new(contract.clone(), contract, settings.sync_settings());

    match cli.command {
        Command::Status => print!("{}", status_view(&sync).await),
        Command::Candidates { json } => {
            let candidates = sync.refresh_candidates().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&candidates)?);
            } else if candidates.is_empty() {
                println!("No candidates found.");
            } else {
                for candidate in candidates {
                    println!(
                        "[{}] {} - {} votes ({})",
                        candidate.index, candidate.name, candidate.vote_count, candidate.address
                    );
                }
            }
        }
        Command::Winner => {
            let winner = sync.fetch_winner().await;
            println!("{}", render::render_winner(&winner));
        }
        Command::SetPhase { phase } => {
            let phase = WorkflowPhase::try_from(phase)?;
            run_write(&sync, actions::advance_phase_call(phase), &settings, cli.force).await?;
        }
        Command::Register { name, address } => {
            let call = actions::register_candidate_call(&name, &address)?;
            run_write(&sync, call, &settings, cli.force).await?;
        }
        Command::Vote { index } => {
            run_write(
                &sync,
                actions::vote_call(CandidateIndex(index)),
                &settings,
                cli.force,
            )
            .await?;
        }
        Command::Fund => {
            println!("Attaching {}", sync.settings().funding_amount);
            run_write(&sync, ContractCall::FundCandidates, &settings, cli.force).await?;
        }
        Command::Withdraw => {
            run_write(&sync, ContractCall::Withdraw, &settings, cli.force).await?;
        }
        Command::Watch { interval } => {
            let every = interval
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.poll_interval());
            watch(&sync, every).await;
        }
    }

    Ok(())
}

async fn check_chain(contract: &JsonRpcVotingContract, settings: &Settings) {
    let Some(expected) = settings.chain_id else {
        return;
    };
    match contract.chain_id().await {
        Ok(actual) if actual.0 != expected => warn!(
            expected,
            actual = actual.0,
            "voting: endpoint is on a different chain than configured"
        ),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "voting: could not read chain id"),
    }
}

/// Failed reads leave the affected part of the view stale or empty.
async fn status_view(sync: &StateSynchronizer) -> String {
    render::render_snapshot(&sync.refresh_all().await)
}

fn ensure_permitted(phase: PhaseView, call: &ContractCall, force: bool) -> Result<()> {
    if actions::is_permitted(phase, ActionKind::of_call(call)) {
        return Ok(());
    }
    if force {
        warn!(
            phase = render::phase_label(phase),
            function = call.function_name(),
            "voting: sending a write the current phase does not offer"
        );
        return Ok(());
    }
    bail!(
        "{} is not available while the contract is in phase {}",
        call.function_name(),
        render::phase_label(phase)
    )
}

async fn run_write(
    sync: &Arc<StateSynchronizer>,
    call: ContractCall,
    settings: &Settings,
    force: bool,
) -> Result<()> {
    ensure_permitted(sync.refresh_phase().await, &call, force)?;

    let explorer = settings.explorer_tx_url.clone();
    let mut events = BroadcastStream::new(sync.subscribe_events());
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let Ok(SyncEvent::TransactionUpdated(tx)) = event {
                if tx.status == TxStatus::Confirming {
                    print!("{}", render::render_pending(&tx, Some(&explorer)));
                }
            }
        }
    });

    let outcome = sync.submit_and_confirm(call).await;
    printer.abort();

    match outcome {
        Ok(tx) => {
            print!(
                "{}",
                render::render_pending(&tx, Some(&settings.explorer_tx_url))
            );
            print!("{}", render::render_snapshot(&sync.snapshot().await));
            Ok(())
        }
        Err(err) => {
            if let Some(tx) = sync.snapshot().await.pending {
                print!(
                    "{}",
                    render::render_pending(&tx, Some(&settings.explorer_tx_url))
                );
            }
            bail!("{}", err.user_message())
        }
    }
}

async fn watch(sync: &Arc<StateSynchronizer>, every: Duration) {
    let mut events = BroadcastStream::new(sync.subscribe_events());
    print!("{}", render::render_snapshot(&sync.refresh_all().await));
    let refresher = sync.spawn_refresh_loop(every);
    info!(every_secs = every.as_secs(), "voting: watching for changes");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => match event {
                Some(Ok(SyncEvent::PhaseUpdated(phase))) => {
                    println!("Phase: {}", render::phase_label(phase));
                }
                Some(Ok(SyncEvent::CandidatesUpdated(candidates))) => {
                    for candidate in candidates {
                        println!(
                            "  [{}] {} - {} votes",
                            candidate.index, candidate.name, candidate.vote_count
                        );
                    }
                }
                Some(Ok(SyncEvent::ReadFailed { function, message })) => {
                    warn!(function, %message, "voting: read failed");
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => warn!(error = %err, "voting: event stream lagged"),
                None => break,
            },
        }
    }
    refresher.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
