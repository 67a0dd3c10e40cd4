//! USDC CCTP Agent CLI
//!
//! One subcommand per agent command. Results are printed as JSON on stdout;
//! logs go to stderr.

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use serde::Serialize;
use std::sync::Arc;

use usdc_cctp_agent::api;
use usdc_cctp_agent::attestation::{AttestationPoller, IrisAttestationApi};
use usdc_cctp_agent::cancel::{CancelHandle, CancelToken};
use usdc_cctp_agent::commands::{Agent, BalanceRequest, PaymentStatusRequest, TransferRequest};
use usdc_cctp_agent::config::Config;
use usdc_cctp_agent::db::PgTransferStore;
use usdc_cctp_agent::gate::EnvironmentGate;
use usdc_cctp_agent::ledger::EvmLedgerFactory;
use usdc_cctp_agent::orchestrator::{BridgeOrchestrator, BridgeRequest, BridgeSettings};
use usdc_cctp_agent::paylink::PaylinkIssuer;
use usdc_cctp_agent::registry::ChainRegistry;

#[derive(Parser)]
#[command(name = "usdc-cctp-agent")]
#[command(about = "Testnet USDC agent with CCTP bridging", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// USDC balance of an account
    Balance {
        account: String,

        #[arg(long)]
        chain: Option<String>,
    },

    /// Send USDC on one test network
    Transfer {
        #[arg(long)]
        to: String,

        #[arg(long)]
        amount: String,

        /// Validate only, submit nothing
        #[arg(long)]
        simulate: bool,

        #[arg(long)]
        chain: Option<String>,
    },

    /// Bridge USDC between test networks with CCTP
    Bridge {
        #[arg(long = "from")]
        chain_from: String,

        #[arg(long = "to")]
        chain_to: String,

        #[arg(long)]
        amount: String,

        /// Defaults to the signing account
        #[arg(long)]
        recipient: Option<String>,

        #[arg(long)]
        simulate: bool,
    },

    /// Attestation status of a bridge request or raw message hash
    AttestationStatus { request_id: String },

    /// Confirmation status of a transaction
    PaymentStatus {
        txid: String,

        #[arg(long)]
        chain: Option<String>,
    },

    /// Create a mock payment link
    Paylink {
        #[arg(long)]
        amount: String,

        #[arg(long)]
        memo: Option<String>,
    },

    /// Continue interrupted bridge transfers (all open ones if no id is given)
    Resume { request_id: Option<String> },

    /// Serve health, metrics and transfer status over HTTP
    Serve {
        #[arg(long)]
        port: Option<u16>,

        /// Skip resuming open transfers on startup
        #[arg(long)]
        no_resume: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = Config::load()?;
    tracing::info!(
        default_chain = %config.default_chain,
        networks = config.networks.len(),
        store = config.database.is_some(),
        credential = config.credential.is_some(),
        "Configuration loaded"
    );

    let registry = Arc::new(ChainRegistry::from_config(&config)?);
    let gate = EnvironmentGate::new(config.test_mode, registry);
    let ledgers = Arc::new(EvmLedgerFactory);

    let attestation_api = Arc::new(IrisAttestationApi::new(&config.attestation)?);
    let poller = AttestationPoller::new(attestation_api, config.attestation.max_errors);

    let mut orchestrator = BridgeOrchestrator::new(
        gate.clone(),
        ledgers.clone(),
        poller,
        BridgeSettings::from_config(&config.attestation),
    )
    .with_credential(config.credential.clone());

    if let Some(database) = &config.database {
        let store = PgTransferStore::connect(&database.url).await?;
        tracing::info!("Database connected");
        orchestrator = orchestrator.with_store(Arc::new(store));
    }
    let orchestrator = Arc::new(orchestrator);

    let agent = Agent::new(
        gate,
        ledgers,
        orchestrator.clone(),
        PaylinkIssuer::new(&config.paylink),
        config.credential.clone(),
        config.default_chain.clone(),
    );

    let (cancel_handle, cancel) = CancelHandle::new();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        cancel_handle.cancel();
    });

    match cli.command {
        Commands::Balance { account, chain } => {
            print_json(&agent.balance(BalanceRequest { account, chain }).await?)
        }
        Commands::Transfer {
            to,
            amount,
            simulate,
            chain,
        } => print_json(
            &agent
                .transfer(TransferRequest {
                    to,
                    amount,
                    simulate,
                    chain,
                })
                .await?,
        ),
        Commands::Bridge {
            chain_from,
            chain_to,
            amount,
            recipient,
            simulate,
        } => {
            let request = BridgeRequest {
                source_network: chain_from,
                destination_network: chain_to,
                amount,
                recipient,
                simulate,
            };
            print_json(&agent.bridge(request, &cancel).await?)
        }
        Commands::AttestationStatus { request_id } => {
            print_json(&agent.attestation_status(&request_id).await?)
        }
        Commands::PaymentStatus { txid, chain } => print_json(
            &agent
                .payment_status(PaymentStatusRequest { txid, chain })
                .await?,
        ),
        Commands::Paylink { amount, memo } => {
            print_json(&agent.paylink_create(&amount, memo.as_deref()).await?)
        }
        Commands::Resume { request_id } => match request_id {
            Some(id) => print_json(&agent.resume(&id, &cancel).await?),
            None => print_json(&agent.resume_all(&cancel).await?),
        },
        Commands::Serve { port, no_resume } => {
            serve(
                agent,
                port.unwrap_or(config.api.port),
                !no_resume,
                cancel,
            )
            .await
        }
    }
}

async fn serve(agent: Agent, port: u16, resume: bool, cancel: CancelToken) -> Result<()> {
    let agent = Arc::new(agent);

    if resume && agent.orchestrator().has_store() {
        let agent = agent.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match agent.resume_all(&cancel).await {
                Ok(resumed) => {
                    tracing::info!(count = resumed.len(), "Open bridge transfers resumed")
                }
                Err(e) => tracing::error!(error = %e, "Failed to resume open bridge transfers"),
            }
        });
    }

    api::start_server("0.0.0.0", port, agent.orchestrator().clone(), cancel).await?;
    tracing::info!("USDC CCTP agent stopped");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,usdc_cctp_agent=debug"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(filter)
        .init();
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
