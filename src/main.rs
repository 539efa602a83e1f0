use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use stepsign::config::StepSignConfig;
use stepsign::rpc::{SuiRpc, SuiRpcClient};
use stepsign::signer::{LocalKeySigner, PeerEventSink, RemoteSigner, TcpPeerLink};
use stepsign::tx::{ExecutionResult, Intent};
use stepsign::utils::logging;
use stepsign::{
    Broadcaster, CoSignExecution, CoSignOrchestrator, CoSignOutcome, CoSigner, FinalityTracker,
    MultisigPolicy, PublicKey, SharedWallet, SuiAddress, SuiKeyPair, TransactionBuilder, TransactionDigest,
};

#[derive(Parser)]
#[command(name = "stepsign", version, about = "Co-signed transactions for a shared multisig wallet")]
struct Cli {
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the multisig address of a policy
    Address {
        #[arg(long)]
        threshold: u16,
        /// `ed25519:<hex>:<weight>` or `suiprivkey1…:<weight>`
        #[arg(long = "member", required = true)]
        members: Vec<String>,
    },
    /// Print the digest signers sign for a serialized transaction
    Digest {
        /// base64 BCS bytes
        #[arg(long)]
        tx_bytes: String,
        /// Bytes are a transaction kind signed out of band
        #[arg(long)]
        kind: bool,
    },
    /// Report whether the shared wallet is frozen
    Status(WalletArgs),
    /// Co-signed transfer out of the shared wallet
    Transfer {
        #[command(flatten)]
        wallet: WalletArgs,
        #[command(flatten)]
        key: AppKeyArgs,
        #[arg(long)]
        recipient: String,
        /// Amount in MIST
        #[arg(long)]
        amount: u64,
    },
    /// Transfer signed by the app key, carrying the hardware signature in the call
    CosignTransfer {
        #[command(flatten)]
        wallet: WalletArgs,
        #[command(flatten)]
        key: AppKeyArgs,
        #[arg(long)]
        recipient: String,
        /// Amount in MIST
        #[arg(long)]
        amount: u64,
    },
    /// Co-signed freeze of the shared wallet
    Freeze {
        #[command(flatten)]
        wallet: WalletArgs,
        #[command(flatten)]
        key: AppKeyArgs,
    },
    /// Thaw the shared wallet with the creator key
    Thaw {
        #[command(flatten)]
        wallet: WalletArgs,
        #[command(flatten)]
        key: AppKeyArgs,
    },
}

#[derive(Args)]
struct WalletArgs {
    #[arg(long, default_value = "stepsign.toml")]
    config: PathBuf,
    /// Shared wallet object id
    #[arg(long)]
    wallet: String,
}

#[derive(Args)]
struct AppKeyArgs {
    /// Hex seed or `suiprivkey1…`
    #[arg(long = "app-key", env = "STEPSIGN_APP_KEY", hide_env_values = true)]
    app_key: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init("warn");
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            if cli.json {
                println!("{}", json!({ "error": e.to_string() }));
            } else {
                eprintln!("error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command succeeded
async fn run(cli: &Cli) -> Result<bool> {
    match &cli.command {
        Command::Address { threshold, members } => {
            let policy = parse_policy(members, *threshold)?;
            let address = policy.address();
            emit(
                cli.json,
                json!({ "address": address, "threshold": policy.threshold(), "members": policy.members().len() }),
                address.to_string(),
            );
            Ok(true)
        }
        Command::Digest { tx_bytes, kind } => {
            let bytes = STANDARD.decode(tx_bytes.trim()).context("tx bytes are not base64")?;
            let intent = if *kind {
                Intent::personal_message()
            } else {
                Intent::transaction_data()
            };
            let digest = TransactionDigest::of_intent_message(intent, &bytes);
            emit(
                cli.json,
                json!({ "digest": digest.to_hex(), "intent": intent.to_bytes() }),
                digest.to_hex(),
            );
            Ok(true)
        }
        Command::Status(args) => {
            let (config, rpc) = connect(&args.config)?;
            let wallet = shared_wallet(&config, &args.wallet)?;
            let state = wallet.state(rpc.as_ref()).await?;
            let text = if state.is_frozen { "frozen" } else { "unfrozen" };
            emit(cli.json, serde_json::to_value(&state)?, text.to_string());
            Ok(true)
        }
        Command::Transfer {
            wallet,
            key,
            recipient,
            amount,
        } => {
            let (config, rpc) = connect(&wallet.config)?;
            let shared = shared_wallet(&config, &wallet.wallet)?;
            let recipient = SuiAddress::from_string(recipient)?;
            let orchestrator = orchestrator(&config, rpc, &key.app_key).await?;

            let mut plan = TransactionBuilder::new(orchestrator.address());
            plan.gas_budget(config.gas_budget());
            shared.execute_transfer(&mut plan, *amount, recipient)?;
            Ok(report(cli.json, orchestrator.execute_cosigned_transaction(plan).await))
        }
        Command::CosignTransfer {
            wallet,
            key,
            recipient,
            amount,
        } => {
            let (config, rpc) = connect(&wallet.config)?;
            let shared = shared_wallet(&config, &wallet.wallet)?;
            let recipient = SuiAddress::from_string(recipient)?;
            let orchestrator = orchestrator(&config, rpc, &key.app_key).await?;

            let execution = orchestrator
                .execute_cosigned_transfer(&shared, *amount, recipient, config.gas_budget())
                .await;
            Ok(report(cli.json, execution))
        }
        Command::Freeze { wallet, key } => {
            let (config, rpc) = connect(&wallet.config)?;
            let shared = shared_wallet(&config, &wallet.wallet)?;
            let orchestrator = orchestrator(&config, rpc, &key.app_key).await?;

            let mut plan = TransactionBuilder::new(orchestrator.address());
            plan.gas_budget(config.gas_budget());
            shared.freeze_wallet(&mut plan)?;
            Ok(report(cli.json, orchestrator.execute_cosigned_transaction(plan).await))
        }
        Command::Thaw { wallet, key } => {
            let (config, rpc) = connect(&wallet.config)?;
            let shared = shared_wallet(&config, &wallet.wallet)?;
            let creator = SuiKeyPair::parse(&key.app_key)?;

            let mut plan = TransactionBuilder::new(creator.address);
            plan.gas_budget(config.gas_budget());
            shared.thaw_wallet(&mut plan)?;
            let tx = plan.build(rpc.as_ref()).await?;
            let signature = creator.sign_with_flag(TransactionDigest::of_transaction(&tx).as_bytes());

            let broadcaster = broadcaster(&config, rpc);
            match broadcaster.submit(&tx, &signature).await {
                ExecutionResult::Success(effects) => {
                    emit(cli.json, serde_json::to_value(&effects)?, format!("thawed in {}", effects.transaction_digest));
                    Ok(true)
                }
                ExecutionResult::OnChainFailure(reason) => {
                    emit(cli.json, serde_json::to_value(&reason)?, format!("rejected: {}", reason.message));
                    Ok(false)
                }
                ExecutionResult::TransportFailure { message } => Err(anyhow!("submission outcome unknown: {}", message)),
            }
        }
    }
}

fn emit(json: bool, value: serde_json::Value, text: String) {
    if json {
        println!("{}", value);
    } else {
        println!("{}", text);
    }
}

/// `<key>:<weight>` where key is `ed25519:<hex>` or a private key export
fn parse_member(member: &str) -> Result<(PublicKey, u8)> {
    let (key, weight) = member
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("member '{}' must end with :<weight>", member))?;
    let weight: u8 = weight.parse().with_context(|| format!("invalid weight in '{}'", member))?;
    let public_key = if key.starts_with(stepsign::sui::keypair::SUI_PRIVATE_KEY_PREFIX) {
        SuiKeyPair::parse(key)?.public()
    } else {
        PublicKey::parse(key)?
    };
    Ok((public_key, weight))
}

fn parse_policy(members: &[String], threshold: u16) -> Result<MultisigPolicy> {
    let pairs = members.iter().map(|m| parse_member(m)).collect::<Result<Vec<_>>>()?;
    Ok(MultisigPolicy::from_pairs(pairs, threshold)?)
}

fn connect(path: &Path) -> Result<(StepSignConfig, Arc<dyn SuiRpc>)> {
    let config = StepSignConfig::load(path)?;
    let rpc: Arc<dyn SuiRpc> = Arc::new(SuiRpcClient::new(config.rpc_url(), config.request_timeout())?);
    Ok((config, rpc))
}

fn shared_wallet(config: &StepSignConfig, wallet: &str) -> Result<SharedWallet> {
    Ok(SharedWallet::new(config.package_id()?, SuiAddress::from_string(wallet)?))
}

fn broadcaster(config: &StepSignConfig, rpc: Arc<dyn SuiRpc>) -> Broadcaster {
    let tracker = FinalityTracker::new(rpc.clone(), config.poll_interval(), config.submission.poll_attempts);
    Broadcaster::new(rpc, config.retry_policy(), tracker)
}

async fn orchestrator(config: &StepSignConfig, rpc: Arc<dyn SuiRpc>, app_key: &str) -> Result<CoSignOrchestrator> {
    let policy = config.multisig_policy()?;
    let local = LocalKeySigner::from_encoded(app_key)?;
    if policy.index_of(&local.public_key()).is_none() {
        bail!("app key {} is not a member of the configured policy", local.public_key());
    }

    let peer_address = config
        .remote
        .peer_address
        .as_deref()
        .ok_or_else(|| anyhow!("remote.peer_address is not set"))?;
    let sink = PeerEventSink::new();
    let link = TcpPeerLink::connect(peer_address, sink.clone()).await?;
    let remote = RemoteSigner::new(Arc::new(link), sink, config.peer_public_key()?, config.signing_timeout());

    Ok(CoSignOrchestrator::new(
        rpc.clone(),
        policy,
        Arc::new(remote),
        Arc::new(local),
        broadcaster(config, rpc),
    ))
}

fn report(json: bool, execution: CoSignExecution) -> bool {
    let confirmed = execution.outcome.is_confirmed();
    let text = match &execution.outcome {
        CoSignOutcome::Confirmed(effects) => format!("confirmed: {}", effects.transaction_digest),
        CoSignOutcome::Rejected(reason) => format!("rejected: {}", reason.message),
        CoSignOutcome::Failed(error) => {
            let mut text = format!("failed: {}", error);
            if error.requires_fresh_assertion() {
                text.push_str(" (sign in again)");
            }
            text
        }
    };
    let value = serde_json::to_value(&execution).unwrap_or_else(|e| json!({ "error": e.to_string() }));
    emit(json, value, text);
    confirmed
}
