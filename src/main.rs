//! Diagnostic entry point
//!
//! Loads the adapter configuration, connects to the Celo node and reports
//! the relayer identity, chain head, pending nonce, confirmed deposits and
//! the gas price the submission engine would use.

use celo_bridge_adapter::proposal::contract::DEPOSIT_EVENT_SIGNATURE;
use celo_bridge_adapter::{CeloClient, CeloConfig, RpcBackend};
use eyre::WrapErr;

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    let config = CeloConfig::load()?;
    tracing::info!(
        chain_id = config.chain_id,
        rpc_url = %config.rpc_url,
        fallbacks = config.rpc_fallback_urls.len(),
        eth_compatible = config.eth_compatible,
        "Configuration loaded"
    );

    let (backend, node_chain_id) = RpcBackend::connect_first(&config.all_rpc_urls())
        .await
        .wrap_err("Failed to connect to any Celo RPC endpoint")?;
    if node_chain_id != config.chain_id {
        tracing::warn!(
            configured = config.chain_id,
            node = node_chain_id,
            "Node reports a different chain id"
        );
    }

    let client = CeloClient::from_config(backend, &config)?;
    let head = client.latest_block().await?;
    let nonce = client.pending_nonce().await?;
    let gas_price = client.safe_gas_price().await?;
    let bridge = config.bridge_address()?;

    tracing::info!(
        address = %client.address(),
        bridge = %bridge,
        head = head,
        nonce = nonce,
        gas_price = %gas_price,
        "Celo adapter ready"
    );

    let (deposits, scanned_to) = client
        .fetch_confirmed_deposit_logs(
            bridge,
            DEPOSIT_EVENT_SIGNATURE,
            config.start_block,
            config.block_confirmations,
        )
        .await?;
    tracing::info!(
        from_block = config.start_block,
        scanned_to = ?scanned_to,
        confirmations = config.block_confirmations,
        deposits = deposits.len(),
        "Scanned confirmed deposits"
    );

    let mut opts = client.opts().await;
    opts.nonce = nonce;
    opts.gas_price = gas_price;
    println!("{}", serde_json::to_string_pretty(&opts)?);

    Ok(())
}

/// Initialize tracing/logging with structured output
///
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,celo_bridge_adapter=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .init();
    }
}
