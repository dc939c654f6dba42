use anyhow::{anyhow, Result};
use clap::{Arg, Command};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::Directive, prelude::*, reload, EnvFilter};
use whitelist_token_backend::{
    config::Config,
    ethereum::{
        abi::InterfaceDescriptor, contract::ContractGateway, provider::AlloyChainClient, utils,
    },
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("whitelist-token-backend")
        .version(env!("CARGO_PKG_VERSION"))
        .about("HTTP backend for an on-chain whitelisted token sale")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .help("Blockchain node HTTP RPC endpoint"),
        )
        .arg(
            Arg::new("ws-url")
                .short('w')
                .long("ws-url")
                .value_name("URL")
                .help("Blockchain node WebSocket endpoint for event subscriptions"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .value_parser(clap::value_parser!(u16))
                .help("HTTP port to listen on"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("generate-config") {
        println!("{}", Config::generate_sample());
        return Ok(());
    }

    if matches.get_flag("config-path") {
        let path = Config::default_config_path()?;
        println!("{}", path.display());
        return Ok(());
    }

    // Logging to stderr is installed before the config is read, starting from
    // LOG_LEVEL; the configured level replaces it once the config is loaded
    let initial_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let (filter, filter_handle) =
        reload::Layer::new(log_filter(&initial_level).or_else(|_| log_filter("info"))?);
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let mut config = Config::load_or_default(config_path).await;

    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        config.chain.rpc_url = rpc_url.clone();
    }
    if let Some(ws_url) = matches.get_one::<String>("ws-url") {
        config.chain.ws_url = Some(ws_url.clone());
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.server.port = *port;
    }

    filter_handle
        .reload(log_filter(&config.logging.level)?)
        .map_err(|e| anyhow!("Failed to apply log level: {}", e))?;

    config.validate()?;

    if let Err(e) = run(config).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// RUST_LOG directives sit on top of `level`.
fn log_filter(level: &str) -> Result<EnvFilter> {
    let directive: Directive = level
        .parse()
        .map_err(|e| anyhow!("Invalid log level '{}': {}", level, e))?;
    Ok(EnvFilter::from_default_env().add_directive(directive))
}

async fn run(config: Config) -> Result<()> {
    info!("Starting whitelist token backend");
    info!("RPC endpoint: {}", config.chain.rpc_url);

    let sale = config.sale_address()?;
    let token = config.token_address()?;
    let signer = config.signing_key()?;
    let admin_address = config.admin_address()?;

    match sale {
        Some(address) => info!("Sale contract: {}", utils::format_address(&address)),
        None => warn!("CONTRACT_ADDRESS not set, sale operations are disabled"),
    }
    match token {
        Some(address) => info!("Token contract: {}", utils::format_address(&address)),
        None => warn!("TOKEN_ADDRESS not set, whitelist and balance operations are disabled"),
    }
    match &signer {
        Some(signer) => info!(
            "Signing transactions as {}",
            utils::format_address(&signer.address())
        ),
        None => warn!("PRIVATE_KEY not set, running in read-only mode"),
    }
    if admin_address.is_none() {
        warn!("ADMIN_ADDRESS not set, admin login is disabled");
    }
    if config.chain.ws_url.is_none() {
        warn!("BLOCKCHAIN_WS_URL not set, purchase event streaming is disabled");
    }

    let client = AlloyChainClient::connect(
        &config.chain.rpc_url,
        config.chain.ws_url.as_deref(),
        config.receipt_poll_interval(),
    )
    .await?;

    let gateway = ContractGateway::new(
        Arc::new(client),
        InterfaceDescriptor::load()?,
        sale,
        token,
        signer,
        config.gateway_options(),
    );

    let state = AppState {
        gateway: Arc::new(gateway),
        admin_address,
    };

    server::serve(&config.server, state).await
}
