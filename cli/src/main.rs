//! chainharvest CLI — run the harvesting components against a websocket node.
//!
//! Usage:
//! ```bash
//! chainharvest scan --url wss://node/ws --address 0x9Ad6... \
//!     --topic "Transfer(address,address,uint256)" --from 2486392 --to 2488440
//! chainharvest logs --url wss://node/ws --address 0x9Ad6... \
//!     --topic "Transfer(address,address,uint256)" --topic "Approval(address,address,uint256)"
//! chainharvest mempool --url wss://node/ws --target 0x60aE... --chain-id 43114
//! ```

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tracing_subscriber::EnvFilter;

use chainharvest_core::error::HarvestError;
use chainharvest_core::handler::{LoggingEventHandler, LoggingPendingHandler, TracingProgress};
use chainharvest_core::topic::topic_hash;
use chainharvest_core::types::{Address, FilterQuery, TopicHash};
use chainharvest_evm::MessageDecoder;
use chainharvest_rpc::{WsClientConfig, WsEthClient};
use chainharvest_stream::{
    LiveSubscriber, MatchDirection, MempoolWatcher, RangeScanner, ScanConfig,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "scan" => cmd_scan(&args[2..]).await,
        "logs" => cmd_logs(&args[2..]).await,
        "mempool" => cmd_mempool(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("chainharvest {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        tracing::error!("{e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainharvest {}", env!("CARGO_PKG_VERSION"));
    println!("Scan, stream, and watch EVM event logs over websocket RPC\n");
    println!("USAGE:");
    println!("    chainharvest <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    scan     Scan a historical block range for matching logs");
    println!("    logs     Stream new matching logs as blocks land");
    println!("    mempool  Watch pending transactions sent to one contract");
    println!("    version  Print version");
    println!("    help     Print this help\n");
    println!("COMMON FLAGS:");
    println!("    --url <WS_URL>         Websocket RPC endpoint (required)");
    println!("    --address <HEX>        Contract address filter (repeatable)");
    println!("    --topic <SIG_OR_HASH>  Event signature or 0x topic hash (repeatable,");
    println!("                           multiple topics form one OR-set at position 0)");
    println!("SCAN FLAGS:");
    println!("    --from <BLOCK>         First block of the range (required)");
    println!("    --to <BLOCK>           Last block (default: current chain head)");
    println!("    --window <BLOCKS>      Query window width (default: 2048)");
    println!("    --max-inflight <N>     Concurrent handler cap (default: 64)");
    println!("MEMPOOL FLAGS:");
    println!("    --target <HEX>         Watched contract address (required)");
    println!("    --chain-id <ID>        Chain id for transaction decoding (required)");
    println!("    --direction <to|from>  Which side must match --target (default: to)");
}

// ─── Flag parsing ─────────────────────────────────────────────────────────────

/// Flags as `--name value` pairs; repeatable flags accumulate.
struct Flags {
    pairs: Vec<(String, String)>,
}

impl Flags {
    fn parse(args: &[String]) -> Result<Self> {
        let mut pairs = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let name = args[i]
                .strip_prefix("--")
                .ok_or_else(|| anyhow!("expected a --flag, got `{}`", args[i]))?;
            let value = args
                .get(i + 1)
                .ok_or_else(|| anyhow!("--{name} requires a value"))?;
            pairs.push((name.to_string(), value.clone()));
            i += 2;
        }
        Ok(Self { pairs })
    }

    fn one(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.one(name).ok_or_else(|| anyhow!("--{name} is required"))
    }

    fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn block(&self, name: &str) -> Result<Option<u64>> {
        self.one(name)
            .map(|v| v.parse().with_context(|| format!("--{name}: not a block number: {v}")))
            .transpose()
    }
}

/// A topic flag is either a canonical event signature (hashed here) or an
/// already-hashed 32-byte hex value.
fn parse_topic(value: &str) -> Result<TopicHash> {
    if value.contains('(') {
        return Ok(topic_hash(value));
    }
    TopicHash::parse(value).with_context(|| format!("invalid topic: {value}"))
}

fn build_filter(flags: &Flags) -> Result<FilterQuery> {
    let mut query = FilterQuery::default();
    for addr in flags.all("address") {
        query
            .addresses
            .push(Address::parse(addr).with_context(|| format!("invalid address: {addr}"))?);
    }
    let topics: Vec<TopicHash> = flags
        .all("topic")
        .map(parse_topic)
        .collect::<Result<_>>()?;
    if !topics.is_empty() {
        query = query.topics(topics);
    }
    Ok(query)
}

async fn dial(flags: &Flags) -> Result<Arc<WsEthClient>> {
    let url = flags.required("url")?;
    let client = WsEthClient::dial(url, WsClientConfig::default())
        .await
        .map_err(|e| HarvestError::Connection {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    Ok(Arc::new(client))
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn cmd_scan(args: &[String]) -> Result<()> {
    let flags = Flags::parse(args)?;
    let from = flags
        .block("from")?
        .ok_or_else(|| anyhow!("--from is required"))?;
    let to = flags.block("to")?;

    let mut config = ScanConfig::default();
    if let Some(w) = flags.block("window")? {
        config.window = w;
    }
    if let Some(n) = flags.block("max-inflight")? {
        config.max_inflight = n as usize;
    }

    let rpc = dial(&flags).await?;
    let scanner = RangeScanner::new(
        rpc,
        build_filter(&flags)?,
        config,
        Arc::new(LoggingEventHandler),
        Arc::new(TracingProgress),
    );

    tokio::select! {
        result = scanner.scan(from, to) => {
            let report = result?;
            println!(
                "scanned {} blocks: {} events, {} handler failures",
                report.blocks, report.events, report.handler_failures
            );
            if report.handler_failures > 0 {
                bail!("{} handler failures", report.handler_failures);
            }
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(())
        }
    }
}

async fn cmd_logs(args: &[String]) -> Result<()> {
    let flags = Flags::parse(args)?;
    let rpc = dial(&flags).await?;
    let live = LiveSubscriber::new(rpc, build_filter(&flags)?, Arc::new(LoggingEventHandler));

    tokio::select! {
        // run() only returns on a terminal subscription error
        result = live.run() => result.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(())
        }
    }
}

async fn cmd_mempool(args: &[String]) -> Result<()> {
    let flags = Flags::parse(args)?;
    let target = Address::parse(flags.required("target")?).context("invalid --target")?;
    let chain_id: u64 = flags
        .required("chain-id")?
        .parse()
        .context("--chain-id: not a number")?;
    let direction = match flags.one("direction") {
        None | Some("to") => MatchDirection::Recipient,
        Some("from") => MatchDirection::Sender,
        Some(other) => bail!("--direction must be `to` or `from`, got `{other}`"),
    };

    let rpc = dial(&flags).await?;
    let watcher = MempoolWatcher::new(
        rpc,
        target,
        MessageDecoder::new(chain_id),
        Arc::new(LoggingPendingHandler),
    )
    .with_direction(direction);

    tokio::select! {
        result = watcher.run() => result.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(())
        }
    }
}
