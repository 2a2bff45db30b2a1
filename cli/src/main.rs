//! rpcfallback CLI: send JSON-RPC calls across a fallback chain.
//!
//! Usage:
//! ```bash
//! # Primary with one backup, two attempts each with 100ms backoff
//! rpcfallback call --url https://cloudflare-eth.com --url https://eth.llamarpc.com \
//!     --method eth_blockNumber --max-attempts 2 --initial-delay-ms 100
//!
//! # Ask every endpoint at once and take the first success
//! rpcfallback call --url https://a.example --url https://b.example \
//!     --method eth_chainId --strategy first-success
//!
//! # Check every endpoint in a config file
//! rpcfallback check --config endpoints.json
//! ```

mod logging;

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use rpcfallback_core::{
    CancellationToken, DispatchConfig, DispatchError, Endpoint, FallbackClient, FanOut,
    FanOutStrategy, JsonRpcRequest, Strategy,
};
use rpcfallback_http::{HttpClientConfig, HttpConnector};

use logging::{init_tracing, LogConfig};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    init_tracing(&log_config(&args));

    let result = match args[1].as_str() {
        "call" => cmd_call(&args[2..]).await,
        "check" => cmd_check(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("rpcfallback {}", env!("CARGO_PKG_VERSION"));
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
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("rpcfallback {}", env!("CARGO_PKG_VERSION"));
    println!("Send JSON-RPC calls across an ordered fallback chain\n");
    println!("USAGE:");
    println!("    rpcfallback <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    call       Send one JSON-RPC call");
    println!("    check      Ask every endpoint for eth_blockNumber");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("FLAGS:");
    println!("    --url <URL>               Endpoint, repeat for backups (in order)");
    println!("    --config <FILE>           JSON dispatch config");
    println!("    --method <NAME>           JSON-RPC method  [call: required]");
    println!("    --params <JSON>           JSON array of params (default: [])");
    println!("    --strategy <NAME>         sequential | race-first | first-success | wait-all");
    println!("    --max-attempts <N>        Attempts per endpoint (0 = once)");
    println!("    --initial-delay-ms <MS>   First retry delay");
    println!("    --max-delay-ms <MS>       Backoff cap");
    println!("    --growth-factor <F>       Backoff multiplier (>= 1.0)");
    println!("    --timeout-ms <MS>         Per-attempt timeout");
    println!("    --verbose                 Log retries and fallbacks");
    println!("    --log-level <DIRECTIVES>  Tracing filter, e.g. warn,rpcfallback_core=debug");
    println!("    --json-logs               Emit logs as JSON");
}

async fn cmd_call(args: &[String]) -> Result<()> {
    let config = load_config(args)?;
    let method = parse_flag(args, "--method").context("--method is required")?;
    let params = match parse_flag(args, "--params") {
        Some(raw) => serde_json::from_str::<Vec<Value>>(&raw).context("--params must be a JSON array")?,
        None => vec![],
    };

    let client = build_client(&config)?;
    tracing::info!(
        endpoints = client.len(),
        strategy = %config.strategy,
        method = %method,
        "dispatching"
    );
    let req = JsonRpcRequest::new(1, method, params);

    // Ctrl-C cancels the dispatch, which then returns with the attempts it made.
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let output = run(&client, &cancel, config.strategy, req).await?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn cmd_check(args: &[String]) -> Result<()> {
    let config = load_config(args)?;
    let client = build_client(&config)?;

    println!("Checking {} endpoint(s)...\n", client.len());
    let settled = client
        .fan_out(
            FanOutStrategy::WaitAll,
            JsonRpcRequest::new(1, "eth_blockNumber", vec![]),
        )
        .await?
        .into_settled();

    let mut healthy = 0;
    for s in &settled {
        match &s.result {
            Ok(block) => {
                healthy += 1;
                println!("  OK    {}  {}", s.endpoint, describe_block(block));
            }
            Err(e) => println!("  FAIL  {}  {e}", s.endpoint),
        }
    }
    println!("\n{healthy}/{} endpoint(s) healthy", settled.len());

    if healthy == 0 {
        bail!("no endpoint answered");
    }
    Ok(())
}

/// `block N (0x..)` for a hex quantity, the raw JSON otherwise.
fn describe_block(result: &Value) -> String {
    let hex = result.as_str().unwrap_or_default();
    match hex
        .strip_prefix("0x")
        .and_then(|digits| u64::from_str_radix(digits, 16).ok())
    {
        Some(n) => format!("block {n} ({hex})"),
        None => format!("result {result}"),
    }
}

/// Run `req` with the configured strategy and shape the result as JSON.
async fn run(
    client: &FallbackClient,
    cancel: &CancellationToken,
    strategy: Strategy,
    req: JsonRpcRequest,
) -> Result<Value> {
    let outcome = match strategy.fan_out() {
        None => client.request_with(cancel, req).await.map(FanOut::Winner),
        Some(fan_out) => client.fan_out_with(cancel, fan_out, req).await,
    };
    match outcome {
        Ok(FanOut::Winner(d)) => Ok(json!({ "origin": d.origin, "result": d.value })),
        Ok(FanOut::All(all)) => Ok(Value::Array(
            all.into_iter()
                .map(|s| match s.result {
                    Ok(value) => json!({ "endpoint": s.endpoint, "result": value }),
                    Err(e) => json!({ "endpoint": s.endpoint, "error": e.to_string() }),
                })
                .collect(),
        )),
        Err(e @ DispatchError::Exhausted { .. }) => {
            let tried: Vec<_> = e.attempted().iter().map(Endpoint::to_string).collect();
            Err(anyhow::Error::new(e).context(format!("attempted: {}", tried.join(", "))))
        }
        Err(e) => Err(e.into()),
    }
}

fn log_config(args: &[String]) -> LogConfig {
    let mut log = LogConfig::default();
    if has_flag(args, "--verbose") {
        log.level = "info".into();
    }
    if let Some(level) = parse_flag(args, "--log-level") {
        log.level = level;
    }
    log.json = has_flag(args, "--json-logs");
    log
}

fn build_client(config: &DispatchConfig) -> Result<FallbackClient> {
    let dispatcher = config.dispatcher()?;
    let mut http = HttpClientConfig::default();
    if let Some(timeout) = config.attempt_timeout() {
        http.request_timeout = http.request_timeout.max(timeout);
    }
    let connector = HttpConnector::new(http)?;
    let client = FallbackClient::new(config.endpoints.clone(), Arc::new(connector), dispatcher)?;
    Ok(client)
}

/// Config file (if any) overlaid with command-line flags.
fn load_config(args: &[String]) -> Result<DispatchConfig> {
    let urls = parse_flags(args, "--url");
    let mut config = match parse_flag(args, "--config") {
        Some(path) => {
            DispatchConfig::from_file(&path).with_context(|| format!("loading {path}"))?
        }
        None if urls.is_empty() => bail!("at least one --url (or --config) is required"),
        None => DispatchConfig::new(&urls),
    };
    if !urls.is_empty() {
        config.endpoints = urls.iter().map(Endpoint::new).collect();
    }

    if let Some(s) = parse_flag(args, "--strategy") {
        config.strategy = s.parse()?;
    }
    if let Some(n) = parse_num(args, "--max-attempts")? {
        config.retry.max_attempts = n;
    }
    if let Some(n) = parse_num(args, "--initial-delay-ms")? {
        config.retry.initial_delay_ms = n;
    }
    if let Some(n) = parse_num(args, "--max-delay-ms")? {
        config.retry.max_delay_ms = n;
    }
    if let Some(f) = parse_num(args, "--growth-factor")? {
        config.retry.growth_factor = f;
    }
    if let Some(n) = parse_num(args, "--timeout-ms")? {
        config.attempt_timeout_ms = Some(n);
    }

    config.validate()?;
    Ok(config)
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn parse_flags(args: &[String], flag: &str) -> Vec<String> {
    args.windows(2)
        .filter(|w| w[0] == flag)
        .map(|w| w[1].clone())
        .collect()
}

fn parse_num<T>(args: &[String], flag: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_flag(args, flag)
        .map(|raw| raw.parse::<T>().with_context(|| format!("invalid value for {flag}: {raw}")))
        .transpose()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}
