use super::demo;
use crate::config::{CollisionPolicy, DispatcherConfig};
use crate::jsonrpc::FramedLink;
use crate::rpc::{Dispatcher, RpcCall};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

/// rpcbridge - bidirectional JSON-RPC call routing over stdio
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Request timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Fixed prefix for generated request ids
    #[arg(long, global = true)]
    pub id_prefix: Option<String>,

    /// Fail registration when two handlers map to the same method name
    #[arg(long, global = true)]
    pub strict_names: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve the demo methods over stdin/stdout
    Serve,
    /// Call a method on a spawned `serve` peer and print the result
    Call {
        /// Wire method name, e.g. `sayHello` or `system.echo`
        method: String,

        /// Parameters as JSON
        params: Option<String>,

        /// Peer executable (defaults to this binary)
        #[arg(long)]
        peer: Option<PathBuf>,
    },
}

impl Cli {
    /// 環境変数の設定にCLIフラグを重ねる
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let mut config = DispatcherConfig::from_env();
        if let Some(ms) = self.timeout_ms {
            config = config.with_request_timeout(Duration::from_millis(ms));
        }
        if let Some(prefix) = &self.id_prefix {
            config = config.with_id_prefix(prefix.clone());
        }
        if self.strict_names {
            config = config.with_collision_policy(CollisionPolicy::Reject);
        }
        config
    }
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    let _ = builder.try_init();
}

/// CLI実行エントリーポイント
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.dispatcher_config();
    debug!("Dispatcher config: {:?}", config);

    match &cli.command {
        Command::Serve => run_serve(config).await,
        Command::Call {
            method,
            params,
            peer,
        } => run_call(config, method, params.as_deref(), peer.clone(), cli.verbose).await,
    }
}

async fn run_serve(config: DispatcherConfig) -> Result<()> {
    let mut link = FramedLink::stdio()?;
    let inbound = link
        .take_inbound()
        .ok_or_else(|| anyhow!("stdio link has no inbound channel"))?;

    let dispatcher = Dispatcher::new(link.sender(), config);
    demo::register(&dispatcher)?;
    debug!("Serving {} method(s) over stdio", dispatcher.registry().len());

    // stdinが閉じられるまで処理を続ける
    dispatcher.serve(inbound).await?;
    link.shutdown().await?;
    Ok(())
}

fn parse_params(params: Option<&str>) -> Result<Option<Value>> {
    params
        .map(|text| serde_json::from_str(text).with_context(|| format!("invalid params JSON: {}", text)))
        .transpose()
}

async fn run_call(
    config: DispatcherConfig,
    method: &str,
    params: Option<&str>,
    peer: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let params = parse_params(params)?;
    let peer = match peer {
        Some(peer) => peer,
        None => std::env::current_exe().context("cannot locate the rpcbridge executable")?,
    };
    let peer = peer.to_string_lossy().into_owned();

    let mut args = vec!["serve"];
    if verbose {
        args.push("--verbose");
    }
    let mut link = FramedLink::spawn_child(&peer, &args)?;
    let inbound = link
        .take_inbound()
        .ok_or_else(|| anyhow!("child link has no inbound channel"))?;

    let dispatcher = Dispatcher::new(link.sender(), config);
    let serve = dispatcher.serve(inbound);

    let result = dispatcher.request(RpcCall::untyped(method, params)).await;

    dispatcher.shutdown();
    serve.await?;
    link.shutdown().await?;

    let value = result?.into_result()?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_parse_call_command() {
        let cli = Cli::try_parse_from([
            "rpcbridge",
            "call",
            "sayHello",
            r#"{"name":"John"}"#,
            "--timeout-ms",
            "500",
        ])
        .unwrap();

        let config = cli.dispatcher_config();
        assert_eq!(config.request_timeout, Some(Duration::from_millis(500)));
        match cli.command {
            Command::Call { method, params, .. } => {
                assert_eq!(method, "sayHello");
                assert_eq!(parse_params(params.as_deref()).unwrap(), Some(json!({"name": "John"})));
            }
            Command::Serve => panic!("Expected call"),
        }
    }

    #[test]
    #[serial]
    fn test_strict_names_flag() {
        let cli = Cli::try_parse_from(["rpcbridge", "--strict-names", "serve"]).unwrap();
        assert_eq!(cli.dispatcher_config().collision_policy, CollisionPolicy::Reject);
    }

    #[test]
    fn test_invalid_params() {
        assert!(parse_params(Some("{oops")).is_err());
        assert_eq!(parse_params(None).unwrap(), None);
    }
}
