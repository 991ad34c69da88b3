//! rpcbridge - bidirectional JSON-RPC call routing
//!
//! Command-line usage:
//!   rpcbridge serve                    - Serve the demo methods over stdio
//!   rpcbridge call <method> [params]   - Call a method on a spawned peer

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rpcbridge::cli::run_cli().await
}
