//! # fexec CLI Entry Point
//!
//! Runs the function executor sidecar and offers two small client commands
//! for poking at a running one.
//!
//! ## Usage
//!
//! ```bash
//! # Run the sidecar (invocations on 8080, fallback updates on 8081)
//! CONTEXT='{"tenant":"acme"}' fexec serve -p 8080
//!
//! # Invoke a handler (outputs raw JSON)
//! fexec invoke http://127.0.0.1:8080 isprime.handler -a '{"n":"17"}'
//!
//! # Push a new fallback address list
//! fexec fallback http://127.0.0.1:8081 10.0.0.2 10.0.0.3:1323
//! ```

use anyhow::Result;
use argh::FromArgs;
use fexec_common::InvocationRequest;
use fexec_server::capture;
use fexec_server::fallback::DEFAULT_FALLBACK_FILE;
use fexec_server::{ExecutorConfig, Sidecar};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

/// Validates that a URL string starts with http://
fn validate_http_url(url: &str, description: &str) -> Result<()> {
    if url.starts_with("http://") {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Invalid {}: '{}' must start with http://",
            description,
            url
        ))
    }
}

#[derive(FromArgs)]
/// fexec - function executor sidecar
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Serve**: run the invocation server and the fallback listener
/// - **Invoke**: make a single invocation (unix-friendly JSON output)
/// - **Fallback**: replace a sidecar's fallback address list
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Invoke(InvokeArgs),
    Fallback(FallbackArgs),
}

/// Arguments for running the sidecar.
///
/// The execution context handed to every handler is read once from the
/// `CONTEXT` environment variable (JSON, empty mapping when unset).
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// run the executor sidecar
struct ServeArgs {
    /// address to bind both endpoints to
    #[argh(option, long = "host", default = "\"0.0.0.0\".into()")]
    host: String,

    /// invocation port; the fallback listener binds the next port
    #[argh(option, short = 'p', default = "8080")]
    port: u16,

    /// file holding the fallback address list
    #[argh(option, long = "fallback-file", default = "DEFAULT_FALLBACK_FILE.into()")]
    fallback_file: String,

    /// port of fallback nodes for addresses that do not name one
    #[argh(option, long = "receive-port", default = "1323")]
    receive_port: u16,

    /// timeout of one forwarding attempt in milliseconds
    #[argh(option, long = "delivery-timeout-ms", default = "3000")]
    delivery_timeout_ms: u64,
}

/// Arguments for a single invocation.
///
/// Prints the response as raw JSON on stdout and exits non-zero when the
/// invocation did not succeed.
///
/// ```bash
/// fexec invoke http://127.0.0.1:8080 isprime.handler -a '{"n":"17"}' --output | jq .Result
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "invoke")]
/// invoke a handler on a sidecar
struct InvokeArgs {
    /// address of the sidecar's invocation endpoint
    #[argh(positional)]
    server_address: String,

    /// handler reference in module.function form
    #[argh(positional)]
    handler: String,

    /// JSON parameters for the handler, defaults to {}
    #[argh(option, short = 'a', long = "params", default = "\"{}\".into()")]
    params: String,

    /// directory to add to the handler search path
    #[argh(option, short = 'd', long = "dir", default = "String::new()")]
    dir: String,

    /// return the handler's captured output
    #[argh(switch, short = 'o')]
    output: bool,

    /// correlation id echoed in the response
    #[argh(option, long = "id")]
    id: Option<String>,
}

/// Arguments for replacing a fallback address list.
#[derive(FromArgs)]
#[argh(subcommand, name = "fallback")]
/// send a new fallback address list to a sidecar
struct FallbackArgs {
    /// address of the sidecar's fallback listener
    #[argh(positional)]
    server_address: String,

    /// fallback addresses in priority order
    #[argh(positional)]
    addresses: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Client commands keep stdout clean for piping.
    if matches!(cli.command, Commands::Serve(_)) {
        init_logging()?;
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Invoke(args) => run_invoke(args).await,
        Commands::Fallback(args) => run_fallback(args).await,
    }
}

/// Logs go to a copy of stdout taken now, so they never end up in a
/// handler's captured output.
fn init_logging() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let console = capture::console()
        .map_err(|e| anyhow::anyhow!("Failed to open log output: {}", e))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(Mutex::new(console))
        .init();
    Ok(())
}

fn serve_config(args: &ServeArgs) -> Result<ExecutorConfig> {
    let host: IpAddr = args
        .host
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid host {}: {}", args.host, e))?;

    let config = ExecutorConfig::new()
        .with_host(host)
        .with_port(args.port)
        .with_fallback_file(&args.fallback_file)
        .with_receive_port(args.receive_port)
        .with_delivery_timeout(Duration::from_millis(args.delivery_timeout_ms));
    config.validate()?;
    Ok(config)
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = serve_config(&args)?.with_context_from_env()?;

    tracing::info!("Invocation endpoint: {}", config.invocation_addr());
    tracing::info!("Fallback endpoint: {}", config.fallback_listener_addr()?);
    tracing::info!("Fallback file: {}", config.fallback_file.display());

    Sidecar::new(config).run().await?;
    Ok(())
}

/// Executes the `invoke` subcommand and prints the raw JSON response.
async fn run_invoke(args: InvokeArgs) -> Result<()> {
    validate_http_url(&args.server_address, "server address")?;

    let params: serde_json::Value = serde_json::from_str(&args.params)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in params: {}", e))?;

    let mut request = InvocationRequest::new(args.handler, params).with_handler_dir(args.dir);
    if args.output {
        request = request.with_output();
    }
    if let Some(id) = args.id {
        request = request.with_id(id);
    }

    let client = fexec_client::ExecutorClient::new(&args.server_address)?;
    let response = client.invoke(&request).await?;

    println!("{}", serde_json::to_string(&response)?);

    if !response.success {
        anyhow::bail!("Invocation of {} failed", request.handler);
    }
    Ok(())
}

async fn run_fallback(args: FallbackArgs) -> Result<()> {
    validate_http_url(&args.server_address, "server address")?;

    let client = fexec_client::ExecutorClient::new(&args.server_address)?;
    let ack = client.update_fallback(args.addresses).await?;

    println!("{}", serde_json::to_string(&ack)?);
    Ok(())
}
