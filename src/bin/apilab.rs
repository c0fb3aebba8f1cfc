use anyhow::Result;
use apilab_cli::commands::{ContentCommand, SendCommand};
use apilab_client::ApiError;
use clap::Parser;
use std::process::exit;
use tracing_subscriber::EnvFilter;

fn version() -> &'static str {
    option_env!("CARGO_VERSION_INFO").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// API Lab relay client.
#[derive(Parser)]
#[clap(
    bin_name = "apilab",
    version,
    propagate_version = true,
    arg_required_else_help = true
)]
#[command(version = version())]
enum ApilabCli {
    Send(SendCommand),
    Content(ContentCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = match ApilabCli::parse() {
        ApilabCli::Send(cmd) => cmd.exec().await,
        ApilabCli::Content(cmd) => cmd.exec().await,
    } {
        if let Some(e) = e.downcast_ref::<ApiError>() {
            describe_api_error(e);
        } else {
            eprintln!("error: {e:?}");
        }
        exit(1);
    }

    Ok(())
}

fn describe_api_error(e: &ApiError) {
    match e {
        ApiError::Server { status, message } if status.is_client_error() => {
            eprintln!("The relay rejected the request ({status}): {message}");
        }
        ApiError::Server { status, message } => {
            eprintln!("The relay could not reach the target ({status}): {message}");
        }
        ApiError::Request(e) => {
            eprintln!("Failed to contact the API Lab server: {e}");
            eprintln!("Is the server running? Set its URL with `--server` or `APILAB_URL`.");
        }
        e => eprintln!("error: {e}"),
    }
}
