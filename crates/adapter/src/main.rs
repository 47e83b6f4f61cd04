use std::net::SocketAddr;

use clap::Parser;
use dap_codec::Stdio;

mod logging;
mod server;

use logging::{LogFormat, Logging};

/// Attach an IDE to a Ruby program running under `byebug --remote`.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Serve DAP over TCP on this address instead of stdin/stdout.
    #[clap(short, long)]
    listen: Option<SocketAddr>,

    #[clap(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let logging = Logging::install(args.log_format)?;

    match args.listen {
        Some(address) => server::listen(address, logging).await,
        None => {
            tracing::debug!("serving over stdio");
            server::serve(Stdio, logging).await
        }
    }
}
