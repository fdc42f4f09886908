use clap::Parser;
use jsbox::ResourceLimits;
use jsbox_server::{create_app, run_server};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to listen on
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    addr: SocketAddr,

    /// Maximum number of concurrent evaluations
    #[arg(short, long, default_value = "10")]
    max_concurrent: usize,

    /// Memory budget per evaluation in bytes
    #[arg(long, default_value = "536870912")] // 512MB
    memory_limit: u64,

    /// CPU time budget per evaluation in seconds
    #[arg(long, default_value = "5")]
    cpu_time_limit: u32,

    /// File size budget per evaluation in bytes
    #[arg(long, default_value = "10485760")] // 10MB
    file_size_limit: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let resource_limits = ResourceLimits {
        cpu_time: args.cpu_time_limit,
        memory: args.memory_limit,
        file_size: args.file_size_limit,
    };

    let app = create_app(args.max_concurrent, resource_limits).await?;
    run_server(app, args.addr).await?;

    Ok(())
}
