//! FragDB - TCP server

use std::env;

use anyhow::{bail, Context};
use fragdb::server::{ConnectionUrl, OutputFormat, Server, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn parse_args(args: &[String]) -> anyhow::Result<ServerConfig> {
    let mut config = ServerConfig::new();
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .with_context(|| format!("{} expects a value", name))
        };
        match arg.as_str() {
            "--port" | "-p" => {
                let port = value(arg)?;
                config = config.port(port.parse().with_context(|| format!("invalid port '{}'", port))?);
            }
            "--host" | "-H" => config = config.host(value(arg)?),
            "--data-dir" | "-d" => config = config.data_dir(value(arg)?),
            "--headroom" => {
                let headroom = value(arg)?;
                config = config.symtable_headroom(
                    headroom
                        .parse()
                        .with_context(|| format!("invalid headroom '{}'", headroom))?,
                );
            }
            "--max-connections" => {
                let max = value(arg)?;
                config = config.max_connections(
                    max.parse()
                        .with_context(|| format!("invalid connection limit '{}'", max))?,
                );
            }
            "--json" => config = config.output_format(OutputFormat::Json),
            "--url" => {
                let url = ConnectionUrl::parse(&value(arg)?)?;
                config = url.to_server_config();
            }
            other => bail!("unknown argument '{}'", other),
        }
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let config = parse_args(&args)?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting FragDB server");
    let server = Server::new(config).context("failed to initialise engine")?;
    server.run().await.context("server stopped")?;
    Ok(())
}
