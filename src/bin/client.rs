use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use peerchat::client::{app, ChatSession, Intent};
use peerchat::config::{self, ClientConfig};

fn main() -> anyhow::Result<()> {
    println!("peerchat");
    println!("========");

    let stdin = io::stdin();
    let endpoint = config::prompt_target(&mut stdin.lock(), &mut io::stdout())?;
    let config = ClientConfig::from_env(endpoint)?;

    // the terminal belongs to the UI, so logs go to a file
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .with_context(|| format!("cannot open log file {}", config.log_file.display()))?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();

    tracing::info!(peer = %config.endpoint, options = ?config.link, "starting");

    let mut session = ChatSession::new(config.link.clone());
    session.add_peer(config.endpoint.clone());

    println!("Connecting to {}...", config.endpoint);
    session.handle(Intent::RequestConnect);

    app::run(&mut session)?;

    println!("Bye!");
    Ok(())
}
