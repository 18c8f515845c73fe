use std::io;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use peerchat::config;
use peerchat::server::PeerListener;

const ENV_ECHO: &str = "PEERCHAT_ECHO";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    println!("peerchat listener");
    println!("=================");

    let stdin = io::stdin();
    let endpoint = config::prompt_target(&mut stdin.lock(), &mut io::stdout())?;
    let echo = std::env::var(ENV_ECHO)
        .map(|v| matches!(v.trim(), "1" | "true" | "on" | "yes"))
        .unwrap_or(false);

    let listener = PeerListener::bind((endpoint.host(), endpoint.port()))?.with_echo(echo);
    println!("Listening on {} (echo {})", listener.local_addr()?, if echo { "on" } else { "off" });

    listener.serve(|addr, text| {
        println!("[{}] {}: {}", chrono::Local::now().format("%H:%M:%S"), addr, text);
    })?;

    Ok(())
}
