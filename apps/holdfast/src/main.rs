mod cli;
mod logging;

use anyhow::{Context, Result, bail};
use clap::Parser;
use holdfast_client::{ClientConfig, LongPollClient, SessionEvent};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use crate::cli::{Cli, Commands};
use crate::logging::LogConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&LogConfig {
        level: cli.log_level,
        file: cli.log_file.clone(),
    })?;

    let config = ClientConfig::new(&cli.server).context("invalid server url")?;
    let client = LongPollClient::new(config)?;

    match cli.command {
        Commands::Watch => run_watch(client).await,
        Commands::Send { payload } => run_send(client, payload).await,
    }
}

async fn run_watch(client: LongPollClient) -> Result<()> {
    let mut events = client.start()?;
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(SessionEvent::Started { session }) => {
                        println!("session {session} established");
                    }
                    Some(SessionEvent::Update { payload }) if payload.is_empty() => {}
                    Some(SessionEvent::Update { payload }) => {
                        println!("{}", pretty(&payload));
                    }
                    Some(SessionEvent::ChannelLost { error }) => {
                        warn!(%error, "channel lost; reconnecting");
                        eprintln!("channel lost ({error}); reconnecting");
                    }
                    None => bail!("session ended unexpectedly"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    client.end()?;
    Ok(())
}

async fn run_send(client: LongPollClient, payload: String) -> Result<()> {
    let mut events = client.start()?;
    wait_for_session(&mut events).await?;
    let response = client.send_update(payload).await?;
    println!("{}", pretty(&response));
    client.end()?;
    Ok(())
}

async fn wait_for_session(events: &mut UnboundedReceiver<SessionEvent>) -> Result<()> {
    loop {
        match events.recv().await {
            Some(SessionEvent::Started { .. }) => return Ok(()),
            Some(SessionEvent::ChannelLost { error }) => {
                warn!(%error, "channel lost while connecting; retrying");
            }
            Some(_) => {}
            None => bail!("session ended before it was established"),
        }
    }
}

/// Pretty-prints JSON payloads; anything else passes through verbatim.
fn pretty(payload: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| payload.to_string()),
        Err(_) => payload.to_string(),
    }
}
