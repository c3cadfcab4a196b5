//! Broadcast CLI.
//!
//! Posts a message to the running bot's local endpoint, which relays it to
//! every known chat of an allowed user:
//!
//! ```text
//! rcb-broadcast -m "MESSAGE_TO_BROADCAST"
//! rcb-broadcast "MESSAGE_TO_BROADCAST"
//! echo "something" | rcb-broadcast
//! ```

use std::{
    io::{IsTerminal, Read},
    process::ExitCode,
};

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};

use rcb_core::{
    broadcast::{BROADCAST_PARAM, BROADCAST_PATH},
    config::{CliSettings, DEFAULT_CLI_PORT},
};

#[derive(Debug, Parser)]
#[command(
    name = "rcb-broadcast",
    version,
    about = "Broadcast a message through the running remote-control bot"
)]
struct Args {
    /// Message to broadcast.
    #[arg(short, long, value_name = "MESSAGE")]
    message: Option<String>,

    /// Message words, joined with spaces when --message is absent.
    #[arg(value_name = "WORDS", trailing_var_arg = true)]
    words: Vec<String>,
}

impl Args {
    fn argument_message(&self) -> String {
        match &self.message {
            Some(m) => m.clone(),
            None => self.words.join(" "),
        }
    }
}

/// Piped input comes first, separated from the argument by a blank line.
fn compose_message(stdin: &str, argument: &str) -> String {
    match (stdin.is_empty(), argument.is_empty()) {
        (true, _) => argument.to_string(),
        (false, true) => stdin.to_string(),
        (false, false) => format!("{stdin}\n\n{argument}"),
    }
}

fn read_piped_stdin() -> String {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return String::new();
    }
    let mut buf = String::new();
    if let Err(e) = stdin.read_to_string(&mut buf) {
        eprintln!("Failed to read standard input: {e}");
    }
    buf
}

fn broadcast_url(port: u16) -> String {
    format!("http://localhost:{port}{BROADCAST_PATH}")
}

async fn send(url: &str, auth_token: Option<&str>, message: &str) -> anyhow::Result<()> {
    let mut req = reqwest::Client::new()
        .post(url)
        .form(&[(BROADCAST_PARAM, message)]);
    if let Some(token) = auth_token {
        req = req.bearer_auth(token);
    }

    let resp = req.send().await.context("request failed")?;
    let status = resp.status();
    if !status.is_success() {
        bail!("HTTP {status}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let message = compose_message(&read_piped_stdin(), &args.argument_message());
    if message.is_empty() {
        let _ = Args::command().print_help();
        return ExitCode::FAILURE;
    }

    let settings = CliSettings::load().unwrap_or_else(|e| {
        println!("Failed to load config, using default port number: {DEFAULT_CLI_PORT} ({e})");
        CliSettings::default()
    });

    match send(
        &broadcast_url(settings.cli_port),
        settings.cli_auth_token.as_deref(),
        &message,
    )
    .await
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("* Broadcast failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
