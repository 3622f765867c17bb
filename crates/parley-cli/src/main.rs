use anyhow::Result;
use clap::Parser;
use console::style;
use parley::protocol::Frame;
use parley_cli::store::RemoteSessionStore;
use parley_cli::transport::HttpTransport;
use parley_cli::{ChatError, ChatSession, SendOutcome};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const PROMPT: &str = "\x1b[1m\x1b[38;5;30m> \x1b[0m";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the parley server
    #[arg(long, env = "PARLEY_SERVER_URL", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Agent to talk to, e.g. job-description
    #[arg(short, long)]
    agent: String,

    /// Session id to record the conversation under (a new one by default)
    #[arg(short, long)]
    session: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let session_id = cli
        .session
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let session = ChatSession::new(
        Arc::new(HttpTransport::new(cli.server.clone())),
        Arc::new(RemoteSessionStore::new(cli.server.clone())?),
        cli.agent,
        session_id,
    );

    println!(
        "Chatting with {} {}",
        style(session.agent_id()).bold(),
        style(format!("(session {})", session.session_id())).dim()
    );
    println!(
        "{}",
        style("Ctrl-C stops a reply, /clear starts over, /exit or Ctrl-D quits").dim()
    );

    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let input = line.trim();
        match input {
            "" => continue,
            "/exit" => break,
            "/clear" => {
                session.clear()?;
                println!("{}", style("Conversation cleared").dim());
                continue;
            }
            _ => {}
        }
        let _ = editor.add_history_entry(input);

        match reply(&session, input).await {
            Ok(SendOutcome::Completed(_)) => println!("\n"),
            Ok(SendOutcome::Failed(message)) => {
                println!("\n{}\n", style(message.content).red());
            }
            Ok(SendOutcome::Cancelled) => println!("\n{}\n", style("(stopped)").dim()),
            Err(e) => eprintln!("{}", style(e).red()),
        }
    }

    Ok(())
}

/// Send one message, printing the reply as it streams and cancelling it on Ctrl-C
async fn reply(session: &ChatSession, input: &str) -> Result<SendOutcome, ChatError> {
    let send = session.send(input, render_frame);
    tokio::pin!(send);

    loop {
        tokio::select! {
            outcome = &mut send => return outcome,
            _ = tokio::signal::ctrl_c() => {
                session.cancel();
            }
        }
    }
}

fn render_frame(frame: &Frame) {
    match frame {
        Frame::Text { content } => print!("{}", content),
        Frame::ToolUseStart { tool_name, .. } => {
            println!("{}", style(format!("[{}]", tool_name)).dim());
        }
        Frame::Continuing => print!("\n\n"),
        _ => {}
    }
    let _ = io::stdout().flush();
}
