// Copyright 2026 Dw Chat contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Dw Chat main entry point - CLI and streaming REPL.

use clap::Parser;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;

use dwchat::config::{ChatConfig, API_KEY_ENV, BASE_URL_ENV, DEFAULT_BASE_URL};
use dwchat::session::{ChatSession, SessionEvent};
use dwchat::types::{MessageStatus, Role};

/// Dw Chat - streaming DeepSeek chat in the terminal.
#[derive(Parser)]
#[command(name = "dwchat")]
#[command(author, version, about = "Streaming DeepSeek chat in the terminal", long_about = None)]
struct Cli {
    /// DeepSeek API key
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: String,

    /// Base URL for the API
    #[arg(long, env = BASE_URL_ENV)]
    base_url: Option<String>,

    /// Start with the reasoning model enabled
    #[arg(short, long)]
    reasoner: bool,

    /// Run a single prompt and exit
    #[arg(short = 'P', long)]
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let base_url = cli
        .base_url
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let config = ChatConfig::new(cli.api_key, base_url)?;

    let session = ChatSession::new(&config)?;
    session.set_reasoning_enabled(cli.reasoner);

    if let Some(prompt) = cli.prompt {
        let mut events = session.subscribe();
        session.send(&prompt)?;
        stream_reply(&session, &mut events).await?;
        return Ok(());
    }

    run_repl(session).await
}

fn init_tracing() {
    // Only initialize if trace or debug is enabled
    if std::env::var("RUST_LOG").is_ok() {
        // Let env var control logging
        tracing_subscriber::fmt::init();
    } else {
        // Default to WARN level
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .init();
    }
}

async fn run_repl(session: ChatSession) -> anyhow::Result<()> {
    println!("{}", "Dw Chat".bold());
    println!("{}", "Type /help for commands, /quit to exit.".dimmed());
    println!();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(prompt_label(&session).as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = stdin.next_line().await? else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            if handle_command(&session, command) {
                break;
            }
            continue;
        }

        // Subscribe before sending so no event can be missed.
        let mut events = session.subscribe();
        match session.send(&line) {
            Ok(()) => stream_reply(&session, &mut events).await?,
            Err(err) => eprintln!("{} {}", "error:".red().bold(), err),
        }
    }

    Ok(())
}

fn prompt_label(session: &ChatSession) -> String {
    let model = session.current_model();
    format!("{} ", format!("{} ❯", model.id).cyan())
}

/// Handle a slash command. Returns true when the REPL should exit.
fn handle_command(session: &ChatSession, command: &str) -> bool {
    let mut parts = command.split_whitespace();
    match parts.next().unwrap_or("") {
        "quit" | "exit" | "q" => return true,
        "help" => {
            println!("  /new               start a new conversation");
            println!("  /list              list conversations");
            println!("  /switch <n>        switch to conversation n from /list");
            println!("  /delete <n>        delete conversation n from /list");
            println!("  /reasoner          toggle the reasoning model");
            println!("  /quit              exit");
        }
        "new" => {
            session.new_conversation();
            println!("{}", "started a new conversation".dimmed());
        }
        "list" => {
            let conversations = session.conversations();
            if conversations.is_empty() {
                println!("{}", "no conversations yet".dimmed());
            }
            let active = session.active_conversation();
            for (index, item) in conversations.iter().enumerate() {
                let marker = if active.as_deref() == Some(item.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                let title = if item.title.is_empty() {
                    "(untitled)"
                } else {
                    item.title.as_str()
                };
                println!("{} {:>2}  {}", marker, index + 1, title);
            }
        }
        "switch" => {
            let conversations = session.conversations();
            let target = parts
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| conversations.get(i));
            match target {
                Some(item) => {
                    if let Err(err) = session.switch_conversation(&item.id) {
                        eprintln!("{} {}", "error:".red().bold(), err);
                    } else {
                        replay_conversation(session);
                    }
                }
                None => eprintln!("{} usage: /switch <n>", "error:".red().bold()),
            }
        }
        "delete" => {
            let conversations = session.conversations();
            let target = parts
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| conversations.get(i));
            match target {
                Some(item) => {
                    session.delete_conversation(&item.id);
                    println!("{}", "conversation deleted".dimmed());
                }
                None => eprintln!("{} usage: /delete <n>", "error:".red().bold()),
            }
        }
        "reasoner" => {
            let enabled = !session.reasoning_enabled();
            session.set_reasoning_enabled(enabled);
            let state = if enabled { "on" } else { "off" };
            println!("{}", format!("reasoning model {}", state).dimmed());
        }
        other => eprintln!("{} unknown command: /{}", "error:".red().bold(), other),
    }
    false
}

/// Print the switched-to conversation's history.
fn replay_conversation(session: &ChatSession) {
    for view in session.visible_messages() {
        match view.role {
            Role::User => println!("{} {}", "you:".green().bold(), view.content),
            Role::Assistant => {
                if !view.reasoning_content.is_empty() {
                    println!("{}", view.reasoning_content.dimmed());
                }
                println!("{}", view.content);
                match view.status {
                    MessageStatus::Cancelled => println!("{}", "[cancelled]".yellow()),
                    MessageStatus::Error => println!("{}", "[error]".red()),
                    _ => {}
                }
            }
        }
    }
}

/// Print the in-flight reply as it streams, until its terminal event.
/// Ctrl-C cancels the request; the partial reply is kept.
async fn stream_reply(
    session: &ChatSession,
    events: &mut broadcast::Receiver<SessionEvent>,
) -> anyhow::Result<()> {
    let Some(conversation_id) = session.active_conversation() else {
        return Ok(());
    };

    // Aggregated fields only ever grow, so printing the unseen suffix by
    // byte offset is safe.
    let mut printed_reasoning = 0usize;
    let mut printed_content = 0usize;
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                let _ = session.cancel();
            }
            event = events.recv() => match event {
                Ok(SessionEvent::MessagesUpdated { conversation_id: id })
                    if id == conversation_id =>
                {
                    print_suffixes(
                        session,
                        &conversation_id,
                        &mut printed_reasoning,
                        &mut printed_content,
                        &mut stdout,
                    )
                    .await?;
                }
                Ok(SessionEvent::RequestFinished {
                    conversation_id: id,
                    status,
                    error,
                    ..
                }) if id == conversation_id => {
                    print_suffixes(
                        session,
                        &conversation_id,
                        &mut printed_reasoning,
                        &mut printed_content,
                        &mut stdout,
                    )
                    .await?;
                    println!();
                    match status {
                        MessageStatus::Cancelled => println!("{}", "[cancelled]".yellow()),
                        MessageStatus::Error => {
                            let detail = error.unwrap_or_else(|| "request failed".to_string());
                            eprintln!("{} {}", "error:".red().bold(), detail);
                        }
                        _ => {}
                    }
                    break;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    Ok(())
}

async fn print_suffixes(
    session: &ChatSession,
    conversation_id: &str,
    printed_reasoning: &mut usize,
    printed_content: &mut usize,
    stdout: &mut tokio::io::Stdout,
) -> anyhow::Result<()> {
    let views = session.messages_of(conversation_id);
    let Some(reply) = views.iter().rev().find(|v| v.role == Role::Assistant) else {
        return Ok(());
    };

    if reply.reasoning_content.len() > *printed_reasoning {
        let suffix = &reply.reasoning_content[*printed_reasoning..];
        stdout
            .write_all(suffix.dimmed().to_string().as_bytes())
            .await?;
        *printed_reasoning = reply.reasoning_content.len();
    }
    if reply.content.len() > *printed_content {
        let suffix = &reply.content[*printed_content..];
        stdout.write_all(suffix.as_bytes()).await?;
        *printed_content = reply.content.len();
    }
    stdout.flush().await?;
    Ok(())
}
