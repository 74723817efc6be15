use clap::Parser;
use sprout_chat::{ChatClient, ChatEvent, FaqSelection, SendOutcome};
use sprout_core::models::{FaqPrompt, Message, SenderKind};
use sprout_core::SproutConfig;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Sprout support chat in the terminal", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "sprout.toml")]
    config: String,

    /// Signed-in user id; omit to chat as a guest
    #[arg(long)]
    user: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Logs go to stderr so they do not interleave with the conversation
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let config = if Path::new(&args.config).exists() {
        match SproutConfig::load(&args.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config from {}: {}", args.config, e);
                std::process::exit(1);
            }
        }
    } else {
        tracing::warn!(path = %args.config, "Config file not found, using defaults");
        SproutConfig::default()
    };

    let client = ChatClient::from_config(&config)?;
    let mut events = client.subscribe();

    let snapshot = match client.open(args.user.as_deref()).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Support chat is unavailable right now: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(banner) = &snapshot.banner {
        println!("*** {} ***", banner);
    }
    for msg in &snapshot.messages {
        print_message(msg);
    }
    if snapshot.faq_visible {
        print_suggestions(&snapshot.suggestions);
    }
    println!("(type a message, /faq N to ask a suggested question, /quit to leave)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Shutdown signal received");
                break;
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_input(&client, line.trim()) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => render_event(&client, event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Chat events dropped; view may be behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    client.close();
    Ok(())
}

/// Returns false when the user asked to leave.
fn handle_input(client: &ChatClient, line: &str) -> bool {
    match line {
        "" => true,
        "/quit" | "/exit" => false,
        "/faqs" => {
            let snapshot = client.snapshot();
            if snapshot.faq_visible {
                print_suggestions(&snapshot.suggestions);
            } else {
                println!("(suggestions are not available right now)");
            }
            true
        }
        _ if line.starts_with("/faq ") => {
            let index = line["/faq ".len()..].trim().parse::<usize>().ok();
            match index.and_then(|n| n.checked_sub(1)).and_then(|i| client.select_faq(i)) {
                Some(FaqSelection::Draft(question)) => {
                    println!("> {}", question);
                    spawn_send(client, None);
                }
                Some(FaqSelection::OpenTickets) => {
                    println!("(this one is answered in your ticket list on the website)");
                }
                None => println!("(no such suggestion)"),
            }
            true
        }
        text => {
            spawn_send(client, Some(text.to_string()));
            true
        }
    }
}

/// Send without blocking input; results arrive as events.
fn spawn_send(client: &ChatClient, text: Option<String>) {
    let client = client.clone();
    tokio::spawn(async move {
        let result = match text {
            Some(text) => client.send(&text).await,
            None => client.send_draft().await,
        };
        match result {
            Ok(SendOutcome::Delivered { .. }) | Ok(SendOutcome::Failed { .. }) => {}
            Err(e) => println!("(message not sent: {})", e),
        }
    });
}

fn render_event(client: &ChatClient, event: ChatEvent) {
    match event {
        ChatEvent::MessagesAppended(messages) => {
            for msg in messages.iter().filter(|m| m.sender != SenderKind::User) {
                print_message(msg);
            }
        }
        ChatEvent::StatusChanged(_) => {
            if let Some(banner) = client.snapshot().banner {
                println!("*** {} ***", banner);
            }
        }
        ChatEvent::SendFailed { reason, .. } => {
            println!("(message not delivered: {}; send it again to retry)", reason);
        }
        ChatEvent::SuggestionsReady => {
            print_suggestions(&client.snapshot().suggestions);
        }
    }
}

fn print_message(msg: &Message) {
    println!(
        "[{}] {}: {}",
        msg.created_at.format("%H:%M"),
        msg.sender_label,
        msg.body
    );
}

fn print_suggestions(prompts: &[FaqPrompt]) {
    if prompts.is_empty() {
        return;
    }
    println!("Suggested questions:");
    for (i, prompt) in prompts.iter().enumerate() {
        println!("  {}. {}", i + 1, prompt.question);
    }
}
