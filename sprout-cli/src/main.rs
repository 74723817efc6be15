//! sprout-cli — inspect and drive support-chat conversations from a shell
//!
//! Talks to the same chat service endpoints as the storefront widget.
//!
//! # Subcommands
//! - `faqs [--json]`                                   — list quick-reply prompts
//! - `session <identity> [--guest] [--json]`           — show status and messages
//! - `send <identity> <session-id> <body> [--guest]`   — post a message as the visitor

use clap::{Parser, Subcommand};
use sprout_core::models::{
    ChatSession, FaqAnswer, FaqPrompt, SendRequest, SendResponse, SessionSnapshot, SessionStatus,
    WireMessage,
};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080/api/support";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "sprout-cli",
    version,
    about = "Sprout support chat inspection tool"
)]
struct Cli {
    /// Chat service base URL (overrides SPROUT_CHAT_URL env var)
    #[arg(long, env = "SPROUT_CHAT_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List FAQ prompts offered in the chat
    Faqs {
        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a conversation's session and messages
    Session {
        /// User id, or guest token with --guest
        identity: String,

        /// Treat the identity as a guest token
        #[arg(long)]
        guest: bool,

        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Send a message on behalf of a visitor
    Send {
        identity: String,

        session_id: i64,

        body: String,

        #[arg(long)]
        guest: bool,
    },
}

// ============================================================================
// Formatting
// ============================================================================

pub fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Bot => "assistant",
        SessionStatus::Waiting => "waiting for operator",
        SessionStatus::Active => "operator connected",
        SessionStatus::Closed => "closed",
    }
}

/// One-line session summary: "#31 operator connected (Olga, id 7)".
pub fn format_session_header(session: &ChatSession) -> String {
    match &session.assigned_agent {
        Some(agent) => format!(
            "#{} {} ({}, id {})",
            session.id,
            status_label(session.status),
            agent.display_name,
            agent.id
        ),
        None => format!("#{} {}", session.id, status_label(session.status)),
    }
}

/// One line per message, body cut to 200 chars.
pub fn format_message_line(msg: &WireMessage) -> String {
    let body: String = msg.body.chars().take(200).collect();
    format!(
        "{} [{:>5}] {:<12} {}",
        msg.created_at.format("%Y-%m-%d %H:%M"),
        msg.id,
        msg.sender_label,
        body
    )
}

pub fn format_faq_line(index: usize, prompt: &FaqPrompt) -> String {
    match &prompt.answer {
        FaqAnswer::Text(_) => format!("{:>2}. {}", index + 1, prompt.question),
        FaqAnswer::OpenTickets => format!("{:>2}. {} -> ticket list", index + 1, prompt.question),
    }
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn http_client() -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?)
}

fn check_status(resp: reqwest::blocking::Response) -> reqwest::blocking::Response {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("sprout-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }
    resp
}

fn do_faqs(server: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/faqs", server);
    let resp = match http_client()?.get(&url).send() {
        Ok(r) => check_status(r),
        Err(e) => {
            eprintln!("sprout-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let faqs: Vec<FaqPrompt> = resp.json()?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&faqs)?);
    } else if faqs.is_empty() {
        eprintln!("No FAQ prompts configured");
    } else {
        for (i, prompt) in faqs.iter().enumerate() {
            println!("{}", format_faq_line(i, prompt));
        }
    }

    Ok(())
}

fn do_session(server: &str, identity: &str, guest: bool, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/session", server);
    let guest_flag = if guest { "true" } else { "false" };
    let resp = match http_client()?
        .get(&url)
        .query(&[("identity", identity), ("guest", guest_flag)])
        .send()
    {
        Ok(r) => check_status(r),
        Err(e) => {
            eprintln!("sprout-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let snapshot: SessionSnapshot = match resp.json() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("sprout-cli: failed to parse session response: {}", e);
            std::process::exit(1);
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("Session {}", format_session_header(&snapshot.session));
    if snapshot.messages.is_empty() {
        println!("(no messages)");
    }
    for msg in &snapshot.messages {
        println!("{}", format_message_line(msg));
    }

    Ok(())
}

fn do_send(server: &str, request: &SendRequest) -> anyhow::Result<()> {
    let url = format!("{}/send", server);
    let resp = match http_client()?.post(&url).json(request).send() {
        Ok(r) => check_status(r),
        Err(e) => {
            eprintln!("sprout-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let sent: SendResponse = resp.json()?;
    println!("Message id:  {}", sent.message_id);
    println!("Escalated:   {}", if sent.escalated { "yes" } else { "no" });
    if let Some(reply) = sent.bot_reply {
        println!("Bot reply:   [{}] {}", reply.id, reply.text);
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Faqs { json } => do_faqs(&server, json),
        Commands::Session {
            identity,
            guest,
            json,
        } => do_session(&server, &identity, guest, json),
        Commands::Send {
            identity,
            session_id,
            body,
            guest,
        } => do_send(
            &server,
            &SendRequest {
                identity,
                session_id,
                body,
                guest,
            },
        ),
    };

    if let Err(e) = result {
        eprintln!("sprout-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
