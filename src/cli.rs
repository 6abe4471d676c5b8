//! Interactive console
//!
//! Reads commands on a blocking thread and forwards them to the main loop.

use colored::*;
use rosc::OscType;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::bridge::MultiplayBridge;
use crate::commands::parse_arg;
use crate::state::FieldValue;

/// Command typed at the console
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Status,
    Send { address: String, args: Vec<OscType> },
    Help,
    Quit,
}

/// Parse one console line; `Ok(None)` for blank lines
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Ok(None);
    };

    let command = match cmd {
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        "send" => {
            let address = parts
                .next()
                .ok_or_else(|| "usage: send <address> [args...]".to_string())?;
            if !address.starts_with('/') {
                return Err(format!("OSC address must start with '/': {}", address));
            }
            ConsoleCommand::Send {
                address: address.to_string(),
                args: parts.map(parse_arg).collect(),
            }
        },
        other => return Err(format!("unknown command: {} (try 'help')", other)),
    };

    Ok(Some(command))
}

/// Run the line editor on its own thread
///
/// The thread exits on EOF, Ctrl-C, `quit`, or when the receiver is dropped.
pub fn spawn_repl(tx: mpsc::UnboundedSender<ConsoleCommand>) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let mut rl = match DefaultEditor::new() {
                Ok(rl) => rl,
                Err(e) => {
                    warn!("Console unavailable: {}", e);
                    return;
                },
            };

            loop {
                match rl.readline("multiplay> ") {
                    Ok(line) => {
                        let _ = rl.add_history_entry(line.as_str());
                        match parse_line(&line) {
                            Ok(Some(command)) => {
                                let quit = command == ConsoleCommand::Quit;
                                if tx.send(command).is_err() || quit {
                                    break;
                                }
                            },
                            Ok(None) => {},
                            Err(msg) => println!("{}", msg.red()),
                        }
                    },
                    Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                        let _ = tx.send(ConsoleCommand::Quit);
                        break;
                    },
                    Err(e) => {
                        warn!("Console read error: {}", e);
                        break;
                    },
                }
            }
            debug!("Console thread exiting");
        })
}

pub fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  {}                      show device status and feedbacks", "status".yellow());
    println!("  {}  send an OSC command to the device", "send <address> [args]".yellow());
    println!("  {}                        exit", "quit".yellow());
}

pub fn print_status(bridge: &MultiplayBridge) {
    println!("\n{} {}", "Instance:".bold(), bridge.status().to_string().cyan());

    println!("{}", "Variables:".bold());
    for (field, value) in bridge.snapshot().iter() {
        let rendered = match value {
            FieldValue::Boolean(true) => "on".green().to_string(),
            FieldValue::Boolean(false) => "off".dimmed().to_string(),
            FieldValue::String(s) if s.is_empty() => "-".dimmed().to_string(),
            FieldValue::String(s) => s.bright_white().to_string(),
        };
        println!("  {:<24} {:<14} {}", field.name(), field.variable_id().dimmed(), rendered);
    }

    println!("{}", "Feedbacks:".bold());
    for (id, lit) in bridge.feedback_states() {
        let lamp = if lit { "●".green() } else { "○".dimmed() };
        println!("  {} {}", lamp, id);
    }
    println!();
}
