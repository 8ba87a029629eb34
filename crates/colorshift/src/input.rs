//! Line-oriented commands read from stdin, standing in for the on-screen
//! buttons and the tap gesture.

use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Tap,
    ZoomIn,
    ZoomOut,
    SharpnessUp,
    SharpnessDown,
    Start,
    Stop,
    Resize { width: u32, height: u32 },
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".to_string());
    };
    let command = match verb.to_ascii_lowercase().as_str() {
        "tap" | "describe" => Command::Tap,
        "zoom+" | "zoom-in" => Command::ZoomIn,
        "zoom-" | "zoom-out" => Command::ZoomOut,
        "sharp+" | "sharpen" => Command::SharpnessUp,
        "sharp-" | "soften" => Command::SharpnessDown,
        "start" => Command::Start,
        "stop" => Command::Stop,
        "quit" | "exit" | "q" => Command::Quit,
        "resize" => {
            let size = words
                .next()
                .ok_or_else(|| "resize needs WIDTHxHEIGHT".to_string())?;
            let (width, height) = crate::cli::parse_viewport(size)?;
            Command::Resize { width, height }
        }
        other => return Err(format!("unknown command '{other}'")),
    };
    if let Some(extra) = words.next() {
        return Err(format!("unexpected argument '{extra}'"));
    }
    Ok(command)
}

/// Reads stdin on a background thread until EOF or until the receiver hangs up.
pub fn spawn_stdin_reader(commands: Sender<Command>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to read command");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(command) => {
                        if commands.send(command).is_err() {
                            break;
                        }
                    }
                    Err(err) => tracing::warn!(input = %line.trim(), "{err}"),
                }
            }
            tracing::debug!("command input closed");
        })
}
