//! Minimal TCP front-end exposing the TideKv API.

use crate::engine::TideKv;
use crate::error::{Result, TideError};
use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info};

const HELP: &str = "Commands: PUT <key> <value>, GET <key>, DEL <key>, HELP";

/// Starts a blocking TCP server handling text commands.
pub fn run(addr: &str, engine: TideKv) -> Result<()> {
    let listener = TcpListener::bind(addr)?;
    info!(%addr, "tidekv tcp server listening");
    for stream in listener.incoming() {
        let stream = stream?;
        let engine = engine.clone();
        thread::spawn(move || {
            if let Err(err) = handle_client(stream, engine) {
                error!("client error: {err}");
            }
        });
    }
    Ok(())
}

fn handle_client(stream: TcpStream, engine: TideKv) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let mut writer = stream.try_clone()?;
    let reader = BufReader::new(stream);
    writeln!(writer, "Welcome to TideKv. {HELP}")?;

    for line in reader.lines() {
        let line = line?;
        let response = match parse_command(&line) {
            Command::Put { key, value } => engine.put(key, value).map(|_| "OK".to_string()),
            Command::Get { key } => match engine.get(key)? {
                Some(value) => Ok(format!("VALUE {value}")),
                None => Ok("NOT_FOUND".to_string()),
            },
            Command::Del { key } => engine.delete(key).map(|_| "OK".to_string()),
            Command::Help => Ok(HELP.to_string()),
            Command::Invalid => Err(TideError::Io(io::Error::new(
                ErrorKind::InvalidInput,
                "bad command",
            ))),
        };

        match response {
            Ok(output) => {
                writeln!(writer, "{output}")?;
            }
            Err(err) => {
                writeln!(writer, "ERR {err}")?;
            }
        }
        writer.flush()?;
    }

    if let Some(addr) = peer {
        info!(%addr, "connection closed");
    }
    Ok(())
}

enum Command {
    Put { key: i32, value: String },
    Get { key: i32 },
    Del { key: i32 },
    Help,
    Invalid,
}

fn parse_command(line: &str) -> Command {
    let mut parts = line.trim().split_whitespace();
    match parts.next() {
        Some(cmd) if cmd.eq_ignore_ascii_case("put") => {
            let key = match parts.next().and_then(parse_key) {
                Some(key) => key,
                None => return Command::Invalid,
            };
            let value = match parts.next() {
                Some(value) => value.to_owned(),
                None => return Command::Invalid,
            };
            if parts.next().is_some() {
                return Command::Invalid;
            }
            Command::Put { key, value }
        }
        Some(cmd) if cmd.eq_ignore_ascii_case("get") => match parts.next().and_then(parse_key) {
            Some(key) => {
                if parts.next().is_some() {
                    Command::Invalid
                } else {
                    Command::Get { key }
                }
            }
            None => Command::Invalid,
        },
        Some(cmd) if cmd.eq_ignore_ascii_case("del") => match parts.next().and_then(parse_key) {
            Some(key) => {
                if parts.next().is_some() {
                    Command::Invalid
                } else {
                    Command::Del { key }
                }
            }
            None => Command::Invalid,
        },
        Some(cmd) if cmd.eq_ignore_ascii_case("help") => {
            if parts.next().is_some() {
                Command::Invalid
            } else {
                Command::Help
            }
        }
        _ => Command::Invalid,
    }
}

fn parse_key(token: &str) -> Option<i32> {
    token.parse().ok()
}
