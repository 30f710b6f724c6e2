use std::env;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tidekv::{Result, TideError, TideKv, server};
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    if let Err(error) = run() {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        return Ok(());
    }

    let command = args.remove(0);
    let data_dir = data_directory();

    match command.as_str() {
        "put" => cmd_put(&data_dir, args),
        "get" => cmd_get(&data_dir, args),
        "delete" => cmd_delete(&data_dir, args),
        "serve" => cmd_serve(&data_dir, args),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => Err(invalid(format!("unknown command `{other}`"))),
    }
}

fn print_usage() {
    println!("TideKv CLI");
    println!("Usage:");
    println!("  tidekv put <key> <value>");
    println!("  tidekv get <key>");
    println!("  tidekv delete <key>");
    println!("  tidekv serve [--addr <host:port>]");
    println!("Environment overrides: TIDEKV_DATA_DIR");
}

fn cmd_put(data_dir: &Path, mut args: Vec<String>) -> Result<()> {
    if args.len() < 2 {
        return Err(invalid("missing key or value"));
    }
    let key = parse_key(&args.remove(0))?;
    let value = args.remove(0);
    ensure_no_flags(&args)?;
    let engine = TideKv::open(data_dir)?;
    engine.put(key, value)?;
    println!("stored");
    Ok(())
}

fn cmd_get(data_dir: &Path, mut args: Vec<String>) -> Result<()> {
    if args.is_empty() {
        return Err(invalid("missing key"));
    }
    let key = parse_key(&args.remove(0))?;
    ensure_no_flags(&args)?;
    let engine = TideKv::open(data_dir)?;
    match engine.get(key)? {
        Some(value) => println!("{value}"),
        None => println!("key not found"),
    }
    Ok(())
}

fn cmd_delete(data_dir: &Path, mut args: Vec<String>) -> Result<()> {
    if args.is_empty() {
        return Err(invalid("missing key"));
    }
    let key = parse_key(&args.remove(0))?;
    ensure_no_flags(&args)?;
    let engine = TideKv::open(data_dir)?;
    engine.delete(key)?;
    println!("deleted");
    Ok(())
}

fn cmd_serve(data_dir: &Path, args: Vec<String>) -> Result<()> {
    let mut addr = String::from("127.0.0.1:4000");

    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--addr" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| invalid("--addr requires a value"))?;
                addr = value.clone();
            }
            flag => {
                return Err(invalid(format!("unknown option `{flag}`")));
            }
        }
        index += 1;
    }

    let engine = TideKv::open(data_dir)?;
    server::run(&addr, engine)
}

fn ensure_no_flags(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }
    Err(invalid(format!(
        "unexpected arguments: {}",
        args.join(" ")
    )))
}

fn parse_key(token: &str) -> Result<i32> {
    token
        .parse()
        .map_err(|_| invalid(format!("invalid key `{token}`, expected a 32-bit integer")))
}

fn data_directory() -> PathBuf {
    env::var("TIDEKV_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn invalid(message: impl Into<String>) -> TideError {
    TideError::Io(io::Error::new(ErrorKind::InvalidInput, message.into()))
}
