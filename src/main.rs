//! Binary entrypoint for the radarlink console.
//!
//! Commands:
//! - `init` - write a starter `radarlink.toml`
//! - `ports` - list serial ports
//! - `monitor [--port <path>] [--baud <n>] [--json]` - print telemetry as it arrives;
//!   type `flags R1 R3`, `stats` or `quit` on stdin
//! - `send-flags [--port <path>] [--baud <n>] <ROBOT>...` - send one vulnerability flag frame
//! - `encode --command <id> [--seq <n>] [PAYLOAD_HEX]` - print a frame without a port
//! - `decode <HEX> [--json] [--permissive]` - parse captured bytes without a port
//!
//! See the library crate docs for module-level details: `radarlink::`.
use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use radarlink::config::Config;
use radarlink::logutil::{hex_dump, parse_hex};
use radarlink::protocol::{CommandId, FrameBuilder, FrameParser, ParseOutcome, ReceiveBuffer};
use radarlink::session::LinkEvent;
use radarlink::telemetry::{Robot, TelemetryDecoder, TelemetryRecord, VulnerabilityFlags};

#[derive(Parser)]
#[command(name = "radarlink")]
#[command(about = "Serial link console for the radar station controller")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "radarlink.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// List serial ports
    Ports,
    /// Poll the link and print decoded telemetry
    Monitor {
        /// Serial port (overrides config)
        #[arg(short, long)]
        port: Option<String>,
        /// Baud rate (overrides config)
        #[arg(short, long)]
        baud: Option<u32>,
        /// One JSON object per event instead of text
        #[arg(long)]
        json: bool,
    },
    /// Send vulnerability flags for the given robots (e.g. R1 R3)
    SendFlags {
        #[arg(short, long)]
        port: Option<String>,
        #[arg(short, long)]
        baud: Option<u32>,
        /// Robots to flag; none clears every flag
        robots: Vec<String>,
    },
    /// Build a frame and print it as hex
    Encode {
        /// Command id, hex (0x020C) or decimal
        #[arg(long)]
        command: String,
        #[arg(long, default_value_t = 1)]
        seq: u8,
        /// Payload bytes as hex
        #[arg(default_value = "")]
        payload: String,
    },
    /// Parse hex bytes and print every frame and rejection found
    Decode {
        hex: String,
        #[arg(long)]
        json: bool,
        /// Accept any command id
        #[arg(long)]
        permissive: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init { .. } => None,
        _ => match Config::load(&cli.config).await {
            Ok(c) => Some(c),
            Err(e) => {
                if std::path::Path::new(&cli.config).exists() {
                    return Err(e);
                }
                None
            }
        },
    };
    init_logging(&pre_config, cli.verbose);
    let config = pre_config.unwrap_or_default();

    match cli.command {
        Commands::Init { force } => {
            if std::path::Path::new(&cli.config).exists() && !force {
                bail!("{} already exists (use --force to overwrite)", cli.config);
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Ports => list_ports()?,
        Commands::Monitor { port, baud, json } => {
            let config = with_overrides(config, port, baud)?;
            monitor(config, json).await?;
        }
        Commands::SendFlags { port, baud, robots } => {
            let config = with_overrides(config, port, baud)?;
            let robots = robots
                .iter()
                .map(|r| r.parse::<Robot>())
                .collect::<Result<Vec<_>, _>>()?;
            let flags = VulnerabilityFlags::from_robots(robots)?;
            send_flags(config, flags)?;
        }
        Commands::Encode { command, seq, payload } => {
            let command = parse_command_id(&command)?;
            let payload = parse_hex(&payload)?;
            let frame = FrameBuilder::build(&payload, seq, command)?;
            println!("{}", hex_dump(&frame, usize::MAX));
        }
        Commands::Decode { hex, json, permissive } => {
            let bytes = parse_hex(&hex)?;
            let parser = if permissive {
                FrameParser::permissive()
            } else {
                config.parser()
            };
            decode(&bytes, parser, config.telemetry.decoder(), json);
        }
    }

    Ok(())
}

fn with_overrides(mut config: Config, port: Option<String>, baud: Option<u32>) -> Result<Config> {
    if let Some(port) = port {
        config.link.port = port;
    }
    if let Some(baud) = baud {
        config.link.baud_rate = baud;
    }
    config.validate()?;
    Ok(config)
}

/// `0x020C` style hex or plain decimal.
fn parse_command_id(text: &str) -> Result<CommandId> {
    let t = text.trim();
    let value = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => t.parse::<u16>(),
    };
    value
        .map(CommandId)
        .map_err(|e| anyhow!("invalid command id '{}': {}", text, e))
}

fn decode(bytes: &[u8], parser: FrameParser, decoder: TelemetryDecoder, json: bool) {
    let mut rx = ReceiveBuffer::new(parser);
    rx.push(bytes);
    for result in rx.drain() {
        let event = match result {
            Ok(frame) => {
                let record = decoder.decode(&frame);
                LinkEvent::Received { frame, record }
            }
            Err(outcome) => LinkEvent::Rejected(outcome),
        };
        if let Some(line) = render_event(&event, json) {
            println!("{}", line);
        }
    }
    if !rx.is_empty() {
        println!("incomplete: {} trailing byte(s)", rx.len());
    }
    if rx.discarded() > 0 {
        println!("discarded: {} byte(s)", rx.discarded());
    }
}

fn render_event(event: &LinkEvent, json: bool) -> Option<String> {
    if json {
        let value = match event {
            LinkEvent::Received { frame, record } => serde_json::json!({
                "event": "frame",
                "command_id": frame.command_id.to_string(),
                "sequence": frame.sequence,
                "record": record,
            }),
            LinkEvent::Rejected(outcome) => rejected_json(outcome),
            LinkEvent::Sent(bytes) => serde_json::json!({
                "event": "sent",
                "bytes": hex_dump(bytes, usize::MAX),
            }),
            LinkEvent::SendFailed(reason) => serde_json::json!({
                "event": "send_failed",
                "reason": reason,
            }),
            LinkEvent::Stats(stats) => serde_json::json!({
                "event": "stats",
                "stats": stats,
            }),
        };
        return Some(value.to_string());
    }
    match event {
        LinkEvent::Received { frame, record } => Some(match record {
            TelemetryRecord::Positions(set) => {
                format!("[seq {}] positions\n  {}", frame.sequence, set.lines().join("\n  "))
            }
            TelemetryRecord::Vulnerability { flags } => {
                format!("[seq {}] vulnerable: {}", frame.sequence, flags)
            }
            TelemetryRecord::Raw { command_id, payload } => format!(
                "[seq {}] cmd {} ({} bytes): {}",
                frame.sequence,
                command_id,
                payload.len(),
                hex_dump(payload, 64)
            ),
        }),
        // Line noise is routine on this link; only show it at debug level.
        LinkEvent::Rejected(ParseOutcome::NoStartByte) => None,
        LinkEvent::Rejected(outcome) => Some(format!("rejected: {}", outcome)),
        LinkEvent::Sent(bytes) => Some(format!("sent: {}", hex_dump(bytes, usize::MAX))),
        LinkEvent::SendFailed(reason) => Some(format!("send failed: {}", reason)),
        LinkEvent::Stats(stats) => Some(format!(
            "stats: {}",
            serde_json::to_string(stats).unwrap_or_default()
        )),
    }
}

fn rejected_json(outcome: &ParseOutcome) -> serde_json::Value {
    let mut value = serde_json::json!({
        "event": "rejected",
        "kind": outcome.kind(),
        "detail": outcome.to_string(),
    });
    if let ParseOutcome::UnknownCommand { command_id, sequence, payload } = outcome {
        value["command_id"] = serde_json::json!(command_id.to_string());
        value["sequence"] = serde_json::json!(sequence);
        value["payload"] = serde_json::json!(hex_dump(payload, usize::MAX));
    }
    value
}

#[cfg(feature = "serial")]
fn list_ports() -> Result<()> {
    let ports = radarlink::session::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        if port.description.is_empty() {
            println!("{}", port.name);
        } else {
            println!("{}\t{}", port.name, port.description);
        }
    }
    Ok(())
}

#[cfg(not(feature = "serial"))]
fn list_ports() -> Result<()> {
    bail!("built without the 'serial' feature")
}

#[cfg(feature = "serial")]
fn send_flags(config: Config, flags: VulnerabilityFlags) -> Result<()> {
    let mut session = radarlink::session::open(&config)?;
    let frame = session.send_vulnerability_flags(flags)?;
    println!("sent: {}", hex_dump(&frame, usize::MAX));
    Ok(())
}

#[cfg(not(feature = "serial"))]
fn send_flags(_config: Config, _flags: VulnerabilityFlags) -> Result<()> {
    bail!("built without the 'serial' feature")
}

#[cfg(feature = "serial")]
async fn monitor(config: Config, json: bool) -> Result<()> {
    use radarlink::session::{self, ControlMessage};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::sync::mpsc;

    let session = session::open(&config)?;
    let started = session.started();
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let reader = tokio::spawn(session::run(
        session,
        config.link.poll_interval(),
        control_rx,
        event_tx,
    ));
    info!("Monitoring {} @ {} baud (type 'help')", config.link.port, config.link.baud_rate);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(LinkEvent::Stats(stats)) if !json => {
                    println!("stats: {}", stats.summary(started));
                }
                Some(event) => {
                    if let Some(line) = render_event(&event, json) {
                        println!("{}", line);
                    }
                }
                None => break,
            },
            line = stdin.next_line(), if stdin_open => match line? {
                Some(line) => match console_command(&line) {
                    Ok(Some(msg)) => {
                        let quit = matches!(msg, ControlMessage::Shutdown);
                        let _ = control_tx.send(msg);
                        if quit {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("{}", e),
                },
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                let _ = control_tx.send(ControlMessage::Shutdown);
                break;
            }
        }
    }

    match reader.await? {
        Ok(session) => info!("{}", session.stats().summary(started)),
        Err(e) => warn!("Link reader stopped: {}", e),
    }
    Ok(())
}

#[cfg(not(feature = "serial"))]
async fn monitor(_config: Config, _json: bool) -> Result<()> {
    bail!("built without the 'serial' feature")
}

#[cfg(feature = "serial")]
fn console_command(line: &str) -> Result<Option<radarlink::session::ControlMessage>> {
    use radarlink::session::ControlMessage;
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    match verb.to_ascii_lowercase().as_str() {
        "flags" | "f" => {
            let robots = words.map(str::parse::<Robot>).collect::<Result<Vec<_>, _>>()?;
            Ok(Some(ControlMessage::SendFlags(VulnerabilityFlags::from_robots(robots)?)))
        }
        "send" => {
            let command = words
                .next()
                .ok_or_else(|| anyhow!("usage: send <command> [payload hex]"))?;
            let command = parse_command_id(command)?;
            let payload = parse_hex(&words.collect::<Vec<_>>().join(""))?;
            Ok(Some(ControlMessage::Send { command, payload }))
        }
        "stats" | "s" => Ok(Some(ControlMessage::Stats)),
        "quit" | "q" | "exit" => Ok(Some(ControlMessage::Shutdown)),
        "help" | "?" => {
            println!("flags R1 R3 ... | send <cmd> [hex] | stats | quit");
            Ok(None)
        }
        other => Err(anyhow!("unknown command '{}' (try 'help')", other)),
    }
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Console output only when someone is watching; piped output stays clean for --json.
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
