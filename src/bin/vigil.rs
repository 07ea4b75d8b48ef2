//! Vigil CLI - Command-line interface for the fusion engine
//!
//! Commands:
//! - run: Process streaming telemetry from stdin, emit output events on stdout
//! - validate: Validate telemetry input without mutating anything
//! - schema: Print schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use vigil_fusion::schema::{BrokerMessage, TelemetryEvent, TopicAdapter};
use vigil_fusion::{EngineError, TelemetryEngine, ENGINE_VERSION, SCHEMA_VERSION};

/// Vigil - telemetry fusion engine for indoor presence and emergency tracking
#[derive(Parser)]
#[command(name = "vigil")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Fuse sensing-node telemetry into presence and emergency state", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process streaming telemetry from stdin (one JSON document per line)
    Run {
        /// Input format
        #[arg(long, default_value = "events")]
        input_format: InputFormat,

        /// Emit a full state snapshot on exit
        #[arg(long)]
        snapshot: bool,

        /// Flush output after each event
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Validate telemetry input without mutating anything
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "events")]
        input_format: InputFormat,
    },

    /// Print schema information
    Schema,
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// Typed telemetry events (vigil.telemetry.v1)
    Events,
    /// Broker envelopes: {"topic": "...", "payload": {...}}
    Broker,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), io::Error> {
    match cli.command {
        Commands::Run {
            input_format,
            snapshot,
            flush,
        } => cmd_run(input_format, snapshot, flush),
        Commands::Validate {
            input,
            input_format,
        } => cmd_validate(&input, input_format),
        Commands::Schema => {
            cmd_schema();
            Ok(())
        }
    }
}

fn cmd_run(input_format: InputFormat, snapshot: bool, flush: bool) -> Result<(), io::Error> {
    let mut engine = TelemetryEngine::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        // Bad input is dropped with a diagnostic; ingestion keeps going.
        let outputs = match parse_line(trimmed, input_format) {
            Ok(event) => engine.apply(event),
            Err(err) => {
                warn!(%err, "dropping unparsable input line");
                continue;
            }
        };

        for output in &outputs {
            writeln!(stdout, "{}", serde_json::to_string(output)?)?;
        }
        if flush && !outputs.is_empty() {
            stdout.flush()?;
        }
    }

    if snapshot {
        writeln!(stdout, "{}", serde_json::to_string(&engine.snapshot())?)?;
    }
    stdout.flush()
}

fn parse_line(line: &str, format: InputFormat) -> Result<TelemetryEvent, EngineError> {
    match format {
        InputFormat::Events => {
            let event: TelemetryEvent = serde_json::from_str(line)?;
            Ok(event)
        }
        InputFormat::Broker => {
            let message: BrokerMessage = serde_json::from_str(line)?;
            TopicAdapter::parse(&message.topic, &message.payload)
        }
    }
}

fn cmd_validate(input: &PathBuf, input_format: InputFormat) -> Result<(), io::Error> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let mut total = 0usize;
    let mut invalid = 0usize;

    for (line_num, line) in input_data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        total += 1;

        let result = parse_line(trimmed, input_format)
            .map_err(|e| e.to_string())
            .and_then(|event| event.validate().map_err(|e| e.to_string()));
        if let Err(err) = result {
            invalid += 1;
            println!("  - line {}: {}", line_num + 1, err);
        }
    }

    println!("Validation Report");
    println!("=================");
    println!("Total events:   {}", total);
    println!("Valid events:   {}", total - invalid);
    println!("Invalid events: {}", invalid);

    if invalid > 0 {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} events failed validation", invalid),
        ))
    } else {
        Ok(())
    }
}

fn cmd_schema() {
    println!("Input schema: {}", SCHEMA_VERSION);
    println!();
    println!("Three telemetry event kinds:");
    println!();
    println!("1. movement - ultrasonic sensor telemetry");
    println!("   kind: no_movement | movement_restored | invalid_readings | regular_update");
    println!("   fields: device_id, distance?, duration?, message?");
    println!();
    println!("2. emergency - per-beacon emergency flag");
    println!("   fields: uuid? (topic room token stands in when absent),");
    println!("           room, emergency, reporting_node?");
    println!();
    println!("3. status - beacon status sample");
    println!("   fields: device_name, uuid, rssi, room, reporting_node");
    println!();
    println!("Output events: sensor_update, movement_emergency, beacon_update,");
    println!("signal_update, room_changed, emergency_alert,");
    println!("global_emergency_raised, global_emergency_cleared");
}
