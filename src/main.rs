use anyhow::{bail, Context as _};
use clap::Parser;
use cncstream::{
    init_logging, list_ports, spawn, Config, Controller, EventFilter, FirmwareDialect,
    SerialTransport, BUILD_DATE, VERSION,
};
use serde_json::{json, Value as Json};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::timeout;

/// Stream G-code to a Grbl-family controller from the terminal
///
/// Lines typed on stdin are sent through the feeder. Lines starting with `:`
/// are controller commands, e.g. `:gcode:start` or `:jog {"x": 1, "feedrate": 600}`.
#[derive(Parser, Debug)]
#[command(name = "cncstream")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML or JSON); defaults to the platform config location
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Baud rate, overrides the configuration
    #[arg(short, long)]
    baud: Option<u32>,

    /// Firmware dialect: grbl, grblhal or fluidnc
    #[arg(short, long)]
    dialect: Option<FirmwareDialect>,

    /// List serial ports that look like controllers and exit
    #[arg(long)]
    list_ports: bool,

    /// Serial port, overrides the configuration
    port: Option<String>,

    /// Program to load after connecting
    program: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => match Config::default_path().filter(|p| p.exists()) {
            Some(path) => Config::load_from_file(&path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => Config::default(),
        },
    };

    if let Some(port) = &args.port {
        config.connection.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.connection.baud_rate = baud;
    }
    if let Some(dialect) = args.dialect {
        config.connection.dialect = dialect;
    }
    Ok(config)
}

/// Split a console line into a command verb and its JSON arguments
///
/// Arguments that are not valid JSON are passed as a single string.
fn parse_input(line: &str) -> (String, Json) {
    match line.strip_prefix(':') {
        Some(command) => {
            let (verb, rest) = command
                .trim()
                .split_once(char::is_whitespace)
                .unwrap_or((command.trim(), ""));
            let rest = rest.trim();
            let args = if rest.is_empty() {
                Json::Null
            } else {
                serde_json::from_str(rest).unwrap_or_else(|_| json!(rest))
            };
            (verb.to_string(), args)
        }
        None => ("gcode".to_string(), json!(line)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging()?;
    tracing::info!("cncstream {} (built {})", VERSION, BUILD_DATE);

    if args.list_ports {
        for port in list_ports()? {
            println!("{}\t{}", port.port_name, port.description);
        }
        return Ok(());
    }

    let config = load_config(&args)?;
    if config.connection.port.is_empty() {
        bail!("no serial port given and none configured");
    }

    let (transport, lines) =
        SerialTransport::open(&config.connection.port, config.connection.baud_rate)?;
    let handle = spawn(Controller::new(transport, config), lines);
    let (_, mut events) = handle.attach(EventFilter::All).await?;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", event.description());
        }
    });

    if let Some(path) = &args.program {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        handle.command("gcode:load", json!([name, text])).await?;
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = stdin.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ":quit" || line == ":exit" {
            break;
        }
        if handle.is_finished() {
            tracing::warn!("Controller for {} has stopped", handle.port());
            break;
        }
        let (verb, args) = parse_input(line);
        if let Err(e) = handle.command(&verb, args).await {
            tracing::warn!("{}: {}", verb, e);
        }
    }

    handle.close().await;
    // The bus closes every subscriber once the controller task is gone
    if timeout(Duration::from_secs(1), printer).await.is_err() {
        tracing::debug!("Event printer did not drain in time");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line_is_gcode() {
        assert_eq!(parse_input("G0 X1"), ("gcode".to_string(), json!("G0 X1")));
    }

    #[test]
    fn test_command_with_json_args() {
        assert_eq!(
            parse_input(r#":jog {"x": 1, "feedrate": 600}"#),
            ("jog".to_string(), json!({"x": 1, "feedrate": 600}))
        );
        assert_eq!(parse_input(":gcode:start"), ("gcode:start".to_string(), Json::Null));
        assert_eq!(
            parse_input(":macro:run probe-z"),
            ("macro:run".to_string(), json!("probe-z"))
        );
    }
}
