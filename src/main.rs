use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;

use clap::Parser;

use polylink_lib::io::serial::list_serial_ports;
use polylink_lib::settings::{default_settings_path, load_settings};

/// Serial companion for the polyhedron display MCU
#[derive(Parser, Debug)]
#[command(name = "polylink")]
#[command(about = "Talk to the polyhedron MCU and track the geometry it dumps", long_about = None)]
#[command(version)]
struct Cli {
    /// Serial port to use instead of scanning (e.g. /dev/ttyACM0, COM3)
    #[arg(long)]
    port: Option<String>,

    /// Baud rate, overrides the settings file
    #[arg(long)]
    baud: Option<u32>,

    /// Settings file (default: <config dir>/polylink/settings.json)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Transcript directory, overrides the settings file
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Do not write a session transcript
    #[arg(long)]
    no_log_file: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

fn main() {
    if let Err(e) = real_main() {
        eprintln!("polylink: {}", e);
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    let cli = Cli::parse();

    if cli.list_ports {
        for port in list_serial_ports().map_err(|e| e.to_string())? {
            match port.product {
                Some(product) => println!("{}\t{}\t{}", port.port_name, port.port_type, product),
                None => println!("{}\t{}", port.port_name, port.port_type),
            }
        }
        return Ok(());
    }

    let settings_path = match cli.settings {
        Some(path) => path,
        None => default_settings_path()?,
    };
    let mut settings = load_settings(&settings_path)?;
    if let Some(port) = cli.port {
        settings.port = Some(port);
    }
    if let Some(baud) = cli.baud {
        settings.baud_rate = baud;
    }
    if let Some(dir) = cli.log_dir {
        settings.log_dir = dir.to_string_lossy().to_string();
    }

    if !cli.no_log_file {
        if let Err(e) = polylink_lib::init_file_logging(&PathBuf::from(&settings.log_dir)) {
            eprintln!("polylink: transcript disabled: {}", e);
        }
    }

    let (tx, rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let result = polylink_lib::run(&settings, rx);
    polylink_lib::stop_file_logging();
    result
}
