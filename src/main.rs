use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use hart_rs::constants::{COMMAND_48, COMMAND_48_BYTE_COUNT};
use hart_rs::util::hex::{decode_hex, encode_hex_upper, parse_hex_u32, pretty_hex};
use hart_rs::{
    connect, decode, encode, init_logger, init_logger_with_default, Command48Response,
    DeviceConfig, HartConfig, TransactionResult,
};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "hart-cli")]
#[command(about = "CLI tool for HART secondary master diagnostics")]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log MAC activity at info level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DeviceArgs {
    /// Device type code, hex [default: 0x2B]
    #[arg(long, value_parser = parse_device_type)]
    device_type: Option<u16>,
    /// Device identifier, hex [default: FFFFFF]
    #[arg(long, value_parser = parse_device_id)]
    device_id: Option<u32>,
    /// Address the device as primary master
    #[arg(long)]
    primary: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read additional device status (Command 48) from a field device
    Poll {
        #[arg(short, long)]
        port: Option<String>,
        #[arg(short, long)]
        retries: Option<u8>,
        #[command(flatten)]
        device: DeviceArgs,
    },
    /// Print the Command 48 request frame for a device
    Encode {
        #[command(flatten)]
        device: DeviceArgs,
    },
    /// Decode a Command 48 response given in hex
    Decode { hex: String },
}

fn parse_device_type(input: &str) -> Result<u16, String> {
    let value = parse_hex_u32(input, 2).map_err(|e| e.to_string())?;
    u16::try_from(value).map_err(|e| e.to_string())
}

fn parse_device_id(input: &str) -> Result<u32, String> {
    parse_hex_u32(input, 3).map_err(|e| e.to_string())
}

fn apply_device_args(device: &mut DeviceConfig, args: &DeviceArgs) {
    if let Some(device_type) = args.device_type {
        device.device_type = device_type;
    }
    if let Some(device_id) = args.device_id {
        device.device_id = device_id;
    }
    if args.primary {
        device.primary_master = true;
    }
}

fn print_response(response: &Command48Response) {
    println!("Device: {}", response.address());
    println!("Status: {}", encode_hex_upper(response.data()));

    let active = response.diagnostics().active_flags();
    if active.is_empty() {
        println!("No diagnostic flags set");
    }
    for flag in active {
        let marker = if flag.is_critical() { "CRITICAL" } else { "warning" };
        println!("  [{marker}] {}", flag.name());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        init_logger_with_default("info")?;
    } else {
        init_logger();
    }
    let mut config = match &cli.config {
        Some(path) => HartConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HartConfig::default(),
    };

    match cli.command {
        Commands::Poll {
            port,
            retries,
            device,
        } => {
            if let Some(port) = port {
                config.serial.port = port;
            }
            if let Some(retries) = retries {
                config.mac.max_retries = retries;
            }
            apply_device_args(&mut config.device, &device);
            let address = config.device.address()?;

            let mac = connect(&config)
                .await
                .with_context(|| format!("opening {}", config.serial.port))?;
            info!("Polling {address} on {}", config.serial.port);

            match mac.read_additional_status(&address).await? {
                TransactionResult::Success(response) => print_response(&response),
                TransactionResult::CommunicationFailure(reason) => {
                    warn!("{:?}", mac.statistics());
                    bail!("communication failure: {reason}")
                }
            }
            info!("{:?}", mac.statistics());
        }
        Commands::Encode { device } => {
            apply_device_args(&mut config.device, &device);
            let address = config.device.address()?;
            let frame = encode(&address, COMMAND_48, &[0u8; COMMAND_48_BYTE_COUNT])?;
            println!("{}", encode_hex_upper(frame.as_bytes()));
        }
        Commands::Decode { hex } => {
            let bytes = decode_hex(&hex)?;
            println!("{}", pretty_hex(&bytes, 16));
            let response = decode(&bytes).context("decoding response")?;
            print_response(&response);
        }
    }

    Ok(())
}
