use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use labpro_lib::{CommandReply, DeviceStatus, LabPro};
use tracing::warn;

mod ledger;
mod provision;

use ledger::Ledger;

#[derive(Parser)]
#[command(
    name = "labpro",
    about = "Talk to a Vernier LabPro data logger over USB",
    version
)]
struct Cli {
    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,

    /// Ledger of provisioned loggers.
    #[arg(long, default_value = "loggers.csv", global = true)]
    ledger: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the device and print its status snapshot.
    Status,
    /// Interactive command console.
    Console,
    /// Provision an attached logger and record it in the ledger.
    Setup {
        /// Device id to assign; defaults to one past the highest in the ledger.
        #[arg(long)]
        id: Option<i64>,
        /// Smallest id this instance may assign.
        #[arg(long, default_value_t = 100)]
        min_id: i64,
        /// Free-form note (room, location, ...); prompted for when omitted.
        #[arg(long)]
        description: Option<String>,
    },
    /// Download collected samples into `<system id>.csv`.
    Download {
        /// Directory for the output file.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity.tracing_level_filter())
        .init();

    let mut device = LabPro::open().await?;
    let result = run(&cli, &mut device).await;
    device.close();
    result
}

async fn run(cli: &Cli, device: &mut LabPro) -> Result<()> {
    match &cli.command {
        Commands::Status => {
            let snapshot = device.get_device_status().await?;
            print_status(&snapshot);
        }
        Commands::Console => console(device).await?,
        Commands::Setup {
            id,
            min_id,
            description,
        } => {
            let mut ledger = Ledger::load(&cli.ledger)?;
            let device_id = (*id).unwrap_or_else(|| ledger.next_device_id(*min_id));
            let description = match description {
                Some(text) => text.clone(),
                None => prompt("Device description (room, location, ...)?")?,
            };
            let record = provision::setup(device, device_id, description).await?;
            ledger.append(record)?;
            println!("Provisioned device {device_id}");
        }
        Commands::Download { out_dir, yes } => {
            let ledger = Ledger::load(&cli.ledger)?;
            let snapshot = device.get_device_status().await?;
            let system_id = snapshot.system_id as i64;
            let record = ledger
                .find(system_id)
                .with_context(|| format!("no ledger entry for system id {system_id}"))?;
            if snapshot.is_collecting() {
                warn!("collection is still running; downloading will terminate it");
            }
            if !*yes && !confirm("Download data?", true)? {
                return Ok(());
            }
            let path = provision::download(device, record, out_dir).await?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn print_status(snapshot: &DeviceStatus) {
    println!("Device status:");
    println!("  Software id:   {}", snapshot.software_id);
    println!("  Error:         {}", snapshot.error);
    println!("  Battery (raw): {}", snapshot.battery);
    println!("  Sample time:   {} s", snapshot.sample_time);
    println!("  Samples:       {}", snapshot.num_samples);
    println!("  Record time:   {}", snapshot.record_time);
    println!("  Temperature:   {} °C", snapshot.temperature);
    println!("  System state:  {}", snapshot.system_state);
    println!(
        "  Data window:   {} .. {}",
        snapshot.data_start, snapshot.data_end
    );
    println!("  System id:     {}", snapshot.system_id);
    if snapshot.is_collecting() {
        println!("  (collection in progress)");
    }
    if snapshot.battery > 0.0 {
        // Nonzero here has meant a weak pack in the field.
        warn!(battery = snapshot.battery, "battery may be low");
    }
}

/// Interactive loop: `#,#,#` dispatches a command, `r` refreshes the status,
/// `s...`/`g...` pass through as raw frames, `q` quits.
async fn console(device: &mut LabPro) -> Result<()> {
    println!("Enter commands as #,#,#  (r = status, s/g = raw frame, q = quit)");
    let stdin = io::stdin();
    loop {
        print!("labpro> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("q") {
            break;
        }
        if input.eq_ignore_ascii_case("r") {
            match device.get_device_status().await {
                Ok(snapshot) => print_status(&snapshot),
                Err(err) => eprintln!("status failed: {err}"),
            }
            continue;
        }
        if input.starts_with('s') || input.starts_with('g') {
            match device.send_raw(input).await {
                Ok(response) => println!("{response}"),
                Err(err) => eprintln!("raw frame failed: {err}"),
            }
            continue;
        }
        match parse_command_line(input) {
            Ok((opcode, args)) => match device.do_command(opcode, &args).await {
                Ok(CommandReply::None) => println!("ok"),
                Ok(CommandReply::Values(values)) => println!("{values:?}"),
                Ok(CommandReply::Text(text)) => println!("{}", text.trim_end()),
                Err(err) => eprintln!("command failed: {err}"),
            },
            Err(err) => eprintln!("{err}"),
        }
    }
    Ok(())
}

/// Split `7,1,0` into an opcode and its arguments.
fn parse_command_line(input: &str) -> Result<(u16, Vec<i64>)> {
    let mut parts = input.split(',').map(str::trim);
    let opcode = parts
        .next()
        .context("empty command")?
        .parse::<u16>()
        .context("opcode must be a number")?;
    let args = parts
        .map(|part| part.parse::<i64>().context("arguments must be integers"))
        .collect::<Result<Vec<_>>>()?;
    Ok((opcode, args))
}

fn prompt(question: &str) -> Result<String> {
    loop {
        print!("{question} ");
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            anyhow::bail!("stdin closed");
        }
        let answer = line.trim();
        if !answer.is_empty() {
            return Ok(answer.to_string());
        }
    }
}

fn confirm(question: &str, default: bool) -> Result<bool> {
    let hint = if default { "Y/n" } else { "y/N" };
    loop {
        print!("{question} [{hint}] ");
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            anyhow::bail!("stdin closed");
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" | "1" | "t" | "true" => return Ok(true),
            "n" | "no" | "0" | "f" | "false" => return Ok(false),
            _ => continue,
        }
    }
}
