//! Command-line front end: parses a program file, drives a `Machine`
//! through it for `--iter` runs, and prints the per-run power/cycle
//! summary (and, with `--plot-power`, the full per-cycle current trace).

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use sapphire_sim::error::{ErrorKind, SimError, SimResult};
use sapphire_sim::machine::{self, Machine};
use sapphire_sim::power;
use sapphire_sim::program::Program;

/// Functional simulator for a lattice-cryptography coprocessor.
#[derive(Parser, Debug)]
#[command(name = "sapphire-sim", version, about)]
struct Cli {
    /// Path to the program text to execute.
    #[arg(long)]
    prog: String,

    /// Supply voltage in volts, used for the power/energy model.
    #[arg(long, default_value_t = 1.1)]
    vdd: f64,

    /// Clock frequency in MHz, used for the timing/energy model.
    #[arg(long, default_value_t = 72.0)]
    fmhz: f64,

    /// Enable debug-level tracing (print/debug helper instructions).
    #[arg(long)]
    verbose: bool,

    /// Exempt load/save/random helper instructions from cycle/power charges.
    #[arg(long)]
    free_rw: bool,

    /// Print the full per-cycle current trace after the summary.
    #[arg(long)]
    plot_power: bool,

    /// Path to a CDT file, required by `cdt_sample`.
    #[arg(long)]
    cdt: Option<String>,

    /// Number of times to run the program, resetting all state between runs.
    #[arg(long, default_value_t = 1)]
    iter: usize,
}

fn fmax(vdd: f64) -> f64 {
    12.0 + (72.0 - 12.0) * (vdd - 0.68) / (1.1 - 0.68)
}

fn validate_cli(cli: &Cli) -> SimResult<()> {
    if !(0.68..=1.21).contains(&cli.vdd) {
        return Err(SimError::new(
            0,
            "",
            ErrorKind::Configuration(format!("--vdd {} out of range, must be in [0.68, 1.21]", cli.vdd)),
        ));
    }
    let limit = fmax(cli.vdd);
    if cli.fmhz > limit {
        return Err(SimError::new(
            0,
            "",
            ErrorKind::Configuration(format!(
                "--fmhz {} exceeds the Vdd-derived maximum of {limit:.3} MHz at Vdd = {}",
                cli.fmhz, cli.vdd
            )),
        ));
    }
    Ok(())
}

fn load_cdt(path: &str) -> SimResult<Vec<u32>> {
    let text = fs::read_to_string(path)
        .map_err(|e| SimError::new(0, "", ErrorKind::Environment(format!("cannot read CDT file \"{path}\": {e}"))))?;
    text.split_whitespace()
        .map(|tok| {
            tok.parse::<u32>()
                .map_err(|_| SimError::new(0, "", ErrorKind::Configuration(format!("invalid CDT entry \"{tok}\" in \"{path}\""))))
        })
        .collect()
}

fn run() -> SimResult<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .without_time()
        .init();

    validate_cli(&cli)?;

    let source = fs::read_to_string(&cli.prog)
        .map_err(|e| SimError::new(0, "", ErrorKind::Environment(format!("cannot read program \"{}\": {e}", cli.prog))))?;
    let (program, warnings) = Program::parse(&source)?;
    for warning in &warnings {
        tracing::warn!(%warning, "preprocessing warning");
    }
    let instructions = machine::compile(&program)?;

    let cdt = cli.cdt.as_deref().map(load_cdt).transpose()?;

    for iteration in 0..cli.iter.max(1) {
        let mut vm = Machine::new(cdt.clone(), cli.free_rw, iteration as u64);
        vm.run(&program, &instructions)?;

        let samples = vm.power_trace_uw(cli.vdd, cli.fmhz);
        let summary = power::summarize(vm.instr_count(), &samples, cli.fmhz);

        println!("iteration {iteration}:");
        println!("  instructions : {}", summary.instructions);
        println!("  cycles       : {}", summary.ticks);
        println!("  time (us)    : {:.4}", summary.time_us);
        println!("  avg power (uW): {:.4}", summary.avg_power_uw);
        println!("  energy (pJ)  : {:.4}", summary.energy_pj);

        if cli.plot_power {
            println!("  per-cycle current trace (uW):");
            for (cycle, p) in samples.iter().enumerate() {
                println!("    {cycle:>8}: {p:.4}");
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "simulation aborted");
            ExitCode::FAILURE
        }
    }
}
