#[path = "experiments/assays.rs"]
mod assays;

use lmu::config::{LmuConfig, Realization, Settings};
use lmu::decoder::DelayDecoder;
use lmu::gated::GateMode;
use lmu::matrices::ContinuousMatrices;
use lmu::memory::build_memory;
use lmu::observer::MemoryAdapter;
use nalgebra::DMatrix;
use serde_json::json;

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().collect();
    let result = match args.get(1).map(String::as_str) {
        None | Some("--help") | Some("-h") | Some("help") => {
            print_help();
            Ok(())
        }
        Some("matrices") => run_matrices(&args[2..]),
        Some("delays") => run_delays(&args[2..]),
        Some("run") => run_memory(args.get(2).map(String::as_str)),
        Some("assays") => assays::run(),
        Some(other) => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn print_help() {
    println!("lmu (Legendre Memory Unit toolkit)");
    println!("usage:");
    println!("  lmu matrices [theta] [q] [dt]   print A, B and their discretization as JSON");
    println!("  lmu delays [q] [n]              print readout weights for n evenly spaced delays");
    println!("  lmu run [config.json]           drive a memory with a sine and print snapshots");
    println!("  lmu assays                      run the built-in checks and print a report");
    println!("  lmu --help");
}

/// Positional argument `idx`, or `default` when absent.
fn arg_or<T: std::str::FromStr>(args: &[String], idx: usize, default: T) -> lmu::Result<T> {
    match args.get(idx) {
        None => Ok(default),
        Some(s) => s
            .parse()
            .map_err(|_| lmu::LmuError::InvalidConfiguration("could not parse a numeric argument")),
    }
}

fn rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|r| r.iter().copied().collect()).collect()
}

fn run_matrices(args: &[String]) -> lmu::Result<()> {
    let defaults = LmuConfig::default();
    let theta = arg_or(args, 0, defaults.theta)?;
    let q = arg_or(args, 1, defaults.q)?;
    let dt = arg_or(args, 2, defaults.dt.unwrap_or(0.001))?;

    let continuous = ContinuousMatrices::new(theta, q)?;
    let discrete = continuous.discretize(dt)?;
    let out = json!({
        "theta": theta,
        "q": q,
        "dt": dt,
        "a": rows(&continuous.a),
        "b": continuous.b.as_slice(),
        "ad": rows(&discrete.ad),
        "bd": discrete.bd.as_slice(),
        "spectral_radius": discrete.spectral_radius(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_delays(args: &[String]) -> lmu::Result<()> {
    let q = arg_or(args, 0, LmuConfig::default().q)?;
    let n = arg_or(args, 1, 5usize)?;
    let decoder = DelayDecoder::evenly_spaced(q, n)?;
    let out = json!({
        "q": q,
        "delays": decoder.delays(),
        "weights": rows(decoder.weights()),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_memory(path: Option<&str>) -> lmu::Result<()> {
    let settings = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                eprintln!("failed to read {path}: {e}");
                lmu::LmuError::InvalidConfiguration("settings file is unreadable")
            })?;
            Settings::from_json(&text)?
        }
        None => Settings::default(),
    };

    let cfg = settings.lmu;
    let dt = cfg.require_dt()?;
    let mut memory = build_memory(&settings)?;
    let decoder = DelayDecoder::evenly_spaced(cfg.q, 3)?;

    // Controls stay at zero: gated memories update, networks never reset.
    let controls = match &settings.realization {
        Realization::Gated(gates) => GateMode::from(*gates).control_width(),
        _ => 0,
    };
    let mut input = vec![0.0; memory.input_width()];

    let steps = (2.0 * cfg.theta / dt).ceil() as usize;
    let report_every = (steps / 10).max(1);
    for k in 0..steps {
        let t = k as f64 * dt;
        for c in 0..cfg.size_in {
            let freq = 1.0 / cfg.theta * (c + 1) as f64;
            input[controls + c] = (2.0 * std::f64::consts::PI * freq * t).sin();
        }
        memory.advance(&input)?;

        if (k + 1) % report_every == 0 || k + 1 == steps {
            let snapshot = MemoryAdapter::new(memory.as_ref(), &decoder).snapshot()?;
            println!("{}", serde_json::to_string(&snapshot)?);
        }
    }
    Ok(())
}
