use lmu::config::{GateConfig, LmuConfig, NetworkConfig};
use lmu::decoder::DelayDecoder;
use lmu::gated::LmuProcess;
use lmu::host::RealizedMemory;
use lmu::matrices::ContinuousMatrices;
use lmu::stepper::ExactStepper;

#[derive(Debug, Clone)]
struct AssayReport {
    theta: f64,
    q: usize,
    dt: f64,

    // Delay reconstruction of a sine, after one window of warm-up.
    sine_freq_hz: f64,
    delay_rmse: Vec<(f64, f64)>,

    spectral_radius: f64,
    worst_spectral_radius: f64,

    // |reset step - fresh first step|, should be exactly zero.
    reset_mismatch: f64,
    // |gated reset+hold=0,1 tick - Bd*x|.
    gated_load_mismatch: f64,

    network_tau: f64,
    network_max_error: f64,
}

pub fn run() -> lmu::Result<()> {
    let theta = 1.0;
    let q = 6;
    let dt = 0.001;
    let cfg = LmuConfig::new(theta, q).with_dt(dt);

    // === Delay reconstruction ===
    let sine_freq_hz = 0.5;
    let delays = [0.0, 0.25, 0.5, 0.75, 1.0];
    let delay_rmse = delay_reconstruction(cfg, sine_freq_hz, &delays)?;

    // === Stability ===
    let spectral_radius = ContinuousMatrices::for_config(&cfg)?
        .discretize(dt)?
        .spectral_radius();
    let mut worst_spectral_radius: f64 = 0.0;
    for order in [1, 2, 4, 8, 16, 32] {
        let rho = ContinuousMatrices::new(theta, order)?
            .discretize(dt)?
            .spectral_radius();
        worst_spectral_radius = worst_spectral_radius.max(rho);
    }

    // === Reset equivalence ===
    let mut used = ExactStepper::new(cfg)?;
    for t in 0..500 {
        used.step(&[(t as f64 * 0.02).cos()], false)?;
    }
    let after_reset = used.step(&[0.8], true)?.clone();
    let mut fresh = ExactStepper::new(cfg)?;
    let first = fresh.step(&[0.8], false)?;
    let reset_mismatch = max_abs_diff(after_reset.flat(), first.flat());

    // === Gated load branch (reset=0, hold=1) ===
    let process = LmuProcess::new(cfg, GateConfig::new(true, true))?;
    let mut gated = process.make_step(dt)?;
    for _ in 0..50 {
        gated.step(&[0.0, 0.0, 1.0])?;
    }
    let loaded = gated.step(&[0.0, 1.0, 5.0])?.to_vec();
    let expected: Vec<f64> = gated.discrete().bd.iter().map(|b| b * 5.0).collect();
    let gated_load_mismatch = max_abs_diff(&loaded, &expected);

    // === Network tracking ===
    let network_tau = 0.05;
    let network_max_error = network_tracking(cfg.with_dt(1e-4), network_tau)?;

    let report = AssayReport {
        theta,
        q,
        dt,
        sine_freq_hz,
        delay_rmse,
        spectral_radius,
        worst_spectral_radius,
        reset_mismatch,
        gated_load_mismatch,
        network_tau,
        network_max_error,
    };
    print_report(&report);
    Ok(())
}

fn delay_reconstruction(cfg: LmuConfig, freq: f64, delays: &[f64]) -> lmu::Result<Vec<(f64, f64)>> {
    let dt = cfg.require_dt()?;
    let mut memory = ExactStepper::new(cfg)?;
    let decoder = DelayDecoder::new(cfg.q, delays)?;
    let signal = |t: f64| (2.0 * std::f64::consts::PI * freq * t).sin();

    let warmup = (cfg.theta / dt).ceil() as usize;
    let measured = 3 * warmup;
    let mut sq_err = vec![0.0; delays.len()];

    for k in 0..warmup + measured {
        let t = k as f64 * dt;
        memory.step(&[signal(t)], false)?;
        if k < warmup {
            continue;
        }
        let estimates = decoder.decode(memory.state())?;
        for (i, r) in delays.iter().enumerate() {
            let err = estimates[(i, 0)] - signal(t - r * cfg.theta);
            sq_err[i] += err * err;
        }
    }

    Ok(delays
        .iter()
        .zip(sq_err)
        .map(|(r, e)| (*r, (e / measured as f64).sqrt()))
        .collect())
}

fn network_tracking(cfg: LmuConfig, tau: f64) -> lmu::Result<f64> {
    let net = NetworkConfig::default().with_tau(tau);
    let mut realized = RealizedMemory::new(&cfg, &net)?;
    let mut exact = ExactStepper::new(cfg)?;
    let steps = (cfg.theta / cfg.require_dt()?).ceil() as usize;

    let mut worst: f64 = 0.0;
    for _ in 0..steps {
        let a = exact.step(&[1.0], false)?.flat().to_vec();
        let b = realized.step(&[1.0], false)?;
        worst = worst.max(max_abs_diff(&a, b));
    }
    Ok(worst)
}

fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

fn print_report(r: &AssayReport) {
    println!("lmu assays");
    println!("theta={}", r.theta);
    println!("q={}", r.q);
    println!("dt={}", r.dt);
    println!("sine_freq_hz={:.2}", r.sine_freq_hz);
    for (delay, rmse) in &r.delay_rmse {
        println!("delay_rmse[r={delay:.2}]={rmse:.4}");
    }
    println!("spectral_radius={:.9}", r.spectral_radius);
    println!("worst_spectral_radius={:.9}", r.worst_spectral_radius);
    println!("reset_mismatch={:.3e}", r.reset_mismatch);
    println!("gated_load_mismatch={:.3e}", r.gated_load_mismatch);
    println!("network_tau={:.3}", r.network_tau);
    println!("network_max_error={:.4}", r.network_max_error);
}
