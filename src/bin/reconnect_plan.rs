use std::env;
use std::time::Duration;
use tracing::{error, info, warn};

use tuner::config::Config;
use tuner::playback::ReconnectPolicy;

/// Longest schedule this tool prints
const MAX_PLAN_ATTEMPTS: u32 = 1000;

fn main() {
    // Use RUST_LOG env var if set, otherwise default to info level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let args: Vec<String> = env::args().collect();

    let config = Config::load();
    let mut policy = ReconnectPolicy::with_max_attempts(config.player.max_reconnect_attempts);

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        if flag == "--help" || flag == "-h" {
            print_usage(&args[0]);
            return;
        }
        let Some(value) = args.get(i + 1) else {
            error!("{} requires a value", flag);
            print_usage(&args[0]);
            std::process::exit(1);
        };
        let Ok(number) = value.parse::<u64>() else {
            error!("{} expects a non-negative integer, got '{}'", flag, value);
            std::process::exit(1);
        };
        match flag {
            "--max" => policy.max_attempts = number.min(u32::MAX as u64) as u32,
            "--base-ms" => policy.base_delay = Duration::from_millis(number),
            "--cap-ms" => policy.max_delay = Duration::from_millis(number),
            "--multiplier" => policy.multiplier = number.min(u32::MAX as u64) as u32,
            _ => {
                error!("Unknown argument: {}", flag);
                print_usage(&args[0]);
                std::process::exit(1);
            }
        }
        i += 2;
    }

    if policy.max_attempts > MAX_PLAN_ATTEMPTS {
        warn!(
            "{} attempts is too many to print, showing {}",
            policy.max_attempts, MAX_PLAN_ATTEMPTS
        );
        policy.max_attempts = MAX_PLAN_ATTEMPTS;
    }

    info!(
        "Backoff: base {:?}, x{}, cap {:?}, max {} attempts",
        policy.base_delay, policy.multiplier, policy.max_delay, policy.max_attempts
    );

    let schedule = policy.schedule();
    let mut elapsed = Duration::ZERO;
    for (index, delay) in schedule.iter().enumerate() {
        elapsed = elapsed.saturating_add(*delay);
        println!(
            "attempt {:>3}  wait {:>7} ms  total {:>8} ms",
            index + 1,
            delay.as_millis(),
            elapsed.as_millis()
        );
    }
    println!(
        "gives up after {} retries ({:.1}s)",
        schedule.len(),
        policy.total_delay().as_secs_f64()
    );
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [--max N] [--base-ms MS] [--cap-ms MS] [--multiplier N]", program);
    eprintln!();
    eprintln!("Prints the reconnect delays the player would use after consecutive failures.");
    eprintln!("Defaults come from TUNER_MAX_RECONNECT_ATTEMPTS (or 10), 1000 ms, x2, 30000 ms.");
}
