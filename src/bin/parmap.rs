#[macro_use]
extern crate slog;
extern crate slog_async;
extern crate slog_term;

extern crate anyhow;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use parmap::tasks::{ShiftedSquare, ShiftedSquareArgs};
use parmap::utils::*;
use parmap::{pmap, try_tmap, MapOptions, Registry, Task};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Backend {
    Processes,
    Threads,
}

/// Computes x^2 + offset for every value, in parallel.
#[derive(Parser, Debug)]
#[clap(version = env!("CARGO_PKG_VERSION"), author = "QingGo", allow_negative_numbers = true)]
struct Config {
    #[clap(required = true)]
    values: Vec<i64>,
    #[clap(long, value_enum, default_value = "processes")]
    backend: Backend,
    /// Added to every square
    #[clap(short('b'), long, default_value_t = 0)]
    offset: i64,
    /// Sleep per item
    #[clap(long, default_value_t = 0)]
    delay_ms: u64,
    /// Pool size, defaults to the number of CPUs
    #[clap(short('j'), long)]
    jobs: Option<usize>,
    #[clap(long)]
    no_progress: bool,
    #[clap(long)]
    desc: Option<String>,
    #[clap(long, default_value = "it")]
    unit: String,
    /// Draw the progress bar even when stderr is not a terminal
    #[clap(long)]
    force_terminal: bool,
    #[clap(long, conflicts_with = "no-leave")]
    leave: bool,
    #[clap(long)]
    no_leave: bool,
    #[clap(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    Registry::new().register::<ShiftedSquare>().serve_if_worker();

    let config = Config::parse();
    let root_logger = get_root_logger("parmap".to_string(), parse_level(&config.log_level)?);
    info!(root_logger, "parse config successfully"; "config" => format!("{:?}", config));

    let mut opts = MapOptions::new()
        .no_progress(config.no_progress)
        .unit(config.unit)
        .force_terminal(config.force_terminal)
        .logger(root_logger.clone());
    if let Some(desc) = config.desc {
        opts = opts.desc(desc);
    }
    if let Some(jobs) = config.jobs {
        opts = opts.workers(jobs);
    }
    if config.leave {
        opts = opts.leave(true);
    } else if config.no_leave {
        opts = opts.leave(false);
    }

    let args = ShiftedSquareArgs {
        offset: config.offset,
        delay_ms: config.delay_ms,
        echo: false,
    };
    let results = match config.backend {
        Backend::Processes => pmap::<ShiftedSquare, _>(config.values, &args, &opts)?,
        Backend::Threads => try_tmap(|x| ShiftedSquare::call(x, &args), config.values, &opts)?,
    };
    println!("{}", serde_json::to_string(&results)?);
    Ok(())
}
