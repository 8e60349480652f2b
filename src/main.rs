use clap::Parser;
use large_page::{
    map_status_str, Config, LargePageMapper, MapError, MapStatus, MemoryRange, PageMode,
};
use log::{error, info};
use std::process::ExitCode;

/// Move this program's code, or a loaded library's, onto large pages.
#[derive(Debug, Parser)]
#[command(name = "large-page", version)]
struct Args {
    /// Move the text of the first loaded object whose name matches REGEX.
    #[arg(long, value_name = "REGEX", conflicts_with = "range")]
    dso: Option<String>,

    /// Move [FROM, TO) as given, without discovery. Hex with or without 0x.
    #[arg(long, num_args = 2, value_names = ["FROM", "TO"], value_parser = parse_address)]
    range: Option<Vec<usize>>,

    /// Use the reserved hugetlbfs pool even if IODLR_USE_EXPLICIT_HP and
    /// LP_USE_EXPLICIT_HP are unset.
    #[arg(long)]
    explicit: bool,
}

fn parse_address(s: &str) -> Result<usize, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    usize::from_str_radix(digits, 16).map_err(|e| format!("bad address {s:?}: {e}"))
}

fn report(result: &Result<MemoryRange, MapError>) -> ExitCode {
    let status = MapStatus::from(result);
    if let Err(e) = result {
        error!("{e}");
    }
    if !status.is_ok() {
        println!(
            "{} ({})",
            map_status_str(status, true),
            map_status_str(status, false)
        );
        return ExitCode::FAILURE;
    }
    if let Ok(range) = result {
        println!("{}: {range}", map_status_str(status, true));
    }
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = Config::from_env();
    if args.explicit {
        config = config.with_mode(PageMode::Explicit);
    }
    let mapper = LargePageMapper::new(config);
    info!("page mode: {:?}", mapper.config().mode);

    match mapper.is_enabled() {
        Ok(true) => {}
        Ok(false) => {
            info!("large pages are not enabled");
            return ExitCode::SUCCESS;
        }
        Err(e) => return report(&Err(e)),
    }

    // Single threaded so far: nothing else runs in the text being moved.
    let result = unsafe {
        match (args.dso.as_deref(), args.range.as_deref()) {
            (Some(pattern), _) => mapper.map_dso(pattern),
            (None, Some(&[from, to])) => mapper.map_range(from, to),
            _ => mapper.map_static_code(),
        }
    };
    report(&result)
}
