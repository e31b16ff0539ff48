use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use vcd2json::{parse_stream, Options, Recovery, VcdError, Window};

/// Convert a VCD trace into JSON on stdout.
///
/// Without --name only the definitions are written. With one or more
/// names the definitions are followed by the (timestamp, value) pairs of
/// each named variable.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// The path to the file to read
    path: PathBuf,

    /// Fully-qualified variable name to include in the output, e.g.
    /// `.top.cpu.clock` (can be repeated)
    #[arg(short, long = "name", value_name = "NAME")]
    names: Vec<String>,

    /// Start of the timeframe to include
    #[arg(short, long, default_value_t = 0)]
    start: u64,

    /// End of the timeframe to include, exclusive (default: unbounded)
    #[arg(short, long)]
    end: Option<u64>,

    /// Number of timestamps per pixel
    #[arg(short, long, default_value_t = 1)]
    resolution: u64,

    /// Skip to the next `$end` on a malformed token instead of aborting
    #[arg(long)]
    resync: bool,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all logging except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // help and version requests are not failures
            let code = if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = err.print();
            return code;
        }
    };

    init_logging(cli.verbose, cli.quiet);

    let file = match File::open(&cli.path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("error: unable to open {}: {err}", cli.path.display());
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, file) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, file: File) -> Result<(), VcdError> {
    let window = Window::new(cli.start, cli.end.unwrap_or(u64::MAX));
    let options = if cli.names.is_empty() {
        Options::definitions()
    } else {
        log::info!(
            "(timestamp, value) in [{}, {}) with resolution {} for",
            window.start,
            window.end,
            cli.resolution
        );
        for name in &cli.names {
            log::info!("\t{name}");
        }
        Options::filter(&cli.names, window, cli.resolution)
    };
    let options = if cli.resync {
        options.with_recovery(Recovery::Resync)
    } else {
        options
    };

    let stdout = io::stdout();
    let outcome = parse_stream(file, &options, BufWriter::new(stdout.lock()))?;

    let metadata = &outcome.metadata;
    if let Some(date) = metadata.date {
        log::info!("date: {date}");
    }
    if let Some(version) = &metadata.version {
        log::info!("version: {}", version.0);
    }
    if let (Some(scalar), unit) = metadata.timescale {
        log::info!("timescale: {scalar} {unit:?}");
    }
    log::debug!("read {} lines", outcome.lines);
    if !outcome.warnings.is_empty() {
        log::warn!(
            "{} problem(s) skipped in {}",
            outcome.warnings.len(),
            cli.path.display()
        );
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .target(Target::Stderr)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
