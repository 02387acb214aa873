// segheap: segmented heap load tester with a live heap map

use std::io;

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use segheap::stress::{StressConfig, StressRun};
use segheap::ui::App;

/// Parsed command line
struct Options {
    config: StressConfig,
    headless: bool,
}

fn usage(program_name: &str) {
    eprintln!(
        "Usage: {} [--seed N] [--ops N] [--size BYTES] [--headless]",
        program_name
    );
    eprintln!();
    eprintln!("  --seed N       random seed (default 0)");
    eprintln!("  --ops N        number of heap operations (default 100000)");
    eprintln!("  --size BYTES   initial heap size, up to 65536 (default 32768)");
    eprintln!("  --headless     run without the TUI and log progress to stderr");
    eprintln!();
    eprintln!("Set RUST_LOG=debug or RUST_LOG=trace for more detail in headless mode.");
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("{} needs a value", flag))?;
    value
        .parse()
        .map_err(|_| format!("invalid value '{}' for {}", value, flag))
}

fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let mut options = Options {
        config: StressConfig::default(),
        headless: false,
    };

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--seed" => options.config.seed = parse_value(arg, iter.next())?,
            "--ops" => options.config.operations = parse_value(arg, iter.next())?,
            "--size" => options.config.initial_size = parse_value(arg, iter.next())?,
            "--headless" => options.headless = true,
            "-h" | "--help" => return Ok(None),
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }
    Ok(Some(options))
}

fn run_headless(mut run: StressRun) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    info!(
        seed = run.config().seed,
        operations = run.config().operations,
        initial_size = run.config().initial_size,
        "starting heap load test"
    );
    match run.run() {
        Ok(stats) => {
            info!(
                allocs = stats.allocs,
                failed_allocs = stats.failed_allocs,
                reallocs = stats.reallocs,
                failed_reallocs = stats.failed_reallocs,
                frees = stats.frees,
                defrags = stats.defrags,
                "heap verified"
            );
            Ok(())
        }
        Err(e) => {
            error!(step = run.steps(), "corruption detected: {}", e);
            Err(e.into())
        }
    }
}

fn run_tui(run: StressRun) -> Result<(), Box<dyn std::error::Error>> {
    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(run);
    let res = app.run(&mut terminal);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }
    if let Some(e) = app.error {
        eprintln!("Corruption detected at step {}: {}", app.run.steps(), e);
        std::process::exit(1);
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let program_name = args.first().map(|s| s.as_str()).unwrap_or("segheap");

    let options = match parse_args(&args) {
        Ok(Some(options)) => options,
        Ok(None) => {
            usage(program_name);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            usage(program_name);
            std::process::exit(1);
        }
    };

    let run = match StressRun::new(options.config) {
        Ok(run) => run,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if options.headless {
        run_headless(run)
    } else {
        run_tui(run)
    }
}
