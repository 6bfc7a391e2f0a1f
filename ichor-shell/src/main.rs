//! ichor binary
//!
//! Run with: `ichor [COMMAND]`

use std::cell::RefCell;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ichor::config::{FuzzConfigBuilder, LogLevel};
use ichor::{Classifier, Driver, FuzzConfig, Grammar, ModuleRegistry};
use ichor_shell::report::{flag_names, format_classification, format_summary};
use ichor_shell::{ProcessSandbox, RunReport};

#[derive(Parser)]
#[command(name = "ichor")]
#[command(about = "Randomized JavaScript and DOM testcase generator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Run seed (default: wall clock)
    #[arg(short, long, global = true)]
    seed: Option<u64>,

    /// More output (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a testcase without running it
    Generate {
        /// Turns to play
        #[arg(short, long)]
        turns: Option<u32>,

        /// Initial depth budget
        #[arg(short, long)]
        budget: Option<u32>,

        /// Write the testcase here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate and run against an engine shell, checking oracles
    Run {
        /// Engine shell binary
        #[arg(short, long)]
        engine: Option<PathBuf>,

        /// Argument passed to the engine before the script (repeatable)
        #[arg(long = "engine-arg", allow_hyphen_values = true)]
        engine_args: Vec<String>,

        /// Iterations (0 = until interrupted)
        #[arg(short, long)]
        iterations: Option<u64>,

        /// Turns per iteration
        #[arg(short, long)]
        turns: Option<u32>,

        /// Per-execution timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Wall-clock limit for the run in seconds
        #[arg(long)]
        time_limit: Option<u64>,

        /// Stop at the first finding
        #[arg(long)]
        stop_on_finding: bool,

        /// Expression counting reachable objects; enables the leak oracle
        #[arg(long)]
        count_expr: Option<String>,

        /// Write the testcase here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write a JSON report here
        #[arg(short, long)]
        report: Option<PathBuf>,
    },

    /// Classify the code in a file ("-" for stdin)
    Classify {
        /// Source file
        file: PathBuf,
    },

    /// List the denylist rules
    Rules,

    /// List the registered modules and their weights
    Modules,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => FuzzConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => FuzzConfig::default(),
    };
    config.apply_env();
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    init_logging(&config, cli.verbose, cli.quiet);

    match cli.command {
        Commands::Generate {
            turns,
            budget,
            output,
        } => {
            let mut builder = FuzzConfigBuilder::from_config(config).execute(false);
            if let Some(turns) = turns {
                builder = builder.turns(turns);
            }
            if let Some(budget) = budget {
                builder = builder.budget(budget);
            }
            cmd_generate(builder.build()?, output.as_deref())
        }
        Commands::Run {
            engine,
            engine_args,
            iterations,
            turns,
            timeout_ms,
            time_limit,
            stop_on_finding,
            count_expr,
            output,
            report,
        } => {
            let mut builder = FuzzConfigBuilder::from_config(config);
            if let Some(engine) = engine {
                builder = builder.engine(engine);
            }
            if let Some(iterations) = iterations {
                builder = builder.iterations(iterations);
            }
            if let Some(turns) = turns {
                builder = builder.turns(turns);
            }
            if let Some(ms) = timeout_ms {
                builder = builder.timeout(Duration::from_millis(ms));
            }
            if let Some(secs) = time_limit {
                builder = builder.time_limit(Some(Duration::from_secs(secs)));
            }
            if stop_on_finding {
                builder = builder.stop_on_finding(true);
            }
            let mut config = builder.build()?;
            if !engine_args.is_empty() {
                config.sandbox.engine_args = engine_args;
            }
            if count_expr.is_some() {
                config.sandbox.count_expression = count_expr;
            }
            cmd_run(config, output.as_deref(), report.as_deref())
        }
        Commands::Classify { file } => cmd_classify(&file),
        Commands::Rules => cmd_rules(),
        Commands::Modules => cmd_modules(&config),
    }
}

/// `RUST_LOG` wins; otherwise the configured level moved by `-v`/`-q`.
fn init_logging(config: &FuzzConfig, verbose: u8, quiet: bool) {
    let level = if quiet {
        LogLevel::Error
    } else {
        match verbose {
            0 => config.log.level,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str())),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_generate(config: FuzzConfig, output: Option<&Path>) -> Result<ExitCode> {
    let modules = ModuleRegistry::standard(&config)?;
    let mut driver = Driver::new(config, Grammar::standard(), modules)?;
    let summary = driver.run();
    info!(
        seed = summary.seed,
        fragments = summary.fragments,
        "generated"
    );
    write_testcase(&driver.testcase(), output)?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_run(config: FuzzConfig, output: Option<&Path>, report: Option<&Path>) -> Result<ExitCode> {
    let sandbox = ProcessSandbox::new(&config.sandbox).context("Failed to set up engine")?;
    info!(engine = %sandbox.engine().display(), "engine ready");
    let can_count = sandbox.can_count();
    let shared = Rc::new(RefCell::new(sandbox));

    let modules = ModuleRegistry::standard(&config)?;
    let mut driver = Driver::new(config.clone(), Grammar::standard(), modules)?
        .with_sandbox(Box::new(Rc::clone(&shared)));
    if can_count {
        driver = driver.with_probe(Box::new(Rc::clone(&shared)));
    } else if config.oracle.leak_rate > 0 {
        warn!("no count expression configured; leak oracle disabled");
    }

    let stop = driver.stop_handle();
    ctrlc::set_handler(move || stop.stop()).context("Failed to install interrupt handler")?;

    let summary = driver.run();
    let testcase = driver.testcase();
    if let Some(path) = output {
        write_testcase(&testcase, Some(path))?;
    }
    if let Some(path) = report {
        let mut run_report = RunReport::new(&config, &summary);
        run_report.testcase = output.map(|p| p.display().to_string());
        fs::write(path, run_report.to_json()?)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
    }

    print!("{}", format_summary(&summary));
    if summary.findings.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

fn cmd_classify(file: &Path) -> Result<ExitCode> {
    let text = if file == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        text
    } else {
        fs::read_to_string(file)
            .with_context(|| format!("Failed to read file: {}", file.display()))?
    };
    print!("{}", format_classification(&Classifier::standard(), &text));
    Ok(ExitCode::SUCCESS)
}

fn cmd_rules() -> Result<ExitCode> {
    let classifier = Classifier::standard();
    for rule in classifier.rules() {
        println!(
            "{:<16} {:<48} {}",
            rule.name.cyan(),
            flag_names(rule.clears),
            rule.reason
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_modules(config: &FuzzConfig) -> Result<ExitCode> {
    let modules = ModuleRegistry::standard(config)?;
    if modules.is_empty() {
        bail!("every module is disabled");
    }
    for (index, name) in modules.names().into_iter().enumerate() {
        let weight = modules.weight(index).unwrap_or(0);
        println!("{:<20} {}", name, weight);
    }
    Ok(ExitCode::SUCCESS)
}

fn write_testcase(testcase: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, testcase)
                .with_context(|| format!("Failed to write testcase: {}", path.display()))?;
            info!(path = %path.display(), "testcase written");
        }
        None => print!("{}", testcase),
    }
    Ok(())
}
