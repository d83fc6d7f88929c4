use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use docshift_cli::commands::{self, MigrateArgs, SeedArgs};
use docshift_cli::logging::{self, LogFormat};
use docshift_cli::{exit_code, EXIT_OK, EXIT_PANIC};
use docshift_store::DEFAULT_FIXTURE_COUNT;
use std::path::PathBuf;

fn cli() -> Command {
    Command::new("docshift")
        .version(docshift_core::VERSION)
        .about("Bulk document migrations over JSON collection files")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level when RUST_LOG is unset"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(value_parser!(LogFormat))
                .help("Log output format: text or json"),
        )
        .subcommand(
            Command::new("migrate")
                .about("Run a migration job against a collection file")
                .arg(
                    Arg::new("job")
                        .long("job")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Job envelope (.json, .yaml, .yml or .toml)"),
                )
                .arg(
                    Arg::new("store")
                        .long("store")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Collection file (JSON array of documents)"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write migrated documents here instead of --store"),
                )
                .arg(
                    Arg::new("concurrency")
                        .long("concurrency")
                        .value_parser(value_parser!(usize))
                        .help("Default concurrency for jobs that set none"),
                ),
        )
        .subcommand(
            Command::new("seed")
                .about("Write a collection file of generated contracts")
                .arg(
                    Arg::new("out")
                        .long("out")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Collection file to write"),
                )
                .arg(
                    Arg::new("count")
                        .long("count")
                        .value_parser(value_parser!(usize))
                        .help("Number of contracts (default 100)"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                ),
        )
}

async fn run(matches: ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("migrate", args)) => {
            let args = MigrateArgs {
                job: required_path(args, "job")?,
                store: required_path(args, "store")?,
                out: args.get_one::<PathBuf>("out").cloned(),
                concurrency: args.get_one::<usize>("concurrency").copied(),
            };
            let result = commands::migrate(&args).await?;
            println!("{}", commands::render(result.as_ref())?);
        }
        Some(("seed", args)) => {
            let args = SeedArgs {
                out: required_path(args, "out")?,
                count: args
                    .get_one::<usize>("count")
                    .copied()
                    .unwrap_or(DEFAULT_FIXTURE_COUNT),
                seed: args.get_one::<u64>("seed").copied(),
            };
            let written = commands::seed(&args).await?;
            println!("Seeded {written} contracts into {}", args.out.display());
        }
        _ => anyhow::bail!("unknown command"),
    }
    Ok(())
}

fn required_path(args: &ArgMatches, name: &str) -> anyhow::Result<PathBuf> {
    args.get_one::<PathBuf>(name)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing --{name}"))
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    let verbose = matches.get_flag("verbose");
    let format = matches
        .get_one::<LogFormat>("log-format")
        .copied()
        .unwrap_or_default();
    if let Err(err) = logging::init(verbose, format) {
        eprintln!("warning: {err}");
    }

    // panics outside the worker pool surface here; worker panics arrive as errors
    match tokio::spawn(run(matches)).await {
        Ok(Ok(())) => std::process::exit(EXIT_OK),
        Ok(Err(err)) => {
            tracing::error!(error = %format!("{err:#}"), "docshift failed");
            eprintln!("Error: {err:#}");
            std::process::exit(exit_code(&err));
        }
        Err(join_error) => {
            tracing::error!(error = %join_error, "docshift aborted");
            std::process::exit(EXIT_PANIC);
        }
    }
}
