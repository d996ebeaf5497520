//! flow: AWS command line helpers.
//!
//! ```text
//! flow [-D|-v|-q] [-p] [--profile P] [--region R] [--endpoint-url U] <command>
//!
//! flow dynamodb purge --table-name T [--filter-expression E]
//!                     [--expression-attribute-values JSON]
//!                     [--max-concurrent-pages-delete N] [--max-attempts N]
//! flow dynamodb put-item --table-name T --input FILE [--max-attempts N]
//! flow dynamodb delete-item --table-name T --keys FILE [--max-attempts N]
//! flow session env
//! ```

use clap::{Arg, ArgAction, ArgMatches, Command, crate_authors, crate_version, value_parser};
use flow::Error;
use flow::session::Session;
use flow::table::{
    BulkWriteOutput, BulkWriter, DEFAULT_MAX_CONCURRENT_PAGES, DotProgress, DynamoStore, ScanRequest,
    WriteConfig, parse_item, parse_items,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt};

/// Log to stderr so stdout carries only progress and command output
fn configure_logging(matches: &ArgMatches) -> Result<(), Error> {
    let level = match (
        matches.get_flag("debug"),
        matches.get_flag("verbose"),
        matches.get_flag("quiet"),
    ) {
        (true, _, _) => Level::TRACE,
        (false, true, _) => Level::DEBUG,
        (false, false, true) => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env()
        .map_err(|e| Error::Config(format!("invalid RUST_LOG: {e}")))?;
    let formatter: Box<dyn Layer<Registry> + Send + Sync> = if matches.get_flag("plain") {
        Box::new(fmt::Layer::default().compact().with_writer(io::stderr))
    } else {
        Box::new(fmt::Layer::default().json().with_writer(io::stderr))
    };
    tracing::subscriber::set_global_default(Registry::default().with(formatter).with(filter))
        .map_err(|e| Error::Config(format!("failed to install logger: {e}")))
}

fn table_name_arg() -> Arg {
    Arg::new("table-name")
        .long("table-name")
        .num_args(1)
        .required(true)
        .help("name of the DynamoDB table")
}

fn max_attempts_arg() -> Arg {
    Arg::new("max-attempts")
        .long("max-attempts")
        .num_args(1)
        .value_parser(value_parser!(usize))
        .env("FLOW_MAX_ATTEMPTS")
        .help("give up on a batch after this many write calls (default: retry until accepted)")
}

fn cli() -> Command {
    Command::new("flow")
        .version(crate_version!())
        .author(crate_authors!())
        .about("AWS command line helpers")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("debug")
                .short('D')
                .long("debug")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .global(true)
                .env("FLOW_DEBUG")
                .help("produce debug output"),
        )
        .arg(
            Arg::new("plain")
                .short('p')
                .long("plain")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .global(true)
                .env("FLOW_PLAIN")
                .help("log in human-readable format, not JSON/structured logging"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .global(true)
                .env("FLOW_QUIET")
                .help("produce only error output"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .global(true)
                .env("FLOW_VERBOSE")
                .help("produce prolix output"),
        )
        .arg(
            Arg::new("profile")
                .long("profile")
                .num_args(1)
                .global(true)
                .env("FLOW_PROFILE")
                .help("named AWS profile (default: AWS_PROFILE or 'default')"),
        )
        .arg(
            Arg::new("region")
                .long("region")
                .num_args(1)
                .global(true)
                .env("FLOW_REGION")
                .help("AWS region override"),
        )
        .arg(
            Arg::new("endpoint-url")
                .long("endpoint-url")
                .num_args(1)
                .global(true)
                .env("FLOW_ENDPOINT_URL")
                .help("endpoint override, e.g. http://127.0.0.1:4566"),
        )
        .subcommand(
            Command::new("dynamodb")
                .about("DynamoDB bulk operations")
                .subcommand_required(true)
                .subcommand(
                    Command::new("purge")
                        .about("delete every item of a table, optionally only those matching a filter")
                        .arg(table_name_arg())
                        .arg(
                            Arg::new("filter-expression")
                                .long("filter-expression")
                                .num_args(1)
                                .help("scan filter, e.g. 'expires < :now'"),
                        )
                        .arg(
                            Arg::new("expression-attribute-values")
                                .long("expression-attribute-values")
                                .num_args(1)
                                .requires("filter-expression")
                                .help(r#"filter values as typed JSON, e.g. '{":now": {"N": "1700000000"}}'"#),
                        )
                        .arg(
                            Arg::new("max-concurrent-pages-delete")
                                .long("max-concurrent-pages-delete")
                                .num_args(1)
                                .value_parser(value_parser!(usize))
                                .env("FLOW_MAX_CONCURRENT_PAGES_DELETE")
                                .help(format!(
                                    "maximum number of scanned pages being deleted at once [default: {DEFAULT_MAX_CONCURRENT_PAGES}]"
                                )),
                        )
                        .arg(max_attempts_arg()),
                )
                .subcommand(
                    Command::new("put-item")
                        .about("put items from a typed-JSON array file")
                        .arg(table_name_arg())
                        .arg(
                            Arg::new("input")
                                .long("input")
                                .num_args(1)
                                .required(true)
                                .value_parser(value_parser!(PathBuf))
                                .help("file holding a JSON array of items"),
                        )
                        .arg(max_attempts_arg()),
                )
                .subcommand(
                    Command::new("delete-item")
                        .about("delete items by key from a typed-JSON array file")
                        .arg(table_name_arg())
                        .arg(
                            Arg::new("keys")
                                .long("keys")
                                .num_args(1)
                                .required(true)
                                .value_parser(value_parser!(PathBuf))
                                .help("file holding a JSON array of keys"),
                        )
                        .arg(max_attempts_arg()),
                ),
        )
        .subcommand(
            Command::new("session")
                .about("credential resolution")
                .subcommand_required(true)
                .subcommand(
                    Command::new("env").about("resolve credentials and print them as shell exports"),
                ),
        )
}

async fn session(matches: &ArgMatches) -> Result<Session, Error> {
    let mut builder = Session::builder();
    if let Some(profile) = matches.get_one::<String>("profile") {
        builder = builder.profile(profile);
    }
    if let Some(region) = matches.get_one::<String>("region") {
        builder = builder.region(region);
    }
    if let Some(endpoint_url) = matches.get_one::<String>("endpoint-url") {
        builder = builder.endpoint_url(endpoint_url);
    }
    let session = builder.build().await?;

    // Fail before any table work when no credentials can be had.
    let _ = session.credentials().await?;
    Ok(session)
}

fn write_config(matches: &ArgMatches) -> WriteConfig {
    let mut config = WriteConfig::default();
    // Only purge takes a concurrency ceiling. Input files are written batch
    // after batch so a key repeated in the file ends with its last value.
    config.max_concurrent_pages = match matches.try_get_one::<usize>("max-concurrent-pages-delete") {
        Ok(Some(&pages)) => pages,
        Ok(None) => DEFAULT_MAX_CONCURRENT_PAGES,
        Err(_) => 1,
    };
    config.retry.max_attempts = matches.get_one::<usize>("max-attempts").copied();
    config
}

async fn writer(
    global: &ArgMatches,
    matches: &ArgMatches,
) -> Result<BulkWriter<DynamoStore>, Error> {
    let table_name = matches
        .get_one::<String>("table-name")
        .ok_or_else(|| Error::Config("missing --table-name".to_string()))?;
    let session = session(global).await?;

    Ok(
        BulkWriter::new(Arc::new(DynamoStore::new(session.dynamodb_client())), table_name)
            .with_config(write_config(matches))
            .with_progress(DotProgress),
    )
}

async fn read_file(matches: &ArgMatches, name: &str) -> Result<String, Error> {
    let path = matches
        .get_one::<PathBuf>(name)
        .ok_or_else(|| Error::Config(format!("missing --{name}")))?;
    tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::Config(format!("unable to read {}: {}", path.display(), e))
    })
}

fn report(output: &BulkWriteOutput) {
    println!();
    info!(
        batches = output.batches,
        items = output.items,
        retries = output.retries,
        elapsed_ms = output.total_duration.as_millis() as u64,
        "finished"
    );
    println!("done");
}

async fn purge(global: &ArgMatches, matches: &ArgMatches) -> Result<(), Error> {
    let writer = writer(global, matches).await?;

    let mut request = ScanRequest::new(writer.table_name());
    if let Some(expression) = matches.get_one::<String>("filter-expression") {
        let values = matches
            .get_one::<String>("expression-attribute-values")
            .map(|json| parse_item(json))
            .transpose()?;
        request = request.with_filter(expression, values);
    }

    report(&writer.purge(request).await?);
    Ok(())
}

async fn put_item(global: &ArgMatches, matches: &ArgMatches) -> Result<(), Error> {
    let items = parse_items(&read_file(matches, "input").await?)?;
    let writer = writer(global, matches).await?;
    report(&writer.put_items(items).await?);
    Ok(())
}

async fn delete_item(global: &ArgMatches, matches: &ArgMatches) -> Result<(), Error> {
    let keys = parse_items(&read_file(matches, "keys").await?)?;
    let writer = writer(global, matches).await?;
    report(&writer.delete_keys(keys).await?);
    Ok(())
}

async fn session_env(global: &ArgMatches) -> Result<(), Error> {
    let session = session(global).await?;
    let credentials = session.credentials().await?;

    println!(
        "export AWS_REGION={}",
        session.region().map(|r| r.as_ref()).unwrap_or_default()
    );
    println!("export AWS_ACCESS_KEY_ID={}", credentials.access_key_id());
    println!("export AWS_SECRET_ACCESS_KEY={}", credentials.secret_access_key());
    println!(
        "export AWS_SESSION_TOKEN={}",
        credentials.session_token().unwrap_or_default()
    );
    Ok(())
}

async fn run(matches: ArgMatches) -> Result<(), Error> {
    match matches.subcommand() {
        Some(("dynamodb", dynamodb)) => match dynamodb.subcommand() {
            Some(("purge", sub)) => purge(&matches, sub).await,
            Some(("put-item", sub)) => put_item(&matches, sub).await,
            Some(("delete-item", sub)) => delete_item(&matches, sub).await,
            _ => Err(Error::Config("unknown dynamodb command".to_string())),
        },
        Some(("session", session)) => match session.subcommand() {
            Some(("env", _)) => session_env(&matches).await,
            _ => Err(Error::Config("unknown session command".to_string())),
        },
        _ => Err(Error::Config("unknown command".to_string())),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    if let Err(e) = configure_logging(&matches) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    info!("flow {}", crate_version!());

    match run(matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
