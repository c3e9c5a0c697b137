//! Binary entry point for the SQLQuiz command line.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;

use std::error::Error;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use sqlquiz::{
    challenges::{
        attempt_challenge, challenge_levels, sample_queries, ChallengeAttempt, ChallengeLevel,
        SampleQueries,
    },
    grading::{check_answer, AnswerCheck},
    query::{analyze, CountPolicy, PageEnvelope, PageSize, QueryErrorWithCode},
    server::{self, ServerOptions},
    service::{QueryRequest, QueryService, ServiceSettings},
    store::{seed_demo, SeedReport, Store, StoreOptions, TableSchema},
    SessionToken,
};

use config::CliConfig;

const DEFAULT_PORT: u16 = 5000;

#[derive(Parser, Debug)]
#[command(
    name = "sqlquiz",
    version,
    about = "Run candidate SQL safely against an assessment dataset",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "SQLQUIZ_CONFIG",
        value_name = "FILE",
        help = "Path to the TOML config file"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "DB",
        help = "Database file (overrides [database] path)"
    )]
    db: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(flatten)]
    tuning: TuningArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct TuningArgs {
    #[arg(long, global = true, help = "Per-query time limit in seconds")]
    timeout_secs: Option<u64>,

    #[arg(long, global = true, help = "Number of pooled read-only connections")]
    pool_size: Option<usize>,

    #[arg(
        long,
        global = true,
        help = "Page size used when a request does not name one (100, 250, 500, 1000)"
    )]
    default_page_size: Option<u32>,

    #[arg(long, global = true, value_enum, help = "Whether to count total rows")]
    count_policy: Option<CountPolicyArg>,
}

#[derive(Args, Debug)]
struct ServeCmd {
    #[arg(long, value_name = "HOST", help = "Bind address host [default: 127.0.0.1]")]
    host: Option<IpAddr>,

    #[arg(long, value_name = "PORT", help = "Bind port [default: 5000]")]
    port: Option<u16>,

    #[arg(
        long = "allow-origin",
        value_name = "ORIGIN",
        action = ArgAction::Append,
        help = "Additional CORS origin to allow (repeatable)"
    )]
    allow_origins: Vec<String>,
}

#[derive(Args, Debug)]
struct QueryCmd {
    #[arg(value_name = "SQL")]
    sql: String,

    #[arg(long, help = "1-based page number")]
    page: Option<u32>,

    #[arg(long, help = "Rows per page (snapped to 100, 250, 500 or 1000)")]
    page_size: Option<u32>,

    #[arg(long, value_name = "TOKEN", help = "Session token stamped on activity records")]
    session: Option<String>,

    #[arg(long, help = "Also print complexity and performance insights")]
    insights: bool,
}

#[derive(Args, Debug)]
struct CheckCmd {
    #[arg(value_name = "CANDIDATE_SQL")]
    candidate: String,

    #[arg(value_name = "EXPECTED_SQL")]
    expected: String,
}

#[derive(Args, Debug)]
struct AttemptCmd {
    #[arg(value_name = "CHALLENGE_ID")]
    id: u32,

    #[arg(value_name = "SQL")]
    sql: String,

    #[arg(long, default_value_t = 0, help = "Hints used, each costs points")]
    hints: u32,

    #[arg(long, value_name = "TOKEN", help = "Session token stamped on activity records")]
    session: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Serve the HTTP API")]
    Serve(ServeCmd),
    #[command(about = "Run one query and print a page of results")]
    Query(QueryCmd),
    #[command(about = "Print tables and columns")]
    Schema {
        #[arg(long, value_name = "TABLE", help = "Also print sample rows from TABLE")]
        sample: Option<String>,
    },
    #[command(about = "Compare a candidate query against an expected query")]
    Check(CheckCmd),
    #[command(about = "Print starter queries generated from the schema")]
    SampleQueries,
    #[command(about = "List the built-in challenges")]
    Challenges,
    #[command(about = "Answer a challenge and print the graded result")]
    Attempt(AttemptCmd),
    #[command(about = "Create the demo patients/encounters dataset")]
    SeedDemo,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CountPolicyArg {
    Never,
    Exact,
}

impl From<CountPolicyArg> for CountPolicy {
    fn from(policy: CountPolicyArg) -> Self {
        match policy {
            CountPolicyArg::Never => CountPolicy::Never,
            CountPolicyArg::Exact => CountPolicy::Exact,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.clone())?;
    server::install_tracing_subscriber();

    match &cli.command {
        Command::Serve(cmd) => {
            let options = build_server_options(&cli, &config, cmd)?;
            if let Err(err) = server::serve(options).await {
                eprintln!("server terminated: {err}");
                return Err(Box::new(err));
            }
        }
        Command::Query(cmd) => {
            let service = open_service(&cli, &config)?;
            let mut request = QueryRequest::new(cmd.sql.clone());
            request.page = cmd.page;
            request.page_size = cmd.page_size;
            request.session = cmd.session.clone().map(SessionToken::new);
            let page = service
                .run_query(&request)
                .map_err(|err| QueryErrorWithCode(&err).to_string())?;
            let insights = cmd.insights.then(|| {
                analyze(
                    &cmd.sql,
                    Duration::from_secs_f64(page.execution_time_ms / 1000.0),
                )
            });
            match cli.format {
                OutputFormat::Json => {
                    let value = serde_json::json!({ "page": &page, "insights": &insights });
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                OutputFormat::Text => {
                    print_page_text(&page);
                    if let Some(insights) = &insights {
                        println!(
                            "complexity {}/10, performance {:?}",
                            insights.complexity, insights.performance_level
                        );
                        for hint in &insights.suggestions {
                            println!("  - {hint}");
                        }
                    }
                }
            }
        }
        Command::Schema { sample } => {
            let service = open_service(&cli, &config)?;
            let schema = service.catalog().schema()?;
            emit(&cli.format, &schema, || print_schema_text(&schema))?;
            if let Some(table) = sample {
                let page = service.sample_data(table, None)?;
                emit(&cli.format, &page, || print_page_text(&page))?;
            }
        }
        Command::Check(cmd) => {
            let service = open_service(&cli, &config)?;
            let check = check_answer(&service, &cmd.candidate, &cmd.expected, None);
            emit(&cli.format, &check, || print_check_text(&check))?;
            if !check.correct {
                std::process::exit(2);
            }
        }
        Command::SampleQueries => {
            let service = open_service(&cli, &config)?;
            let samples = sample_queries(service.catalog())?;
            emit(&cli.format, &samples, || print_samples_text(&samples))?;
        }
        Command::Challenges => {
            let levels = challenge_levels();
            emit(&cli.format, &levels, || print_levels_text(&levels))?;
        }
        Command::Attempt(cmd) => {
            let service = open_service(&cli, &config)?;
            let session = cmd.session.clone().map(SessionToken::new);
            let attempt = attempt_challenge(&service, cmd.id, &cmd.sql, cmd.hints, session)?;
            emit(&cli.format, &attempt, || print_attempt_text(&attempt))?;
            if !attempt.check.correct {
                std::process::exit(2);
            }
        }
        Command::SeedDemo => {
            let path = resolve_db(&cli, &config)?;
            let report = seed_demo(&path)?;
            emit(&cli.format, &report, || print_seed_text(&path, &report))?;
        }
    }
    Ok(())
}

fn resolve_db(cli: &Cli, config: &CliConfig) -> Result<PathBuf, Box<dyn Error>> {
    cli.db
        .clone()
        .or_else(|| config.database_path().cloned())
        .ok_or_else(|| "no database given; pass --db or set [database] path in the config".into())
}

fn open_service(cli: &Cli, config: &CliConfig) -> Result<QueryService, Box<dyn Error>> {
    let path = resolve_db(cli, config)?;
    let (store_opts, settings) = build_tuning(cli, config)?;
    let store = Store::open(&path, store_opts)?;
    Ok(QueryService::new(Arc::new(store), settings))
}

fn build_tuning(
    cli: &Cli,
    config: &CliConfig,
) -> Result<(StoreOptions, ServiceSettings), Box<dyn Error>> {
    let mut store = config.store_options();
    let mut settings = config.service_settings();
    if let Some(secs) = cli.tuning.timeout_secs {
        store.timeout = Duration::from_secs(secs);
    }
    if let Some(pool_size) = cli.tuning.pool_size {
        store.pool_size = pool_size;
    }
    if let Some(size) = cli.tuning.default_page_size {
        settings.default_page_size = PageSize::try_from(size)?;
    }
    if let Some(policy) = cli.tuning.count_policy {
        settings.count_policy = policy.into();
    }
    Ok((store, settings))
}

fn build_server_options(
    cli: &Cli,
    config: &CliConfig,
    cmd: &ServeCmd,
) -> Result<ServerOptions, Box<dyn Error>> {
    let (store, settings) = build_tuning(cli, config)?;
    let mut allow_origins = config.allow_origins().to_vec();
    allow_origins.extend(cmd.allow_origins.iter().cloned());
    Ok(ServerOptions {
        db_path: resolve_db(cli, config)?,
        store,
        settings,
        host: cmd
            .host
            .or(config.host())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        port: cmd.port.or(config.port()).unwrap_or(DEFAULT_PORT),
        allow_origins,
    })
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_page_text(page: &PageEnvelope) {
    let headers: Vec<&str> = page.columns.iter().map(|c| c.name.as_str()).collect();
    let cells: Vec<Vec<String>> = page
        .rows
        .iter()
        .map(|row| row.iter().map(|value| value.display()).collect())
        .collect();
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            cells
                .iter()
                .filter_map(|row| row.get(idx))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: Vec<&str>| {
        values
            .iter()
            .zip(&widths)
            .map(|(value, width)| format!("{value:<width$}"))
            .collect::<Vec<_>>()
            .join(" | ")
    };
    println!("{}", line(headers.clone()));
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-")
    );
    for row in &cells {
        println!("{}", line(row.iter().map(String::as_str).collect()));
    }

    let total = page
        .total_rows
        .map_or_else(|| "unknown".to_string(), |n| n.to_string());
    println!(
        "({} rows, page {}, page size {}, total {}, more: {}{}, {:.2} ms)",
        page.row_count,
        page.page,
        page.page_size,
        total,
        if page.has_more { "yes" } else { "no" },
        if page.user_limit_honored {
            ", LIMIT honored"
        } else {
            ""
        },
        page.execution_time_ms
    );
}

fn print_schema_text(schema: &[TableSchema]) {
    for table in schema {
        println!("{}", table.name);
        for column in &table.columns {
            let mut flags = Vec::new();
            if column.pk {
                flags.push("pk");
            }
            if column.notnull {
                flags.push("not null");
            }
            println!(
                "  {:<24} {:<10} {}",
                column.name,
                column.declared_type,
                flags.join(", ")
            );
        }
    }
}

fn print_check_text(check: &AnswerCheck) {
    println!("{}", check.message);
}

fn print_samples_text(samples: &SampleQueries) {
    println!("{}\n\n{}\n\n{}", samples.basic, samples.join, samples.aggregate);
}

fn print_levels_text(levels: &[ChallengeLevel]) {
    for level in levels {
        println!("{}", level.name);
        for challenge in &level.challenges {
            println!(
                "  {:>3}  {:<28} {:>4} pts  {}",
                challenge.id, challenge.title, challenge.max_score, challenge.description
            );
        }
    }
}

fn print_attempt_text(attempt: &ChallengeAttempt) {
    println!("{}", attempt.check.message);
    println!("score {} (hints used: {})", attempt.score, attempt.hints_used);
}

fn print_seed_text(path: &std::path::Path, report: &SeedReport) {
    println!(
        "Demo data written to {} ({} patients, {} encounters) in {:.2} ms",
        path.display(),
        report.patients,
        report.encounters,
        report.duration_ms
    );
}
