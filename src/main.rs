use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use yelp_enrichment::config::{
    DEFAULT_COMPANIES_PATH, DEFAULT_CONFIG_PATH, DEFAULT_OUTPUT_PATH, DEFAULT_REIMBURSEMENTS_PATH,
};
use yelp_enrichment::{
    Credentials, Enricher, RunConfig, YelpClient, DEFAULT_API_URL, DEFAULT_BATCH_SIZE,
    MEAL_SUBQUOTA,
};

#[derive(Parser, Debug)]
#[command(name = "fetch-yelp-info")]
#[command(about = "Enrich meal-expense companies with Yelp business data, one batch per run")]
#[command(version)]
struct Cli {
    /// Reimbursements dataset (CSV, optionally .xz)
    #[arg(long, default_value = DEFAULT_REIMBURSEMENTS_PATH)]
    reimbursements: PathBuf,

    /// Companies dataset (CSV, optionally .xz)
    #[arg(long, default_value = DEFAULT_COMPANIES_PATH)]
    companies: PathBuf,

    /// Fetched companies table, read at start and rewritten during the run
    #[arg(short, long, default_value = DEFAULT_OUTPUT_PATH)]
    output: PathBuf,

    /// INI file holding [Yelp] AccessToken
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Access token (takes precedence over the config file)
    #[arg(long, env = "YELP_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Companies fetched per run
    #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Reimbursement category used to select companies
    #[arg(long, default_value = MEAL_SUBQUOTA)]
    category: String,

    /// Search API base URL
    #[arg(long, default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Per-request timeout in seconds (waits indefinitely when omitted)
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Print the batch without calling the API or writing the output
    #[arg(long)]
    dry_run: bool,

    /// Verbose logging (-v for INFO, -vv for DEBUG)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let credentials = match cli.token.as_deref() {
        Some(token) => Credentials::new(token)?,
        None => Credentials::from_ini(&cli.config)
            .with_context(|| format!("Failed to read credentials from {}", cli.config.display()))?,
    };

    let config = RunConfig {
        reimbursements_path: cli.reimbursements,
        companies_path: cli.companies,
        output_path: cli.output,
        credentials,
        batch_size: cli.batch_size,
        category: cli.category,
        api_url: cli.api_url,
        timeout: cli.timeout_secs.map(Duration::from_secs),
    };
    config.validate()?;

    let client = YelpClient::new(
        &config.api_url,
        &config.credentials.access_token,
        config.timeout,
    )?;
    let enricher = Enricher::new(config, client);

    if cli.dry_run {
        run_dry(&enricher)
    } else {
        run_fetch(&enricher)
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_fetch(enricher: &Enricher<YelpClient>) -> Result<()> {
    println!("🍽️  Yelp Enrichment - meal-expense companies");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let summary = enricher.run()?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Selected companies:  {}", summary.selected);
    println!("✓ Already cached:      {}", summary.cached_before);
    println!("✓ Attempted this run:  {}", summary.attempted);
    println!("✓ Matched:             {}", summary.matched);
    println!("✓ Not found:           {}", summary.not_found);
    if summary.failed > 0 {
        println!("⚠️  Failed lookups:     {}", summary.failed);
    }
    println!(
        "💾 {} rows written to {}",
        summary.total_rows,
        enricher.config().output_path.display()
    );

    Ok(())
}

fn run_dry(enricher: &Enricher<YelpClient>) -> Result<()> {
    println!("🔍 Dry run - nothing will be fetched or written\n");

    let batch = enricher.plan()?;
    for company in &batch {
        println!(
            "  {} - CNPJ: {} (zip {})",
            company.usable_trade_name().unwrap_or_default(),
            company.cnpj,
            company.zip_code.as_deref().unwrap_or_default()
        );
    }
    println!("\n✓ {} companies would be fetched", batch.len());

    Ok(())
}
