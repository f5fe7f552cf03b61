#![deny(warnings)]

//! `cpq` command-line tool: price fence quotes from scenario files or a
//! quote database.

mod settings;

use anyhow::{bail, Context, Result};
use cpq_core::{CalculatedQuote, InMemoryCatalog, QuoteId};
use cpq_engine::{QuoteCalculator, QuoteService};
use cpq_pricing::MarginConvention;
use persistence::Store;
use settings::{load_scenario, Settings, DEFAULT_SETTINGS_PATH};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage:
  cpq calc --scenario <file> [--db <url>] [--json] [--convention markup|gross_margin]
  cpq calc --quote <id> [--db <url>] [--json]
  cpq latest --quote <id> [--db <url>] [--json]
  cpq finalize --quote <id> [--db <url>]
  cpq version
options:
  --settings <file>   settings file (default assets/cpq.yaml)";

#[derive(Debug, Default, PartialEq)]
struct Args {
    command: String,
    scenario: Option<PathBuf>,
    quote: Option<QuoteId>,
    db: Option<String>,
    json: bool,
    convention: Option<MarginConvention>,
    settings: Option<PathBuf>,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut it = args.into_iter();
    let mut parsed = Args {
        command: it.next().unwrap_or_else(|| "help".to_string()),
        ..Args::default()
    };
    while let Some(arg) = it.next() {
        let mut value = || it.next().with_context(|| format!("{arg} needs a value"));
        match arg.as_str() {
            "--scenario" => parsed.scenario = Some(PathBuf::from(value()?)),
            "--quote" => {
                let raw = value()?;
                let id = raw
                    .parse()
                    .with_context(|| format!("invalid quote id '{raw}'"))?;
                parsed.quote = Some(QuoteId(id));
            }
            "--db" => parsed.db = Some(value()?),
            "--convention" => parsed.convention = Some(value()?.parse()?),
            "--settings" => parsed.settings = Some(PathBuf::from(value()?)),
            "--json" => parsed.json = true,
            other => bail!("unknown argument '{other}'\n{USAGE}"),
        }
    }
    Ok(parsed)
}

fn create_parent_dir(url: &str) -> Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"));
    if let Some(path) = path.filter(|p| !p.starts_with(":memory:")) {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

async fn open_store(url: &str) -> Result<Store> {
    create_parent_dir(url)?;
    Ok(Store::connect(url).await?)
}

fn print_calculation(calc: &CalculatedQuote, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(calc)?);
        return Ok(());
    }
    match calc.id {
        Some(id) => println!(
            "Quote {} | calculation {} | {}",
            calc.quote_id, id, calc.calculated_at
        ),
        None => println!("Quote {} | {}", calc.quote_id, calc.calculated_at),
    }
    println!("Bill of materials:");
    for line in &calc.bill_of_materials {
        let mut extra = String::new();
        if let Some(cull) = line.cull_units {
            extra.push_str(&format!(" (cull {cull})"));
        }
        if let Some(left) = line.leftovers {
            extra.push_str(&format!(" (leftover {left})"));
        }
        println!(
            "  {:<32} {:>10} {:<12} @ {:>9} = {:>10}{}",
            line.material_name,
            line.quantity,
            line.unit_name,
            line.unit_cost,
            line.total_cost,
            extra
        );
    }
    println!(
        "Material: ${} | Labor: ${}",
        calc.total_material_cost, calc.total_labor_cost
    );
    println!("COGS: ${}", calc.cost_of_goods_sold);
    for rate in &calc.applied_rates_info {
        println!("  {:<24} {:>8} {:>10}", rate.name, rate.rate_value, rate.applied_amount);
    }
    println!(
        "Subtotal: ${} | Tax: ${} | Final: ${}",
        calc.subtotal_before_tax, calc.tax_amount, calc.final_price
    );
    Ok(())
}

/// Filter from `log_filter` in the settings, `info` when it does not parse.
fn settings_filter(settings: &Settings) -> EnvFilter {
    EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"))
}

async fn run(args: Args, settings: Settings) -> Result<()> {
    let convention = args.convention.unwrap_or(settings.margin_convention);
    let calculator = QuoteCalculator::with_convention(convention);
    match args.command.as_str() {
        "calc" => {
            let scenario = args.scenario.as_deref().map(load_scenario).transpose()?;
            match (scenario, args.db) {
                (Some(scenario), None) => {
                    let quote_id = args.quote.unwrap_or(scenario.quote_id);
                    info!(%quote_id, %convention, "calculating scenario in memory");
                    let catalog = InMemoryCatalog::new(scenario.catalog);
                    let calc = calculator.calculate(&catalog, quote_id)?;
                    print_calculation(&calc, args.json)
                }
                (scenario, db) => {
                    let quote_id = match (&scenario, args.quote) {
                        (_, Some(id)) => id,
                        (Some(s), None) => s.quote_id,
                        (None, None) => bail!("calc needs --scenario or --quote\n{USAGE}"),
                    };
                    let store = open_store(&db.unwrap_or(settings.database_url)).await?;
                    if let Some(scenario) = scenario {
                        store.seed(&scenario.catalog).await?;
                    }
                    let service = QuoteService::new(store, calculator);
                    let calc = service.calculate(quote_id).await?;
                    print_calculation(&calc, args.json)
                }
            }
        }
        "latest" => {
            let quote_id = args.quote.context("latest needs --quote")?;
            let store = open_store(&args.db.unwrap_or(settings.database_url)).await?;
            let service = QuoteService::new(store, calculator);
            match service.latest_calculated_quote(quote_id).await? {
                Some(calc) => print_calculation(&calc, args.json),
                None => {
                    println!("Quote {quote_id} has not been calculated yet");
                    Ok(())
                }
            }
        }
        "finalize" => {
            let quote_id = args.quote.context("finalize needs --quote")?;
            let store = open_store(&args.db.unwrap_or(settings.database_url)).await?;
            let quote = QuoteService::new(store, calculator)
                .finalize(quote_id)
                .await?;
            println!("Quote {} is now {}", quote.id, quote.status);
            Ok(())
        }
        "version" => {
            println!(
                "cpq {} (git {} built {})",
                env!("CARGO_PKG_VERSION"),
                env!("GIT_SHA"),
                env!("BUILD_DATE")
            );
            Ok(())
        }
        "help" | "--help" | "-h" => {
            println!("{USAGE}");
            Ok(())
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
    let settings = Settings::load(&settings_path)?;

    // Logs go to stderr so --json output stays parseable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| settings_filter(&settings));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    info!(command = %args.command, settings = %settings_path.display(), "starting cpq");

    run(args, settings).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_calc_flags() {
        let a = args(&[
            "calc",
            "--scenario",
            "assets/scenarios/postmaster_h_100ft.yaml",
            "--json",
            "--convention",
            "gross_margin",
        ])
        .unwrap();
        assert_eq!(a.command, "calc");
        assert!(a.json);
        assert_eq!(a.convention, Some(MarginConvention::GrossMargin));
        assert_eq!(a.db, None);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(args(&["latest", "--quote", "abc"]).is_err());
        assert!(args(&["latest", "--quote"]).is_err());
        assert!(args(&["calc", "--fast"]).is_err());
        assert_eq!(args(&[]).unwrap().command, "help");
    }

    fn debug_enabled(log_filter: &str) -> bool {
        let settings = Settings {
            log_filter: log_filter.to_string(),
            ..Settings::default()
        };
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(settings_filter(&settings))
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::enabled!(tracing::Level::DEBUG)
        })
    }

    #[test]
    fn log_filter_setting_controls_level() {
        assert!(debug_enabled("debug"));
        assert!(!debug_enabled("info"));
        assert!(!debug_enabled("warn"));
    }

    #[tokio::test]
    async fn calc_runs_scenario_in_memory() {
        let scenario = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../assets/scenarios/postmaster_h_100ft.yaml");
        let a = Args {
            command: "calc".into(),
            scenario: Some(scenario),
            ..Args::default()
        };
        run(a, Settings::default()).await.unwrap();
    }

    #[tokio::test]
    async fn version_reports_build_metadata() {
        assert!(!env!("GIT_SHA").is_empty());
        assert!(!env!("BUILD_DATE").is_empty());
        let a = Args {
            command: "version".into(),
            ..Args::default()
        };
        run(a, Settings::default()).await.unwrap();
    }

    #[tokio::test]
    async fn calc_needs_an_input() {
        let a = Args {
            command: "calc".into(),
            db: Some("sqlite::memory:".into()),
            ..Args::default()
        };
        assert!(run(a, Settings::default()).await.is_err());
    }
}
