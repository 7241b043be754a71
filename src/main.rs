use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use recommendation_service::config::{context_for, init_tracing, ServiceConfig};
use recommendation_service::{Recommendation, ServiceError};

/// Bank product recommendation service: data import and rule administration
#[derive(Parser, Debug)]
#[command(name = "recommendation-service", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ServiceConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database schema
    Init,

    /// Import users, products and transactions from CSV files
    Import {
        #[arg(long)]
        users: Option<PathBuf>,

        #[arg(long)]
        products: Option<PathBuf>,

        #[arg(long)]
        transactions: Option<PathBuf>,
    },

    /// Print recommendations for a user, the way the chat bot sends them
    Recommend {
        user_name: String,
    },

    /// Print all dynamic rules as JSON
    Rules,

    /// Print the match counter of every dynamic rule
    Stats,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.config.log) {
        eprintln!("❌ {:#}", e);
        return ExitCode::from(2);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("❌ {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init => run_init(&cli.config),
        Commands::Import {
            users,
            products,
            transactions,
        } => run_import(&cli.config, users, products, transactions),
        Commands::Recommend { user_name } => run_recommend(&cli.config, &user_name),
        Commands::Rules => run_rules(&cli.config),
        Commands::Stats => run_stats(&cli.config),
    }
}

fn run_init(config: &ServiceConfig) -> Result<()> {
    println!("🔧 Setting up database...");
    config.open_database()?;
    println!("✓ Database initialized with WAL mode: {:?}", config.database);
    Ok(())
}

fn run_import(
    config: &ServiceConfig,
    users: Option<PathBuf>,
    products: Option<PathBuf>,
    transactions: Option<PathBuf>,
) -> Result<()> {
    if users.is_none() && products.is_none() && transactions.is_none() {
        anyhow::bail!("nothing to import: pass --users, --products and/or --transactions");
    }

    let db = config.open_database()?;

    // Users and products first so transactions can join against them
    if let Some(path) = users {
        println!("📂 Importing users from {:?}...", path);
        let n = db.import_users(&path)?;
        println!("✓ {} new users", n);
    }
    if let Some(path) = products {
        println!("📂 Importing products from {:?}...", path);
        let n = db.import_products(&path)?;
        println!("✓ {} new products", n);
    }
    if let Some(path) = transactions {
        println!("📂 Importing transactions from {:?}...", path);
        let n = db.import_transactions(&path)?;
        println!("✓ {} new transactions", n);
    }

    Ok(())
}

fn run_recommend(config: &ServiceConfig, user_name: &str) -> Result<()> {
    let db = config.open_database()?;
    let full_name = db.full_name(user_name)?;
    let ctx = context_for(db);

    match ctx.recommendations.recommend_for_user_name(user_name) {
        Ok(recommendations) => {
            let name = full_name.unwrap_or_else(|| user_name.to_string());
            println!("{}", bot_message(&name, &recommendations));
            Ok(())
        }
        Err(ServiceError::UserNotFound(_)) => {
            println!("User not found");
            Ok(())
        }
        Err(e) => Err(e).context("recommendation failed"),
    }
}

fn run_rules(config: &ServiceConfig) -> Result<()> {
    let ctx = config.build_context()?;
    let rules = ctx.rules.list_rules()?;
    println!("{}", serde_json::to_string_pretty(&rules)?);
    Ok(())
}

fn run_stats(config: &ServiceConfig) -> Result<()> {
    let ctx = config.build_context()?;
    let stats = ctx.rules.rule_stats()?;

    println!("📊 Rule match counters");
    println!("━━━━━━━━━━━━━━━━━━━━━━");
    if stats.is_empty() {
        println!("(no dynamic rules)");
    }
    for stat in stats {
        println!("rule {:>5}  {:>8}", stat.rule_id, stat.count);
    }
    Ok(())
}

/// Chat-bot reply: greeting line, then one "name\ntext" block per product
fn bot_message(full_name: &str, recommendations: &[Recommendation]) -> String {
    let mut message = format!("Recommendations for {}:\n", full_name);
    if recommendations.is_empty() {
        message.push_str("No suitable products found for this user");
        return message;
    }
    for recommendation in recommendations {
        message.push_str(&recommendation.to_string());
        message.push('\n');
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_import() {
        let cli = Cli::try_parse_from([
            "recommendation-service",
            "--database",
            "bank.db",
            "import",
            "--users",
            "users.csv",
        ])
        .unwrap();

        assert_eq!(cli.config.database, PathBuf::from("bank.db"));
        match cli.command {
            Commands::Import { users, products, .. } => {
                assert_eq!(users, Some(PathBuf::from("users.csv")));
                assert!(products.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_requires_user_name() {
        assert!(Cli::try_parse_from(["recommendation-service", "recommend"]).is_err());
    }

    #[test]
    fn test_bot_message() {
        let recs = vec![
            Recommendation::new("1", "Invest 500", "Open an account"),
            Recommendation::new("2", "Top Saving", "Save more"),
        ];
        assert_eq!(
            bot_message("John Doe", &recs),
            "Recommendations for John Doe:\nInvest 500\nOpen an account\nTop Saving\nSave more\n"
        );
        assert_eq!(
            bot_message("John Doe", &[]),
            "Recommendations for John Doe:\nNo suitable products found for this user"
        );
    }
}
