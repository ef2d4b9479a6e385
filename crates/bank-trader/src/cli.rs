use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bank-trader")]
#[command(about = "Daily BUY/SELL/HOLD signals for the big ASX banks, with outcome tracking")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Latest price for one symbol from the configured providers
    Quote {
        /// ASX code, e.g. CBA or CBA.AX
        symbol: String,
    },

    /// Score symbols and store one prediction each
    Predict {
        /// Comma-separated symbols (default: WATCHLIST)
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,

        /// JSON array of news articles to feed the sentiment engine
        #[arg(long)]
        news_file: Option<PathBuf>,
    },

    /// Record outcomes for predictions past their horizon
    Evaluate {
        /// Override EVALUATION_HORIZON_HOURS
        #[arg(long)]
        horizon_hours: Option<i64>,
    },

    /// Count integrity violations in the database
    Audit,

    /// Normalise legacy rows and recompute derived outcome fields
    Repair {
        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Merge another database file into the configured one
    Consolidate { other_db: String },

    /// Compare table row counts with another database file
    Compare { other_db: String },

    /// Generate synthetic enhanced outcomes for unlabelled feature rows
    Synthesize {
        #[arg(long, default_value = "42")]
        seed: u64,

        #[arg(long, default_value = "1000")]
        limit: i64,
    },

    /// Performance, calibration and integrity report
    Report {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// Predictions considered for the all-HOLD check
        #[arg(long, default_value = "100")]
        hold_window: i64,
    },

    /// Serve the read-only JSON dashboard
    Serve {
        /// Override DASHBOARD_ADDR
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_predict_symbols() {
        let cli = Cli::try_parse_from(["bank-trader", "predict", "--symbols", "CBA,WBC"]).unwrap();
        match cli.command {
            Command::Predict { symbols, news_file } => {
                assert_eq!(symbols, vec!["CBA", "WBC"]);
                assert!(news_file.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_defaults_and_errors() {
        let cli = Cli::try_parse_from(["bank-trader", "synthesize"]).unwrap();
        assert!(matches!(cli.command, Command::Synthesize { seed: 42, limit: 1000 }));

        let cli = Cli::try_parse_from(["bank-trader", "repair", "--dry-run"]).unwrap();
        assert!(matches!(cli.command, Command::Repair { dry_run: true }));

        assert!(Cli::try_parse_from(["bank-trader", "serve", "--addr", "not-an-addr"]).is_err());
        assert!(Cli::try_parse_from(["bank-trader", "compare"]).is_err());
    }
}
