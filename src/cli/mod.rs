//! Command-line interface for rust_ccd

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rust_ccd")]
#[command(version)]
#[command(about = "Regularized GLM fitting by cyclic coordinate descent")]
#[command(disable_help_flag = true)]
#[command(disable_version_flag = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit a regularized regression model
    #[command(
        about = "Fit a regularized regression model",
        long_about = "Fit a regularized regression model\n\n\
            Reads a design file, fits the chosen model family under a Laplace (L1),\n\
            Normal (L2) or flat prior by cyclic coordinate descent, and writes one\n\
            row per coefficient. Optional asymptotic standard errors come from the\n\
            inverse Fisher information over the non-zero coefficients.",
        after_long_help = "\
Examples:
  # Lasso logistic regression
  rust_ccd fit -i design.csv -y outcome --model logistic --prior laplace --variance 1 -o coef.csv

  # Conditional logistic regression on matched sets with standard errors
  rust_ccd fit -i matched.tsv -y case --stratum set --model clr --prior normal --ase

  # Poisson regression with an offset column and no penalty
  rust_ccd fit -i counts.csv -y events --offset log_time --model poisson --prior none --json"
    )]
    Fit {
        /// Path to design file (CSV or TSV)
        #[arg(short, long,
            long_help = "Path to design file.\n\
                Format: header row of column names, one observation per row.\n\
                Supports both CSV (comma) and TSV (tab) delimiters (auto-detected).\n\
                Every column other than outcome/stratum/time is a covariate.")]
        input: String,

        /// Outcome column name [default: y]
        #[arg(short = 'y', long, default_value = "y")]
        outcome: String,

        /// Stratum id column (conditional models)
        #[arg(long, value_name = "COLUMN",
            long_help = "Column holding stratum (matched set) ids.\n\
                Required for clr, cpr and sccs. Rows of one stratum must be contiguous.")]
        stratum: Option<String>,

        /// Exposure or survival time column
        #[arg(long, value_name = "COLUMN",
            long_help = "Column holding exposure time (poisson, sccs) or survival\n\
                time (cox). For cox, rows must be sorted by decreasing time.")]
        time: Option<String>,

        /// Offset covariate column (coefficient fixed at 1)
        #[arg(long, value_name = "COLUMN")]
        offset: Option<String>,

        /// Model family [default: logistic]
        #[arg(short, long, default_value = "logistic",
            long_help = "Regression family.\n\
                ls:      least squares\n\
                pr:      Poisson\n\
                lr:      logistic\n\
                clr:     conditional logistic (needs --stratum)\n\
                cpr:     conditional Poisson (needs --stratum)\n\
                sccs:    self-controlled case series (needs --stratum, --time)\n\
                cox:     Cox proportional hazards (needs --time)")]
        model: String,

        /// Prior type [default: laplace]
        #[arg(short, long, default_value = "laplace",
            long_help = "Prior on every coefficient.\n\
                laplace: L1 penalty, produces exact zeros\n\
                normal:  L2 (ridge) penalty\n\
                none:    unpenalized maximum likelihood")]
        prior: String,

        /// Prior variance [default: 20]
        #[arg(long, conflicts_with = "lambda")]
        variance: Option<f64>,

        /// Laplace scale (lambda = sqrt(2 / variance))
        #[arg(long)]
        lambda: Option<f64>,

        /// Maximum sweeps [default: 1000]
        #[arg(long, default_value = "1000")]
        max_iterations: usize,

        /// Convergence criterion [default: gradient]
        #[arg(long, default_value = "gradient",
            long_help = "Convergence criterion.\n\
                gradient:   relative change of sum(eta * y)\n\
                mittal:     relative change of the log-likelihood\n\
                lange:      relative change of the log posterior\n\
                zhang_oles: relative change of the linear predictor")]
        convergence: String,

        /// Convergence tolerance [default: 1e-6]
        #[arg(long, default_value = "1e-6")]
        tolerance: f64,

        /// Initial trust-region bound [default: 2.0]
        #[arg(long, default_value = "2.0")]
        initial_bound: f64,

        /// Report asymptotic standard errors
        #[arg(long)]
        ase: bool,

        /// Output file path [default: ccd_results.csv]
        #[arg(short, long, default_value = "ccd_results.csv")]
        output: String,

        /// Write JSON instead of CSV
        #[arg(long)]
        json: bool,

        /// Number of threads (0 = auto) [default: 0]
        #[arg(short = 't', long, default_value = "0")]
        threads: usize,
    },
}
