//! rust_ccd command-line interface

use clap::Parser;
use log::{info, LevelFilter};

use rust_ccd::cli::{Cli, Commands};
use rust_ccd::prelude::*;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Find the first non-flag argument (potential subcommand)
    let first_positional = args.iter().skip(1).find(|a| !a.starts_with('-'));
    let subcommands = ["fit", "help"];
    let has_subcommand = first_positional.is_some_and(|a| subcommands.contains(&a.as_str()));

    if !has_subcommand {
        if args.len() == 1 {
            print_no_args();
            return;
        }
        if args.iter().any(|a| a == "--help") {
            print_long_help();
            return;
        }
        if args.iter().any(|a| a == "-h") {
            print_short_help();
            return;
        }
        if args.iter().any(|a| a == "-V" || a == "--version") {
            println!("rust_ccd {}", VERSION);
            return;
        }
        print_no_args();
        return;
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Some(Commands::Fit {
            input,
            outcome,
            stratum,
            time,
            offset,
            model,
            prior,
            variance,
            lambda,
            max_iterations,
            convergence,
            tolerance,
            initial_bound,
            ase,
            output,
            json,
            threads,
        }) => {
            let layout = DesignFileSpec {
                outcome,
                stratum,
                time,
                offset,
            };
            let options = FitOptions {
                model: &model,
                prior: &prior,
                variance,
                lambda,
                max_iterations,
                convergence: &convergence,
                tolerance,
                initial_bound,
                ase,
                output: &output,
                json,
                threads,
            };
            run_fit(&input, &layout, &options)
        }
        None => {
            print_no_args();
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Custom help output
// ---------------------------------------------------------------------------

fn print_no_args() {
    println!("rust_ccd v{}", VERSION);
    println!("Run `rust_ccd -h` for usage or `rust_ccd --help` for detailed information.");
}

fn print_short_help() {
    println!("rust_ccd v{}", VERSION);
    println!();
    println!("Usage: rust_ccd <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  fit        Fit a regularized regression model");
    println!();
    println!("Run `rust_ccd <COMMAND> -h` for command-specific options.");
}

fn print_long_help() {
    println!("rust_ccd v{}", VERSION);
    println!("Regularized generalized linear models by cyclic coordinate descent");
    println!();
    println!("Usage: rust_ccd <COMMAND> [OPTIONS]");
    println!();
    println!("Commands:");
    println!("  fit        Fit a regularized regression model");
    println!("               - Families: ls, pr, lr, clr, cpr, sccs, cox");
    println!("               - Priors: laplace (L1), normal (L2), none");
    println!("               - Convergence: gradient, mittal, lange, zhang_oles");
    println!("               - Asymptotic standard errors over non-zero coefficients");
    println!();
    println!("Global Options:");
    println!("  -v, --verbose    Enable verbose output");
    println!("  -h               Print short help");
    println!("      --help       Print detailed help");
    println!("  -V, --version    Print version");
    println!();
    println!("Examples:");
    println!("  rust_ccd fit -i design.csv -y outcome --model logistic --prior laplace --variance 1");
    println!();
    println!("  rust_ccd fit -i matched.tsv -y case --stratum set --model clr --ase -o coef.csv");
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

struct FitOptions<'a> {
    model: &'a str,
    prior: &'a str,
    variance: Option<f64>,
    lambda: Option<f64>,
    max_iterations: usize,
    convergence: &'a str,
    tolerance: f64,
    initial_bound: f64,
    ase: bool,
    output: &'a str,
    json: bool,
    threads: usize,
}

fn build_prior(prior: &str, variance: Option<f64>, lambda: Option<f64>) -> Result<PriorConfig> {
    let prior_type: PriorType = prior.parse()?;
    match (prior_type, lambda) {
        (PriorType::None, _) => Ok(PriorConfig::none()),
        (PriorType::Laplace, Some(l)) => PriorConfig::laplace_with_lambda(l),
        (_, Some(l)) => PriorConfig::new(prior_type, convert_hyperparameter_to_variance(l)),
        (_, None) => PriorConfig::new(prior_type, variance.unwrap_or(PriorConfig::default().variance())),
    }
}

fn run_fit(input: &str, layout: &DesignFileSpec, options: &FitOptions<'_>) -> Result<()> {
    if options.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .build_global()
            .ok();
    }

    // Reject bad names before reading any data
    let model_type: ModelType = options.model.parse()?;
    let convergence: ConvergenceType = options.convergence.parse()?;
    let prior = build_prior(options.prior, options.variance, options.lambda)?;
    let params = FitParams::new(options.max_iterations, convergence, options.tolerance);
    params.validate()?;

    info!("Reading design from {}", input);
    let data = read_design_matrix(input, layout)?;

    info!("Fitting {} model with prior {}", model_type, prior);
    let mut ccd = CyclicCoordinateDescent::with_model_type(&data, model_type, prior)?;
    ccd.set_initial_bound(options.initial_bound)?;
    let status = ccd.fit(&params)?;
    if !status.is_normal() {
        log::warn!("Fit ended with status {}; consider a stronger prior", status);
    }

    let report = ccd.report(options.ase)?;
    println!("{}", report.summary());

    if options.json {
        write_results_json(options.output, &report)?;
    } else {
        write_results(options.output, &report)?;
    }
    info!("Results written to {}", options.output);
    Ok(())
}
