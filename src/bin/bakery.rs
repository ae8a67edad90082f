use std::env;
use std::process;

use colored::Colorize;

use bakery::config::USAGE;
use bakery::{parse_args, BakeryError, Coordinator, Invocation, RunSummary};

fn print_summary(summary: &RunSummary) {
    println!(
        "{} {} monitor iterations, {} worker cycles in {:.2?}",
        "done:".green().bold(),
        summary.monitor.iterations,
        summary.total_cycles(),
        summary.elapsed
    );
    for report in &summary.workers {
        println!("  worker {:>3}: {} cycles", report.id, report.cycles);
    }
    let starved = summary.starved();
    if !starved.is_empty() {
        println!("{} {:?}", "never entered:".yellow(), starved);
    }
}

fn run() -> Result<(), BakeryError> {
    let config = match parse_args(env::args().skip(1))? {
        Invocation::Run(config) => config,
        Invocation::Help => {
            println!("{USAGE}");
            return Ok(());
        }
    };

    let summary = Coordinator::new(config).run()?;
    print_summary(&summary);
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        let label = if err.is_invariant_violation() {
            "invariant violated:"
        } else {
            "error:"
        };
        eprintln!("{} {err}", label.red().bold());
        if matches!(err, BakeryError::Config(_)) {
            eprintln!("\n{USAGE}");
        }
        process::exit(err.exit_code());
    }
}
