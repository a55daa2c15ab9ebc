//! Laziness demo - greets the current user according to the time of day.
//!
//! The greeting is assembled from lazy values wrapping shell commands
//! (`whoami`, `date`). Building it runs nothing; awaiting it runs exactly the
//! commands the chosen greeting needs.

mod exec;
mod greet;

use std::collections::HashMap;

use clap::Parser;
use laziness::Value;
use tracing_subscriber::EnvFilter;

use greet::GreetOptions;

#[derive(Parser, Debug)]
#[command(name = "laziness-demo")]
#[command(about = "Greets you, computing only what the greeting needs")]
#[command(version)]
struct Args {
    /// Hours strictly after this one count as evening
    #[arg(long, value_name = "HOUR", default_value_t = 14)]
    evening_after: u32,

    /// Name to greet instead of asking `whoami`
    #[arg(short, long)]
    name: Option<String>,

    /// Finish with a JSON report instead of "Done."
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut options = GreetOptions::new().evening_after(args.evening_after);
    if let Some(name) = args.name {
        options = options.name(name);
    }

    // Nothing has run yet; this only builds the graph.
    let greeting = greet::greet(&exec::exec(), &options);

    println!("Waking up.");
    let line = greeting.await?;
    tracing::info!("Greeting delivered: {}", line);

    if args.json {
        let report = Value::Object(HashMap::from([
            ("greeting".to_string(), Value::from(line)),
            (
                "evening_after".to_string(),
                Value::from(f64::from(args.evening_after)),
            ),
        ]));
        println!("{}", report.to_json());
    } else {
        println!("Done.");
    }

    Ok(())
}
