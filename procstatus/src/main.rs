use chrono::TimeDelta;
use processing_status::{Clock, StatusConfig, connect, watermark_calculator};
use std::collections::HashMap;
use std::env;
use std::error::Error;
use std::sync::Arc;
use tracing::{error, info};

mod cmdline;
mod setup_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_tracing::register();

    if let Err(e) = run().await {
        error!("{e:?}");
        return Err(e);
    }
    info!("Exiting...");

    Ok(())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = cmdline::root_cli().get_matches();

    let env_vars: HashMap<String, String> = env::vars().collect();
    let config = StatusConfig::load(env_vars)?;
    let status_store = connect(&config).await?;

    match cli.subcommand() {
        Some(("watermark", args)) => {
            let calculator = watermark_calculator(Arc::clone(&status_store), &config)?;
            let now = status_store.clock().now_utc();
            let threshold = match args.get_one::<u64>("threshold-ms") {
                Some(millis) => TimeDelta::try_milliseconds(i64::try_from(*millis)?)
                    .ok_or("threshold out of range")?,
                None => TimeDelta::from_std(config.update_threshold)?,
            };
            let cutoff = args
                .get_one::<f64>("cutoff")
                .copied()
                .unwrap_or(config.journal_write_rate_threshold);

            let watermark = calculator
                .earliest_post_indexing_timestamp_at(now, threshold, cutoff)
                .await?;
            match watermark {
                Some(watermark) => println!("{}", watermark.to_rfc3339()),
                None => println!("none"),
            }
        }
        Some(("list", _)) => {
            for record in status_store.all().await? {
                println!("{}", serde_json::to_string(&record.to_document()?)?);
            }
        }
        Some(("local", _)) => match status_store.get_for_local_node().await? {
            Some(record) => println!("{}", serde_json::to_string(&record.to_document()?)?),
            None => println!("none"),
        },
        other => return Err(format!("unknown subcommand {other:?}").into()),
    }

    Ok(())
}
