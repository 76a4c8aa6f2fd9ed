use bacflow_client::{DataLinkAddress, DiscoverRequest, Session};
use bacflow_tools::SessionArgs;
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "bacflow-whois")]
struct Args {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long)]
    low: Option<u32>,
    #[arg(long)]
    high: Option<u32>,
    /// Send the Who-Is to one station instead of broadcasting it.
    #[arg(long)]
    target: Option<DataLinkAddress>,
    /// How long to collect I-Am answers, in milliseconds.
    #[arg(long, default_value_t = 3000)]
    window_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let session = Session::bind(args.session.session_config()?).await?;

    let request = DiscoverRequest {
        low_limit: args.low,
        high_limit: args.high,
        address: args.target,
        window: Duration::from_millis(args.window_ms),
    };
    let devices = session.discover(request).await?;
    if args.session.json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else {
        for d in &devices {
            println!(
                "device {} at {} (max apdu {}, {:?}, vendor {})",
                d.device_id, d.address, d.max_apdu_length, d.segmentation, d.vendor_id
            );
        }
    }
    session.close().await;
    Ok(())
}
