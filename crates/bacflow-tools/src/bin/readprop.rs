use bacflow_client::{DataLinkAddress, Session};
use bacflow_core::types::{ObjectId, PropertyId};
use bacflow_tools::{parse_property, ObjectTypeArg, SessionArgs};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "bacflow-readprop")]
struct Args {
    #[command(flatten)]
    session: SessionArgs,
    /// Device station as `ip` or `ip:port`.
    #[arg(long)]
    target: DataLinkAddress,
    #[arg(long, value_enum, default_value = "device")]
    object_type: ObjectTypeArg,
    #[arg(long, default_value_t = 0)]
    instance: u32,
    #[arg(long, value_parser = parse_property, default_value = "object-name")]
    property: PropertyId,
    #[arg(long)]
    index: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let session = Session::bind(args.session.session_config()?).await?;

    let object_id = ObjectId::new(args.object_type.into_object_type(), args.instance);
    let result = session
        .read_property(args.target, object_id, args.property, args.index)
        .await;
    session.close().await;

    match result {
        Ok(v) if args.session.json => println!("{}", serde_json::to_string_pretty(&v)?),
        Ok(v) => println!("value: {v:?}"),
        Err(e) => {
            eprintln!("read failed: {e}");
            std::process::exit(1);
        }
    }
    Ok(())
}
