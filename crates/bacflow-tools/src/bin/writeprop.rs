use bacflow_client::{DataLinkAddress, Session};
use bacflow_core::types::{ObjectId, PropertyId};
use bacflow_tools::{parse_property, ObjectTypeArg, SessionArgs, ValueKind};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "bacflow-writeprop")]
struct Args {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long)]
    target: DataLinkAddress,
    #[arg(long, value_enum, default_value = "analog-value")]
    object_type: ObjectTypeArg,
    #[arg(long)]
    instance: u32,
    #[arg(long, value_parser = parse_property, default_value = "present-value")]
    property: PropertyId,
    #[arg(long, value_enum, default_value = "real")]
    kind: ValueKind,
    /// Value to write; repeat for a list.
    #[arg(long, required = true)]
    value: Vec<String>,
    /// Command priority 1..=16; 16 when omitted.
    #[arg(long)]
    priority: Option<u8>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let values = args
        .value
        .iter()
        .map(|raw| args.kind.parse(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let session = Session::bind(args.session.session_config()?).await?;

    let object_id = ObjectId::new(args.object_type.into_object_type(), args.instance);
    let result = session
        .write_property(args.target, object_id, args.property, args.priority, values)
        .await;
    session.close().await;

    match result {
        Ok(()) => println!("write acknowledged"),
        Err(e) => {
            eprintln!("write failed: {e}");
            std::process::exit(1);
        }
    }
    Ok(())
}
