use bacflow_client::{DataLinkAddress, Session};
use bacflow_core::services::{PropertyReference, ReadAccessSpec, ReadResult};
use bacflow_core::types::{ObjectId, PropertyId};
use bacflow_tools::{parse_property, ObjectTypeArg, SessionArgs};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "bacflow-readpropm")]
struct Args {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long)]
    target: DataLinkAddress,
    #[arg(long, value_enum, default_value = "device")]
    object_type: ObjectTypeArg,
    #[arg(long, default_value_t = 0)]
    instance: u32,
    /// Properties to read; repeat the flag for each one.
    #[arg(
        long = "property",
        value_parser = parse_property,
        default_values = ["object-name", "vendor-identifier"]
    )]
    properties: Vec<PropertyId>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let session = Session::bind(args.session.session_config()?).await?;

    let spec = ReadAccessSpec {
        object_id: ObjectId::new(args.object_type.into_object_type(), args.instance),
        properties: args
            .properties
            .iter()
            .copied()
            .map(PropertyReference::new)
            .collect(),
    };
    let result = session.read_property_multiple(args.target, vec![spec]).await;
    session.close().await;

    let results = match result {
        Ok(results) => results,
        Err(e) => {
            eprintln!("read failed: {e}");
            std::process::exit(1);
        }
    };
    if args.session.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    for access in &results {
        println!("{:?} {}", access.object_id.object_type(), access.object_id.instance());
        for item in &access.results {
            match &item.result {
                ReadResult::Value(v) => println!("  {:?}: {v:?}", item.property_id),
                ReadResult::Error { class, code } => {
                    println!("  {:?}: error {class:?}/{code:?}", item.property_id)
                }
            }
        }
    }
    Ok(())
}
