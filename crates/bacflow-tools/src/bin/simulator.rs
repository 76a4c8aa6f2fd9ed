use bacflow_client::SimulatedDevice;
use bacflow_core::types::{ObjectId, ObjectType, PropertyId, PropertyValue};
use bacflow_datalink::{BacnetIpTransport, TransportConfig};
use clap::Parser;
use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Parser, Debug)]
#[command(name = "bacflow-simulator")]
struct Args {
    /// Device instance number.
    #[arg(long, default_value_t = 9999)]
    instance: u32,
    #[arg(long, default_value = "0.0.0.0")]
    interface: IpAddr,
    #[arg(long, default_value_t = 47808)]
    port: u16,
    /// Number of analog-value objects to create.
    #[arg(long, default_value_t = 3)]
    analog_values: u32,
    /// Number of binary-input objects to create.
    #[arg(long, default_value_t = 2)]
    binary_inputs: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let transport = BacnetIpTransport::bind(TransportConfig {
        interface: args.interface,
        port: args.port,
        ..TransportConfig::default()
    })
    .await?;
    let mut sim = SimulatedDevice::new(args.instance);

    for i in 0..args.analog_values {
        let mut props = HashMap::new();
        props.insert(
            PropertyId::ObjectName,
            PropertyValue::CharacterString(format!("AV-{i}")),
        );
        props.insert(PropertyId::PresentValue, PropertyValue::Real(0.0));
        props.insert(PropertyId::OutOfService, PropertyValue::Boolean(false));
        sim.add_object(ObjectId::new(ObjectType::AnalogValue, i), props);
    }

    for i in 0..args.binary_inputs {
        let mut props = HashMap::new();
        props.insert(
            PropertyId::ObjectName,
            PropertyValue::CharacterString(format!("BI-{i}")),
        );
        props.insert(PropertyId::PresentValue, PropertyValue::Enumerated(0));
        sim.add_object(ObjectId::new(ObjectType::BinaryInput, i), props);
    }

    println!(
        "Simulated device {} on {} ({} AV, {} BI). Ctrl+C to stop.",
        args.instance,
        transport.local_addr()?,
        args.analog_values,
        args.binary_inputs
    );
    sim.run(&transport).await?;
    Ok(())
}
