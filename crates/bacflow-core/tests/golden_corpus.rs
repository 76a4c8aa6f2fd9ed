use bacflow_core::codec::{decode_npdu_frame, ConfirmedService, DecodedFrame, ServiceAck};
use bacflow_core::types::{ErrorClass, ErrorCode, PropertyValue, Segmentation};
use std::fs;
use std::path::{Path, PathBuf};

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/golden")
}

fn parse_hex_fixture(path: &Path) -> Vec<u8> {
    let content = fs::read_to_string(path).expect("fixture must be readable");
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(str::split_whitespace)
        .map(|token| {
            u8::from_str_radix(token, 16)
                .unwrap_or_else(|_| panic!("invalid hex token '{token}' in {}", path.display()))
        })
        .collect()
}

fn load(name: &str) -> DecodedFrame {
    let bytes = parse_hex_fixture(&fixture_dir().join(name));
    decode_npdu_frame(&bytes)
        .unwrap_or_else(|e| panic!("{name}: {e}"))
        .frame
}

#[test]
fn every_fixture_decodes_to_a_known_frame() {
    let mut files = fs::read_dir(fixture_dir())
        .expect("fixtures directory should exist")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "hex"))
        .collect::<Vec<_>>();
    files.sort();
    assert!(!files.is_empty());

    for path in files {
        let bytes = parse_hex_fixture(&path);
        let inbound = decode_npdu_frame(&bytes)
            .unwrap_or_else(|e| panic!("{} failed to decode: {e}", path.display()));
        assert!(
            !matches!(inbound.frame, DecodedFrame::Unrecognized { .. }),
            "{} decoded as unrecognized",
            path.display()
        );
    }
}

#[test]
fn i_am_fixture_fields() {
    match load("i_am_device_15.hex") {
        DecodedFrame::IAm(iam) => {
            assert_eq!(iam.device_id.instance(), 15);
            assert_eq!(iam.max_apdu, 1476);
            assert_eq!(iam.segmentation, Segmentation::None);
            assert_eq!(iam.vendor_id, 260);
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[test]
fn routed_i_am_exposes_source_network() {
    let bytes = parse_hex_fixture(&fixture_dir().join("i_am_routed_device_25.hex"));
    let inbound = decode_npdu_frame(&bytes).unwrap();
    let source = inbound.npdu.source.expect("routed frame carries SNET/SADR");
    assert_eq!(source.network, 5);
    assert_eq!(source.mac(), &[0x0A]);
    assert!(matches!(inbound.frame, DecodedFrame::IAm(iam) if iam.device_id.instance() == 25));
}

#[test]
fn read_property_ack_fixture_value() {
    match load("read_property_ack_present_value.hex") {
        DecodedFrame::ComplexAck {
            invoke_id: 5,
            service: ConfirmedService::ReadProperty,
            ack: ServiceAck::ReadProperty(ack),
        } => assert_eq!(ack.value, PropertyValue::Real(72.5)),
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[test]
fn response_fixtures_map_to_their_variants() {
    assert_eq!(
        load("error_unknown_property.hex"),
        DecodedFrame::Error {
            invoke_id: 2,
            service: ConfirmedService::ReadProperty,
            class: ErrorClass::Property,
            code: ErrorCode::UnknownProperty,
        }
    );
    assert_eq!(
        load("simple_ack_write_property.hex"),
        DecodedFrame::SimpleAck {
            invoke_id: 3,
            service: ConfirmedService::WriteProperty,
        }
    );
    assert_eq!(
        load("reject_unrecognized_service.hex"),
        DecodedFrame::Reject {
            invoke_id: 4,
            reason: 9,
        }
    );
    assert_eq!(
        load("abort_segmentation_not_supported.hex"),
        DecodedFrame::Abort {
            invoke_id: 6,
            reason: 4,
            server: true,
        }
    );
}
