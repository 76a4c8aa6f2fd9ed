use bacflow_core::codec::{encode, encode_unconfirmed_request, ServiceRequest, UnconfirmedRequest};
use bacflow_core::npdu::Npdu;
use bacflow_core::services::{
    PropertyReference, PropertyWrite, ReadAccessSpec, ReadPropertyMultipleRequest,
    ReadPropertyRequest, WhoIsRequest, WriteAccessSpec, WritePropertyMultipleRequest,
    WritePropertyRequest,
};
use bacflow_core::types::{ObjectId, ObjectType, PropertyId, PropertyValue};

#[test]
fn who_is_global_frame_matches_fixture() {
    let request = UnconfirmedRequest::WhoIs(WhoIsRequest::global());
    let bytes = encode_unconfirmed_request(&Npdu::local(), &request).unwrap();
    assert_eq!(bytes, [0x01, 0x00, 0x10, 0x08]);
}

#[test]
fn who_is_ranged_frame_matches_fixture() {
    let bytes = encode_unconfirmed_request(
        &Npdu::local(),
        &UnconfirmedRequest::WhoIs(WhoIsRequest::ranged(Some(10), Some(20))),
    )
    .unwrap();
    assert_eq!(bytes, [0x01, 0x00, 0x10, 0x08, 0x09, 0x0A, 0x19, 0x14]);
}

#[test]
fn read_property_frame_matches_fixture() {
    let bytes = encode(
        1,
        &ServiceRequest::ReadProperty(ReadPropertyRequest {
            object_id: ObjectId::device(123),
            property_id: PropertyId::ObjectName,
            array_index: None,
        }),
    )
    .unwrap();
    assert_eq!(
        bytes,
        [0x01, 0x04, 0x00, 0x05, 0x01, 0x0C, 0x0C, 0x02, 0x00, 0x00, 0x7B, 0x19, 0x4D]
    );
}

#[test]
fn write_property_frame_matches_fixture() {
    let bytes = encode(
        3,
        &ServiceRequest::WriteProperty(WritePropertyRequest {
            object_id: ObjectId::new(ObjectType::AnalogValue, 1),
            property_id: PropertyId::PresentValue,
            array_index: None,
            values: vec![PropertyValue::Real(72.5)],
            priority: Some(8),
        }),
    )
    .unwrap();
    assert_eq!(
        bytes,
        [
            0x01, 0x04, 0x00, 0x05, 0x03, 0x0F, 0x0C, 0x00, 0x80, 0x00, 0x01, 0x19, 0x55, 0x3E,
            0x44, 0x42, 0x91, 0x00, 0x00, 0x3F, 0x49, 0x08,
        ]
    );
}

#[test]
fn read_property_multiple_frame_matches_fixture() {
    let bytes = encode(
        4,
        &ServiceRequest::ReadPropertyMultiple(ReadPropertyMultipleRequest {
            specs: vec![ReadAccessSpec {
                object_id: ObjectId::new(ObjectType::AnalogInput, 3),
                properties: vec![PropertyReference::new(PropertyId::PresentValue)],
            }],
        }),
    )
    .unwrap();
    assert_eq!(
        bytes,
        [
            0x01, 0x04, 0x00, 0x05, 0x04, 0x0E, 0x0C, 0x00, 0x00, 0x00, 0x03, 0x1E, 0x09, 0x55,
            0x1F,
        ]
    );
}

#[test]
fn write_property_multiple_frame_matches_fixture() {
    let bytes = encode(
        5,
        &ServiceRequest::WritePropertyMultiple(WritePropertyMultipleRequest {
            specs: vec![WriteAccessSpec {
                object_id: ObjectId::new(ObjectType::AnalogOutput, 1),
                properties: vec![PropertyWrite {
                    property_id: PropertyId::PresentValue,
                    array_index: None,
                    value: PropertyValue::Real(55.0),
                    priority: Some(8),
                }],
            }],
        }),
    )
    .unwrap();
    assert_eq!(
        bytes,
        [
            0x01, 0x04, 0x00, 0x05, 0x05, 0x10, 0x0C, 0x00, 0x40, 0x00, 0x01, 0x1E, 0x09, 0x55,
            0x2E, 0x44, 0x42, 0x5C, 0x00, 0x00, 0x2F, 0x39, 0x08, 0x1F,
        ]
    );
}
