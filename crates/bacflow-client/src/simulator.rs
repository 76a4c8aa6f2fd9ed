//! Lightweight simulated BACnet device.
//!
//! [`SimulatedDevice`] answers Who-Is, ReadProperty, WriteProperty,
//! ReadPropertyMultiple and WritePropertyMultiple. Useful for testing and
//! development without physical hardware.

use crate::ClientError;
use bacflow_core::apdu::{ComplexAckHeader, ErrorPdu, SimpleAck};
use bacflow_core::codec::{
    decode_npdu_frame, encode_frame, encode_unconfirmed_request, DecodedFrame, ServiceRequest,
    UnconfirmedRequest,
};
use bacflow_core::npdu::Npdu;
use bacflow_core::services::{
    IAmRequest, PropertyResult, ReadAccessResult, ReadPropertyAck, ReadPropertyMultipleAck,
    ReadResult, SERVICE_READ_PROPERTY, SERVICE_READ_PROPERTY_MULTIPLE,
};
use bacflow_core::types::{
    ErrorClass, ErrorCode, ObjectId, ObjectType, PropertyId, PropertyValue, Segmentation,
};
use bacflow_core::EncodeError;
use bacflow_datalink::{DataLink, DataLinkError};
use std::collections::{BTreeMap, HashMap};

type Failure = (ErrorClass, ErrorCode);

const SIM_VENDOR_ID: u32 = 999;
const SIM_MAX_APDU: u32 = 1476;

/// A simulated BACnet device. Writes ignore priority; no priority arrays
/// are kept.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    device_id: ObjectId,
    vendor_id: u32,
    objects: BTreeMap<ObjectId, HashMap<PropertyId, PropertyValue>>,
}

impl SimulatedDevice {
    /// Create a new simulated device with the given instance number.
    pub fn new(instance: u32) -> Self {
        let device_id = ObjectId::device(instance);
        let mut props = HashMap::new();
        props.insert(
            PropertyId::ObjectIdentifier,
            PropertyValue::ObjectId(device_id),
        );
        props.insert(
            PropertyId::ObjectName,
            PropertyValue::CharacterString(format!("SimDevice-{instance}")),
        );
        props.insert(
            PropertyId::ObjectType,
            PropertyValue::Enumerated(ObjectType::Device.to_raw() as u32),
        );
        props.insert(
            PropertyId::VendorIdentifier,
            PropertyValue::Unsigned(SIM_VENDOR_ID),
        );
        props.insert(
            PropertyId::MaxApduLengthAccepted,
            PropertyValue::Unsigned(SIM_MAX_APDU),
        );
        props.insert(
            PropertyId::SegmentationSupported,
            PropertyValue::Enumerated(Segmentation::None.to_raw()),
        );

        let mut device = Self {
            device_id,
            vendor_id: SIM_VENDOR_ID,
            objects: BTreeMap::new(),
        };
        device.objects.insert(device_id, props);
        device.refresh_object_list();
        device
    }

    pub fn with_vendor_id(mut self, vendor_id: u32) -> Self {
        self.vendor_id = vendor_id;
        self.set_device_property(PropertyId::VendorIdentifier, PropertyValue::Unsigned(vendor_id));
        self
    }

    pub fn instance(&self) -> u32 {
        self.device_id.instance()
    }

    /// Add an object with its properties. Identifier and type are filled in.
    pub fn add_object(
        &mut self,
        id: ObjectId,
        mut properties: HashMap<PropertyId, PropertyValue>,
    ) {
        properties
            .entry(PropertyId::ObjectIdentifier)
            .or_insert(PropertyValue::ObjectId(id));
        properties
            .entry(PropertyId::ObjectType)
            .or_insert(PropertyValue::Enumerated(id.object_type().to_raw() as u32));
        self.objects.insert(id, properties);
        self.refresh_object_list();
    }

    pub fn property(&self, object_id: ObjectId, property_id: PropertyId) -> Option<&PropertyValue> {
        self.objects.get(&object_id)?.get(&property_id)
    }

    pub fn i_am(&self) -> IAmRequest {
        IAmRequest {
            device_id: self.device_id,
            max_apdu: SIM_MAX_APDU,
            segmentation: Segmentation::None,
            vendor_id: self.vendor_id,
        }
    }

    /// Builds the reply to one inbound NPDU, if it warrants one.
    pub fn respond(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        let inbound = match decode_npdu_frame(frame) {
            Ok(pdu) => pdu,
            Err(e) => {
                log::debug!("simulator: dropping frame: {e}");
                return None;
            }
        };
        // Replies to routed requests go back through the router.
        let npdu = Npdu::routed(inbound.npdu.source);
        let reply = match inbound.frame {
            DecodedFrame::WhoIs(req) if req.matches(self.instance()) => {
                encode_unconfirmed_request(&npdu, &UnconfirmedRequest::IAm(self.i_am()))
            }
            DecodedFrame::ConfirmedRequest { invoke_id, request } => {
                self.answer(&npdu, invoke_id, request)
            }
            _ => return None,
        };
        match reply {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log::warn!("simulator: could not encode reply: {e}");
                None
            }
        }
    }

    /// Run the device loop, responding to incoming requests until the data
    /// link closes.
    pub async fn run<D: DataLink>(&mut self, datalink: &D) -> Result<(), ClientError> {
        let mut buf = [0u8; 1600];
        loop {
            let (n, source) = match datalink.recv(&mut buf).await {
                Ok(v) => v,
                Err(DataLinkError::Closed) => return Ok(()),
                Err(e) if e.is_frame_error() => {
                    log::debug!("simulator: {e}");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if let Some(reply) = self.respond(&buf[..n]) {
                datalink.send(source, &reply).await?;
            }
        }
    }

    fn answer(
        &mut self,
        npdu: &Npdu,
        invoke_id: u8,
        request: ServiceRequest,
    ) -> Result<Vec<u8>, EncodeError> {
        let service = request.service().code();
        let failure = match request {
            ServiceRequest::ReadProperty(req) => {
                match self.read(req.object_id, req.property_id, req.array_index) {
                    Ok(value) => {
                        let ack = ReadPropertyAck {
                            object_id: req.object_id,
                            property_id: req.property_id,
                            array_index: req.array_index,
                            value,
                        };
                        return encode_frame(npdu, |w| {
                            ComplexAckHeader::unsegmented(invoke_id, SERVICE_READ_PROPERTY)
                                .encode(w)?;
                            ack.encode(w)
                        });
                    }
                    Err(failure) => failure,
                }
            }
            ServiceRequest::WriteProperty(req) => {
                let value = PropertyValue::from_items(req.values);
                match self.write(req.object_id, req.property_id, req.array_index, value) {
                    Ok(()) => return simple_ack(npdu, invoke_id, service),
                    Err(failure) => failure,
                }
            }
            ServiceRequest::ReadPropertyMultiple(req) => {
                let results = req
                    .specs
                    .iter()
                    .map(|spec| ReadAccessResult {
                        object_id: spec.object_id,
                        results: spec
                            .properties
                            .iter()
                            .map(|prop| PropertyResult {
                                property_id: prop.property_id,
                                array_index: prop.array_index,
                                result: match self.read(
                                    spec.object_id,
                                    prop.property_id,
                                    prop.array_index,
                                ) {
                                    Ok(value) => ReadResult::Value(value),
                                    Err((class, code)) => ReadResult::Error { class, code },
                                },
                            })
                            .collect(),
                    })
                    .collect();
                let ack = ReadPropertyMultipleAck { results };
                return encode_frame(npdu, |w| {
                    ComplexAckHeader::unsegmented(invoke_id, SERVICE_READ_PROPERTY_MULTIPLE)
                        .encode(w)?;
                    ack.encode(w)
                });
            }
            ServiceRequest::WritePropertyMultiple(req) => {
                let outcome = req.specs.into_iter().try_for_each(|spec| {
                    spec.properties.into_iter().try_for_each(|prop| {
                        self.write(spec.object_id, prop.property_id, prop.array_index, prop.value)
                    })
                });
                match outcome {
                    Ok(()) => return simple_ack(npdu, invoke_id, service),
                    Err(failure) => failure,
                }
            }
        };

        let (error_class, error_code) = failure;
        encode_frame(npdu, |w| {
            ErrorPdu {
                invoke_id,
                service_choice: service,
                error_class,
                error_code,
            }
            .encode(w)
        })
    }

    fn read(
        &self,
        object_id: ObjectId,
        property_id: PropertyId,
        array_index: Option<u32>,
    ) -> Result<PropertyValue, Failure> {
        let object = self
            .objects
            .get(&object_id)
            .ok_or((ErrorClass::Object, ErrorCode::UnknownObject))?;
        let value = object
            .get(&property_id)
            .ok_or((ErrorClass::Property, ErrorCode::UnknownProperty))?;
        match (array_index, value) {
            (None, value) => Ok(value.clone()),
            (Some(0), PropertyValue::List(items)) => {
                Ok(PropertyValue::Unsigned(items.len() as u32))
            }
            (Some(index), PropertyValue::List(items)) => items
                .get(index as usize - 1)
                .cloned()
                .ok_or((ErrorClass::Property, ErrorCode::InvalidArrayIndex)),
            (Some(_), _) => Err((ErrorClass::Property, ErrorCode::PropertyIsNotAnArray)),
        }
    }

    fn write(
        &mut self,
        object_id: ObjectId,
        property_id: PropertyId,
        array_index: Option<u32>,
        value: PropertyValue,
    ) -> Result<(), Failure> {
        if matches!(
            property_id,
            PropertyId::ObjectIdentifier | PropertyId::ObjectType | PropertyId::ObjectList
        ) {
            return Err((ErrorClass::Property, ErrorCode::WriteAccessDenied));
        }
        let object = self
            .objects
            .get_mut(&object_id)
            .ok_or((ErrorClass::Object, ErrorCode::UnknownObject))?;
        let slot = object
            .get_mut(&property_id)
            .ok_or((ErrorClass::Property, ErrorCode::UnknownProperty))?;
        match (array_index, slot) {
            (None, slot) => *slot = value,
            (Some(index), PropertyValue::List(items)) if index >= 1 => {
                let item = items
                    .get_mut(index as usize - 1)
                    .ok_or((ErrorClass::Property, ErrorCode::InvalidArrayIndex))?;
                *item = value;
            }
            (Some(0), PropertyValue::List(_)) => {
                return Err((ErrorClass::Property, ErrorCode::WriteAccessDenied))
            }
            (Some(_), _) => return Err((ErrorClass::Property, ErrorCode::PropertyIsNotAnArray)),
        }
        if object_id == self.device_id && property_id == PropertyId::VendorIdentifier {
            if let Some(vendor_id) = self
                .property(object_id, property_id)
                .and_then(PropertyValue::as_u32)
            {
                self.vendor_id = vendor_id;
            }
        }
        Ok(())
    }

    fn set_device_property(&mut self, property_id: PropertyId, value: PropertyValue) {
        if let Some(device) = self.objects.get_mut(&self.device_id) {
            device.insert(property_id, value);
        }
    }

    fn refresh_object_list(&mut self) {
        let list = self.objects.keys().copied().map(PropertyValue::ObjectId).collect();
        self.set_device_property(PropertyId::ObjectList, PropertyValue::List(list));
    }
}

fn simple_ack(npdu: &Npdu, invoke_id: u8, service_choice: u8) -> Result<Vec<u8>, EncodeError> {
    encode_frame(npdu, |w| {
        SimpleAck {
            invoke_id,
            service_choice,
        }
        .encode(w)
    })
}
