//! Frame encoding and decoding.
//!
//! Every frame shares one envelope:
//!
//! ```text
//! ┌───────────┬────────┬──────┬─────────────────┬──────────┐
//! │ Sync (2B) │ Length │ Type │ Payload         │ Checksum │
//! │ 0xAA 0xAA │ (1B)   │ (1B) │ (Length - 2 B)  │ (1B)     │
//! └───────────┴────────┴──────┴─────────────────┴──────────┘
//! ```
//!
//! The length byte counts everything after itself (type, payload, checksum).
//! The checksum is the wrapping 8-bit sum of every preceding byte, sync
//! header included.
//!
//! Status frames and command frames are the same thing: a command is the last
//! received status frame with one field rewritten ([`patch_field`]).

use crate::error::{CommandError, ProtocolError};
use crate::registry::{PropertyDescriptor, PropertyRegistry};
use crate::value::{PropertyMap, PropertyValue};
use serde::Serialize;

/// Sync header that opens every frame.
pub const SYNC: [u8; 2] = [0xAA, 0xAA];

/// Offset of the declared length byte.
pub const LENGTH_OFFSET: usize = 2;

/// Offset of the type/command byte.
pub const TYPE_OFFSET: usize = 3;

/// Offset of the first payload byte.
pub const PAYLOAD_OFFSET: usize = 4;

/// Header, length, type, and checksum with an empty payload.
pub const MIN_FRAME_LEN: usize = 5;

/// Total size of a status or command frame.
pub const STATUS_FRAME_LEN: usize = 21;

/// Offset of the checksum byte in a status frame.
pub const CHECKSUM_OFFSET: usize = STATUS_FRAME_LEN - 1;

/// Type byte of the broadcast discovery probe.
pub const TYPE_DISCOVERY_PROBE: u8 = 0x02;

/// Type byte of a discovery reply.
pub const TYPE_DISCOVERY_REPLY: u8 = 0x03;

/// Type byte of status and command frames.
pub const TYPE_STATUS: u8 = 0x01;

/// Type byte of the status request.
pub const TYPE_STATUS_REQUEST: u8 = 0xA0;

/// Declared length of a discovery reply.
pub const DISCOVERY_REPLY_LENGTH: u8 = 0x0C;

/// Declared length of status frames and the status request.
pub const STATUS_LENGTH: u8 = 0x12;

/// Broadcast discovery probe.
pub const DISCOVERY_PROBE: [u8; 9] = [0xAA, 0xAA, 0x06, 0x02, 0xFF, 0xFF, 0xFF, 0x00, 0x59];

/// Fixed status request sent over the status connection.
pub const STATUS_REQUEST: [u8; 21] = [
    0xAA, 0xAA, 0x12, 0xA0, 0x0A, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x1A,
];

const ID_RANGE: std::ops::Range<usize> = 4..10;
const NAME_RANGE: std::ops::Range<usize> = 10..14;

/// Identity carried by a discovery reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    /// Hardware identifier, lowercase hex
    pub id: String,
    /// Display name
    pub name: String,
}

/// Compute the checksum over `bytes`.
///
/// Pass every byte that precedes the trailer.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Rewrite the trailing checksum byte of `frame` in place.
pub fn seal(frame: &mut [u8]) {
    if let Some((last, body)) = frame.split_last_mut() {
        *last = checksum(body);
    }
}

/// Whether the trailing byte of `frame` matches its checksum.
#[must_use]
pub fn verify_checksum(frame: &[u8]) -> bool {
    frame
        .split_last()
        .is_some_and(|(last, body)| *last == checksum(body))
}

/// Total frame size announced by a declared length byte.
#[must_use]
pub fn frame_len(length: u8) -> usize {
    usize::from(length) + LENGTH_OFFSET + 1
}

/// Type byte of a frame with a valid sync header, if present.
#[must_use]
pub fn peek_type(bytes: &[u8]) -> Option<u8> {
    if bytes.len() > TYPE_OFFSET && bytes[..2] == SYNC {
        Some(bytes[TYPE_OFFSET])
    } else {
        None
    }
}

/// Check sync header and declared length, returning `(length, type)`.
fn check_envelope(bytes: &[u8]) -> Result<(u8, u8), ProtocolError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(ProtocolError::Malformed(format!(
            "frame too short: {} bytes",
            bytes.len()
        )));
    }
    if bytes[..2] != SYNC {
        return Err(ProtocolError::Malformed(format!(
            "bad sync header {:02x}{:02x}",
            bytes[0], bytes[1]
        )));
    }

    let length = bytes[LENGTH_OFFSET];
    if frame_len(length) != bytes.len() {
        return Err(ProtocolError::Malformed(format!(
            "declared length {length:#04x} does not match {} bytes",
            bytes.len()
        )));
    }

    Ok((length, bytes[TYPE_OFFSET]))
}

fn check_status_frame(bytes: &[u8]) -> Result<(), ProtocolError> {
    let (length, frame_type) = check_envelope(bytes)?;
    if length != STATUS_LENGTH || frame_type != TYPE_STATUS {
        return Err(ProtocolError::UnexpectedFrame { length, frame_type });
    }
    check_trailer(bytes)
}

fn check_trailer(bytes: &[u8]) -> Result<(), ProtocolError> {
    if verify_checksum(bytes) {
        Ok(())
    } else {
        let expected = checksum(&bytes[..bytes.len() - 1]);
        Err(ProtocolError::Malformed(format!(
            "checksum mismatch: expected {expected:#04x}, got {:#04x}",
            bytes[bytes.len() - 1]
        )))
    }
}

/// Decode a discovery reply into the device identity.
///
/// # Errors
///
/// Returns [`ProtocolError::UnexpectedFrame`] unless the declared length is
/// `0x0C` and the type is `0x03`, or [`ProtocolError::Malformed`] if the
/// envelope or checksum is broken.
pub fn decode_discovery_reply(bytes: &[u8]) -> Result<DeviceIdentity, ProtocolError> {
    let (length, frame_type) = check_envelope(bytes)?;
    if length != DISCOVERY_REPLY_LENGTH || frame_type != TYPE_DISCOVERY_REPLY {
        return Err(ProtocolError::UnexpectedFrame { length, frame_type });
    }
    check_trailer(bytes)?;

    let id = hex::encode(&bytes[ID_RANGE]);
    let name: String = String::from_utf8_lossy(&bytes[NAME_RANGE])
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string();
    let name = if name.is_empty() {
        format!("ac-{}", &id[id.len() - 4..])
    } else {
        name
    };

    Ok(DeviceIdentity { id, name })
}

/// Decode a status frame into one value per registry field.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if the frame is too short, the sync
/// header does not match, or the checksum is wrong, and
/// [`ProtocolError::UnexpectedFrame`] if it is not a status frame.
pub fn decode_status(
    bytes: &[u8],
    registry: &PropertyRegistry,
) -> Result<PropertyMap, ProtocolError> {
    check_status_frame(bytes)?;

    let mut properties = PropertyMap::new();
    for descriptor in registry.iter() {
        if let Some(raw) = descriptor.extract(bytes) {
            properties.insert(descriptor.name.clone(), descriptor.decode_raw(raw));
        }
    }

    tracing::trace!(fields = properties.len(), "Decoded status frame");
    Ok(properties)
}

/// Produce a command frame from the last snapshot with one field changed.
///
/// The result is byte-identical to `last_frame` except for the bits under
/// `descriptor`'s mask and the checksum byte. `last_frame` must be a status
/// frame previously accepted by [`decode_status`].
///
/// # Errors
///
/// Returns [`CommandError::InvalidValue`] if `new_value` is outside the
/// descriptor's domain, or [`CommandError::InvalidSnapshot`] if `last_frame`
/// is not an intact status frame.
pub fn patch_field(
    last_frame: &[u8],
    descriptor: &PropertyDescriptor,
    new_value: &PropertyValue,
) -> Result<Vec<u8>, CommandError> {
    let raw = descriptor.encode_value(new_value)?;
    check_status_frame(last_frame).map_err(CommandError::InvalidSnapshot)?;

    let mut frame = last_frame.to_vec();
    descriptor.store(&mut frame, raw);
    seal(&mut frame);

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldEncoding;

    /// Status frame: power off, cool, l2, set 24, indoor 26, swing full/full,
    /// lights on, health on, quiet off, air off, celsius.
    fn sample_status() -> Vec<u8> {
        let mut frame = vec![0u8; STATUS_FRAME_LEN];
        frame[..4].copy_from_slice(&[0xAA, 0xAA, STATUS_LENGTH, TYPE_STATUS]);
        frame[4] = 0x12;
        frame[5] = 24;
        frame[6] = 26;
        frame[7] = 0x71;
        frame[8] = 0x03;
        frame[9] = 0x00;
        seal(&mut frame);
        frame
    }

    fn discovery_reply(name: &[u8; 4]) -> Vec<u8> {
        let mut frame = vec![0xAA, 0xAA, DISCOVERY_REPLY_LENGTH, TYPE_DISCOVERY_REPLY];
        frame.extend_from_slice(&[0xf0, 0xfe, 0x6b, 0x12, 0x34, 0x56]);
        frame.extend_from_slice(name);
        frame.push(0);
        seal(&mut frame);
        frame
    }

    fn domain(descriptor: &PropertyDescriptor) -> Vec<PropertyValue> {
        match &descriptor.encoding {
            FieldEncoding::Flag => vec![PropertyValue::flag(false), PropertyValue::flag(true)],
            FieldEncoding::Enumerated { values } => values
                .iter()
                .map(|entry| PropertyValue::label(entry.label.clone()))
                .collect(),
            FieldEncoding::Numeric { min, max } => {
                (*min..=*max).map(PropertyValue::Number).collect()
            }
        }
    }

    #[test]
    fn templates_are_self_consistent() {
        assert!(verify_checksum(&DISCOVERY_PROBE));
        assert!(verify_checksum(&STATUS_REQUEST));
        assert_eq!(frame_len(DISCOVERY_PROBE[LENGTH_OFFSET]), DISCOVERY_PROBE.len());
        assert_eq!(frame_len(STATUS_REQUEST[LENGTH_OFFSET]), STATUS_REQUEST.len());
    }

    #[test]
    fn recomputing_untouched_checksum_reproduces_trailer() {
        let frame = sample_status();
        let trailer = frame[CHECKSUM_OFFSET];

        let mut resealed = frame.clone();
        seal(&mut resealed);

        assert_eq!(resealed[CHECKSUM_OFFSET], trailer);
        assert_eq!(resealed, frame);
    }

    #[test]
    fn decode_sample_status() {
        let registry = PropertyRegistry::standard();
        let props = decode_status(&sample_status(), &registry).unwrap();

        assert_eq!(props.len(), registry.len());
        assert_eq!(props["power"], PropertyValue::flag(false));
        assert_eq!(props["mode"], PropertyValue::label("cool"));
        assert_eq!(props["fan_speed"], PropertyValue::label("l2"));
        assert_eq!(props["temperature"], PropertyValue::Number(24));
        assert_eq!(props["temperature_in"], PropertyValue::Number(26));
        assert_eq!(props["swing_hor"], PropertyValue::label("full"));
        assert_eq!(props["swing_vert"], PropertyValue::label("full"));
        assert_eq!(props["lights"], PropertyValue::flag(true));
        assert_eq!(props["health"], PropertyValue::flag(true));
        assert_eq!(props["sleep"], PropertyValue::flag(false));
        assert_eq!(props["quiet"], PropertyValue::label("off"));
        assert_eq!(props["temperature_unit"], PropertyValue::label("celsius"));
    }

    #[test]
    fn patch_every_field_every_value() {
        let registry = PropertyRegistry::standard();
        let original = sample_status();

        for descriptor in registry.iter() {
            for value in domain(descriptor) {
                let patched = patch_field(&original, descriptor, &value).unwrap();
                let decoded = decode_status(&patched, &registry).unwrap();
                assert_eq!(decoded[&descriptor.name], value, "{}", descriptor.name);

                for (i, (before, after)) in original.iter().zip(&patched).enumerate() {
                    if i != descriptor.offset && i != CHECKSUM_OFFSET {
                        assert_eq!(before, after, "{} changed byte {i}", descriptor.name);
                    }
                }
                assert_eq!(
                    original[descriptor.offset] & !descriptor.mask,
                    patched[descriptor.offset] & !descriptor.mask,
                    "{} leaked outside its mask",
                    descriptor.name
                );
            }
        }
    }

    #[test]
    fn patch_rejects_value_outside_domain() {
        let registry = PropertyRegistry::standard();
        let frame = sample_status();

        let err = patch_field(
            &frame,
            registry.get("fan_speed").unwrap(),
            &PropertyValue::label("l9"),
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::InvalidValue { .. }));

        let err = patch_field(
            &frame,
            registry.get("temperature").unwrap(),
            &PropertyValue::Number(12),
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::InvalidValue { .. }));
    }

    #[test]
    fn patch_rejects_frames_that_are_not_status_frames() {
        let registry = PropertyRegistry::standard();
        let power = registry.get("power").unwrap();
        let on = PropertyValue::flag(true);

        for base in [Vec::new(), sample_status()[..8].to_vec(), STATUS_REQUEST.to_vec()] {
            let err = patch_field(&base, power, &on).unwrap_err();
            assert!(matches!(err, CommandError::InvalidSnapshot(_)), "{base:02x?}");
        }

        let mut corrupt = sample_status();
        corrupt[CHECKSUM_OFFSET] ^= 0xFF;
        let err = patch_field(&corrupt, power, &on).unwrap_err();
        assert!(matches!(
            err,
            CommandError::InvalidSnapshot(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn discovery_reply_decodes_identity() {
        let identity = decode_discovery_reply(&discovery_reply(b"C&H1")).unwrap();

        assert_eq!(identity.id, "f0fe6b123456");
        assert_eq!(identity.name, "C&H1");
    }

    #[test]
    fn discovery_reply_without_name_falls_back_to_id() {
        let identity = decode_discovery_reply(&discovery_reply(&[0, 0, 0, 0])).unwrap();

        assert!(!identity.id.is_empty());
        assert_eq!(identity.name, "ac-3456");
    }

    #[test]
    fn discovery_reply_rejects_other_type() {
        let mut frame = discovery_reply(b"C&H1");
        frame[TYPE_OFFSET] = TYPE_STATUS;
        seal(&mut frame);

        let err = decode_discovery_reply(&frame).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnexpectedFrame {
                length: DISCOVERY_REPLY_LENGTH,
                frame_type: TYPE_STATUS
            }
        );
    }

    #[test]
    fn discovery_reply_rejects_status_frame() {
        let err = decode_discovery_reply(&sample_status()).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedFrame { .. }));
    }

    #[test]
    fn status_rejects_short_frame() {
        let registry = PropertyRegistry::standard();
        let err = decode_status(&[0xAA, 0xAA, 0x01], &registry).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn status_rejects_bad_sync() {
        let registry = PropertyRegistry::standard();
        let mut frame = sample_status();
        frame[0] = 0x55;
        seal(&mut frame);

        let err = decode_status(&frame, &registry).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn status_rejects_bad_checksum() {
        let registry = PropertyRegistry::standard();
        let mut frame = sample_status();
        frame[CHECKSUM_OFFSET] = frame[CHECKSUM_OFFSET].wrapping_add(1);

        let err = decode_status(&frame, &registry).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn status_rejects_discovery_reply() {
        let registry = PropertyRegistry::standard();
        let err = decode_status(&discovery_reply(b"C&H1"), &registry).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedFrame { .. }));
    }

    #[test]
    fn peek_type_requires_sync() {
        assert_eq!(peek_type(&DISCOVERY_PROBE), Some(TYPE_DISCOVERY_PROBE));
        assert_eq!(peek_type(&STATUS_REQUEST), Some(TYPE_STATUS_REQUEST));
        assert_eq!(peek_type(&[0x00, 0xAA, 0x06, 0x02]), None);
        assert_eq!(peek_type(&[0xAA, 0xAA]), None);
    }
}
