// Property tests for the frame codec
//
// Laws every layout must hold regardless of payload content.

use eventmesh_core::transport::ble::{decode, encode, FramingError, RadioLayout, FRAME_MAGIC};
use proptest::prelude::*;

fn any_layout() -> impl Strategy<Value = RadioLayout> {
    prop_oneof![
        Just(RadioLayout::UuidServiceData),
        Just(RadioLayout::LengthPrefixed),
        any::<u16>().prop_map(|company_id| RadioLayout::ManufacturerData { company_id }),
    ]
}

proptest! {
    #[test]
    fn encoded_size_fits_layout_bounds(
        layout in any_layout(),
        payload in prop::collection::vec(any::<u8>(), 1..=27),
    ) {
        let bytes = encode(&payload, &layout).unwrap().to_bytes();
        let (min, max) = layout.raw_size_bounds();
        prop_assert!(bytes.len() >= min && bytes.len() <= max);
        prop_assert!(bytes.len() <= 31);
    }

    #[test]
    fn decode_recovers_payload(
        layout in any_layout(),
        payload in prop::collection::vec(any::<u8>(), 1..=27),
    ) {
        let bytes = encode(&payload, &layout).unwrap().to_bytes();
        let decoded = decode(&bytes, &layout).unwrap();

        if layout == RadioLayout::UuidServiceData {
            prop_assert_eq!(decoded.len(), 27);
            prop_assert_eq!(&decoded[..payload.len()], payload.as_slice());
            prop_assert!(decoded[payload.len()..].iter().all(|b| *b == 0));
        } else {
            prop_assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn length_prefixed_header_is_consistent(
        payload in prop::collection::vec(any::<u8>(), 1..=27),
    ) {
        let bytes = encode(&payload, &RadioLayout::LengthPrefixed).unwrap().to_bytes();
        prop_assert_eq!(bytes.len(), 31);
        prop_assert_eq!(bytes[0] as usize, 3 + payload.len());
        prop_assert_eq!(&bytes[2..4], &FRAME_MAGIC[..]);
    }

    #[test]
    fn oversized_payload_always_rejected(
        layout in any_layout(),
        payload in prop::collection::vec(any::<u8>(), 28..64),
    ) {
        let err = encode(&payload, &layout).unwrap_err();
        prop_assert_eq!(err, FramingError::PayloadTooLarge { size: payload.len(), capacity: 27 });
    }

    #[test]
    fn decode_never_panics(
        layout in any_layout(),
        bytes in prop::collection::vec(any::<u8>(), 0..40),
    ) {
        let _ = decode(&bytes, &layout);
    }

    #[test]
    fn wrong_size_is_malformed(
        layout in any_layout(),
        bytes in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let (min, max) = layout.raw_size_bounds();
        prop_assume!(bytes.len() < min || bytes.len() > max);
        let is_malformed = matches!(
            decode(&bytes, &layout),
            Err(FramingError::MalformedFrame { .. })
        );
        prop_assert!(is_malformed);
    }

    #[test]
    fn missing_magic_is_rejected(
        payload in prop::collection::vec(any::<u8>(), 1..=27),
        corrupt in 0usize..2,
    ) {
        let mut bytes = encode(&payload, &RadioLayout::LengthPrefixed).unwrap().to_bytes();
        bytes[2 + corrupt] ^= 0xFF;
        prop_assert_eq!(
            decode(&bytes, &RadioLayout::LengthPrefixed),
            Err(FramingError::BadMagic)
        );
    }
}
