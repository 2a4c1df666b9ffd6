//! Robustness properties: structural decoding never panics and never
//! consumes more than the architectural length limit, for any input.

#![cfg(not(target_arch = "wasm32"))]

use ferrox_x86::{parse_modrm, scan_prefixes, Cursor, DecodeMode, MAX_INST_LEN};
use proptest::prelude::*;

fn any_mode() -> impl Strategy<Value = DecodeMode> {
    prop_oneof![
        Just(DecodeMode::Bits16),
        Just(DecodeMode::Bits32),
        Just(DecodeMode::Bits64),
    ]
}

proptest! {
    #[test]
    fn prefix_scan_is_total_and_bounded(
        bytes in proptest::collection::vec(any::<u8>(), 0..32),
        mode in any_mode(),
    ) {
        let mut cursor = Cursor::new(&bytes);
        let _ = scan_prefixes(&mut cursor, mode);
        prop_assert!(cursor.len() <= MAX_INST_LEN);
    }

    #[test]
    fn modrm_parse_is_total_and_bounded(
        bytes in proptest::collection::vec(any::<u8>(), 0..32),
        mode in any_mode(),
    ) {
        let mut cursor = Cursor::new(&bytes);
        if let Ok(prefixes) = scan_prefixes(&mut cursor, mode) {
            // Treat the next byte as an opcode and the rest as a ModRM tail.
            if cursor.next_u8().is_ok() {
                let _ = parse_modrm(&mut cursor, mode, &prefixes);
            }
        }
        prop_assert!(cursor.len() <= MAX_INST_LEN);
    }

    #[test]
    fn scale_is_always_a_power_of_two(
        bytes in proptest::collection::vec(any::<u8>(), 1..16),
    ) {
        let mut cursor = Cursor::new(&bytes);
        let prefixes = ferrox_x86::Prefixes::default();
        if let Ok((_, Some(mem))) = parse_modrm(&mut cursor, DecodeMode::Bits64, &prefixes) {
            prop_assert!(matches!(mem.scale, 1 | 2 | 4 | 8));
        }
    }
}
