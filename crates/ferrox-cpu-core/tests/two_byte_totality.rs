//! Every (second opcode byte, prefix) cell of the two-byte map must
//! dispatch to a handler: execution either retires or produces a defined
//! error, never a panic or a stuck decode.

mod common;

use common::{TestCpu, CODE};
use ferrox_cpu_core::{EmuError, Exception};

const PREFIXES: [&[u8]; 4] = [&[], &[0x66], &[0xF3], &[0xF2]];

#[test]
fn every_cell_dispatches() {
    for opcode in 0..=0xFFu8 {
        for prefix in PREFIXES {
            let mut cpu = TestCpu::long_mode();
            let mut bytes = Vec::new();
            bytes.extend_from_slice(prefix);
            bytes.extend_from_slice(&[0x0F, opcode]);
            // Plenty of ModRM/SIB/displacement/immediate fodder; ModRM
            // 0x00 resolves to [rax] with rax = 0, which the flat bus
            // accepts.
            bytes.extend_from_slice(&[0x00; 12]);

            let result = cpu.run(&bytes);
            match result {
                Ok(_) => {
                    let len = cpu.executed_len();
                    assert!(
                        len >= 2 && len <= 15,
                        "0F {opcode:02X} (prefix {prefix:02X?}): bad length {len}"
                    );
                }
                Err(EmuError::Fault(_)) | Err(EmuError::Unimplemented(_)) => {
                    // Defined outcome; RIP must not have moved.
                    assert_eq!(cpu.state.rip, CODE, "0F {opcode:02X}: RIP moved on fault");
                }
            }
        }
    }
}

#[test]
fn reserved_cells_raise_invalid_opcode() {
    // A sample of deliberately reserved encodings across the map.
    let cases: &[(&[u8], &[u8])] = &[
        (&[], &[0x0F, 0x04]),
        (&[], &[0x0F, 0x0A]),
        (&[], &[0x0F, 0x25]),
        (&[], &[0x0F, 0x36]),
        (&[], &[0x0F, 0x7A]),
        (&[], &[0x0F, 0xA6]),
        // Reserved prefix columns of defined opcodes.
        (&[0xF3], &[0x0F, 0x13, 0xC1]),
        (&[0xF3], &[0x0F, 0x60, 0xC1]),
        (&[0xF2], &[0x0F, 0x6F, 0xC1]),
        (&[0x66], &[0x0F, 0x77]),
        // UD0/UD1/UD2 are architecturally guaranteed #UD.
        (&[], &[0x0F, 0x0B]),
        (&[], &[0x0F, 0xB9, 0xC0]),
        (&[], &[0x0F, 0xFF]),
    ];

    for (prefix, body) in cases {
        let mut cpu = TestCpu::long_mode();
        let mut bytes = prefix.to_vec();
        bytes.extend_from_slice(body);
        bytes.extend_from_slice(&[0x00; 8]);
        let result = cpu.run(&bytes);
        assert_eq!(
            result,
            Err(EmuError::Fault(Exception::InvalidOpcode)),
            "expected #UD for {prefix:02X?} {body:02X?}"
        );
    }
}

#[test]
fn three_byte_escapes_chain_and_reject() {
    // 0F 38 and 0F 3A chain into dense maps whose cells are reserved in
    // this module.
    let mut cpu = TestCpu::long_mode();
    let result = cpu.run(&[0x0F, 0x38, 0x00, 0xC1]);
    assert_eq!(result, Err(EmuError::Fault(Exception::InvalidOpcode)));

    let mut cpu = TestCpu::long_mode();
    let result = cpu.run(&[0x0F, 0x3A, 0x0F, 0xC1, 0x04]);
    assert_eq!(result, Err(EmuError::Fault(Exception::InvalidOpcode)));
}
