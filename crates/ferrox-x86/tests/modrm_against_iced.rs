//! Differential checks of our ModRM/SIB/displacement parsing against
//! iced-x86 on a corpus of hand-picked encodings.

use ferrox_x86::{parse_modrm, scan_prefixes, Cursor, DecodeMode};
use iced_x86::{Decoder, DecoderOptions, Register};

fn iced_reg_number(reg: Register) -> Option<u8> {
    use Register::*;
    let n = match reg {
        RAX | EAX | AX => 0,
        RCX | ECX | CX => 1,
        RDX | EDX | DX => 2,
        RBX | EBX | BX => 3,
        RSP | ESP | SP => 4,
        RBP | EBP | BP => 5,
        RSI | ESI | SI => 6,
        RDI | EDI | DI => 7,
        R8 | R8D => 8,
        R9 | R9D => 9,
        R10 | R10D => 10,
        R11 | R11D => 11,
        R12 | R12D => 12,
        R13 | R13D => 13,
        R14 | R14D => 14,
        R15 | R15D => 15,
        _ => return Option::None,
    };
    Some(n)
}

/// Decode `bytes` with both decoders and compare the memory-operand shape.
/// `opcode_len` is the number of opcode bytes after the prefixes.
fn check_mem_operand(bytes: &[u8], bitness: u32, opcode_len: usize) {
    let mut iced = Decoder::new(bitness, bytes, DecoderOptions::NONE);
    let ins = iced.decode();
    assert!(!ins.is_invalid(), "iced rejected corpus bytes {bytes:02X?}");

    let mode = match bitness {
        16 => DecodeMode::Bits16,
        32 => DecodeMode::Bits32,
        _ => DecodeMode::Bits64,
    };
    let mut cursor = Cursor::new(bytes);
    let prefixes = scan_prefixes(&mut cursor, mode).unwrap();
    for _ in 0..opcode_len {
        cursor.next_u8().unwrap();
    }
    let (_, mem) = parse_modrm(&mut cursor, mode, &prefixes).unwrap();
    let mem = mem.expect("corpus entries are memory forms");

    assert_eq!(cursor.len(), ins.len(), "length mismatch for {bytes:02X?}");

    if ins.memory_base() == Register::RIP {
        assert!(mem.rip_relative);
        // iced reports the resolved target; recompute it from our raw
        // displacement relative to the next instruction.
        let target = (ins.len() as u64).wrapping_add(mem.disp as u64);
        assert_eq!(ins.memory_displacement64(), target);
    } else {
        assert!(!mem.rip_relative);
        assert_eq!(
            mem.base,
            iced_reg_number(ins.memory_base()),
            "base mismatch for {bytes:02X?}"
        );
        assert_eq!(
            ins.memory_displacement64() as i64,
            if bitness == 16 {
                mem.disp & 0xFFFF
            } else if bitness == 32 {
                mem.disp & 0xFFFF_FFFF
            } else {
                mem.disp
            },
            "disp mismatch for {bytes:02X?}"
        );
    }

    assert_eq!(
        mem.index,
        iced_reg_number(ins.memory_index()),
        "index mismatch for {bytes:02X?}"
    );
    if mem.index.is_some() {
        assert_eq!(mem.scale as u32, ins.memory_index_scale());
    }
}

#[test]
fn sib_scaled_index_disp32() {
    // mov rax, [rbx+rcx*4+0x12345678]
    check_mem_operand(&[0x48, 0x8B, 0x84, 0x8B, 0x78, 0x56, 0x34, 0x12], 64, 1);
}

#[test]
fn rip_relative_load() {
    // mov rax, [rip+0x12345678]
    check_mem_operand(&[0x48, 0x8B, 0x05, 0x78, 0x56, 0x34, 0x12], 64, 1);
}

#[test]
fn rbp_disp8_defaults() {
    // mov eax, [rbp+0x10]
    check_mem_operand(&[0x8B, 0x45, 0x10], 64, 1);
}

#[test]
fn r12_base_requires_sib() {
    // mov rax, [r12]
    check_mem_operand(&[0x49, 0x8B, 0x04, 0x24], 64, 1);
}

#[test]
fn r13_base_forces_disp8() {
    // mov rax, [r13+0]
    check_mem_operand(&[0x49, 0x8B, 0x45, 0x00], 64, 1);
}

#[test]
fn rex_x_extends_the_index_register() {
    // mov rax, [rbx+r12*2]
    check_mem_operand(&[0x4A, 0x8B, 0x04, 0x63], 64, 1);
}

#[test]
fn no_base_sib_disp32() {
    // mov eax, [rcx*8+0x10]
    check_mem_operand(&[0x8B, 0x04, 0xCD, 0x10, 0x00, 0x00, 0x00], 64, 1);
}

#[test]
fn two_byte_opcode_memory_form() {
    // movzx eax, byte [rbx+0x40]
    check_mem_operand(&[0x0F, 0xB6, 0x43, 0x40], 64, 2);
}

#[test]
fn protected_mode_absolute_disp32() {
    // mov eax, [0x00401000]
    check_mem_operand(&[0x8B, 0x05, 0x00, 0x10, 0x40, 0x00], 32, 1);
}

#[test]
fn real_mode_bp_si_form() {
    // mov ax, [bp+si+0x12]
    check_mem_operand(&[0x8B, 0x42, 0x12], 16, 1);
}

#[test]
fn real_mode_direct_address() {
    // mov ax, [0x1234]
    check_mem_operand(&[0x8B, 0x06, 0x34, 0x12], 16, 1);
}

#[test]
fn address_size_override_in_32bit_mode() {
    // mov eax, [bx+di]
    check_mem_operand(&[0x67, 0x8B, 0x01], 32, 1);
}
