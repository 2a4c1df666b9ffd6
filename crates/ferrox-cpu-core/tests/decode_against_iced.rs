//! Differential length checks: for a corpus of implemented encodings,
//! the RIP advance after execution must equal iced-x86's decoded length.

mod common;

use common::{TestCpu, CODE, DATA};
use ferrox_types::Gpr;
use iced_x86::{Decoder, DecoderOptions};

fn check_len(bytes: &[u8]) {
    let mut iced = Decoder::new(64, bytes, DecoderOptions::NONE);
    let ins = iced.decode();
    assert!(!ins.is_invalid(), "iced rejected corpus bytes {bytes:02X?}");

    let mut cpu = TestCpu::long_mode();
    // Give memory forms something sane to point at.
    cpu.state.set_gpr64(Gpr::Rax, DATA);
    cpu.state.set_gpr64(Gpr::Rbx, DATA);
    cpu.state.set_gpr64(Gpr::Rcx, 2);
    cpu.state.set_gpr64(Gpr::Rsi, DATA + 0x40);
    cpu.state.set_gpr64(Gpr::Rdi, DATA + 0x80);

    cpu.run(bytes)
        .unwrap_or_else(|e| panic!("execution failed for {bytes:02X?}: {e}"));
    assert_eq!(
        cpu.executed_len(),
        ins.len() as u64,
        "length mismatch for {bytes:02X?}"
    );
}

#[test]
fn one_byte_corpus() {
    let corpus: &[&[u8]] = &[
        &[0x01, 0xC8],                               // add eax, ecx
        &[0x48, 0x01, 0xC8],                         // add rax, rcx
        &[0x83, 0x03, 0x10],                         // add dword [rbx], 0x10
        &[0x81, 0xC1, 0x78, 0x56, 0x34, 0x12],       // add ecx, 0x12345678
        &[0x66, 0x05, 0x34, 0x12],                   // add ax, 0x1234
        &[0x88, 0xE1],                               // mov cl, ah
        &[0x8B, 0x44, 0x8B, 0x10],                   // mov eax, [rbx+rcx*4+0x10]
        &[0x48, 0xB8, 1, 2, 3, 4, 5, 6, 7, 8],       // mov rax, imm64
        &[0xC7, 0x03, 0x78, 0x56, 0x34, 0x12],       // mov dword [rbx], imm32
        &[0x8D, 0x44, 0x8B, 0x10],                   // lea eax, [rbx+rcx*4+0x10]
        &[0x50],                                     // push rax
        &[0x68, 0x11, 0x22, 0x33, 0x44],             // push imm32
        &[0xF7, 0xD9],                               // neg ecx
        &[0xC1, 0xE0, 0x05],                         // shl eax, 5
        &[0xFE, 0xC1],                               // inc cl
        &[0x98],                                     // cwde
        &[0x63, 0xC8],                               // movsxd ecx, eax
    ];
    for bytes in corpus {
        check_len(bytes);
    }
}

#[test]
fn two_byte_corpus() {
    let corpus: &[&[u8]] = &[
        &[0x0F, 0xB6, 0xC1],                         // movzx eax, cl
        &[0x0F, 0xB7, 0x03],                         // movzx eax, word [rbx]
        &[0x0F, 0xBE, 0xC1],                         // movsx eax, cl
        &[0x0F, 0xAF, 0xC1],                         // imul eax, ecx
        &[0x0F, 0xA3, 0xC8],                         // bt eax, ecx
        &[0x0F, 0xBA, 0xE0, 0x07],                   // bt eax, 7
        &[0x0F, 0xA4, 0xC1, 0x04],                   // shld ecx, eax, 4
        &[0x0F, 0xC1, 0x03],                         // xadd [rbx], eax
        &[0x0F, 0xB0, 0x03],                         // cmpxchg [rbx], al
        &[0x0F, 0x44, 0xC1],                         // cmovz eax, ecx
        &[0x0F, 0x94, 0xC1],                         // setz cl
        &[0x0F, 0xC8],                               // bswap eax
        &[0x0F, 0x1F, 0x44, 0x00, 0x00],             // nop [rax+rax]
        &[0x0F, 0x6F, 0xC1],                         // movq mm0, mm1
        &[0x66, 0x0F, 0x6F, 0x00],                   // movdqa xmm0, [rax]
        &[0xF3, 0x0F, 0x6F, 0x00],                   // movdqu xmm0, [rax]
        &[0x0F, 0x28, 0x00],                         // movaps xmm0, [rax]
        &[0x0F, 0x10, 0x40, 0x01],                   // movups xmm0, [rax+1]
        &[0xF3, 0x0F, 0x10, 0x00],                   // movss xmm0, [rax]
        &[0x0F, 0x58, 0xC1],                         // addps xmm0, xmm1
        &[0x66, 0x0F, 0xFC, 0xC1],                   // paddb xmm0, xmm1
        &[0x0F, 0x70, 0xC1, 0x1B],                   // pshufw mm0, mm1, 0x1B
        &[0x66, 0x0F, 0x70, 0xC1, 0x1B],             // pshufd xmm0, xmm1, 0x1B
        &[0x66, 0x0F, 0x71, 0xD1, 0x04],             // psrlw xmm1, 4
        &[0x0F, 0xC2, 0xC1, 0x01],                   // cmpps xmm0, xmm1, lt
        &[0x0F, 0xC6, 0xC1, 0x4E],                   // shufps xmm0, xmm1, 0x4E
        &[0x66, 0x0F, 0xD6, 0x00],                   // movq [rax], xmm0
        &[0xF3, 0x0F, 0xB8, 0xC1],                   // popcnt eax, ecx
        &[0x0F, 0xBC, 0xC1],                         // bsf eax, ecx
        &[0x0F, 0xAE, 0x18],                         // stmxcsr [rax]
    ];
    for bytes in corpus {
        check_len(bytes);
    }
}

#[test]
fn syscall_length_with_sce_enabled() {
    let mut iced = Decoder::new(64, &[0x0F, 0x05], DecoderOptions::NONE);
    let ins = iced.decode();

    let mut cpu = TestCpu::long_mode();
    cpu.state.msr.efer |= ferrox_cpu_core::state::EFER_SCE;
    cpu.state.msr.lstar = 0x7000;
    cpu.run(&[0x0F, 0x05]).unwrap();
    // A branch does not advance linearly; SYSCALL records the return RIP
    // in RCX instead.
    assert_eq!(cpu.state.gpr64(Gpr::Rcx), CODE + ins.len() as u64);
}

#[test]
fn branch_targets_match_iced() {
    // jz +0x10 taken: the target equals iced's computed branch target.
    let bytes = [0x74, 0x10];
    let mut iced = Decoder::with_ip(64, &bytes, CODE, DecoderOptions::NONE);
    let ins = iced.decode();

    let mut cpu = TestCpu::long_mode();
    cpu.state.rflags.set(ferrox_cpu_core::flags::RFlags::ZF, true);
    cpu.run(&bytes).unwrap();
    assert_eq!(cpu.state.rip, ins.near_branch_target());
}
