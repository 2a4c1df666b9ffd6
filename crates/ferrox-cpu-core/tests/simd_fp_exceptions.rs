//! The SIMD floating-point exception path: sticky MXCSR reporting,
//! mask-bit gating, the CR4.OSXMMEXCPT #XM/#UD split, and the exemption
//! of the packed-integer family from all of it.

mod common;

use common::TestCpu;
use ferrox_cpu_core::flags::{MXCSR_IE, MXCSR_IM, MXCSR_ZE, MXCSR_ZM};
use ferrox_cpu_core::state::CR4_OSXMMEXCPT;
use ferrox_cpu_core::{EmuError, Exception};

fn f32x4(v: [f32; 4]) -> u128 {
    (v[0].to_bits() as u128)
        | ((v[1].to_bits() as u128) << 32)
        | ((v[2].to_bits() as u128) << 64)
        | ((v[3].to_bits() as u128) << 96)
}

fn snan() -> f32 {
    f32::from_bits(0x7F80_0001)
}

#[test]
fn masked_invalid_only_sets_the_sticky_bit() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_xmm(0, f32x4([snan(), 1.0, 1.0, 1.0]));
    cpu.state.set_xmm(1, f32x4([1.0, 1.0, 1.0, 1.0]));

    // 0F 58 C1 : addps xmm0, xmm1, with all exceptions masked by default.
    cpu.run(&[0x0F, 0x58, 0xC1]).unwrap();
    assert_ne!(cpu.state.mxcsr & MXCSR_IE, 0);
}

#[test]
fn unmasked_invalid_with_osxmmexcpt_raises_xm() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.control.cr4 |= CR4_OSXMMEXCPT;
    cpu.state.mxcsr &= !MXCSR_IM;
    cpu.state.set_xmm(0, f32x4([snan(), 1.0, 1.0, 1.0]));
    cpu.state.set_xmm(1, f32x4([1.0, 1.0, 1.0, 1.0]));
    let dst_before = cpu.state.xmm(0);

    let err = cpu.run(&[0x0F, 0x58, 0xC1]).unwrap_err();
    assert_eq!(err, EmuError::Fault(Exception::SimdFloatingPoint));
    // The sticky bit is set, the destination is not.
    assert_ne!(cpu.state.mxcsr & MXCSR_IE, 0);
    assert_eq!(cpu.state.xmm(0), dst_before);
}

#[test]
fn unmasked_invalid_without_osxmmexcpt_is_undefined_opcode() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.mxcsr &= !MXCSR_IM;
    cpu.state.set_xmm(0, f32x4([snan(), 1.0, 1.0, 1.0]));
    cpu.state.set_xmm(1, f32x4([1.0, 1.0, 1.0, 1.0]));

    let err = cpu.run(&[0x0F, 0x58, 0xC1]).unwrap_err();
    assert_eq!(err, EmuError::Fault(Exception::InvalidOpcode));
}

#[test]
fn divide_by_zero_reports_ze() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.control.cr4 |= CR4_OSXMMEXCPT;
    cpu.state.mxcsr &= !MXCSR_ZM;
    cpu.state.set_xmm(0, f32x4([1.0, 1.0, 1.0, 1.0]));
    cpu.state.set_xmm(1, f32x4([0.0, 1.0, 1.0, 1.0]));

    // 0F 5E C1 : divps xmm0, xmm1
    let err = cpu.run(&[0x0F, 0x5E, 0xC1]).unwrap_err();
    assert_eq!(err, EmuError::Fault(Exception::SimdFloatingPoint));
    assert_ne!(cpu.state.mxcsr & MXCSR_ZE, 0);
}

/// The packed-integer family never consults MXCSR: an unmasked, already-
/// sticky condition does not stop PADDB.
#[test]
fn integer_simd_ignores_fp_exception_state() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.control.cr4 |= CR4_OSXMMEXCPT;
    cpu.state.mxcsr = (cpu.state.mxcsr & !MXCSR_IM) | MXCSR_IE;
    cpu.state.set_xmm(0, 0x01);
    cpu.state.set_xmm(1, 0x02);

    // 66 0F FC C1 : paddb xmm0, xmm1
    cpu.run(&[0x66, 0x0F, 0xFC, 0xC1]).unwrap();
    assert_eq!(cpu.state.xmm(0) as u8, 3);
}

#[test]
fn ucomiss_maps_compare_onto_eflags() {
    use ferrox_cpu_core::flags::RFlags;

    let mut cpu = TestCpu::long_mode();
    cpu.state.set_xmm(0, f32x4([2.0, 0.0, 0.0, 0.0]));
    cpu.state.set_xmm(1, f32x4([1.0, 0.0, 0.0, 0.0]));
    // 0F 2E C1 : ucomiss xmm0, xmm1
    cpu.run(&[0x0F, 0x2E, 0xC1]).unwrap();
    assert!(!cpu.state.rflags.get(RFlags::ZF));
    assert!(!cpu.state.rflags.get(RFlags::CF));
    assert!(!cpu.state.rflags.get(RFlags::PF));

    let mut cpu = TestCpu::long_mode();
    cpu.state.set_xmm(0, f32x4([f32::NAN, 0.0, 0.0, 0.0]));
    cpu.state.set_xmm(1, f32x4([1.0, 0.0, 0.0, 0.0]));
    cpu.run(&[0x0F, 0x2E, 0xC1]).unwrap();
    // Unordered: ZF=PF=CF=1, and a quiet NaN does not signal for the
    // unordered compare.
    assert!(cpu.state.rflags.get(RFlags::ZF));
    assert!(cpu.state.rflags.get(RFlags::PF));
    assert!(cpu.state.rflags.get(RFlags::CF));
    assert_eq!(cpu.state.mxcsr & MXCSR_IE, 0);
}

#[test]
fn comiss_signals_on_quiet_nan() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_xmm(0, f32x4([f32::NAN, 0.0, 0.0, 0.0]));
    cpu.state.set_xmm(1, f32x4([1.0, 0.0, 0.0, 0.0]));
    // 0F 2F C1 : comiss xmm0, xmm1 (masked: sticky bit only)
    cpu.run(&[0x0F, 0x2F, 0xC1]).unwrap();
    assert_ne!(cpu.state.mxcsr & MXCSR_IE, 0);
}

#[test]
fn ldmxcsr_rejects_reserved_bits() {
    use common::DATA;
    use ferrox_types::Gpr;

    let mut cpu = TestCpu::long_mode();
    cpu.bus.load(DATA, &0x0001_0000u32.to_le_bytes());
    cpu.state.set_gpr64(Gpr::Rbx, DATA);

    // 0F AE 13 : ldmxcsr [rbx]
    let err = cpu.run(&[0x0F, 0xAE, 0x13]).unwrap_err();
    assert_eq!(err, EmuError::Fault(Exception::gp0()));

    // A valid value loads.
    cpu.bus.load(DATA, &0x1F80u32.to_le_bytes());
    cpu.run(&[0x0F, 0xAE, 0x13]).unwrap();
    assert_eq!(cpu.state.mxcsr, 0x1F80);
}
