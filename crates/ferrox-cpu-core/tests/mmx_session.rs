//! The MMX-mode FPU transition runs at most once per session; EMMS ends
//! the session and re-arms it. Observed through the tag word.

mod common;

use common::TestCpu;

#[test]
fn transition_runs_once_per_session() {
    let mut cpu = TestCpu::long_mode();
    assert_eq!(cpu.state.fpu.ftw, 0xFFFF, "power-on: all registers empty");

    // 0F 6F C1 : movq mm0, mm1
    cpu.run(&[0x0F, 0x6F, 0xC1]).unwrap();
    assert_eq!(cpu.state.fpu.ftw, 0x0000, "first access validates the file");
    assert_eq!(cpu.state.fpu.fsw & 0x3800, 0, "TOP reset to 0");

    // Poke the tag word; a second MMX op in the same session must not
    // reset it.
    cpu.state.fpu.ftw = 0x5555;
    cpu.run(&[0x0F, 0x6F, 0xD1]).unwrap();
    assert_eq!(cpu.state.fpu.ftw, 0x5555);

    // 0F 77 : emms ends the session.
    cpu.run(&[0x0F, 0x77]).unwrap();
    assert_eq!(cpu.state.fpu.ftw, 0xFFFF);

    // The next access transitions again.
    cpu.run(&[0x0F, 0x6F, 0xC1]).unwrap();
    assert_eq!(cpu.state.fpu.ftw, 0x0000);
}

#[test]
fn transition_precedes_the_operand_access() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_mmx(1, 0x1122_3344_5566_7788);

    cpu.run(&[0x0F, 0x6F, 0xC1]).unwrap();
    // Both the data move and the tag transition happened.
    assert_eq!(cpu.state.mmx(0), 0x1122_3344_5566_7788);
    assert_eq!(cpu.state.fpu.ftw, 0x0000);
}

#[test]
fn mmx_register_numbers_ignore_rex_extension() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_mmx(1, 0xAABB_CCDD_EEFF_0011);

    // 4C 0F 6F D1 : REX.WR movq mm2, mm1; REX.R must not select "mm10".
    cpu.run(&[0x4C, 0x0F, 0x6F, 0xD1]).unwrap();
    assert_eq!(cpu.state.mmx(2), 0xAABB_CCDD_EEFF_0011);
}

#[test]
fn mmx_arithmetic_round_trip() {
    let mut cpu = TestCpu::long_mode();
    cpu.state.set_mmx(0, 0x00FF_0010_7F01_00FE);
    cpu.state.set_mmx(1, 0x0001_0020_0102_0003);

    // 0F FC C1 : paddb mm0, mm1
    cpu.run(&[0x0F, 0xFC, 0xC1]).unwrap();
    assert_eq!(cpu.state.mmx(0), 0x0000_0030_8003_0001);
}
