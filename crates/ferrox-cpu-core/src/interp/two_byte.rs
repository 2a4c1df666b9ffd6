//! The two-byte (0x0F) opcode map.
//!
//! Dense 256×4 function-pointer table: one column per mandatory-prefix
//! state (none, 0x66, 0xF3, 0xF2). Every cell resolves to a handler;
//! reserved encodings point at the invalid handlers so dispatch never
//! needs a presence check. The invalid handlers still consume the operand
//! bytes the encoding implies, keeping instruction lengths coherent.

use super::decode::Ctx;
use super::ops_bit::*;
use super::ops_cf::*;
use super::ops_data::{op_lfs, op_lgs, op_lss, op_pop_fs, op_pop_gs, op_push_fs, op_push_gs};
use super::ops_mmx::*;
use super::ops_sse_fp::*;
use super::ops_sse_mov::*;
use super::ops_sys::*;
use super::{OpHandler, OpResult};
use crate::exception::Exception;

/// Reserved encoding with no defined operand suffix.
pub(crate) fn op_invalid(_ctx: &mut Ctx<'_>) -> OpResult {
    Err(Exception::InvalidOpcode.into())
}

/// Reserved encoding whose neighbors take a ModRM suffix: consume one so
/// the reported length matches what hardware fetches before faulting.
pub(crate) fn op_invalid_need_rm(ctx: &mut Ctx<'_>) -> OpResult {
    let _ = ctx.modrm()?;
    Err(Exception::InvalidOpcode.into())
}

/// Reserved encoding in an imm8-suffixed row.
pub(crate) fn op_invalid_need_rm_imm8(ctx: &mut Ctx<'_>) -> OpResult {
    let _ = ctx.modrm()?;
    let _ = ctx.next_u8()?;
    Err(Exception::InvalidOpcode.into())
}

/// Dispatch a 0x0F-escaped instruction: read the second opcode byte and
/// index by (byte, prefix column).
pub(crate) fn dispatch(ctx: &mut Ctx<'_>) -> OpResult {
    let opcode = ctx.next_u8()?;
    TWO_BYTE_MAP[(opcode as usize) * 4 + ctx.prefixes.index()](ctx)
}

#[rustfmt::skip]
static TWO_BYTE_MAP: [OpHandler; 1024] = [
    /*           no prefix,                0x66,                     0xF3,                     0xF2 */
    /* 0x00 */   op_grp6,                  op_grp6,                  op_grp6,                  op_grp6,
    /* 0x01 */   op_grp7,                  op_grp7,                  op_grp7,                  op_grp7,
    /* 0x02 */   op_lar,                   op_lar,                   op_lar,                   op_lar,
    /* 0x03 */   op_lsl,                   op_lsl,                   op_lsl,                   op_lsl,
    /* 0x04 */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x05 */   op_syscall,               op_syscall,               op_syscall,               op_syscall,
    /* 0x06 */   op_clts,                  op_clts,                  op_clts,                  op_clts,
    /* 0x07 */   op_sysret,                op_sysret,                op_sysret,                op_sysret,
    /* 0x08 */   op_invd,                  op_invd,                  op_invd,                  op_invd,
    /* 0x09 */   op_wbinvd,                op_wbinvd,                op_wbinvd,                op_wbinvd,
    /* 0x0a */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x0b */   op_ud2,                   op_ud2,                   op_ud2,                   op_ud2,
    /* 0x0c */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x0d */   op_nop_modrm,             op_nop_modrm,             op_nop_modrm,             op_nop_modrm,
    /* 0x0e */   op_3dnow,                 op_3dnow,                 op_3dnow,                 op_3dnow,
    /* 0x0f */   op_3dnow,                 op_3dnow,                 op_3dnow,                 op_3dnow,

    /* 0x10 */   op_movups_vps_wps,        op_movupd_vpd_wpd,        op_movss_vss_wss,         op_movsd_vsd_wsd,
    /* 0x11 */   op_movups_wps_vps,        op_movupd_wpd_vpd,        op_movss_wss_vss,         op_movsd_wsd_vsd,
    /* 0x12 */   op_movlps_movhlps,        op_movlpd_vq_mq,          op_movsldup,              op_movddup,
    /* 0x13 */   op_movlps_mq_vq,          op_movlpd_mq_vq,          op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x14 */   op_unpcklps,              op_unpcklpd,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x15 */   op_unpckhps,              op_unpckhpd,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x16 */   op_movhps_movlhps,        op_movhpd_vq_mq,          op_movshdup,              op_invalid_need_rm,
    /* 0x17 */   op_movhps_mq_vq,          op_movhpd_mq_vq,          op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x18 */   op_nop_modrm,             op_nop_modrm,             op_nop_modrm,             op_nop_modrm,
    /* 0x19 */   op_nop_modrm,             op_nop_modrm,             op_nop_modrm,             op_nop_modrm,
    /* 0x1a */   op_nop_modrm,             op_nop_modrm,             op_nop_modrm,             op_nop_modrm,
    /* 0x1b */   op_nop_modrm,             op_nop_modrm,             op_nop_modrm,             op_nop_modrm,
    /* 0x1c */   op_nop_modrm,             op_nop_modrm,             op_nop_modrm,             op_nop_modrm,
    /* 0x1d */   op_nop_modrm,             op_nop_modrm,             op_nop_modrm,             op_nop_modrm,
    /* 0x1e */   op_nop_modrm,             op_nop_modrm,             op_nop_modrm,             op_nop_modrm,
    /* 0x1f */   op_nop_modrm,             op_nop_modrm,             op_nop_modrm,             op_nop_modrm,

    /* 0x20 */   op_mov_rd_cr,             op_mov_rd_cr,             op_mov_rd_cr,             op_mov_rd_cr,
    /* 0x21 */   op_mov_rd_dr,             op_mov_rd_dr,             op_mov_rd_dr,             op_mov_rd_dr,
    /* 0x22 */   op_mov_cr_rd,             op_mov_cr_rd,             op_mov_cr_rd,             op_mov_cr_rd,
    /* 0x23 */   op_mov_dr_rd,             op_mov_dr_rd,             op_mov_dr_rd,             op_mov_dr_rd,
    /* 0x24 */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x25 */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x26 */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x27 */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x28 */   op_movaps_vps_wps,        op_movapd_vpd_wpd,        op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x29 */   op_movaps_wps_vps,        op_movapd_wpd_vpd,        op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x2a */   op_cvtpi2ps,              op_cvtpi2pd,              op_cvtsi2ss,              op_cvtsi2sd,
    /* 0x2b */   op_movntps,               op_movntpd,               op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x2c */   op_cvttps2pi,             op_cvttpd2pi,             op_cvttss2si,             op_cvttsd2si,
    /* 0x2d */   op_cvtps2pi,              op_cvtpd2pi,              op_cvtss2si,              op_cvtsd2si,
    /* 0x2e */   op_ucomiss,               op_ucomisd,               op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x2f */   op_comiss,                op_comisd,                op_invalid_need_rm,       op_invalid_need_rm,

    /* 0x30 */   op_wrmsr,                 op_wrmsr,                 op_wrmsr,                 op_wrmsr,
    /* 0x31 */   op_rdtsc,                 op_rdtsc,                 op_rdtsc,                 op_rdtsc,
    /* 0x32 */   op_rdmsr,                 op_rdmsr,                 op_rdmsr,                 op_rdmsr,
    /* 0x33 */   op_rdpmc,                 op_rdpmc,                 op_rdpmc,                 op_rdpmc,
    /* 0x34 */   op_sysenter,              op_sysenter,              op_sysenter,              op_sysenter,
    /* 0x35 */   op_sysexit,               op_sysexit,               op_sysexit,               op_sysexit,
    /* 0x36 */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x37 */   op_getsec,                op_getsec,                op_getsec,                op_getsec,
    /* 0x38 */   op_three_byte_38,         op_three_byte_38,         op_three_byte_38,         op_three_byte_38,
    /* 0x39 */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x3a */   op_three_byte_3a,         op_three_byte_3a,         op_three_byte_3a,         op_three_byte_3a,
    /* 0x3b */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x3c */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x3d */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x3e */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x3f */   op_invalid,               op_invalid,               op_invalid,               op_invalid,

    /* 0x40 */   op_cmovo,                 op_cmovo,                 op_cmovo,                 op_cmovo,
    /* 0x41 */   op_cmovno,                op_cmovno,                op_cmovno,                op_cmovno,
    /* 0x42 */   op_cmovb,                 op_cmovb,                 op_cmovb,                 op_cmovb,
    /* 0x43 */   op_cmovnb,                op_cmovnb,                op_cmovnb,                op_cmovnb,
    /* 0x44 */   op_cmovz,                 op_cmovz,                 op_cmovz,                 op_cmovz,
    /* 0x45 */   op_cmovnz,                op_cmovnz,                op_cmovnz,                op_cmovnz,
    /* 0x46 */   op_cmovbe,                op_cmovbe,                op_cmovbe,                op_cmovbe,
    /* 0x47 */   op_cmovnbe,               op_cmovnbe,               op_cmovnbe,               op_cmovnbe,
    /* 0x48 */   op_cmovs,                 op_cmovs,                 op_cmovs,                 op_cmovs,
    /* 0x49 */   op_cmovns,                op_cmovns,                op_cmovns,                op_cmovns,
    /* 0x4a */   op_cmovp,                 op_cmovp,                 op_cmovp,                 op_cmovp,
    /* 0x4b */   op_cmovnp,                op_cmovnp,                op_cmovnp,                op_cmovnp,
    /* 0x4c */   op_cmovl,                 op_cmovl,                 op_cmovl,                 op_cmovl,
    /* 0x4d */   op_cmovnl,                op_cmovnl,                op_cmovnl,                op_cmovnl,
    /* 0x4e */   op_cmovle,                op_cmovle,                op_cmovle,                op_cmovle,
    /* 0x4f */   op_cmovnle,               op_cmovnle,               op_cmovnle,               op_cmovnle,

    /* 0x50 */   op_movmskps,              op_movmskpd,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x51 */   op_sqrtps,                op_sqrtpd,                op_sqrtss,                op_sqrtsd,
    /* 0x52 */   op_rsqrtps,               op_invalid_need_rm,       op_rsqrtss,               op_invalid_need_rm,
    /* 0x53 */   op_rcpps,                 op_invalid_need_rm,       op_rcpss,                 op_invalid_need_rm,
    /* 0x54 */   op_andps,                 op_andpd,                 op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x55 */   op_andnps,                op_andnpd,                op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x56 */   op_orps,                  op_orpd,                  op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x57 */   op_xorps,                 op_xorpd,                 op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x58 */   op_addps,                 op_addpd,                 op_addss,                 op_addsd,
    /* 0x59 */   op_mulps,                 op_mulpd,                 op_mulss,                 op_mulsd,
    /* 0x5a */   op_cvtps2pd,              op_cvtpd2ps,              op_cvtss2sd,              op_cvtsd2ss,
    /* 0x5b */   op_cvtdq2ps,              op_cvtps2dq,              op_cvttps2dq,             op_invalid_need_rm,
    /* 0x5c */   op_subps,                 op_subpd,                 op_subss,                 op_subsd,
    /* 0x5d */   op_minps,                 op_minpd,                 op_minss,                 op_minsd,
    /* 0x5e */   op_divps,                 op_divpd,                 op_divss,                 op_divsd,
    /* 0x5f */   op_maxps,                 op_maxpd,                 op_maxss,                 op_maxsd,

    /* 0x60 */   op_punpcklbw_pq,          op_punpcklbw_vx,          op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x61 */   op_punpcklwd_pq,          op_punpcklwd_vx,          op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x62 */   op_punpckldq_pq,          op_punpckldq_vx,          op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x63 */   op_packsswb_pq,           op_packsswb_vx,           op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x64 */   op_pcmpgtb_pq,            op_pcmpgtb_vx,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x65 */   op_pcmpgtw_pq,            op_pcmpgtw_vx,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x66 */   op_pcmpgtd_pq,            op_pcmpgtd_vx,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x67 */   op_packuswb_pq,           op_packuswb_vx,           op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x68 */   op_punpckhbw_pq,          op_punpckhbw_vx,          op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x69 */   op_punpckhwd_pq,          op_punpckhwd_vx,          op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x6a */   op_punpckhdq_pq,          op_punpckhdq_vx,          op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x6b */   op_packssdw_pq,           op_packssdw_vx,           op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x6c */   op_invalid_need_rm,       op_punpcklqdq_vx,         op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x6d */   op_invalid_need_rm,       op_punpckhqdq_vx,         op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x6e */   op_movd_pq_ey,            op_movd_vy_ey,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x6f */   op_movq_pq_qq,            op_movdqa_vx_wx,          op_movdqu_vx_wx,          op_invalid_need_rm,

    /* 0x70 */   op_pshufw,                op_pshufd,                op_pshufhw,               op_pshuflw,
    /* 0x71 */   op_grp12_pq,              op_grp12_vx,              op_invalid_need_rm_imm8,  op_invalid_need_rm_imm8,
    /* 0x72 */   op_grp13_pq,              op_grp13_vx,              op_invalid_need_rm_imm8,  op_invalid_need_rm_imm8,
    /* 0x73 */   op_grp14_pq,              op_grp14_vx,              op_invalid_need_rm_imm8,  op_invalid_need_rm_imm8,
    /* 0x74 */   op_pcmpeqb_pq,            op_pcmpeqb_vx,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x75 */   op_pcmpeqw_pq,            op_pcmpeqw_vx,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x76 */   op_pcmpeqd_pq,            op_pcmpeqd_vx,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0x77 */   op_emms,                  op_invalid,               op_invalid,               op_invalid,
    /* 0x78 */   op_vmx_unavailable,       op_invalid,               op_invalid,               op_invalid,
    /* 0x79 */   op_vmx_unavailable,       op_invalid,               op_invalid,               op_invalid,
    /* 0x7a */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x7b */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0x7c */   op_invalid_need_rm,       op_haddpd,                op_invalid_need_rm,       op_haddps,
    /* 0x7d */   op_invalid_need_rm,       op_hsubpd,                op_invalid_need_rm,       op_hsubps,
    /* 0x7e */   op_movd_ey_pq,            op_movd_ey_vy,            op_movq_vq_wq,            op_invalid_need_rm,
    /* 0x7f */   op_movq_qq_pq,            op_movdqa_wx_vx,          op_movdqu_wx_vx,          op_invalid_need_rm,

    /* 0x80 */   op_jo_rel,                op_jo_rel,                op_jo_rel,                op_jo_rel,
    /* 0x81 */   op_jno_rel,               op_jno_rel,               op_jno_rel,               op_jno_rel,
    /* 0x82 */   op_jb_rel,                op_jb_rel,                op_jb_rel,                op_jb_rel,
    /* 0x83 */   op_jnb_rel,               op_jnb_rel,               op_jnb_rel,               op_jnb_rel,
    /* 0x84 */   op_jz_rel,                op_jz_rel,                op_jz_rel,                op_jz_rel,
    /* 0x85 */   op_jnz_rel,               op_jnz_rel,               op_jnz_rel,               op_jnz_rel,
    /* 0x86 */   op_jbe_rel,               op_jbe_rel,               op_jbe_rel,               op_jbe_rel,
    /* 0x87 */   op_jnbe_rel,              op_jnbe_rel,              op_jnbe_rel,              op_jnbe_rel,
    /* 0x88 */   op_js_rel,                op_js_rel,                op_js_rel,                op_js_rel,
    /* 0x89 */   op_jns_rel,               op_jns_rel,               op_jns_rel,               op_jns_rel,
    /* 0x8a */   op_jp_rel,                op_jp_rel,                op_jp_rel,                op_jp_rel,
    /* 0x8b */   op_jnp_rel,               op_jnp_rel,               op_jnp_rel,               op_jnp_rel,
    /* 0x8c */   op_jl_rel,                op_jl_rel,                op_jl_rel,                op_jl_rel,
    /* 0x8d */   op_jnl_rel,               op_jnl_rel,               op_jnl_rel,               op_jnl_rel,
    /* 0x8e */   op_jle_rel,               op_jle_rel,               op_jle_rel,               op_jle_rel,
    /* 0x8f */   op_jnle_rel,              op_jnle_rel,              op_jnle_rel,              op_jnle_rel,

    /* 0x90 */   op_seto,                  op_seto,                  op_seto,                  op_seto,
    /* 0x91 */   op_setno,                 op_setno,                 op_setno,                 op_setno,
    /* 0x92 */   op_setb,                  op_setb,                  op_setb,                  op_setb,
    /* 0x93 */   op_setnb,                 op_setnb,                 op_setnb,                 op_setnb,
    /* 0x94 */   op_setz,                  op_setz,                  op_setz,                  op_setz,
    /* 0x95 */   op_setnz,                 op_setnz,                 op_setnz,                 op_setnz,
    /* 0x96 */   op_setbe,                 op_setbe,                 op_setbe,                 op_setbe,
    /* 0x97 */   op_setnbe,                op_setnbe,                op_setnbe,                op_setnbe,
    /* 0x98 */   op_sets,                  op_sets,                  op_sets,                  op_sets,
    /* 0x99 */   op_setns,                 op_setns,                 op_setns,                 op_setns,
    /* 0x9a */   op_setp,                  op_setp,                  op_setp,                  op_setp,
    /* 0x9b */   op_setnp,                 op_setnp,                 op_setnp,                 op_setnp,
    /* 0x9c */   op_setl,                  op_setl,                  op_setl,                  op_setl,
    /* 0x9d */   op_setnl,                 op_setnl,                 op_setnl,                 op_setnl,
    /* 0x9e */   op_setle,                 op_setle,                 op_setle,                 op_setle,
    /* 0x9f */   op_setnle,                op_setnle,                op_setnle,                op_setnle,

    /* 0xa0 */   op_push_fs,               op_push_fs,               op_push_fs,               op_push_fs,
    /* 0xa1 */   op_pop_fs,                op_pop_fs,                op_pop_fs,                op_pop_fs,
    /* 0xa2 */   op_cpuid,                 op_cpuid,                 op_cpuid,                 op_cpuid,
    /* 0xa3 */   op_bt_ev_gv,              op_bt_ev_gv,              op_bt_ev_gv,              op_bt_ev_gv,
    /* 0xa4 */   op_shld_ib,               op_shld_ib,               op_shld_ib,               op_shld_ib,
    /* 0xa5 */   op_shld_cl,               op_shld_cl,               op_shld_cl,               op_shld_cl,
    /* 0xa6 */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0xa7 */   op_invalid,               op_invalid,               op_invalid,               op_invalid,
    /* 0xa8 */   op_push_gs,               op_push_gs,               op_push_gs,               op_push_gs,
    /* 0xa9 */   op_pop_gs,                op_pop_gs,                op_pop_gs,                op_pop_gs,
    /* 0xaa */   op_rsm,                   op_rsm,                   op_rsm,                   op_rsm,
    /* 0xab */   op_bts_ev_gv,             op_bts_ev_gv,             op_bts_ev_gv,             op_bts_ev_gv,
    /* 0xac */   op_shrd_ib,               op_shrd_ib,               op_shrd_ib,               op_shrd_ib,
    /* 0xad */   op_shrd_cl,               op_shrd_cl,               op_shrd_cl,               op_shrd_cl,
    /* 0xae */   op_grp15,                 op_grp15,                 op_grp15,                 op_grp15,
    /* 0xaf */   op_imul_gv_ev,            op_imul_gv_ev,            op_imul_gv_ev,            op_imul_gv_ev,

    /* 0xb0 */   op_cmpxchg_eb_gb,         op_cmpxchg_eb_gb,         op_cmpxchg_eb_gb,         op_cmpxchg_eb_gb,
    /* 0xb1 */   op_cmpxchg_ev_gv,         op_cmpxchg_ev_gv,         op_cmpxchg_ev_gv,         op_cmpxchg_ev_gv,
    /* 0xb2 */   op_lss,                   op_lss,                   op_lss,                   op_lss,
    /* 0xb3 */   op_btr_ev_gv,             op_btr_ev_gv,             op_btr_ev_gv,             op_btr_ev_gv,
    /* 0xb4 */   op_lfs,                   op_lfs,                   op_lfs,                   op_lfs,
    /* 0xb5 */   op_lgs,                   op_lgs,                   op_lgs,                   op_lgs,
    /* 0xb6 */   op_movzx_gv_eb,           op_movzx_gv_eb,           op_movzx_gv_eb,           op_movzx_gv_eb,
    /* 0xb7 */   op_movzx_gv_ew,           op_movzx_gv_ew,           op_movzx_gv_ew,           op_movzx_gv_ew,
    /* 0xb8 */   op_invalid,               op_invalid,               op_popcnt,                op_invalid,
    /* 0xb9 */   op_ud1,                   op_ud1,                   op_ud1,                   op_ud1,
    /* 0xba */   op_grp8_ev_ib,            op_grp8_ev_ib,            op_grp8_ev_ib,            op_grp8_ev_ib,
    /* 0xbb */   op_btc_ev_gv,             op_btc_ev_gv,             op_btc_ev_gv,             op_btc_ev_gv,
    /* 0xbc */   op_bsf,                   op_bsf,                   op_tzcnt,                 op_bsf,
    /* 0xbd */   op_bsr,                   op_bsr,                   op_lzcnt,                 op_bsr,
    /* 0xbe */   op_movsx_gv_eb,           op_movsx_gv_eb,           op_movsx_gv_eb,           op_movsx_gv_eb,
    /* 0xbf */   op_movsx_gv_ew,           op_movsx_gv_ew,           op_movsx_gv_ew,           op_movsx_gv_ew,

    /* 0xc0 */   op_xadd_eb_gb,            op_xadd_eb_gb,            op_xadd_eb_gb,            op_xadd_eb_gb,
    /* 0xc1 */   op_xadd_ev_gv,            op_xadd_ev_gv,            op_xadd_ev_gv,            op_xadd_ev_gv,
    /* 0xc2 */   op_cmpps,                 op_cmppd,                 op_cmpss,                 op_cmpsd,
    /* 0xc3 */   op_movnti,                op_invalid_need_rm,       op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xc4 */   op_pinsrw_pq,             op_pinsrw_vx,             op_invalid_need_rm_imm8,  op_invalid_need_rm_imm8,
    /* 0xc5 */   op_pextrw_gd_nq,          op_pextrw_gd_ux,          op_invalid_need_rm_imm8,  op_invalid_need_rm_imm8,
    /* 0xc6 */   op_shufps,                op_shufpd,                op_invalid_need_rm_imm8,  op_invalid_need_rm_imm8,
    /* 0xc7 */   op_grp9,                  op_grp9,                  op_grp9,                  op_grp9,
    /* 0xc8 */   op_bswap_rax,             op_bswap_rax,             op_bswap_rax,             op_bswap_rax,
    /* 0xc9 */   op_bswap_rcx,             op_bswap_rcx,             op_bswap_rcx,             op_bswap_rcx,
    /* 0xca */   op_bswap_rdx,             op_bswap_rdx,             op_bswap_rdx,             op_bswap_rdx,
    /* 0xcb */   op_bswap_rbx,             op_bswap_rbx,             op_bswap_rbx,             op_bswap_rbx,
    /* 0xcc */   op_bswap_rsp,             op_bswap_rsp,             op_bswap_rsp,             op_bswap_rsp,
    /* 0xcd */   op_bswap_rbp,             op_bswap_rbp,             op_bswap_rbp,             op_bswap_rbp,
    /* 0xce */   op_bswap_rsi,             op_bswap_rsi,             op_bswap_rsi,             op_bswap_rsi,
    /* 0xcf */   op_bswap_rdi,             op_bswap_rdi,             op_bswap_rdi,             op_bswap_rdi,

    /* 0xd0 */   op_invalid_need_rm,       op_addsubpd,              op_invalid_need_rm,       op_addsubps,
    /* 0xd1 */   op_psrlw_pq,              op_psrlw_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xd2 */   op_psrld_pq,              op_psrld_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xd3 */   op_psrlq_pq,              op_psrlq_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xd4 */   op_paddq_pq,              op_paddq_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xd5 */   op_pmullw_pq,             op_pmullw_vx,             op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xd6 */   op_invalid_need_rm,       op_movq_wq_vq,            op_movq2dq,               op_movdq2q,
    /* 0xd7 */   op_pmovmskb_gd_nq,        op_pmovmskb_gd_ux,        op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xd8 */   op_psubusb_pq,            op_psubusb_vx,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xd9 */   op_psubusw_pq,            op_psubusw_vx,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xda */   op_pminub_pq,             op_pminub_vx,             op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xdb */   op_pand_pq,               op_pand_vx,               op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xdc */   op_paddusb_pq,            op_paddusb_vx,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xdd */   op_paddusw_pq,            op_paddusw_vx,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xde */   op_pmaxub_pq,             op_pmaxub_vx,             op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xdf */   op_pandn_pq,              op_pandn_vx,              op_invalid_need_rm,       op_invalid_need_rm,

    /* 0xe0 */   op_pavgb_pq,              op_pavgb_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xe1 */   op_psraw_pq,              op_psraw_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xe2 */   op_psrad_pq,              op_psrad_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xe3 */   op_pavgw_pq,              op_pavgw_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xe4 */   op_pmulhuw_pq,            op_pmulhuw_vx,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xe5 */   op_pmulhw_pq,             op_pmulhw_vx,             op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xe6 */   op_invalid_need_rm,       op_cvttpd2dq,             op_cvtdq2pd,              op_cvtpd2dq,
    /* 0xe7 */   op_movntq,                op_movntdq,               op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xe8 */   op_psubsb_pq,             op_psubsb_vx,             op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xe9 */   op_psubsw_pq,             op_psubsw_vx,             op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xea */   op_pminsw_pq,             op_pminsw_vx,             op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xeb */   op_por_pq,                op_por_vx,                op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xec */   op_paddsb_pq,             op_paddsb_vx,             op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xed */   op_paddsw_pq,             op_paddsw_vx,             op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xee */   op_pmaxsw_pq,             op_pmaxsw_vx,             op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xef */   op_pxor_pq,               op_pxor_vx,               op_invalid_need_rm,       op_invalid_need_rm,

    /* 0xf0 */   op_invalid_need_rm,       op_invalid_need_rm,       op_invalid_need_rm,       op_lddqu,
    /* 0xf1 */   op_psllw_pq,              op_psllw_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xf2 */   op_pslld_pq,              op_pslld_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xf3 */   op_psllq_pq,              op_psllq_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xf4 */   op_pmuludq_pq,            op_pmuludq_vx,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xf5 */   op_pmaddwd_pq,            op_pmaddwd_vx,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xf6 */   op_psadbw_pq,             op_psadbw_vx,             op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xf7 */   op_maskmovq,              op_maskmovdqu,            op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xf8 */   op_psubb_pq,              op_psubb_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xf9 */   op_psubw_pq,              op_psubw_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xfa */   op_psubd_pq,              op_psubd_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xfb */   op_psubq_pq,              op_psubq_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xfc */   op_paddb_pq,              op_paddb_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xfd */   op_paddw_pq,              op_paddw_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xfe */   op_paddd_pq,              op_paddd_vx,              op_invalid_need_rm,       op_invalid_need_rm,
    /* 0xff */   op_ud0,                   op_ud0,                   op_ud0,                   op_ud0,
];

fn op_three_byte_38(ctx: &mut Ctx<'_>) -> OpResult {
    super::three_byte::dispatch_38(ctx)
}

fn op_three_byte_3a(ctx: &mut Ctx<'_>) -> OpResult {
    super::three_byte::dispatch_3a(ctx)
}

#[cfg(test)]
mod tests {
    use super::TWO_BYTE_MAP;

    #[test]
    fn map_has_a_cell_for_every_byte_and_prefix() {
        assert_eq!(TWO_BYTE_MAP.len(), 256 * 4);
    }
}
