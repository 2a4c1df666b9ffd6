//! The one-byte opcode map: the dispatch entry point.
//!
//! Prefix bytes are consumed by the scanner before dispatch, so their
//! cells can never be reached and are wired to the invalid handler. The
//! 0x0F cell chains into the two-byte map.

use super::decode::Ctx;
use super::ops_alu::*;
use super::ops_cf::*;
use super::ops_data::*;
use super::ops_string::*;
use super::ops_sys::*;
use super::two_byte;
use super::two_byte::op_invalid;
use super::{OpHandler, OpResult};

fn op_two_byte_escape(ctx: &mut Ctx<'_>) -> OpResult {
    two_byte::dispatch(ctx)
}

pub(crate) fn dispatch(ctx: &mut Ctx<'_>, opcode: u8) -> OpResult {
    ONE_BYTE_MAP[opcode as usize](ctx)
}

#[rustfmt::skip]
static ONE_BYTE_MAP: [OpHandler; 256] = [
    /* 0x00 */ op_add_eb_gb,    op_add_ev_gv,    op_add_gb_eb,    op_add_gv_ev,
    /* 0x04 */ op_add_al_ib,    op_add_rax_iz,   op_push_es,      op_pop_es,
    /* 0x08 */ op_or_eb_gb,     op_or_ev_gv,     op_or_gb_eb,     op_or_gv_ev,
    /* 0x0c */ op_or_al_ib,     op_or_rax_iz,    op_push_cs,      op_two_byte_escape,
    /* 0x10 */ op_adc_eb_gb,    op_adc_ev_gv,    op_adc_gb_eb,    op_adc_gv_ev,
    /* 0x14 */ op_adc_al_ib,    op_adc_rax_iz,   op_push_ss,      op_pop_ss,
    /* 0x18 */ op_sbb_eb_gb,    op_sbb_ev_gv,    op_sbb_gb_eb,    op_sbb_gv_ev,
    /* 0x1c */ op_sbb_al_ib,    op_sbb_rax_iz,   op_push_ds,      op_pop_ds,
    /* 0x20 */ op_and_eb_gb,    op_and_ev_gv,    op_and_gb_eb,    op_and_gv_ev,
    /* 0x24 */ op_and_al_ib,    op_and_rax_iz,   op_invalid /* seg ES prefix */, op_daa,
    /* 0x28 */ op_sub_eb_gb,    op_sub_ev_gv,    op_sub_gb_eb,    op_sub_gv_ev,
    /* 0x2c */ op_sub_al_ib,    op_sub_rax_iz,   op_invalid /* seg CS prefix */, op_das,
    /* 0x30 */ op_xor_eb_gb,    op_xor_ev_gv,    op_xor_gb_eb,    op_xor_gv_ev,
    /* 0x34 */ op_xor_al_ib,    op_xor_rax_iz,   op_invalid /* seg SS prefix */, op_aaa,
    /* 0x38 */ op_cmp_eb_gb,    op_cmp_ev_gv,    op_cmp_gb_eb,    op_cmp_gv_ev,
    /* 0x3c */ op_cmp_al_ib,    op_cmp_rax_iz,   op_invalid /* seg DS prefix */, op_aas,
    // 0x40-0x4F are REX prefixes in 64-bit mode and consumed by the
    // scanner there; these handlers only run in 16/32-bit modes.
    /* 0x40 */ op_inc_eax,      op_inc_ecx,      op_inc_edx,      op_inc_ebx,
    /* 0x44 */ op_inc_esp,      op_inc_ebp,      op_inc_esi,      op_inc_edi,
    /* 0x48 */ op_dec_eax,      op_dec_ecx,      op_dec_edx,      op_dec_ebx,
    /* 0x4c */ op_dec_esp,      op_dec_ebp,      op_dec_esi,      op_dec_edi,
    /* 0x50 */ op_push_rax,     op_push_rcx,     op_push_rdx,     op_push_rbx,
    /* 0x54 */ op_push_rsp,     op_push_rbp,     op_push_rsi,     op_push_rdi,
    /* 0x58 */ op_pop_rax,      op_pop_rcx,      op_pop_rdx,      op_pop_rbx,
    /* 0x5c */ op_pop_rsp,      op_pop_rbp,      op_pop_rsi,      op_pop_rdi,
    /* 0x60 */ op_pusha,        op_popa,         op_bound,        op_movsxd_or_arpl,
    /* 0x64 */ op_invalid /* seg FS prefix */, op_invalid /* seg GS prefix */,
               op_invalid /* osize prefix */,  op_invalid /* asize prefix */,
    /* 0x68 */ op_push_iz,      op_imul_gv_ev_iz, op_push_ib,     op_imul_gv_ev_ib,
    /* 0x6c */ op_insb,         op_insv,         op_outsb,        op_outsv,
    /* 0x70 */ op_jo_rel8,      op_jno_rel8,     op_jb_rel8,      op_jnb_rel8,
    /* 0x74 */ op_jz_rel8,      op_jnz_rel8,     op_jbe_rel8,     op_jnbe_rel8,
    /* 0x78 */ op_js_rel8,      op_jns_rel8,     op_jp_rel8,      op_jnp_rel8,
    /* 0x7c */ op_jl_rel8,      op_jnl_rel8,     op_jle_rel8,     op_jnle_rel8,
    /* 0x80 */ op_grp1_eb_ib,   op_grp1_ev_iz,   op_grp1_eb_ib_alias, op_grp1_ev_ib,
    /* 0x84 */ op_test_eb_gb,   op_test_ev_gv,   op_xchg_eb_gb,   op_xchg_ev_gv,
    /* 0x88 */ op_mov_eb_gb,    op_mov_ev_gv,    op_mov_gb_eb,    op_mov_gv_ev,
    /* 0x8c */ op_mov_ev_sw,    op_lea,          op_mov_sw_ev,    op_grp1a_pop,
    /* 0x90 */ op_nop,          op_xchg_rcx_rax, op_xchg_rdx_rax, op_xchg_rbx_rax,
    /* 0x94 */ op_xchg_rsp_rax, op_xchg_rbp_rax, op_xchg_rsi_rax, op_xchg_rdi_rax,
    /* 0x98 */ op_cbw,          op_cwd,          op_call_far,     op_wait,
    /* 0x9c */ op_pushf,        op_popf,         op_sahf,         op_lahf,
    /* 0xa0 */ op_mov_al_ob,    op_mov_rax_ov,   op_mov_ob_al,    op_mov_ov_rax,
    /* 0xa4 */ op_movsb,        op_movsv,        op_cmpsb,        op_cmpsv,
    /* 0xa8 */ op_test_al_ib,   op_test_rax_iz,  op_stosb,        op_stosv,
    /* 0xac */ op_lodsb,        op_lodsv,        op_scasb,        op_scasv,
    /* 0xb0 */ op_mov_al_ib,    op_mov_cl_ib,    op_mov_dl_ib,    op_mov_bl_ib,
    /* 0xb4 */ op_mov_ah_ib,    op_mov_ch_ib,    op_mov_dh_ib,    op_mov_bh_ib,
    /* 0xb8 */ op_mov_rax_iv,   op_mov_rcx_iv,   op_mov_rdx_iv,   op_mov_rbx_iv,
    /* 0xbc */ op_mov_rsp_iv,   op_mov_rbp_iv,   op_mov_rsi_iv,   op_mov_rdi_iv,
    /* 0xc0 */ op_grp2_eb_ib,   op_grp2_ev_ib,   op_ret_iw,       op_ret,
    /* 0xc4 */ op_les,          op_lds,          op_grp11_eb_ib,  op_grp11_ev_iz,
    /* 0xc8 */ op_enter,        op_leave,        op_ret_far_iw,   op_ret_far,
    /* 0xcc */ op_int3,         op_int_ib,       op_into,         op_iret,
    /* 0xd0 */ op_grp2_eb_1,    op_grp2_ev_1,    op_grp2_eb_cl,   op_grp2_ev_cl,
    /* 0xd4 */ op_aam,          op_aad,          op_salc,         op_xlat,
    /* 0xd8 */ op_x87_escape,   op_x87_escape,   op_x87_escape,   op_x87_escape,
    /* 0xdc */ op_x87_escape,   op_x87_escape,   op_x87_escape,   op_x87_escape,
    /* 0xe0 */ op_loopne,       op_loope,        op_loop,         op_jcxz,
    /* 0xe4 */ op_in_al_ib,     op_in_eax_ib,    op_out_ib_al,    op_out_ib_eax,
    /* 0xe8 */ op_call_rel_z,   op_jmp_rel_z,    op_jmp_far,      op_jmp_rel8,
    /* 0xec */ op_in_al_dx,     op_in_eax_dx,    op_out_dx_al,    op_out_dx_eax,
    /* 0xf0 */ op_invalid /* LOCK prefix */, op_int1,
               op_invalid /* REPNE prefix */, op_invalid /* REP prefix */,
    /* 0xf4 */ op_hlt,          op_cmc,          op_grp3_eb,      op_grp3_ev,
    /* 0xf8 */ op_clc,          op_stc,          op_cli,          op_sti,
    /* 0xfc */ op_cld,          op_std,          op_grp4,         op_grp5,
];

#[cfg(test)]
mod tests {
    use super::ONE_BYTE_MAP;

    #[test]
    fn map_is_dense() {
        assert_eq!(ONE_BYTE_MAP.len(), 256);
    }
}
