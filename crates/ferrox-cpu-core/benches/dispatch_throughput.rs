use criterion::{criterion_group, criterion_main, Criterion};
use ferrox_cpu_core::{CoreConfig, CpuFeatureSet, CpuMode, CpuState, FlatBus};
use ferrox_types::Gpr;

const CODE: u64 = 0x1000;

fn bench_movzx(c: &mut Criterion) {
    let cfg = CoreConfig::from_features(CpuFeatureSet::modern());
    let mut state = CpuState::new(CpuMode::Long);
    let mut bus = FlatBus::new(0x1_0000);
    bus.load(CODE, &[0x0F, 0xB6, 0xC1]); // movzx eax, cl
    state.set_gpr64(Gpr::Rcx, 0xFF);

    c.bench_function("dispatch_movzx", |b| {
        b.iter(|| {
            state.rip = CODE;
            ferrox_cpu_core::step(&cfg, &mut state, &mut bus).unwrap();
        })
    });
}

fn bench_alu_loop(c: &mut Criterion) {
    let cfg = CoreConfig::from_features(CpuFeatureSet::modern());
    let mut state = CpuState::new(CpuMode::Long);
    let mut bus = FlatBus::new(0x1_0000);
    // add eax, ecx ; imul eax, ecx ; xor eax, eax
    bus.load(CODE, &[0x01, 0xC8, 0x0F, 0xAF, 0xC1, 0x31, 0xC0]);
    state.set_gpr64(Gpr::Rcx, 3);

    c.bench_function("dispatch_alu_block", |b| {
        b.iter(|| {
            state.rip = CODE;
            ferrox_cpu_core::run_batch(&cfg, &mut state, &mut bus, 3);
        })
    });
}

fn bench_sse_packed(c: &mut Criterion) {
    use ferrox_cpu_core::state::CR4_OSFXSR;

    let cfg = CoreConfig::from_features(CpuFeatureSet::modern());
    let mut state = CpuState::new(CpuMode::Long);
    state.control.cr4 |= CR4_OSFXSR;
    let mut bus = FlatBus::new(0x1_0000);
    bus.load(CODE, &[0x66, 0x0F, 0xFC, 0xC1]); // paddb xmm0, xmm1
    state.set_xmm(1, 0x0101_0101_0101_0101_0101_0101_0101_0101);

    c.bench_function("dispatch_paddb_xmm", |b| {
        b.iter(|| {
            state.rip = CODE;
            ferrox_cpu_core::step(&cfg, &mut state, &mut bus).unwrap();
        })
    });
}

criterion_group!(benches, bench_movzx, bench_alu_loop, bench_sse_packed);
criterion_main!(benches);
