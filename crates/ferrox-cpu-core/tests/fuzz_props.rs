//! Robustness: arbitrary byte streams through the full dispatch path
//! never panic, and successful execution never consumes more than the
//! architectural instruction length limit.

#![cfg(not(target_arch = "wasm32"))]

mod common;

use common::{TestCpu, CODE};
use ferrox_cpu_core::{CpuFeatureSet, StepExit};
use proptest::prelude::*;

proptest! {
    #[test]
    fn dispatch_is_total_over_random_bytes(
        bytes in proptest::collection::vec(any::<u8>(), 1..16),
        modern in any::<bool>(),
    ) {
        let features = if modern {
            CpuFeatureSet::modern()
        } else {
            CpuFeatureSet::baseline()
        };
        let mut cpu = TestCpu::with_features(features);
        let result = cpu.run(&bytes);
        if let Ok(StepExit::Continue) = result {
            let len = cpu.state.rip - CODE;
            prop_assert!(len >= 1 && len <= 15, "bad instruction length {len}");
        }
    }

    #[test]
    fn faults_never_advance_rip(
        bytes in proptest::collection::vec(any::<u8>(), 1..16),
    ) {
        let mut cpu = TestCpu::long_mode();
        if cpu.run(&bytes).is_err() {
            prop_assert_eq!(cpu.state.rip, CODE);
        }
    }

    #[test]
    fn two_byte_space_is_total(
        opcode in any::<u8>(),
        modrm in any::<u8>(),
        tail in proptest::collection::vec(any::<u8>(), 0..10),
    ) {
        let mut cpu = TestCpu::long_mode();
        let mut bytes = vec![0x0F, opcode, modrm];
        bytes.extend_from_slice(&tail);
        // Must not panic; outcome is success or a defined error.
        let _ = cpu.run(&bytes);
    }
}
