//! Every built-in scenario must pass against the CPU backend, on the default
//! seed and on a handful of others.

mod common;

use common::{Fault, Faulty};
use opc_conformance::{ConformanceDriver, HarnessConfig, builtin_suite, run_suite};
use opc_cpu::{CpuBackend, cpu_backend};

#[test]
fn builtin_suite_passes_on_cpu_backend() {
    let _ = tracing_subscriber::fmt::try_init();

    let driver = ConformanceDriver::new(CpuBackend::new());
    let suite = builtin_suite(&HarnessConfig::default()).unwrap();
    let summary = run_suite(&driver, &suite);
    for report in summary.failures() {
        eprintln!("{report}");
    }
    assert!(summary.all_passed(), "{summary}");
    assert_eq!(summary.passed(), suite.len());
    // One compiled program per scenario.
    assert_eq!(driver.adapter().cached_programs(), suite.len());
}

#[test]
fn builtin_suite_passes_across_seeds() {
    let driver = ConformanceDriver::new(cpu_backend());
    for seed in [0, 1, 7, 1234, u64::MAX] {
        let config = HarnessConfig {
            seed,
            ..HarnessConfig::default()
        };
        let suite = builtin_suite(&config).unwrap();
        let summary = run_suite(&driver, &suite);
        assert!(summary.all_passed(), "seed {seed}: {summary}");
    }
}

#[test]
fn zero_adapter_fails_every_scenario() {
    let driver = ConformanceDriver::new(Faulty::new(Fault::ZeroOutputs));
    let suite = builtin_suite(&HarnessConfig::default()).unwrap();
    let summary = run_suite(&driver, &suite);
    assert_eq!(summary.failed(), suite.len(), "{summary}");
    assert!(
        summary
            .failures()
            .all(|r| r.error().map(|e| e.kind()) == Some("value_mismatch"))
    );
}
