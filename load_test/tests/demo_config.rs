use load_test::{FailurePolicy, InjectionProfile, RunConfig};
use loadtest_core::WireFormat;
use std::path::Path;

#[test]
fn demo_configuration_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demo/run.toml");
    let config = RunConfig::load(Some(&path)).unwrap();
    config.validate().unwrap();

    assert_eq!(config.participants, 5);
    assert_eq!(config.data.format, WireFormat::Binary);
    assert_eq!(config.retry.max_attempts, 3);

    let phases = config.phases();
    assert_eq!(phases[3].injection, InjectionProfile::increment_concurrent(5, 5, 60, 10, 5));
    assert_eq!(phases[2].failure_policy, FailurePolicy::AbortAfter { failures: 1 });
}
