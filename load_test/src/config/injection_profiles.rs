use crate::injection::{ClosedStep, InjectionProfile, OpenStep};

/// Name of the ingestion profile used when none is configured.
pub const DEFAULT_INGESTION_PROFILE: &str = "ramp";

/// Get an ingestion injection profile by name
pub fn get_ingestion_profile(profile: &str) -> InjectionProfile {
    match profile {
        "smoke" => smoke_profile(),
        "ramp" => ramp_profile(),
        "stress" => stress_profile(),
        "constant-rate" => constant_rate_profile(),
        _ => {
            tracing::warn!(profile, "unknown ingestion profile, using '{}'", DEFAULT_INGESTION_PROFILE);
            ramp_profile()
        }
    }
}

pub fn profile_names() -> &'static [&'static str] {
    &["smoke", "ramp", "stress", "constant-rate"]
}

/// Stepped closed-model ramp:
/// - 5, 10, 15, 20, 25 concurrent sessions
/// - each level held for 60 seconds
/// - 10 second linear ramps between levels
pub fn ramp_profile() -> InjectionProfile {
    InjectionProfile::increment_concurrent(5, 5, 60, 10, 5)
}

/// A couple of sessions for checking a deployment end to end.
pub fn smoke_profile() -> InjectionProfile {
    InjectionProfile::Closed(vec![ClosedStep::ConstantConcurrent { users: 2, seconds: 10 }])
}

/// High concurrency:
/// - 50 to 500 concurrent sessions in steps of 50
/// - each level held for 2 minutes
/// - 30 second ramps
pub fn stress_profile() -> InjectionProfile {
    InjectionProfile::increment_concurrent(50, 10, 120, 30, 50)
}

/// Open model, arrivals independent of response times:
/// - warmup from 1 to 20 sessions/sec over 30 seconds
/// - then 20 sessions/sec for 5 minutes
pub fn constant_rate_profile() -> InjectionProfile {
    InjectionProfile::Open(vec![
        OpenStep::RampRate {
            from: 1.0,
            to: 20.0,
            seconds: 30,
        },
        OpenStep::ConstantRate {
            rate: 20.0,
            seconds: 300,
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_named_profile_is_valid() {
        for name in profile_names() {
            assert!(get_ingestion_profile(name).validate().is_ok(), "{}", name);
        }
    }

    #[test]
    fn unknown_profile_falls_back_to_ramp() {
        assert_eq!(get_ingestion_profile("nope"), ramp_profile());
    }
}
