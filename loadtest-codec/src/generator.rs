//! Synthetic questionnaire responses.

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

use loadtest_core::{LoadTestError, LoadTestResult};

use crate::model::{Answer, AnswerValue, Questionnaire};

pub const DEFAULT_STEP_SECONDS: f64 = 1000.0;
pub const DEFAULT_MAX_JITTER_SECONDS: u32 = 10_000;

/// Latest timestamp, in epoch seconds, whose answer steps must stay distinct.
const TIMESTAMP_HORIZON: f64 = 1e10;

/// Smallest answer step that survives f64 rounding at epoch-scale timestamps.
pub const MIN_STEP_SECONDS: f64 = 64.0 * f64::EPSILON * TIMESTAMP_HORIZON;

/// Generates questionnaires whose answers are `step_seconds` apart, starting
/// at a random point in the recent past.
#[derive(Debug, Clone)]
pub struct QuestionnaireGenerator {
    step_seconds: f64,
    max_jitter_seconds: u32,
    name: String,
    version: String,
}

impl Default for QuestionnaireGenerator {
    fn default() -> Self {
        Self {
            step_seconds: DEFAULT_STEP_SECONDS,
            max_jitter_seconds: DEFAULT_MAX_JITTER_SECONDS,
            name: "test".to_string(),
            version: "1".to_string(),
        }
    }
}

impl QuestionnaireGenerator {
    pub fn new(step_seconds: f64, max_jitter_seconds: u32) -> LoadTestResult<Self> {
        if !step_seconds.is_finite() || step_seconds <= 0.0 {
            return Err(LoadTestError::InvalidArgument(format!(
                "answer step must be positive, got {}",
                step_seconds
            )));
        }
        if step_seconds < MIN_STEP_SECONDS {
            return Err(LoadTestError::InvalidArgument(format!(
                "answer step {} is below the timestamp resolution of {}",
                step_seconds, MIN_STEP_SECONDS
            )));
        }
        Ok(Self {
            step_seconds,
            max_jitter_seconds,
            ..Self::default()
        })
    }

    pub fn step_seconds(&self) -> f64 {
        self.step_seconds
    }

    /// A questionnaire of `count` answers ending no later than
    /// `now - jitter + count * step`.
    pub fn generate(&self, count: usize) -> LoadTestResult<Questionnaire> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        self.generate_at(now, count, &mut rand::thread_rng())
    }

    pub fn generate_at<R: Rng + ?Sized>(
        &self,
        now: f64,
        count: usize,
        rng: &mut R,
    ) -> LoadTestResult<Questionnaire> {
        let jitter = if self.max_jitter_seconds == 0 {
            0
        } else {
            rng.gen_range(0..self.max_jitter_seconds)
        };
        let base = now - f64::from(jitter);

        let answers: Vec<Answer> = (0..count)
            .map(|index| {
                let timestamp = base + (index as f64 + 1.0) * self.step_seconds;
                Answer {
                    question_id: Some("questionId".to_string()),
                    value: AnswerValue::String(format!("Answer #{}", index)),
                    start_time: timestamp,
                    end_time: timestamp,
                }
            })
            .collect();

        let (time, time_completed) = match (answers.first(), answers.last()) {
            (Some(first), Some(last)) => (first.start_time, last.end_time),
            _ => (base, base),
        };
        let questionnaire = Questionnaire {
            time,
            time_completed,
            time_notification: Some(time),
            name: self.name.clone(),
            version: self.version.clone(),
            answers,
        };
        questionnaire.check_timeline(self.step_seconds)?;
        Ok(questionnaire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn answers_increase_by_constant_step() {
        let generator = QuestionnaireGenerator::default();
        let mut rng = StdRng::seed_from_u64(7);
        for count in [1, 2, 10, 100] {
            let q = generator.generate_at(1_700_000_000.0, count, &mut rng).unwrap();
            assert_eq!(q.answers.len(), count);
            for pair in q.answers.windows(2) {
                assert!(pair[1].start_time > pair[0].start_time);
                assert!((pair[1].start_time - pair[0].start_time - DEFAULT_STEP_SECONDS).abs() < 1e-3);
            }
            assert_eq!(q.time, q.answers[0].start_time);
            assert_eq!(q.time_completed, q.answers[count - 1].end_time);
            assert_eq!(q.time_notification, Some(q.time));
        }
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let generator = QuestionnaireGenerator::new(1.0, 10).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let q = generator.generate_at(100.0, 1, &mut rng).unwrap();
            // base in (90, 100], first answer one step later
            assert!(q.time > 91.0 - 1e-9 && q.time <= 101.0);
        }
    }

    #[test]
    fn zero_answers_yield_empty_questionnaire_at_base() {
        let generator = QuestionnaireGenerator::new(5.0, 0).unwrap();
        let q = generator.generate_at(50.0, 0, &mut rand::thread_rng()).unwrap();
        assert!(q.answers.is_empty());
        assert_eq!(q.time, 50.0);
        assert_eq!(q.time_completed, 50.0);
    }

    #[test]
    fn non_positive_step_is_rejected() {
        assert!(QuestionnaireGenerator::new(0.0, 10).is_err());
        assert!(QuestionnaireGenerator::new(-1.0, 10).is_err());
    }

    #[test]
    fn steps_below_timestamp_resolution_are_rejected() {
        assert!(QuestionnaireGenerator::new(1e-7, 10).is_err());

        let generator = QuestionnaireGenerator::new(MIN_STEP_SECONDS, 0).unwrap();
        let q = generator
            .generate_at(4_000_000_000.0, 50, &mut rand::thread_rng())
            .unwrap();
        assert!(q.answers.windows(2).all(|pair| pair[1].start_time > pair[0].start_time));
    }

    #[test]
    fn generate_uses_wall_clock() {
        let q = QuestionnaireGenerator::default().generate(3).unwrap();
        assert_eq!(q.answers.len(), 3);
        assert_eq!(q.name, "test");
    }
}
