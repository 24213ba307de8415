//! Confidence update rules.
//!
//! A rule folds one resolved outcome into an insight's score. Any rule
//! must keep the score inside `[0, 1]` and move it toward the outcome's
//! target, never past it.

use std::fmt::Debug;

use brain_types::{ApplicationOutcome, Confidence};

use crate::error::{InsightError, InsightResult};

pub trait ConfidenceRule: Send + Sync + Debug {
    /// Short name for logs
    fn name(&self) -> &str;

    /// New score after one resolved outcome.
    ///
    /// `pending` outcomes carry no information and return `current`.
    fn update(&self, current: Confidence, outcome: ApplicationOutcome) -> Confidence;
}

/// Exponentially weighted update: `score + alpha * (target - score)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EwmaRule {
    alpha: f64,
}

impl EwmaRule {
    /// `alpha` must lie in `(0, 1]`
    pub fn new(alpha: f64) -> InsightResult<Self> {
        if !alpha.is_finite() || alpha <= 0.0 || alpha > 1.0 {
            return Err(InsightError::InvalidInput(format!(
                "learning rate {} outside (0, 1]",
                alpha
            )));
        }
        Ok(Self { alpha })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl ConfidenceRule for EwmaRule {
    fn name(&self) -> &str {
        "ewma"
    }

    fn update(&self, current: Confidence, outcome: ApplicationOutcome) -> Confidence {
        match outcome.target() {
            Some(target) => {
                let score = current.value();
                Confidence::clamped(score + self.alpha * (target - score))
            }
            None => current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(v: f64) -> Confidence {
        Confidence::new(v).unwrap()
    }

    #[test]
    fn success_moves_toward_one() {
        let rule = EwmaRule::new(0.2).unwrap();
        let next = rule.update(c(0.6), ApplicationOutcome::Success);
        assert!((next.value() - 0.68).abs() < 1e-12);
    }

    #[test]
    fn partial_success_moves_toward_half() {
        let rule = EwmaRule::new(0.5).unwrap();
        assert!((rule.update(c(0.9), ApplicationOutcome::PartialSuccess).value() - 0.7).abs() < 1e-12);
        assert!((rule.update(c(0.1), ApplicationOutcome::PartialSuccess).value() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn failure_moves_toward_zero() {
        let rule = EwmaRule::new(0.25).unwrap();
        assert!((rule.update(c(0.8), ApplicationOutcome::Failure).value() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn pending_leaves_score_alone() {
        let rule = EwmaRule::new(0.25).unwrap();
        assert_eq!(rule.update(c(0.8), ApplicationOutcome::Pending), c(0.8));
    }

    #[test]
    fn alpha_of_one_jumps_to_target() {
        let rule = EwmaRule::new(1.0).unwrap();
        assert_eq!(rule.update(c(0.3), ApplicationOutcome::Success).value(), 1.0);
    }

    #[test]
    fn alpha_must_be_in_range() {
        assert!(EwmaRule::new(0.0).is_err());
        assert!(EwmaRule::new(1.5).is_err());
        assert!(EwmaRule::new(f64::NAN).is_err());
    }
}
