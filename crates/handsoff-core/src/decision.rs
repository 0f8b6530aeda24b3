//! The touch decision rule applied to every prediction.

use crate::types::{Label, Prediction};

/// Confidence a `touched` prediction must exceed to count as a touch.
pub const DEFAULT_TOUCH_CONFIDENCE: f32 = 0.8;

/// True iff the prediction is `touched` with confidence strictly above `threshold`.
pub fn is_touching(prediction: &Prediction, threshold: f32) -> bool {
    prediction.label == Label::Touching && prediction.confidence() > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_exclusive() {
        let at = Prediction::with_confidence(Label::Touching, 0.8);
        assert!(!is_touching(&at, DEFAULT_TOUCH_CONFIDENCE));
    }

    #[test]
    fn test_just_above_threshold() {
        let above = Prediction::with_confidence(Label::Touching, 0.80001);
        assert!(is_touching(&above, DEFAULT_TOUCH_CONFIDENCE));
    }

    #[test]
    fn test_not_touching_never_triggers() {
        for c in [0.0, 0.5, 0.8, 0.80001, 0.95, 1.0] {
            let p = Prediction::with_confidence(Label::NotTouching, c);
            assert!(!is_touching(&p, DEFAULT_TOUCH_CONFIDENCE), "confidence {c}");
        }
    }

    #[test]
    fn test_touching_sweep() {
        for (c, expected) in [(0.0, false), (0.5, false), (0.79, false), (0.81, true), (1.0, true)] {
            let p = Prediction::with_confidence(Label::Touching, c);
            assert_eq!(is_touching(&p, DEFAULT_TOUCH_CONFIDENCE), expected, "confidence {c}");
        }
    }
}
