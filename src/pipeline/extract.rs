//! Final-answer extraction from expert-deliberation completions.
//!
//! Every question is answered by several experts and a closing verdict, each
//! ending in `FINAL_ANSWER: ...`. Only the text after the last marker is the
//! answer; everything before it is deliberation and is discarded.

use tracing::warn;

/// Delimiter between deliberation and the authoritative answer.
pub const FINAL_ANSWER_MARKER: &str = "FINAL_ANSWER:";

/// Answer extracted from a raw completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub answer: String,
    /// False when the completion had no marker and `answer` is the whole text.
    pub marker_found: bool,
}

/// Returns the text after the last [`FINAL_ANSWER_MARKER`], trimmed.
///
/// Without a marker the completion is returned unchanged and flagged, since it
/// may be raw deliberation rather than an answer.
pub fn extract_final_answer(raw: &str) -> Extraction {
    match raw.rfind(FINAL_ANSWER_MARKER) {
        Some(index) => Extraction {
            answer: raw[index + FINAL_ANSWER_MARKER.len()..].trim().to_string(),
            marker_found: true,
        },
        None => {
            warn!(
                marker = FINAL_ANSWER_MARKER,
                chars = raw.len(),
                "Completion has no final-answer marker; using the whole text"
            );
            Extraction {
                answer: raw.to_string(),
                marker_found: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_marker() {
        let out = extract_final_answer("JUSTIFICATION: obvious\nFINAL_ANSWER: car\npedestrian");
        assert!(out.marker_found);
        assert_eq!(out.answer, "car\npedestrian");
    }

    #[test]
    fn test_last_marker_wins() {
        let raw = "EXPERT 1:\nFINAL_ANSWER: car\nEXPERT 2:\nFINAL_ANSWER: truck\nVERDICT:\nFINAL_ANSWER: car, pedestrian";
        let out = extract_final_answer(raw);
        assert!(out.marker_found);
        assert_eq!(out.answer, "car, pedestrian");
    }

    #[test]
    fn test_marker_like_text_before_true_marker() {
        let raw = "The FINAL_ANSWER field must be short.\nFINAL_ANSWER: FINAL_ANSWERS are lists";
        let out = extract_final_answer(raw);
        assert_eq!(out.answer, "FINAL_ANSWERS are lists");

        let raw = "mentions FINAL_ANSWER_ inline\nFINAL_ANSWER: keep FINAL-ANSWER text";
        let out = extract_final_answer(raw);
        assert_eq!(out.answer, "keep FINAL-ANSWER text");
    }

    #[test]
    fn test_missing_marker_returns_input_unchanged() {
        let raw = "  Expert deliberation without a verdict\n";
        let out = extract_final_answer(raw);
        assert!(!out.marker_found);
        assert_eq!(out.answer, raw);
    }

    #[test]
    fn test_marker_without_space() {
        let out = extract_final_answer("FINAL_ANSWER:PEDESTRIAN_SPEED = Range(0.5, 1.5)");
        assert_eq!(out.answer, "PEDESTRIAN_SPEED = Range(0.5, 1.5)");
    }

    #[test]
    fn test_empty_answer_after_marker() {
        let out = extract_final_answer("deliberation FINAL_ANSWER:   ");
        assert!(out.marker_found);
        assert_eq!(out.answer, "");
    }
}
