//! Validated questionnaires available to the assessment tools.
//!
//! The registry is closed: instruments are compiled in, keyed by id, and
//! looked up once per tool call.

use crate::error::MemoryError;

/// A validated screening instrument.
#[derive(Debug, Clone)]
pub struct Questionnaire {
    pub id: &'static str,
    pub name: &'static str,
    pub items: &'static [&'static str],
    /// Per-item answer scale is 0..=max_item_score.
    pub max_item_score: u8,
    /// (inclusive lower bound, severity label), sorted descending.
    bands: &'static [(u32, &'static str)],
}

impl Questionnaire {
    /// Score a full answer set, validating length and range.
    pub fn score(&self, answers: &[u8]) -> Result<u32, MemoryError> {
        if answers.len() != self.items.len() {
            return Err(MemoryError::Invalid(format!(
                "{} expects {} answers, got {}",
                self.id,
                self.items.len(),
                answers.len()
            )));
        }
        for (i, &answer) in answers.iter().enumerate() {
            if answer > self.max_item_score {
                return Err(MemoryError::Invalid(format!(
                    "item {} answer {} exceeds scale 0..={}",
                    i + 1,
                    answer,
                    self.max_item_score
                )));
            }
        }
        Ok(answers.iter().map(|&a| a as u32).sum())
    }

    /// Severity label for a total score.
    pub fn severity(&self, score: u32) -> &'static str {
        for &(lower, label) in self.bands {
            if score >= lower {
                return label;
            }
        }
        "none"
    }
}

const PHQ9_ITEMS: &[&str] = &[
    "Little interest or pleasure in doing things",
    "Feeling down, depressed, or hopeless",
    "Trouble falling or staying asleep, or sleeping too much",
    "Feeling tired or having little energy",
    "Poor appetite or overeating",
    "Feeling bad about yourself",
    "Trouble concentrating on things",
    "Moving or speaking noticeably slowly, or being fidgety or restless",
    "Thoughts that you would be better off dead or of hurting yourself",
];

const GAD7_ITEMS: &[&str] = &[
    "Feeling nervous, anxious, or on edge",
    "Not being able to stop or control worrying",
    "Worrying too much about different things",
    "Trouble relaxing",
    "Being so restless that it is hard to sit still",
    "Becoming easily annoyed or irritable",
    "Feeling afraid as if something awful might happen",
];

const REGISTRY: &[Questionnaire] = &[
    Questionnaire {
        id: "phq-9",
        name: "Patient Health Questionnaire-9",
        items: PHQ9_ITEMS,
        max_item_score: 3,
        bands: &[
            (20, "severe"),
            (15, "moderately severe"),
            (10, "moderate"),
            (5, "mild"),
            (0, "minimal"),
        ],
    },
    Questionnaire {
        id: "gad-7",
        name: "Generalized Anxiety Disorder-7",
        items: GAD7_ITEMS,
        max_item_score: 3,
        bands: &[(15, "severe"), (10, "moderate"), (5, "mild"), (0, "minimal")],
    },
];

/// Look up an instrument by id.
pub fn get(id: &str) -> Result<&'static Questionnaire, MemoryError> {
    REGISTRY
        .iter()
        .find(|q| q.id == id)
        .ok_or_else(|| MemoryError::not_found("questionnaire", id))
}

/// All registered instrument ids.
pub fn available_ids() -> Vec<&'static str> {
    REGISTRY.iter().map(|q| q.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(get("phq-9").unwrap().items.len(), 9);
        assert_eq!(get("gad-7").unwrap().items.len(), 7);
        assert!(get("big-5").is_err());
    }

    #[test]
    fn test_scoring_and_bands() {
        let phq9 = get("phq-9").unwrap();
        assert_eq!(phq9.score(&[0; 9]).unwrap(), 0);
        assert_eq!(phq9.score(&[3; 9]).unwrap(), 27);
        assert_eq!(phq9.severity(3), "minimal");
        assert_eq!(phq9.severity(12), "moderate");
        assert_eq!(phq9.severity(27), "severe");

        // Wrong answer count and out-of-scale answers are rejected.
        assert!(phq9.score(&[1; 7]).is_err());
        assert!(phq9.score(&[4, 0, 0, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_gad7_bands() {
        let gad7 = get("gad-7").unwrap();
        assert_eq!(gad7.severity(4), "minimal");
        assert_eq!(gad7.severity(9), "mild");
        assert_eq!(gad7.severity(21), "severe");
    }
}
