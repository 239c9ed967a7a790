//! Relevance verdicts over a retrieval result list.
//!
//! A list is sufficient when its best score reaches `relevance_threshold`
//! and at least `min_supporting_results` results (the best one included)
//! lie within `support_margin` of that score.

use crate::config::RetrievalConfig;
use crate::models::{RetrievalResult, Verdict};

#[derive(Debug, Clone, Copy)]
pub struct RelevanceScorer {
    threshold: f32,
    min_supporting: usize,
    margin: f32,
}

impl RelevanceScorer {
    pub fn new(threshold: f32, min_supporting: usize, margin: f32) -> Self {
        Self {
            threshold,
            min_supporting: min_supporting.max(1),
            margin: margin.max(0.0),
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(
            config.relevance_threshold,
            config.min_supporting_results,
            config.support_margin,
        )
    }

    pub fn assess(&self, results: &[RetrievalResult]) -> Verdict {
        let best = results
            .iter()
            .map(|r| r.score)
            .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))));

        let Some(top) = best else {
            return Verdict {
                sufficient: false,
                best_score: None,
            };
        };

        let floor = top - self.margin;
        let supporting = results.iter().filter(|r| r.score >= floor).count();

        Verdict {
            sufficient: top >= self.threshold && supporting >= self.min_supporting,
            best_score: Some(top),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn results(scores: &[f32]) -> Vec<RetrievalResult> {
        scores
            .iter()
            .enumerate()
            .map(|(rank, &score)| RetrievalResult {
                chunk: Chunk {
                    id: format!("c{}", rank),
                    source_path: "doc".to_string(),
                    chunk_index: rank as i64,
                    text: String::new(),
                    embedding: Vec::new(),
                },
                score,
                rank,
            })
            .collect()
    }

    #[test]
    fn empty_is_insufficient() {
        let v = RelevanceScorer::new(0.3, 1, 0.1).assess(&[]);
        assert!(!v.sufficient);
        assert_eq!(v.best_score, None);
    }

    #[test]
    fn single_result_exactly_at_threshold_is_sufficient() {
        let v = RelevanceScorer::new(0.3, 1, 0.1).assess(&results(&[0.3]));
        assert!(v.sufficient);
        assert_eq!(v.best_score, Some(0.3));
    }

    #[test]
    fn below_threshold_is_insufficient() {
        let v = RelevanceScorer::new(0.3, 1, 0.1).assess(&results(&[0.29, 0.1]));
        assert!(!v.sufficient);
    }

    #[test]
    fn corroboration_counts_results_within_margin() {
        let scorer = RelevanceScorer::new(0.3, 2, 0.1);
        assert!(!scorer.assess(&results(&[0.8, 0.5])).sufficient);
        assert!(scorer.assess(&results(&[0.8, 0.75])).sufficient);
    }

    #[test]
    fn defaults_from_config() {
        let scorer = RelevanceScorer::from_config(&RetrievalConfig::default());
        assert!(scorer.assess(&results(&[0.31])).sufficient);
        assert!(!scorer.assess(&results(&[0.05])).sufficient);
    }
}
