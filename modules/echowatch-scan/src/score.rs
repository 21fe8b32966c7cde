//! Scoring engine — the single source of truth for "visibility".
//!
//! Pure and deterministic. Every score anywhere in the system, including the
//! audited manual-correction path, comes from [`score`] re-applied to its
//! extraction input; nothing recomputes visibility a second way.
//!
//! Formula:
//! - brand absent:  `clamp(5.0 - 0.2 * competitors, 0, 2.0)`: visible but
//!   low ceiling that shrinks as competitor density rises
//! - brand present: `6.0 + position_bonus - min(2.0, 0.3 * competitors)`,
//!   floored at 3.0, where position_bonus is 1.5 / 1.0 / 0.5 / 0 for a
//!   first / second / third / later overall mention rank
//! - always clamped to [0, 10] and rounded to one decimal

use echowatch_common::{Extraction, Mention, ScoreRecord};

const PRESENT_BASE: f64 = 6.0;
const PRESENT_FLOOR: f64 = 3.0;
const ABSENT_BASE: f64 = 5.0;
const ABSENT_CEILING: f64 = 2.0;
const ABSENT_COMPETITOR_STEP: f64 = 0.2;
const COMPETITOR_PENALTY_STEP: f64 = 0.3;
const COMPETITOR_PENALTY_CAP: f64 = 2.0;

pub fn score(extraction: &Extraction) -> ScoreRecord {
    let competitor_count = extraction.competitor_mentions.len() as u32;
    let org_brand_present = !extraction.brand_mentions.is_empty();
    let org_brand_prominence = prominence_rank(extraction);

    let raw = if org_brand_present {
        let bonus = match org_brand_prominence {
            Some(1) => 1.5,
            Some(2) => 1.0,
            Some(3) => 0.5,
            _ => 0.0,
        };
        let penalty =
            (COMPETITOR_PENALTY_STEP * competitor_count as f64).min(COMPETITOR_PENALTY_CAP);
        (PRESENT_BASE + bonus - penalty).max(PRESENT_FLOOR)
    } else {
        (ABSENT_BASE - ABSENT_COMPETITOR_STEP * competitor_count as f64)
            .clamp(0.0, ABSENT_CEILING)
    };

    ScoreRecord {
        score: round_one_decimal(raw.clamp(0.0, 10.0)),
        org_brand_present,
        org_brand_prominence,
        competitor_count,
    }
}

/// 1-based rank of the org brand's first mention among all mentions, ordered
/// by first occurrence. Ties go to the org brand (tenant entries precede
/// industry entries in the gazetteer), which keeps the rank deterministic.
fn prominence_rank(extraction: &Extraction) -> Option<u32> {
    let org_first = extraction
        .brand_mentions
        .iter()
        .map(|m| m.first_pos_ratio)
        .fold(None, |best: Option<f64>, r| {
            Some(best.map_or(r, |b| b.min(r)))
        })?;

    let earlier = |mentions: &[Mention]| {
        mentions
            .iter()
            .filter(|m| m.first_pos_ratio < org_first)
            .count() as u32
    };

    Some(1 + earlier(&extraction.competitor_mentions))
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(name: &str, first_pos_ratio: f64) -> Mention {
        Mention {
            name: name.to_string(),
            normalized: name.to_lowercase(),
            count: 1,
            first_pos_ratio,
        }
    }

    fn extraction(brands: Vec<Mention>, competitors: Vec<Mention>) -> Extraction {
        Extraction {
            citations: Vec::new(),
            brand_mentions: brands,
            competitor_mentions: competitors,
        }
    }

    #[test]
    fn brand_first_no_competitors_scores_7_5() {
        let record = score(&extraction(vec![mention("Acme", 0.0)], vec![]));
        assert_eq!(record.score, 7.5);
        assert!(record.org_brand_present);
        assert_eq!(record.org_brand_prominence, Some(1));
        assert_eq!(record.competitor_count, 0);
    }

    #[test]
    fn absent_brand_stays_at_low_ceiling() {
        let record = score(&extraction(vec![], vec![mention("HubSpot", 0.1)]));
        assert!(!record.org_brand_present);
        assert_eq!(record.org_brand_prominence, None);
        assert!(record.score >= 0.0 && record.score <= 2.0);
    }

    #[test]
    fn absent_score_shrinks_with_competitor_density() {
        let few = score(&extraction(vec![], (0..16).map(|i| mention("C", i as f64 / 20.0)).collect()));
        let many = score(&extraction(vec![], (0..20).map(|i| mention("C", i as f64 / 25.0)).collect()));
        // 5.0 - 0.2*16 = 1.8; 5.0 - 0.2*20 = 1.0
        assert_eq!(few.score, 1.8);
        assert_eq!(many.score, 1.0);
    }

    #[test]
    fn absent_score_never_goes_negative() {
        let record = score(&extraction(
            vec![],
            (0..40).map(|i| mention("C", i as f64 / 50.0)).collect(),
        ));
        assert_eq!(record.score, 0.0);
    }

    #[test]
    fn position_bonus_steps_down_with_rank() {
        let first = score(&extraction(vec![mention("Acme", 0.0)], vec![mention("A", 0.5)]));
        let second = score(&extraction(vec![mention("Acme", 0.4)], vec![mention("A", 0.1)]));
        let fourth = score(&extraction(
            vec![mention("Acme", 0.9)],
            vec![mention("A", 0.1), mention("B", 0.2), mention("C", 0.3)],
        ));

        assert_eq!(first.org_brand_prominence, Some(1));
        assert_eq!(second.org_brand_prominence, Some(2));
        assert_eq!(fourth.org_brand_prominence, Some(4));
        // 6.0 + 1.5 - 0.3 = 7.2; 6.0 + 1.0 - 0.3 = 6.7; 6.0 + 0 - 0.9 = 5.1
        assert_eq!(first.score, 7.2);
        assert_eq!(second.score, 6.7);
        assert_eq!(fourth.score, 5.1);
    }

    #[test]
    fn competitor_penalty_is_capped() {
        let record = score(&extraction(
            vec![mention("Acme", 0.0)],
            (0..12).map(|i| mention("C", 0.1 + i as f64 / 100.0)).collect(),
        ));
        // Penalty caps at 2.0: 6.0 + 1.5 - 2.0 = 5.5 (not 6.0 + 1.5 - 3.6)
        assert_eq!(record.score, 5.5);
    }

    #[test]
    fn present_score_is_floored() {
        let record = score(&extraction(
            vec![mention("Acme", 0.9)],
            (0..10).map(|i| mention("C", i as f64 / 20.0)).collect(),
        ));
        // 6.0 + 0 - 2.0 = 4.0 stays above the floor; push bonus negative is
        // impossible, so the floor binds only through the cap: min is 4.0.
        assert!(record.score >= 3.0);
    }

    #[test]
    fn score_is_always_bounded_and_rounded() {
        for competitors in 0..30 {
            for &ratio in &[0.0, 0.2, 0.5, 0.9] {
                let record = score(&extraction(
                    vec![mention("Acme", ratio)],
                    (0..competitors)
                        .map(|i| mention("C", i as f64 / 40.0))
                        .collect(),
                ));
                assert!(record.score >= 0.0 && record.score <= 10.0);
                assert_eq!(record.score, round_one_decimal(record.score));
            }
        }
    }

    #[test]
    fn earlier_first_mention_never_decreases_score() {
        // Hold competitors fixed, slide the org brand's first mention earlier.
        let competitors: Vec<Mention> = vec![
            mention("A", 0.1),
            mention("B", 0.3),
            mention("C", 0.6),
        ];
        let mut last = 0.0f64;
        for &ratio in &[0.9, 0.5, 0.2, 0.05] {
            let record = score(&extraction(
                vec![mention("Acme", ratio)],
                competitors.clone(),
            ));
            assert!(
                record.score >= last,
                "score dropped when brand moved earlier: {} -> {}",
                last,
                record.score
            );
            last = record.score;
        }
    }

    #[test]
    fn tie_with_competitor_goes_to_the_brand() {
        let record = score(&extraction(
            vec![mention("Acme", 0.2)],
            vec![mention("HubSpot", 0.2)],
        ));
        assert_eq!(record.org_brand_prominence, Some(1));
    }
}
