//! Probabilistic pacing and priority selection.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::CreativeAd;

/// Source of uniform draws for pacing and for picking the ad to serve.
pub trait RandomSource: Send + Sync {
    /// A uniform draw in `[0, 1)`.
    fn next_f64(&self) -> f64;

    /// A uniform index in `0..len`. `len` is never zero.
    fn index(&self, len: usize) -> usize;
}

/// Thread-local entropy; the production source.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }

    fn index(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Reproducible draws for simulations.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&self) -> f64 {
        self.with_rng(|rng| rng.gen::<f64>())
    }

    fn index(&self, len: usize) -> usize {
        self.with_rng(|rng| rng.gen_range(0..len))
    }
}

/// Always draws the same value and picks the same index, clamped to the slice.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom {
    pub value: f64,
    pub index: usize,
}

impl FixedRandom {
    pub fn new(value: f64) -> Self {
        Self { value, index: 0 }
    }
}

impl RandomSource for FixedRandom {
    fn next_f64(&self) -> f64 {
        self.value
    }

    fn index(&self, len: usize) -> usize {
        self.index.min(len.saturating_sub(1))
    }
}

/// Keeps each candidate iff one fresh draw is below its pass-through rate.
pub fn pace(creative_ads: Vec<CreativeAd>, random: &dyn RandomSource) -> Vec<CreativeAd> {
    creative_ads
        .into_iter()
        .filter(|creative_ad| random.next_f64() < creative_ad.effective_pass_through_rate())
        .collect()
}

/// Keeps only the candidates sharing the lowest priority value. Priority zero is never
/// picked.
pub fn highest_priority(creative_ads: Vec<CreativeAd>) -> Vec<CreativeAd> {
    let Some(top) = creative_ads
        .iter()
        .map(|creative_ad| creative_ad.priority)
        .filter(|priority| *priority > 0)
        .min()
    else {
        return Vec::new();
    };
    creative_ads
        .into_iter()
        .filter(|creative_ad| creative_ad.priority == top)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ad(id: &str, priority: u32) -> CreativeAd {
        CreativeAd::notification(id, &format!("cs-{id}"), "finance").with_priority(priority)
    }

    #[test]
    fn draw_below_rate_survives() {
        let random = FixedRandom::new(0.3);
        let low = ad("ci-1", 1).with_pass_through_rate(0.1);
        let high = ad("ci-2", 1).with_pass_through_rate(0.5);
        let paced = pace(vec![low, high], &random);
        assert_eq!(paced.len(), 1);
        assert_eq!(paced[0].creative_instance_id, "ci-2");
    }

    #[test]
    fn everything_paced_out_yields_nothing() {
        let random = FixedRandom::new(0.99);
        let paced = pace(vec![ad("ci-1", 1).with_pass_through_rate(0.5)], &random);
        assert!(highest_priority(paced).is_empty());
    }

    #[test]
    fn lowest_priority_value_wins() {
        let selected = highest_priority(vec![ad("ci-1", 1), ad("ci-2", 2), ad("ci-3", 1)]);
        let ids: Vec<_> = selected.iter().map(|c| c.creative_instance_id.as_str()).collect();
        assert_eq!(ids, vec!["ci-1", "ci-3"]);
    }

    #[test]
    fn priority_zero_is_never_selected() {
        assert!(highest_priority(vec![ad("ci-1", 0)]).is_empty());
        let selected = highest_priority(vec![ad("ci-1", 0), ad("ci-2", 3)]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].creative_instance_id, "ci-2");
    }

    #[test]
    fn seeded_random_is_reproducible() {
        let a = SeededRandom::new(7);
        let b = SeededRandom::new(7);
        for _ in 0..10 {
            assert_eq!(a.next_f64(), b.next_f64());
            assert_eq!(a.index(5), b.index(5));
        }
    }

    proptest! {
        #[test]
        fn survives_iff_draw_below_rate(draw in 0.0f64..1.0, rate in 0.0f64..=1.0) {
            let random = FixedRandom::new(draw);
            let paced = pace(vec![ad("ci-1", 1).with_pass_through_rate(rate)], &random);
            prop_assert_eq!(paced.len() == 1, draw < rate);
        }
    }
}
