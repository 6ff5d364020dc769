//! Low-complexity masking
//!
//! A linear-time repeat masker over residue codes. A forward recurrence
//! tracks, for every repeat period `p` in `1..=MAX_PERIOD`, the likelihood
//! that the current residue continues a tandem repeat of that period,
//! scoring each residue against the one `p` positions back with a fixed
//! identity log-odds model. Positions whose posterior repeat probability
//! exceeds the mask threshold are overwritten with the unknown code, which
//! makes the extractor skip every window that touches them.
//!
//! The model parameters follow the usual tandem-repeat masking defaults:
//! repeat start probability 0.005, repeat end probability 0.05, geometric
//! period prior with decay 0.5, mask threshold 0.5, maximum period 50.

/// Longest repeat period the masker models.
pub const MAX_PERIOD: usize = 50;

const REPEAT_START_PROB: f64 = 0.005;
const REPEAT_END_PROB: f64 = 0.05;
const PERIOD_DECAY: f64 = 0.5;
const MIN_MASK_PROB: f64 = 0.5;

/// Likelihood ratio of observing a residue equal to its period partner
/// under the repeat model vs. background.
const MATCH_ODDS: f64 = 3.0;
const MISMATCH_ODDS: f64 = 0.3;

/// Masker over sequences of residue codes.
#[derive(Debug, Clone)]
pub struct Masker {
    unknown_code: u8,
    /// Normalized geometric prior over repeat periods.
    period_weight: Vec<f64>,
}

impl Masker {
    /// Create a masker that writes `unknown_code` over masked positions.
    pub fn new(unknown_code: u8) -> Self {
        let mut period_weight = Vec::with_capacity(MAX_PERIOD);
        let mut w = 1.0;
        for _ in 0..MAX_PERIOD {
            period_weight.push(w);
            w *= PERIOD_DECAY;
        }
        let total: f64 = period_weight.iter().sum();
        for w in period_weight.iter_mut() {
            *w /= total;
        }
        Self {
            unknown_code,
            period_weight,
        }
    }

    /// Mask low-complexity stretches of `codes` in place.
    ///
    /// Returns the number of masked positions. The repeat model always
    /// reads the original residues, so masking one position does not bias
    /// the decision for later ones.
    pub fn mask(&self, codes: &mut [u8]) -> usize {
        if codes.len() < 2 {
            return 0;
        }

        let mut repeat = vec![0.0f64; MAX_PERIOD + 1]; // indexed by period
        let mut background = 1.0f64;
        let mut masked_positions = Vec::new();

        for i in 0..codes.len() {
            let leaving: f64 = repeat.iter().sum();
            let mut repeat_total = 0.0;
            let max_p = MAX_PERIOD.min(i);
            for p in 1..=max_p {
                let odds = self.pair_odds(codes[i], codes[i - p]);
                let stay = repeat[p] * (1.0 - REPEAT_END_PROB);
                let enter = background * REPEAT_START_PROB * self.period_weight[p - 1];
                repeat[p] = (stay + enter) * odds;
                repeat_total += repeat[p];
            }
            background = background * (1.0 - REPEAT_START_PROB) + leaving * REPEAT_END_PROB;

            // Rescale so the recurrence never under- or overflows.
            let total = background + repeat_total;
            background /= total;
            for p in 1..=max_p {
                repeat[p] /= total;
            }

            if repeat_total / total > MIN_MASK_PROB {
                masked_positions.push(i);
            }
        }

        for &i in &masked_positions {
            codes[i] = self.unknown_code;
        }
        masked_positions.len()
    }

    #[inline]
    fn pair_odds(&self, a: u8, b: u8) -> f64 {
        if a == self.unknown_code || b == self.unknown_code {
            1.0
        } else if a == b {
            MATCH_ODDS
        } else {
            MISMATCH_ODDS
        }
    }
}
