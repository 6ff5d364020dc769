//! Canonical integer k-mer codes
//!
//! A window of `k` residue codes is mapped to the integer whose base-`a`
//! digits are the codes in window order (`a` = alphabet size). The mapping
//! is bijective for windows over the alphabet, so equal codes mean equal
//! windows. An O(1) update is provided for sliding the window one position
//! to the right.
//!
//! The configuration layer guarantees `a^k - 1 <= u64::MAX` before a coder
//! is constructed.

/// Encoder of fixed-length residue windows to integer k-mer codes.
#[derive(Debug, Clone)]
pub struct KmerCoder {
    k: usize,
    alphabet_size: u64,
    /// `alphabet_size^(k-1)`, the place value of the leading residue.
    high_place: u64,
}

impl KmerCoder {
    /// Create a coder for windows of length `k` over `alphabet_size` codes.
    pub fn new(k: usize, alphabet_size: usize) -> Self {
        assert!(k >= 1, "k must be at least 1");
        let alphabet_size = alphabet_size as u64;
        let high_place = alphabet_size
            .checked_pow((k - 1) as u32)
            .expect("k-mer code space must fit in u64");
        // The full window must fit too; validated again here so a coder
        // can never silently wrap.
        high_place
            .checked_mul(alphabet_size - 1)
            .and_then(|h| h.checked_add(high_place - 1))
            .expect("k-mer code space must fit in u64");
        Self {
            k,
            alphabet_size,
            high_place,
        }
    }

    /// Window length.
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Encode a full window of residue codes.
    #[inline]
    pub fn encode(&self, window: &[u8]) -> u64 {
        debug_assert_eq!(window.len(), self.k);
        window
            .iter()
            .fold(0u64, |code, &c| code * self.alphabet_size + c as u64)
    }

    /// Slide the window one position: drop `outgoing` (the old leading
    /// residue) and append `incoming`. Equals `encode` of the new window.
    #[inline]
    pub fn roll(&self, code: u64, outgoing: u8, incoming: u8) -> u64 {
        (code - outgoing as u64 * self.high_place) * self.alphabet_size + incoming as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_positional() {
        let coder = KmerCoder::new(3, 13);
        assert_eq!(coder.encode(&[0, 0, 0]), 0);
        assert_eq!(coder.encode(&[0, 0, 1]), 1);
        assert_eq!(coder.encode(&[1, 0, 0]), 13 * 13);
        assert_eq!(coder.encode(&[2, 5, 7]), 2 * 169 + 5 * 13 + 7);
    }

    #[test]
    fn test_encode_bijective_on_small_space() {
        let coder = KmerCoder::new(2, 5);
        let mut seen = std::collections::HashSet::new();
        for a in 0..5u8 {
            for b in 0..5u8 {
                assert!(seen.insert(coder.encode(&[a, b])));
            }
        }
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn test_roll_matches_encode() {
        let coder = KmerCoder::new(4, 7);
        let seq: Vec<u8> = vec![3, 1, 4, 1, 5, 2, 6, 5, 3, 5];
        let mut code = coder.encode(&seq[0..4]);
        for start in 1..=seq.len() - 4 {
            code = coder.roll(code, seq[start - 1], seq[start + 3]);
            assert_eq!(code, coder.encode(&seq[start..start + 4]));
        }
    }

    #[test]
    fn test_widest_supported_space() {
        // k=14 over 13 codes is the auto-selected high-sensitivity setting.
        let coder = KmerCoder::new(14, 13);
        let window = [12u8; 14];
        let expected = (0..14).fold(0u64, |c, _| c * 13 + 12);
        assert_eq!(coder.encode(&window), expected);
    }

    #[test]
    #[should_panic]
    fn test_overflowing_space_panics() {
        // 21^20 does not fit in 64 bits.
        let _ = KmerCoder::new(20, 21);
    }
}
