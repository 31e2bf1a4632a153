//! Masked comparison against zero.
//!
//! The key holder's comparator decrypts whatever it is handed, so the
//! difference is scaled by a random positive factor and negated on a private
//! coin before it leaves the caller. The caller undoes the negation by picking
//! the matching indicator bit.
//!
//! What the comparator still learns: whether the difference is zero (a tie
//! masks to 0), and `|a - b|` to within a factor of `2^slack`. It does not
//! learn which operand was larger.

pub mod mask;

pub use mask::{mask_difference, unmask_outcome};

#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct MaskParams {
    /// bit-length bound for |x| before masking
    pub t: u32,
    /// bit length of the multiplicative mask r, r in [1, 2^slack)
    pub slack: u32,
}

impl Default for MaskParams {
    fn default() -> Self {
        // u64 amounts, |a - b| < 2^64
        Self { t: 65, slack: 32 }
    }
}

impl MaskParams {
    /// Masked values must stay inside the centered range (-n/2, n/2].
    pub fn fits(&self, pk: &crate::PaillierPublicKey) -> bool {
        self.masked_bits() as usize + 1 < pk.bits()
    }

    /// Every honestly masked value satisfies `|v| < 2^masked_bits()`.
    pub fn masked_bits(&self) -> u32 {
        self.t + self.slack
    }
}

/// Caller-side secret needed to read back a masked comparison.
#[derive(Clone, Copy, Debug)]
pub struct MaskState {
    pub(crate) flipped: bool,
}

/// Encrypted outcome of `cmp_zero` on the masked value.
#[derive(Clone, Debug)]
pub struct MaskedOutcome {
    pub lt: super::Ciphertext,
    pub eq: super::Ciphertext,
    pub gt: super::Ciphertext,
}
