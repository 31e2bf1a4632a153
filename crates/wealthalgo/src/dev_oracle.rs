//! Key-holding coprocessor for development and tests.
//!
//! SECURITY NOTE: this stands in for the hosting environment's threshold
//! key service. It holds the full secret key in-process; the masking and
//! blinding done by callers are what keep it from learning magnitudes, not
//! any isolation of its own.

use anyhow::{bail, Result};
use rug::Integer;
use tracing::{trace, warn};
use wealthcrypto::compare::MaskParams;
use wealthcrypto::{centered, dec, enc, Ciphertext, PaillierPrivateKey, PaillierPublicKey};
use wealthcrypto::{RemoteComparator, RemoteMultiplier};

use crate::{Discloser, EncWinnerIndex};

/// Max number of pairs accepted in one `mult_batch`.
pub const MULT_BATCH_MAX: usize = 256;

pub struct DevCoprocessor {
    pk: PaillierPublicKey,
    sk: PaillierPrivateKey,
    // exclusive bound on |masked difference|
    cmp_bound: Integer,
    comparisons: usize,
    disclosures: usize,
}

impl DevCoprocessor {
    pub fn new(sk: PaillierPrivateKey) -> Self {
        Self {
            pk: sk.public_key(),
            sk,
            cmp_bound: Integer::from(1) << MaskParams::default().masked_bits(),
            comparisons: 0,
            disclosures: 0,
        }
    }

    pub fn public_key(&self) -> &PaillierPublicKey {
        &self.pk
    }

    /// Number of `cmp_zero` calls served so far.
    pub fn comparisons(&self) -> usize {
        self.comparisons
    }

    /// Number of winner indices disclosed so far.
    pub fn disclosures(&self) -> usize {
        self.disclosures
    }

    fn enc_bit(&self, bit: bool) -> Ciphertext {
        enc(&self.pk, &Integer::from(u8::from(bit)), &mut rand::rngs::OsRng)
    }
}

impl RemoteMultiplier for DevCoprocessor {
    fn mult_batch(&mut self, blinded_pairs: &[(Ciphertext, Ciphertext)]) -> Result<Vec<Ciphertext>> {
        if blinded_pairs.len() > MULT_BATCH_MAX {
            bail!(
                "multiply batch of {} exceeds limit {MULT_BATCH_MAX}",
                blinded_pairs.len()
            );
        }
        trace!(pairs = blinded_pairs.len(), "mult_batch");
        Ok(blinded_pairs
            .iter()
            .map(|(x, y)| {
                let prod = dec(&self.sk, x) * dec(&self.sk, y);
                enc(&self.pk, &prod, &mut rand::rngs::OsRng)
            })
            .collect())
    }
}

impl RemoteComparator for DevCoprocessor {
    fn cmp_zero(&mut self, x: &Ciphertext) -> Result<(Ciphertext, Ciphertext, Ciphertext)> {
        let s = centered(dec(&self.sk, x), &self.pk.n());
        if s.clone().abs() >= self.cmp_bound {
            warn!("refused comparison of out-of-range value");
            bail!("masked value outside the comparable range");
        }
        self.comparisons += 1;
        Ok((self.enc_bit(s < 0), self.enc_bit(s == 0), self.enc_bit(s > 0)))
    }
}

impl Discloser for DevCoprocessor {
    fn disclose_index(&mut self, idx: &EncWinnerIndex) -> Result<usize> {
        let v = dec(&self.sk, idx.ciphertext());
        match v.to_usize() {
            Some(position) if position < idx.candidates() => {
                self.disclosures += 1;
                Ok(position)
            }
            _ => {
                warn!(candidates = idx.candidates(), "refused out-of-range disclosure");
                bail!("winner index outside 0..{}", idx.candidates())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use wealthcrypto::{keygen, MIN_KEY_BITS};

    fn oracle(seed: u64) -> DevCoprocessor {
        let (_pk, sk) = keygen(MIN_KEY_BITS, &mut StdRng::seed_from_u64(seed)).unwrap();
        DevCoprocessor::new(sk)
    }

    #[test]
    fn signed_compare_centered_zero() {
        let mut oracle = oracle(41);
        let pk = oracle.public_key().clone();
        for x in -20..=20 {
            let ct = enc(&pk, &Integer::from(x), &mut rand::thread_rng());
            let (lt, eq, gt) = oracle.cmp_zero(&ct).unwrap();
            assert_eq!(dec(&oracle.sk, &lt), i32::from(x < 0));
            assert_eq!(dec(&oracle.sk, &eq), i32::from(x == 0));
            assert_eq!(dec(&oracle.sk, &gt), i32::from(x > 0));
        }
        assert_eq!(oracle.comparisons(), 41);
    }

    #[test]
    fn compare_refuses_out_of_range_values() {
        let mut oracle = oracle(44);
        let pk = oracle.public_key().clone();
        let bits = MaskParams::default().masked_bits();
        let edge = Integer::from(1) << bits;
        for v in [edge.clone(), -edge.clone(), Integer::from(1) << 400u32] {
            let ct = enc(&pk, &v, &mut rand::thread_rng());
            assert!(oracle.cmp_zero(&ct).is_err());
        }
        let inside = edge - 1u32;
        let ct = enc(&pk, &inside, &mut rand::thread_rng());
        let (_lt, _eq, gt) = oracle.cmp_zero(&ct).unwrap();
        assert_eq!(dec(&oracle.sk, &gt), 1);
        assert_eq!(oracle.comparisons(), 1);
    }

    #[test]
    fn mult_batch_enforces_limit() {
        let mut oracle = oracle(42);
        let one = oracle.enc_bit(true);
        let pairs = vec![(one.clone(), one); MULT_BATCH_MAX + 1];
        assert!(oracle.mult_batch(&pairs).is_err());
    }

    #[test]
    fn disclose_refuses_out_of_range() {
        let mut oracle = oracle(43);
        let pk = oracle.public_key().clone();
        let idx = EncWinnerIndex {
            c: enc(&pk, &Integer::from(3), &mut rand::thread_rng()),
            candidates: 3,
        };
        assert!(oracle.disclose_index(&idx).is_err());
        let idx = EncWinnerIndex {
            c: enc(&pk, &Integer::from(2), &mut rand::thread_rng()),
            candidates: 3,
        };
        assert_eq!(oracle.disclose_index(&idx).unwrap(), 2);
        assert_eq!(oracle.disclosures(), 1);
    }
}
