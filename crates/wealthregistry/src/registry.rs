use std::collections::{HashMap, HashSet};

use tracing::{error, info, instrument, warn};
use wealthalgo::{encrypted_argmax, reveal_winner, Coprocessor, ProtoCtx};
use wealthcrypto::{validate_ciphertext, Ciphertext, EncInt, PaillierPublicKey};

use crate::{Address, Caller, RegistryConfig, RegistryError, Result};

/// Owns every submission and the last comparison result. All mutation goes
/// through [`ComparisonRegistry::submit`] and
/// [`ComparisonRegistry::find_richest`].
pub struct ComparisonRegistry {
    pk: PaillierPublicKey,
    config: RegistryConfig,
    // Presence of a key is the "has submitted" flag; entries are never
    // replaced or removed.
    submissions: HashMap<Address, Ciphertext>,
    richest: Option<Address>,
}

impl ComparisonRegistry {
    pub fn new(pk: PaillierPublicKey, config: RegistryConfig) -> Self {
        Self {
            pk,
            config,
            submissions: HashMap::new(),
            richest: None,
        }
    }

    /// Key participants must encrypt their amounts under.
    pub fn public_key(&self) -> &PaillierPublicKey {
        &self.pk
    }

    /// Records `ciphertext` as the caller's one and only submission.
    ///
    /// Malformed ciphertexts are rejected before anything is recorded, and a
    /// second submission from the same caller is rejected without touching
    /// the first.
    #[instrument(skip_all, fields(caller = %caller.address()))]
    pub fn submit(&mut self, caller: &Caller, ciphertext: Ciphertext) -> Result<()> {
        let who = caller.address();
        if let Err(e) = validate_ciphertext(&self.pk, &ciphertext) {
            warn!("rejected malformed submission: {e}");
            return Err(RegistryError::InvalidCiphertext(e.to_string()));
        }
        if self.submissions.contains_key(&who) {
            warn!("rejected duplicate submission");
            return Err(RegistryError::DuplicateSubmission(who));
        }
        self.submissions.insert(who, ciphertext);
        info!(total = self.submissions.len(), "submission recorded");
        Ok(())
    }

    /// Longest candidate list [`find_richest`](Self::find_richest) accepts.
    pub fn max_candidates(&self) -> usize {
        self.config.max_candidates
    }

    pub fn has_submitted(&self, who: &Address) -> bool {
        self.submissions.contains_key(who)
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.len()
    }

    /// Addresses that have submitted, sorted. Which participants took part
    /// is public; what they submitted is not.
    pub fn participants(&self) -> Vec<Address> {
        let mut out: Vec<Address> = self.submissions.keys().copied().collect();
        out.sort();
        out
    }

    /// Winner of the last successful comparison, `None` until one succeeds.
    pub fn richest(&self) -> Option<Address> {
        self.richest
    }

    /// Finds which of `candidates` submitted the largest amount and records
    /// it as [`richest`](Self::richest).
    ///
    /// Ties go to the candidate listed first. The list is fully validated
    /// before any homomorphic work starts, and on any error the previous
    /// result is left as it was.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub fn find_richest(
        &mut self,
        cop: &mut dyn Coprocessor,
        candidates: &[Address],
    ) -> Result<Address> {
        let values = self.collect_candidates(candidates).map_err(|e| {
            warn!("rejected comparison: {e}");
            e
        })?;

        let winner = match values.len() {
            1 => candidates[0],
            k => {
                let mut ctx = ProtoCtx::new(&self.pk, cop);
                let idx = encrypted_argmax(&values, &mut ctx)?;
                let position = reveal_winner(&idx, &mut ctx)?;
                *candidates.get(position).ok_or_else(|| {
                    error!(position, k, "disclosed position outside candidate list");
                    RegistryError::InternalInvariantFailed
                })?
            }
        };

        self.richest = Some(winner);
        info!(%winner, "comparison complete");
        Ok(winner)
    }

    fn collect_candidates(&self, candidates: &[Address]) -> Result<Vec<EncInt>> {
        if candidates.is_empty() {
            return Err(RegistryError::EmptyComparison);
        }
        if candidates.len() > self.config.max_candidates {
            return Err(RegistryError::TooManyCandidates {
                got: candidates.len(),
                max: self.config.max_candidates,
            });
        }
        let mut seen = HashSet::with_capacity(candidates.len());
        for who in candidates {
            if !seen.insert(*who) {
                return Err(RegistryError::DuplicateCandidate(*who));
            }
        }
        candidates
            .iter()
            .map(|who| {
                self.submissions
                    .get(who)
                    .map(|c| EncInt::new(c.clone()))
                    .ok_or(RegistryError::MissingSubmission(*who))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ADDRESS_LEN;
    use anyhow::anyhow;
    use rand::rngs::{OsRng, StdRng};
    use rand::{Rng, SeedableRng};
    use wealthalgo::dev_oracle::DevCoprocessor;
    use wealthalgo::{Discloser, EncWinnerIndex};
    use rug::Integer;
    use wealthcrypto::{enc, encrypt_amount, keygen, RemoteComparator, RemoteMultiplier, MIN_KEY_BITS};

    const ALICE: Address = Address::new([0xa1; ADDRESS_LEN]);
    const BOB: Address = Address::new([0xb0; ADDRESS_LEN]);
    const CAROL: Address = Address::new([0xc4; ADDRESS_LEN]);
    const DAVE: Address = Address::new([0xd4; ADDRESS_LEN]);

    /// Seeded rng; the seed is printed so a failing run can be replayed.
    fn init_testing() -> StdRng {
        let seed: u64 = OsRng.gen();
        eprintln!("test rng seed: {seed}");
        StdRng::seed_from_u64(seed)
    }

    fn setup(config: RegistryConfig) -> (ComparisonRegistry, DevCoprocessor, StdRng) {
        let mut rng = init_testing();
        let (pk, sk) = keygen(MIN_KEY_BITS, &mut rng).unwrap();
        (ComparisonRegistry::new(pk, config), DevCoprocessor::new(sk), rng)
    }

    fn submit(reg: &mut ComparisonRegistry, rng: &mut StdRng, who: Address, amount: u64) -> Result<()> {
        let c = encrypt_amount(reg.public_key(), amount, rng);
        reg.submit(&Caller::authenticated(who), c)
    }

    // Coprocessor whose comparator always fails.
    struct Broken(DevCoprocessor);

    impl RemoteMultiplier for Broken {
        fn mult_batch(&mut self, pairs: &[(Ciphertext, Ciphertext)]) -> anyhow::Result<Vec<Ciphertext>> {
            self.0.mult_batch(pairs)
        }
    }
    impl RemoteComparator for Broken {
        fn cmp_zero(&mut self, _x: &Ciphertext) -> anyhow::Result<(Ciphertext, Ciphertext, Ciphertext)> {
            Err(anyhow!("comparator offline"))
        }
    }
    impl Discloser for Broken {
        fn disclose_index(&mut self, idx: &EncWinnerIndex) -> anyhow::Result<usize> {
            self.0.disclose_index(idx)
        }
    }

    #[test]
    fn reference_scenario_alice_is_richest() {
        let (mut reg, mut cop, mut rng) = setup(RegistryConfig::default());
        assert_eq!(reg.richest(), None);

        submit(&mut reg, &mut rng, ALICE, 1000).unwrap();
        submit(&mut reg, &mut rng, BOB, 500).unwrap();
        submit(&mut reg, &mut rng, CAROL, 750).unwrap();
        assert!(reg.has_submitted(&ALICE));
        assert!(reg.has_submitted(&BOB));
        assert!(reg.has_submitted(&CAROL));

        let winner = reg.find_richest(&mut cop, &[ALICE, BOB, CAROL]).unwrap();
        assert_eq!(winner, ALICE);
        assert_eq!(reg.richest(), Some(ALICE));
        // one disclosure, never a magnitude
        assert_eq!(cop.disclosures(), 1);
    }

    #[test]
    fn has_submitted_flips_exactly_once() {
        let (mut reg, _cop, mut rng) = setup(RegistryConfig::default());
        assert!(!reg.has_submitted(&ALICE));
        submit(&mut reg, &mut rng, ALICE, 10).unwrap();
        assert!(reg.has_submitted(&ALICE));
        assert!(!reg.has_submitted(&BOB));
        assert_eq!(reg.submission_count(), 1);
    }

    #[test]
    fn duplicate_submission_keeps_original() {
        let (mut reg, mut cop, mut rng) = setup(RegistryConfig::default());
        submit(&mut reg, &mut rng, ALICE, 10).unwrap();
        submit(&mut reg, &mut rng, BOB, 20).unwrap();

        let err = submit(&mut reg, &mut rng, ALICE, 1_000_000).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateSubmission(a) if a == ALICE));
        assert_eq!(reg.submission_count(), 2);
        // the stored amount is still 10, so Bob wins
        assert_eq!(reg.find_richest(&mut cop, &[ALICE, BOB]).unwrap(), BOB);
    }

    #[test]
    fn invalid_ciphertext_is_not_recorded() {
        let (mut reg, _cop, _rng) = setup(RegistryConfig::default());
        let caller = Caller::authenticated(ALICE);
        let zero = Ciphertext(vec![0]);
        assert!(matches!(
            reg.submit(&caller, zero),
            Err(RegistryError::InvalidCiphertext(_))
        ));
        let oversized = Ciphertext(vec![0xff; reg.public_key().n2.len() + 1]);
        assert!(matches!(
            reg.submit(&caller, oversized),
            Err(RegistryError::InvalidCiphertext(_))
        ));
        assert!(!reg.has_submitted(&ALICE));
    }

    #[test]
    fn missing_submission_leaves_result_untouched() {
        let (mut reg, mut cop, mut rng) = setup(RegistryConfig::default());
        submit(&mut reg, &mut rng, ALICE, 5).unwrap();
        submit(&mut reg, &mut rng, BOB, 9).unwrap();

        let err = reg.find_richest(&mut cop, &[ALICE, DAVE]).unwrap_err();
        assert!(matches!(err, RegistryError::MissingSubmission(a) if a == DAVE));
        assert_eq!(reg.richest(), None);

        assert_eq!(reg.find_richest(&mut cop, &[ALICE, BOB]).unwrap(), BOB);
        let err = reg.find_richest(&mut cop, &[DAVE, ALICE]).unwrap_err();
        assert!(matches!(err, RegistryError::MissingSubmission(a) if a == DAVE));
        assert_eq!(reg.richest(), Some(BOB));
        // validation failed before any comparison ran
        assert_eq!(cop.comparisons(), 1);
    }

    #[test]
    fn tie_goes_to_earliest_listed() {
        let (mut reg, mut cop, mut rng) = setup(RegistryConfig::default());
        submit(&mut reg, &mut rng, ALICE, 300).unwrap();
        submit(&mut reg, &mut rng, BOB, 700).unwrap();
        submit(&mut reg, &mut rng, CAROL, 700).unwrap();

        assert_eq!(reg.find_richest(&mut cop, &[ALICE, BOB, CAROL]).unwrap(), BOB);
        assert_eq!(reg.find_richest(&mut cop, &[CAROL, BOB, ALICE]).unwrap(), CAROL);
        assert_eq!(reg.richest(), Some(CAROL));
    }

    #[test]
    fn repeated_runs_pick_the_same_winner() {
        let (mut reg, mut cop, mut rng) = setup(RegistryConfig::default());
        for (who, amount) in [(ALICE, 42), (BOB, 42), (CAROL, 41), (DAVE, 42)] {
            submit(&mut reg, &mut rng, who, amount).unwrap();
        }
        let list = [CAROL, DAVE, ALICE, BOB];
        for _ in 0..3 {
            assert_eq!(reg.find_richest(&mut cop, &list).unwrap(), DAVE);
        }
    }

    #[test]
    fn result_is_overwritten_by_later_comparison() {
        let (mut reg, mut cop, mut rng) = setup(RegistryConfig::default());
        submit(&mut reg, &mut rng, ALICE, 1000).unwrap();
        submit(&mut reg, &mut rng, BOB, 500).unwrap();
        submit(&mut reg, &mut rng, CAROL, 750).unwrap();

        assert_eq!(reg.find_richest(&mut cop, &[ALICE, BOB, CAROL]).unwrap(), ALICE);
        assert_eq!(reg.find_richest(&mut cop, &[BOB, CAROL]).unwrap(), CAROL);
        assert_eq!(reg.richest(), Some(CAROL));
    }

    #[test]
    fn single_candidate_wins_without_disclosure() {
        let (mut reg, mut cop, mut rng) = setup(RegistryConfig::default());
        submit(&mut reg, &mut rng, BOB, 1).unwrap();
        assert_eq!(reg.find_richest(&mut cop, &[BOB]).unwrap(), BOB);
        assert_eq!(cop.comparisons(), 0);
        assert_eq!(cop.disclosures(), 0);
    }

    #[test]
    fn list_shape_is_validated() {
        let (mut reg, mut cop, mut rng) = setup(RegistryConfig { max_candidates: 2 });
        submit(&mut reg, &mut rng, ALICE, 1).unwrap();
        submit(&mut reg, &mut rng, BOB, 2).unwrap();
        submit(&mut reg, &mut rng, CAROL, 3).unwrap();

        assert_eq!(reg.max_candidates(), 2);
        assert!(matches!(
            reg.find_richest(&mut cop, &[]),
            Err(RegistryError::EmptyComparison)
        ));
        assert!(matches!(
            reg.find_richest(&mut cop, &[ALICE, BOB, CAROL]),
            Err(RegistryError::TooManyCandidates { got: 3, max: 2 })
        ));
        assert!(matches!(
            reg.find_richest(&mut cop, &[ALICE, ALICE]),
            Err(RegistryError::DuplicateCandidate(a)) if a == ALICE
        ));
        assert_eq!(reg.richest(), None);
        assert_eq!(cop.comparisons(), 0);
    }

    #[test]
    fn coprocessor_failure_leaves_result_untouched() {
        let (mut reg, cop, mut rng) = setup(RegistryConfig::default());
        submit(&mut reg, &mut rng, ALICE, 1).unwrap();
        submit(&mut reg, &mut rng, BOB, 2).unwrap();

        let mut broken = Broken(cop);
        assert!(matches!(
            reg.find_richest(&mut broken, &[ALICE, BOB]),
            Err(RegistryError::Coprocessor(_))
        ));
        assert_eq!(reg.richest(), None);
    }

    #[test]
    fn out_of_range_amount_fails_every_comparison() {
        let (mut reg, mut cop, mut rng) = setup(RegistryConfig::default());
        submit(&mut reg, &mut rng, ALICE, 5).unwrap();
        // well-formed ciphertext, plaintext far outside u64
        let huge = Integer::from(1) << 490u32;
        let c = enc(reg.public_key(), &huge, &mut rng);
        reg.submit(&Caller::authenticated(BOB), c).unwrap();

        for _ in 0..20 {
            assert!(matches!(
                reg.find_richest(&mut cop, &[ALICE, BOB]),
                Err(RegistryError::Coprocessor(_))
            ));
            assert!(matches!(
                reg.find_richest(&mut cop, &[BOB, ALICE]),
                Err(RegistryError::Coprocessor(_))
            ));
        }
        assert_eq!(reg.richest(), None);

        submit(&mut reg, &mut rng, CAROL, 9).unwrap();
        assert_eq!(reg.find_richest(&mut cop, &[ALICE, CAROL]).unwrap(), CAROL);
    }

    #[test]
    fn participants_are_listed_sorted() {
        let (mut reg, _cop, mut rng) = setup(RegistryConfig::default());
        submit(&mut reg, &mut rng, CAROL, 1).unwrap();
        submit(&mut reg, &mut rng, ALICE, 1).unwrap();
        assert_eq!(reg.participants(), vec![ALICE, CAROL]);
    }
}
