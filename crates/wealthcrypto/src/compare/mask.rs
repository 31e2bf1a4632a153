use super::{MaskParams, MaskState, MaskedOutcome};
use crate::{mul_plain, rand_int_bits, Ciphertext, EncBool, PaillierPublicKey};
use rand::RngCore;
use rug::Integer;

/// Caller side: Enc(s * r * x) with r in [1, 2^slack) and s = ±1.
pub fn mask_difference(
    pk: &PaillierPublicKey,
    enc_x: &Ciphertext,
    params: MaskParams,
    rng: &mut (impl RngCore + ?Sized),
) -> (Ciphertext, MaskState) {
    let mut r = rand_int_bits(params.slack as usize, rng);
    if r == 0 {
        r = Integer::from(1);
    }
    let flipped = rng.next_u32() & 1 == 1;
    if flipped {
        r = -r;
    }
    (mul_plain(pk, enc_x, &r), MaskState { flipped })
}

/// Caller side: Enc([x > 0]) from the comparator's bits on the masked value.
/// Equality is invariant under the mask, so only lt/gt swap.
pub fn unmask_outcome(state: MaskState, outcome: MaskedOutcome) -> EncBool {
    if state.flipped {
        EncBool::new(outcome.lt)
    } else {
        EncBool::new(outcome.gt)
    }
}
