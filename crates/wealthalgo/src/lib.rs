//! Encrypted max-reduction over Paillier ciphertexts.
//!
//! Every step runs the same sequence of homomorphic operations whatever the
//! operands hold: one masked comparison and two blinded selects per
//! candidate after the first. The only value ever decrypted for the caller is
//! the final winner index, and only through [`Discloser`].

use anyhow::{anyhow, bail, Result};
use rug::Integer;
use tracing::{debug, instrument};
use wealthcrypto::compare::{mask_difference, unmask_outcome, MaskParams, MaskedOutcome};
use wealthcrypto::{
    add, add_plain, blind_pair, enc, mul_plain, rand_unit_mod_n, rerandomize, sub,
    unblind_product, Ciphertext, EncBool, EncInt, PaillierPublicKey, RemoteComparator,
    RemoteMultiplier,
};

pub mod dev_oracle;

#[cfg(test)]
use std::cell::Cell;

#[cfg(test)]
thread_local! {
    pub static ALLOW_RAW_MULT: Cell<bool> = Cell::new(false);
}

/// Encrypted position of the winner inside the candidate list.
///
/// Only [`encrypted_argmax`] can build one, so a [`Discloser`] never sees
/// anything but a reduction result.
#[derive(Clone, Debug)]
pub struct EncWinnerIndex {
    c: Ciphertext,
    candidates: usize,
}

impl EncWinnerIndex {
    pub fn ciphertext(&self) -> &Ciphertext {
        &self.c
    }

    /// Length of the list the index points into.
    pub fn candidates(&self) -> usize {
        self.candidates
    }
}

/// Controlled decryption. Implementations must refuse indices outside
/// `0..idx.candidates()`.
pub trait Discloser {
    fn disclose_index(&mut self, idx: &EncWinnerIndex) -> Result<usize>;
}

/// Everything the hosting environment provides on top of the public key.
///
/// Plaintexts are `u64` amounts. The comparator refuses masked values
/// outside the range [`MaskParams`] allows, so a submission encrypting
/// anything larger makes every comparison that includes it fail.
pub trait Coprocessor: RemoteMultiplier + RemoteComparator + Discloser {}

impl<T: RemoteMultiplier + RemoteComparator + Discloser> Coprocessor for T {}

pub struct ProtoCtx<'a> {
    pub pk: &'a PaillierPublicKey,
    pub cop: &'a mut dyn Coprocessor,
    pub mask: MaskParams,
}

impl<'a> ProtoCtx<'a> {
    pub fn new(pk: &'a PaillierPublicKey, cop: &'a mut dyn Coprocessor) -> Self {
        Self {
            pk,
            cop,
            mask: MaskParams::default(),
        }
    }
}

// Fresh-random blinded multiply for two ciphertexts.
pub fn mul_ct_ct<M: RemoteMultiplier + ?Sized>(
    pk: &PaillierPublicKey,
    x: &Ciphertext,
    y: &Ciphertext,
    mult: &mut M,
) -> Result<Ciphertext> {
    let ex = EncInt::new(x.clone());
    let ey = EncInt::new(y.clone());
    // fresh blinders every call
    let mut rng = rand::thread_rng();
    let a = rand_unit_mod_n(pk, &mut rng);
    let b = rand_unit_mod_n(pk, &mut rng);
    let (xb, yb) = blind_pair(pk, &ex, &ey, &a, &b);

    #[cfg(test)]
    let products = crate::ALLOW_RAW_MULT.with(|flag| {
        flag.set(true);
        let r = mult.mult_batch(&[(xb, yb)]);
        flag.set(false);
        r
    })?;

    #[cfg(not(test))]
    let products = mult.mult_batch(&[(xb, yb)])?;

    let prod_blinded = products
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("multiplier returned no product"))?;
    Ok(unblind_product(pk, &ex, &ey, &prod_blinded, &a, &b).c)
}

/// `cond ? x : y` as `y + cond * (x - y)`; one blinded multiply.
pub fn select<M: RemoteMultiplier + ?Sized>(
    pk: &PaillierPublicKey,
    cond: &Ciphertext,
    x: &EncInt,
    y: &EncInt,
    mult: &mut M,
) -> Result<EncInt> {
    let delta = sub(pk, &x.c, &y.c);
    let picked = mul_ct_ct(pk, cond, &delta, mult)?;
    Ok(EncInt::new(add(pk, &y.c, &picked)))
}

/// Enc(a AND b) for encrypted bits.
pub fn bool_and<M: RemoteMultiplier + ?Sized>(
    pk: &PaillierPublicKey,
    a: &EncBool,
    b: &EncBool,
    mult: &mut M,
) -> Result<EncBool> {
    Ok(EncBool::new(mul_ct_ct(pk, &a.c, &b.c, mult)?))
}

/// Enc(a OR b) as `a + b - ab`.
pub fn bool_or<M: RemoteMultiplier + ?Sized>(
    pk: &PaillierPublicKey,
    a: &EncBool,
    b: &EncBool,
    mult: &mut M,
) -> Result<EncBool> {
    let ab = mul_ct_ct(pk, &a.c, &b.c, mult)?;
    let sum = add(pk, &a.c, &b.c);
    Ok(EncBool::new(sub(pk, &sum, &ab)))
}

/// Enc(1 - a); no coprocessor round trip.
pub fn one_minus(pk: &PaillierPublicKey, a: &EncBool) -> EncBool {
    let neg = mul_plain(pk, &a.c, &Integer::from(-1));
    EncBool::new(add_plain(pk, &neg, &Integer::from(1)))
}

/// Enc([a > b]). The comparator only sees a randomly scaled, randomly
/// negated difference: it learns whether `a == b` and the size of `|a - b|`
/// up to a factor of `2^slack`, but not which side is larger.
pub fn masked_gt(a: &EncInt, b: &EncInt, ctx: &mut ProtoCtx) -> Result<EncBool> {
    let pk = ctx.pk;
    let diff = sub(pk, &a.c, &b.c);
    let (masked, state) = mask_difference(pk, &diff, ctx.mask, &mut rand::thread_rng());
    let (lt, eq, gt) = ctx.cop.cmp_zero(&masked)?;
    Ok(unmask_outcome(state, MaskedOutcome { lt, eq, gt }))
}

/// Linear select-reduction. A later candidate replaces the running maximum
/// only when strictly greater, so the earliest of equal maxima wins.
#[instrument(skip_all, fields(candidates = values.len()))]
pub fn encrypted_argmax(values: &[EncInt], ctx: &mut ProtoCtx) -> Result<EncWinnerIndex> {
    let Some((first, rest)) = values.split_first() else {
        bail!("argmax over an empty candidate list");
    };
    if !ctx.mask.fits(ctx.pk) {
        bail!("{}-bit modulus too small for masked comparison", ctx.pk.bits());
    }
    let pk = ctx.pk;
    let mut rng = rand::thread_rng();

    let mut max = first.clone();
    let mut idx = EncInt::new(enc(pk, &Integer::from(0), &mut rng));
    for (offset, candidate) in rest.iter().enumerate() {
        let position = offset + 1;
        let gt = masked_gt(candidate, &max, ctx)?;
        let enc_position = EncInt::new(enc(pk, &Integer::from(position), &mut rng));
        max = select(pk, &gt.c, candidate, &max, &mut *ctx.cop)?;
        idx = select(pk, &gt.c, &enc_position, &idx, &mut *ctx.cop)?;
        debug!(step = position, "reduction step done");
    }

    // unlink the disclosed ciphertext from the products the coprocessor returned
    Ok(EncWinnerIndex {
        c: rerandomize(pk, &idx.c, &mut rng),
        candidates: values.len(),
    })
}

/// The single disclosure point of a comparison run.
pub fn reveal_winner(idx: &EncWinnerIndex, ctx: &mut ProtoCtx) -> Result<usize> {
    let position = ctx.cop.disclose_index(idx)?;
    if position >= idx.candidates {
        bail!(
            "disclosed index {position} outside candidate list of {}",
            idx.candidates
        );
    }
    Ok(position)
}
