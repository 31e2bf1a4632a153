//! wealthcrypto: Minimal Paillier implementation, ciphertext validation and
//! client-side helpers for blinded multiplication and masked comparison.
//!
//! SECURITY NOTE: decryption lives behind the coprocessor traits in
//! `wealthalgo`; nothing in the registry path calls [`dec`] directly.

use anyhow::{anyhow, bail, Result};
use rand::RngCore;
use rug::integer::Order;
use rug::Integer;
use serde::{Deserialize, Serialize};

// ---------------- Paillier core ----------------

pub mod compare;

/// Smallest modulus accepted by [`keygen`]. Masked differences of `u64`
/// amounts must stay far below `n / 2`.
pub const MIN_KEY_BITS: u32 = 512;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaillierPublicKey {
    #[serde(with = "serde_bytes")]
    pub n: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub n2: Vec<u8>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PaillierPrivateKey {
    #[serde(with = "serde_bytes")]
    pub lambda: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub mu: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub n: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub n2: Vec<u8>,
}

// Secret material stays out of logs.
impl core::fmt::Debug for PaillierPrivateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PaillierPrivateKey(<redacted>)")
    }
}

/// Opaque Paillier ciphertext, big-endian bytes of an element of Z*_{n^2}.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext(#[serde(with = "serde_bytes")] pub Vec<u8>);

impl core::fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Ciphertext({} bytes)", self.0.len())
    }
}

/// Encryption of 0 or 1.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncBool {
    pub c: Ciphertext,
}

impl EncBool {
    pub fn new(c: Ciphertext) -> Self {
        Self { c }
    }
}

impl PaillierPublicKey {
    pub fn n(&self) -> Integer {
        int_from_be(&self.n)
    }
    pub fn n2(&self) -> Integer {
        int_from_be(&self.n2)
    }
    pub fn bits(&self) -> usize {
        self.n().significant_bits() as usize
    }
}

impl PaillierPrivateKey {
    pub fn n(&self) -> Integer {
        int_from_be(&self.n)
    }
    pub fn n2(&self) -> Integer {
        int_from_be(&self.n2)
    }
    pub fn lambda(&self) -> Integer {
        int_from_be(&self.lambda)
    }
    pub fn mu(&self) -> Integer {
        int_from_be(&self.mu)
    }
    pub fn public_key(&self) -> PaillierPublicKey {
        PaillierPublicKey {
            n: self.n.clone(),
            n2: self.n2.clone(),
        }
    }
}

#[inline]
fn int_from_be(bytes: &[u8]) -> Integer {
    Integer::from_digits(bytes, Order::MsfBe)
}

#[inline]
fn int_to_be(i: &Integer) -> Vec<u8> {
    i.to_digits::<u8>(Order::MsfBe)
}

/// Canonical residue in [0, n).
fn mod_n(m: &Integer, n: &Integer) -> Integer {
    let mut z = m.clone();
    z %= n;
    if z < 0 {
        z += n;
    }
    z
}

/// Uniform non-negative Integer in [0, 2^bits).
pub fn rand_int_bits(bits: usize, rng: &mut (impl RngCore + ?Sized)) -> Integer {
    let nbytes = (bits + 7) / 8;
    let mut bytes = vec![0u8; nbytes];
    rng.fill_bytes(&mut bytes);

    if nbytes > 0 {
        // mask off any extra MSBs so the value < 2^bits
        let excess = 8 * nbytes - bits;
        if excess > 0 {
            bytes[0] &= 0xFFu8 >> excess;
        }
    }
    Integer::from_digits(&bytes, Order::MsfBe)
}

/// Uniform element of [1, n) by rejection sampling.
pub fn rand_unit_mod_n(pk: &PaillierPublicKey, rng: &mut (impl RngCore + ?Sized)) -> Integer {
    let n = pk.n();
    let bits = n.significant_bits() as usize;
    loop {
        let c = rand_int_bits(bits, rng);
        if c > 0 && c < n {
            return c;
        }
    }
}

pub fn keygen(
    bits: u32,
    rng: &mut impl RngCore,
) -> Result<(PaillierPublicKey, PaillierPrivateKey)> {
    use rug::integer::IsPrime;
    if bits < MIN_KEY_BITS {
        bail!("key size {bits} below minimum {MIN_KEY_BITS}");
    }
    let half = bits / 2;
    let mut gen_prime = |bits: u32| -> Integer {
        loop {
            let mut bytes = vec![0u8; (bits as usize + 7) / 8];
            rng.fill_bytes(&mut bytes);
            // force top bit and odd
            if let Some(b) = bytes.first_mut() {
                *b |= 0x80;
            }
            if let Some(b) = bytes.last_mut() {
                *b |= 1;
            }
            let mut p = Integer::from_digits(&bytes, Order::MsfBe);
            p.next_prime_mut();
            if p.is_probably_prime(25) != IsPrime::No {
                return p;
            }
        }
    };
    let p = gen_prime(half);
    let mut q = gen_prime(half);
    while q == p {
        q = gen_prime(half);
    }
    let n: Integer = (&p * &q).into();
    let n2: Integer = (&n * &n).into();
    let lambda = lcm(&(p.clone() - 1), &(q.clone() - 1));
    let g = generator(&n);

    // mu = (L(g^lambda mod n^2))^{-1} mod n
    let gl = g
        .pow_mod(&lambda, &n2)
        .map_err(|_| anyhow!("g^lambda mod n^2 undefined"))?;
    let mu = l_fn(&gl, &n)
        .invert(&n)
        .map_err(|_| anyhow!("L(g^lambda) not invertible mod n"))?;

    let pk = PaillierPublicKey {
        n: int_to_be(&n),
        n2: int_to_be(&n2),
    };
    let sk = PaillierPrivateKey {
        lambda: int_to_be(&lambda),
        mu: int_to_be(&mu),
        n: pk.n.clone(),
        n2: pk.n2.clone(),
    };
    Ok((pk, sk))
}

// g = n + 1
fn generator(n: &Integer) -> Integer {
    let mut g = n.clone();
    g += 1;
    g
}

// L(u) = (u - 1) / n
fn l_fn(x: &Integer, n: &Integer) -> Integer {
    let mut t = x.clone();
    t -= 1;
    t / n
}

fn gcd(mut a: Integer, mut b: Integer) -> Integer {
    while b != 0 {
        let r: Integer = (&a % &b).into();
        a = b;
        b = r;
    }
    a
}

fn lcm(a: &Integer, b: &Integer) -> Integer {
    let g = gcd(a.clone(), b.clone());
    let prod: Integer = (a * b).into();
    prod / g
}

pub fn enc(pk: &PaillierPublicKey, m: &Integer, rng: &mut (impl RngCore + ?Sized)) -> Ciphertext {
    let n = pk.n();
    let n2 = pk.n2();
    let r = rand_unit_mod_n(pk, rng);
    let m = mod_n(m, &n);
    // (1 + n)^m = 1 + m*n mod n^2
    let gm: Integer = {
        let mut t: Integer = (&m * &n).into();
        t += 1;
        t
    };
    let rn = r
        .pow_mod(&n, &n2)
        .expect("positive exponent always defined");
    let c = (gm * rn) % n2;
    Ciphertext(int_to_be(&c))
}

/// Encrypt a participant amount.
pub fn encrypt_amount(
    pk: &PaillierPublicKey,
    amount: u64,
    rng: &mut (impl RngCore + ?Sized),
) -> Ciphertext {
    enc(pk, &Integer::from(amount), rng)
}

pub fn dec(sk: &PaillierPrivateKey, c: &Ciphertext) -> Integer {
    let n = sk.n();
    let n2 = sk.n2();
    let ci = int_from_be(&c.0);
    let u = ci
        .pow_mod(&sk.lambda(), &n2)
        .expect("positive exponent always defined");
    (l_fn(&u, &n) * sk.mu()) % &n
}

/// Map a residue in [0, n) to its centered representative in (-n/2, n/2].
pub fn centered(v: Integer, n: &Integer) -> Integer {
    let mut half_n = n.clone();
    half_n >>= 1;
    if v > half_n {
        v - n
    } else {
        v
    }
}

/// Structural validity of a ciphertext under `pk`: non-empty, no wider than
/// n^2, in (0, n^2) and a unit mod n.
pub fn validate_ciphertext(pk: &PaillierPublicKey, c: &Ciphertext) -> Result<()> {
    if c.0.is_empty() {
        bail!("empty ciphertext");
    }
    if c.0.len() > pk.n2.len() {
        bail!(
            "ciphertext is {} bytes, modulus allows at most {}",
            c.0.len(),
            pk.n2.len()
        );
    }
    let ci = int_from_be(&c.0);
    if ci == 0 {
        bail!("ciphertext is zero");
    }
    if ci >= pk.n2() {
        bail!("ciphertext not reduced mod n^2");
    }
    if gcd(ci, pk.n()) != 1 {
        bail!("ciphertext is not a unit mod n");
    }
    Ok(())
}

pub fn add(pk: &PaillierPublicKey, a: &Ciphertext, b: &Ciphertext) -> Ciphertext {
    let n2 = pk.n2();
    let ai = int_from_be(&a.0);
    let bi = int_from_be(&b.0);
    Ciphertext(int_to_be(&((ai * bi) % n2)))
}

pub fn add_plain(pk: &PaillierPublicKey, a: &Ciphertext, k: &Integer) -> Ciphertext {
    let n = pk.n();
    let n2 = pk.n2();
    let ai = int_from_be(&a.0);
    let k = mod_n(k, &n);
    let ek: Integer = {
        let mut t: Integer = (&k * &n).into();
        t += 1;
        t
    };
    Ciphertext(int_to_be(&((ai * ek) % n2)))
}

pub fn mul_plain(pk: &PaillierPublicKey, a: &Ciphertext, k: &Integer) -> Ciphertext {
    let n2 = pk.n2();
    let mut ai = int_from_be(&a.0);
    // negative scalars act through their residue mod n
    let kk = mod_n(k, &pk.n());
    ai.pow_mod_mut(&kk, &n2)
        .expect("non-negative exponent always defined");
    Ciphertext(int_to_be(&ai))
}

/// `a - b` under encryption.
pub fn sub(pk: &PaillierPublicKey, a: &Ciphertext, b: &Ciphertext) -> Ciphertext {
    add(pk, a, &mul_plain(pk, b, &Integer::from(-1)))
}

/// Fresh encryption of the same plaintext: multiplies in `r^n` for a new
/// random unit `r`.
pub fn rerandomize(
    pk: &PaillierPublicKey,
    a: &Ciphertext,
    rng: &mut (impl RngCore + ?Sized),
) -> Ciphertext {
    let n = pk.n();
    let n2 = pk.n2();
    let r = rand_unit_mod_n(pk, rng);
    let ri = r.pow_mod(&n, &n2).expect("positive exponent always defined");
    let ai = int_from_be(&a.0);
    Ciphertext(int_to_be(&((ai * ri) % n2)))
}

/// Stable fingerprint of a public key.
pub fn hash_key(pk: &PaillierPublicKey) -> String {
    let mut h = blake3::Hasher::new();
    h.update(&pk.n);
    h.update(&pk.n2);
    h.finalize().to_hex().to_string()
}

// ------------- Coprocessor capability traits -------------

/// Sends blinded pairs to the key holder for ciphertext×ciphertext
/// multiplication.
pub trait RemoteMultiplier {
    fn mult_batch(&mut self, blinded_pairs: &[(Ciphertext, Ciphertext)])
        -> Result<Vec<Ciphertext>>;
}

/// Compares an encrypted integer against zero, returning encrypted
/// indicator bits `(lt, eq, gt)`.
///
/// Implementations must return `Err` for a value whose centered magnitude
/// is at or above `2^MaskParams::masked_bits()`. Such a value can only come
/// from a submission outside the `u64` amount range, and its sign after
/// masking is meaningless.
pub trait RemoteComparator {
    fn cmp_zero(&mut self, x: &Ciphertext) -> Result<(Ciphertext, Ciphertext, Ciphertext)>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncInt {
    pub c: Ciphertext,
}

impl EncInt {
    pub fn new(c: Ciphertext) -> Self {
        Self { c }
    }
    pub fn add(&self, pk: &PaillierPublicKey, other: &EncInt) -> EncInt {
        EncInt::new(add(pk, &self.c, &other.c))
    }
    pub fn add_plain(&self, pk: &PaillierPublicKey, k: &Integer) -> EncInt {
        EncInt::new(add_plain(pk, &self.c, k))
    }
    pub fn mul_plain(&self, pk: &PaillierPublicKey, k: &Integer) -> EncInt {
        EncInt::new(mul_plain(pk, &self.c, k))
    }
}

/// Client-side blinding for secure multiplication.
pub fn blind_pair(
    pk: &PaillierPublicKey,
    x: &EncInt,
    y: &EncInt,
    a: &Integer,
    b: &Integer,
) -> (Ciphertext, Ciphertext) {
    let mut rng = rand::thread_rng();
    let xa = add(pk, &x.c, &enc(pk, a, &mut rng));
    let yb = add(pk, &y.c, &enc(pk, b, &mut rng));
    (xa, yb)
}

/// Client-side unblinding: given J(x+a)(y+b)K plus JxK,JyK and (a,b), compute JxyK.
pub fn unblind_product(
    pk: &PaillierPublicKey,
    x: &EncInt,
    y: &EncInt,
    prod_blinded: &Ciphertext,
    a: &Integer,
    b: &Integer,
) -> EncInt {
    // JxyK = J(x+a)(y+b)K ⊕ (−b)⊗JxK ⊕ (−a)⊗JyK ⊕ J(−ab)K
    let nb: Integer = (-b).into();
    let na: Integer = (-a).into();
    let ab: Integer = (a * b).into();
    let nab: Integer = (-ab).into();

    let term1 = EncInt::new(prod_blinded.clone());
    let term2 = x.mul_plain(pk, &nb);
    let term3 = y.mul_plain(pk, &na);
    let tmp = term1.add(pk, &term2).add(pk, &term3);
    tmp.add_plain(pk, &nab)
}

// --- Simple JSON (de)serialization helpers for keys and config ---

pub fn save_json<T: Serialize>(path: &str, value: &T) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)
        .map_err(|e| anyhow!("failed to write {path}: {e}"))?;
    Ok(())
}

pub fn load_json<T: for<'de> Deserialize<'de>>(path: &str) -> Result<T> {
    let data = std::fs::read(path).map_err(|e| anyhow!("failed to read {path}: {e}"))?;
    Ok(serde_json::from_slice(&data)?)
}

// ------------------- Tests -------------------
