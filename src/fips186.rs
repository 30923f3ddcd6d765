// SPDX-License-Identifier: MIT

//! The legacy SHA-1 based random number generator from NIST FIPS 186
//! (Appendix 3.1, general purpose variant).
//!
//! The generator keeps a key of `b` bytes (20 to 64). Each round runs the
//! SHA-1 compression function twice over the zero-padded key, optionally
//! mixed with an external seed, and folds every 20-byte word back into
//! the key with a big-endian add-with-carry. Output is served from the
//! two-word result cache.
//!
//! This construction predates SP 800-90A and remains here for
//! compatibility with deployments validated against the FIPS 186 VST
//! vectors. New designs should prefer [`CtrDrbg`](crate::ctr::CtrDrbg).
use crate::error::Error;

use aes::cipher::generic_array::GenericArray;
use alloc::vec::Vec;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Smallest permitted key size in bytes.
pub const MIN_KEY_SIZE: usize = 20;
/// Largest permitted key size in bytes.
pub const MAX_KEY_SIZE: usize = 64;
/// Default key size used when acquiring a context without an explicit
/// size.
pub const DEFAULT_KEY_SIZE: usize = MAX_KEY_SIZE;

pub(crate) const SHA1_DIGEST_SIZE: usize = 20;
pub(crate) const SHA1_BLOCK_SIZE: usize = 64;

const SHA1_IV: [u32; 5] = [
    0x6745_2301,
    0xefcd_ab89,
    0x98ba_dcfe,
    0x1032_5476,
    0xc3d2_e1f0,
];

/// One application of the SHA-1 compression function to a single 64-byte
/// block, starting from the standard initialization vector. This is the
/// `G(t, c)` function of FIPS 186; no length padding is involved.
pub(crate) fn sha1_g(block: &[u8; SHA1_BLOCK_SIZE]) -> [u8; SHA1_DIGEST_SIZE] {
    let mut state = SHA1_IV;
    sha1::compress(&mut state, core::slice::from_ref(GenericArray::from_slice(block)));
    let mut out = [0u8; SHA1_DIGEST_SIZE];
    for (chunk, word) in out.chunks_exact_mut(4).zip(state.iter()) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    out
}

/// Big-endian add of `b` into `a` with an initial carry, propagating
/// carries toward the most significant byte. `b` may be shorter or
/// longer than `a`; the operands are aligned at their least significant
/// bytes and overflow past `a[0]` is discarded.
fn rng_add(a: &mut [u8], b: &[u8], mut carry: u8) {
    let mut bi = b.len();
    for ai in (0..a.len()).rev() {
        let (sum, overflow) = a[ai].overflowing_add(carry);
        a[ai] = sum;
        carry = overflow as u8;
        if bi > 0 {
            bi -= 1;
            let (sum, overflow) = a[ai].overflowing_add(b[bi]);
            a[ai] = sum;
            carry += overflow as u8;
        }
    }
}

/// FIPS 186 SHA-1 generator context.
///
/// # Example
///
/// ```
/// use fips_rng::fips186::Fips186;
///
/// # use fips_rng::Error;
/// #
/// # fn main() -> Result<(), Error> {
/// #
/// let key = [0x24u8; 20];
/// let mut rng = Fips186::new(&key, None)?;
/// let mut random_data = [0u8; 32];
/// rng.generate(&mut random_data)?;
/// #
/// # Ok(())
/// # }
/// ```
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Fips186 {
    key: [u8; MAX_KEY_SIZE],
    b: usize,
    seed: Vec<u8>,
    seed_pos: usize,
    seed_remaining: usize,
    result: [u8; 2 * SHA1_DIGEST_SIZE],
    num_bytes_avail: usize,
    bit_pos: usize,
    #[cfg(feature = "fips")]
    history: [u8; SHA1_DIGEST_SIZE],
    #[cfg(feature = "fips")]
    failed: bool,
    #[cfg(all(feature = "fips", test))]
    force_fail: bool,
}

impl Fips186 {
    /// Create a new generator from an initial key of 20 to 64 bytes and
    /// an optional seed. The seed, when present, is consumed forward in
    /// key-sized windows and added into the SHA-1 message of successive
    /// rounds until exhausted.
    ///
    /// # Error
    ///
    /// Returns [`Error::InvalidArgument`] if the key length is outside
    /// `[20, 64]`.
    pub fn new(key: &[u8], seed: Option<&[u8]>) -> Result<Self, Error> {
        if key.len() < MIN_KEY_SIZE || key.len() > MAX_KEY_SIZE {
            return Err(Error::InvalidArgument);
        }
        let mut k = [0u8; MAX_KEY_SIZE];
        k[..key.len()].copy_from_slice(key);
        let seed: Vec<u8> = seed.unwrap_or(&[]).to_vec();
        let seed_remaining = seed.len();
        Ok(Self {
            key: k,
            b: key.len(),
            seed,
            seed_pos: 0,
            seed_remaining,
            result: [0u8; 2 * SHA1_DIGEST_SIZE],
            num_bytes_avail: 0,
            bit_pos: 0,
            #[cfg(feature = "fips")]
            history: [0u8; SHA1_DIGEST_SIZE],
            #[cfg(feature = "fips")]
            failed: false,
            #[cfg(all(feature = "fips", test))]
            force_fail: false,
        })
    }

    /// The key size `b` this context was created with.
    pub fn key_size(&self) -> usize {
        self.b
    }

    /// Fill `out` with generator output, running new rounds whenever the
    /// result cache empties.
    ///
    /// # Error
    ///
    /// Returns [`Error::RngSelfTestFailed`] if the continuous test
    /// detects a repeated output word. The failure is permanent for this
    /// instance; every later call fails the same way.
    pub fn generate(&mut self, out: &mut [u8]) -> Result<(), Error> {
        if out.is_empty() {
            return Ok(());
        }
        #[cfg(feature = "fips")]
        if self.failed {
            return Err(Error::RngSelfTestFailed);
        }
        let mut pos = 0;
        while pos < out.len() {
            let n = (out.len() - pos).min(self.num_bytes_avail);
            if n > 0 {
                let off = 2 * SHA1_DIGEST_SIZE - self.num_bytes_avail;
                out[pos..pos + n].copy_from_slice(&self.result[off..off + n]);
                self.num_bytes_avail -= n;
                pos += n;
            }
            if self.num_bytes_avail == 0 && pos < out.len() {
                self.round()?;
            }
        }
        Ok(())
    }

    /// Fold one caller-supplied entropy bit into the key at a rotating
    /// bit position (mod `8 * b`). A zero bit still advances the
    /// position.
    pub fn add_entropy_bit(&mut self, bit: u8) {
        self.bit_pos = (self.bit_pos + 1) % (8 * self.b);
        if bit & 1 != 0 {
            let index = (self.bit_pos >> 3) % self.b;
            self.key[index] ^= 1 << (self.bit_pos & 7);
        }
    }

    /// Run one round: two SHA-1 words, each fed back into the key.
    fn round(&mut self) -> Result<(), Error> {
        for i in 0..2 {
            let mut scratch = Zeroizing::new([0u8; SHA1_BLOCK_SIZE]);
            scratch[..self.b].copy_from_slice(&self.key[..self.b]);

            if self.seed_remaining > 0 {
                let window = &self.seed[self.seed_pos..self.seed_pos + self.seed_remaining];
                rng_add(&mut scratch[..self.b], window, 0);
                if self.seed_remaining > self.b {
                    self.seed_pos += self.b;
                    self.seed_remaining -= self.b;
                } else {
                    self.seed_remaining = 0;
                }
            }

            let w = sha1_g(&scratch);
            self.result[i * SHA1_DIGEST_SIZE..(i + 1) * SHA1_DIGEST_SIZE].copy_from_slice(&w);
            rng_add(&mut self.key[..self.b], &w, 1);

            #[cfg(feature = "fips")]
            self.continuous_check(&w)?;
        }
        self.num_bytes_avail = 2 * SHA1_DIGEST_SIZE;
        Ok(())
    }

    /// FIPS 140-2 continuous test: a word equal to its predecessor is a
    /// fatal failure for this instance.
    #[cfg(feature = "fips")]
    fn continuous_check(&mut self, word: &[u8; SHA1_DIGEST_SIZE]) -> Result<(), Error> {
        #[cfg(test)]
        if self.force_fail {
            self.history.copy_from_slice(word);
        }
        if self.history == *word {
            self.failed = true;
            return Err(Error::RngSelfTestFailed);
        }
        self.history.copy_from_slice(word);
        Ok(())
    }

    /// Uptime-jitter mixing step used while seeding a freshly acquired
    /// context.
    pub(crate) fn jitter_mix(&mut self, i: usize, up_time: u32) {
        let up = up_time as usize;
        if (up & 0x3) & (self.key[i] as usize & 0x3) == 0x3 {
            let index = up % self.b;
            self.key[index] = self.key[index].wrapping_add(up_time as u8);
        }
        self.key[i] ^= up_time as u8;
    }

    /// Replace the whole key array with generator output gathered by the
    /// caller.
    pub(crate) fn reset_key_material(&mut self, bytes: &[u8; MAX_KEY_SIZE]) {
        self.key.copy_from_slice(bytes);
    }

    #[cfg(all(feature = "fips", test))]
    fn force_continuous_failure(&mut self) {
        self.force_fail = true;
    }
}

#[cfg(test)]
mod tests {
    use super::{Fips186, MAX_KEY_SIZE, MIN_KEY_SIZE};
    use crate::error::Error;

    fn vst_key() -> [u8; 20] {
        let mut key = [0u8; 20];
        key[0] = 0x80;
        key
    }

    //
    // NIST FIPS 186 VST vector: b = 20, key = 80 00 .. 00. The first
    // SHA-1 message is then exactly the padded empty string.
    //
    #[test]
    fn fips186_vst_vector() -> Result<(), Error> {
        let mut rng = Fips186::new(&vst_key(), None)?;
        let mut out = [0u8; 20];
        rng.generate(&mut out)?;
        assert_eq!(
            hex::decode("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap(),
            out
        );
        Ok(())
    }

    #[test]
    fn fips186_vst_vector_zero_seed() -> Result<(), Error> {
        // An all-zero seed adds nothing to the message and must not
        // perturb the vector.
        let seed = [0u8; 20];
        let mut rng = Fips186::new(&vst_key(), Some(&seed))?;
        let mut out = [0u8; 20];
        rng.generate(&mut out)?;
        assert_eq!(
            hex::decode("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap(),
            out
        );
        Ok(())
    }

    #[test]
    fn fips186_cache_is_continuous() -> Result<(), Error> {
        let key = [0x5au8; 32];
        let mut one_shot = Fips186::new(&key, None)?;
        let mut expected = [0u8; 100];
        one_shot.generate(&mut expected)?;

        let mut chunked = Fips186::new(&key, None)?;
        let mut actual = [0u8; 100];
        for chunk in actual.chunks_mut(7) {
            chunked.generate(chunk)?;
        }
        assert_eq!(expected, actual);
        Ok(())
    }

    #[test]
    fn fips186_key_size_bounds() {
        let short = [0u8; MIN_KEY_SIZE - 1];
        assert_eq!(
            Fips186::new(&short, None).err(),
            Some(Error::InvalidArgument)
        );
        let long = [0u8; MAX_KEY_SIZE + 1];
        assert_eq!(Fips186::new(&long, None).err(), Some(Error::InvalidArgument));
    }

    #[test]
    fn fips186_entropy_bit_changes_stream() -> Result<(), Error> {
        let key = [0x42u8; 20];
        let mut plain = Fips186::new(&key, None)?;
        let mut tweaked = Fips186::new(&key, None)?;
        tweaked.add_entropy_bit(1);

        let mut a = [0u8; 20];
        let mut b = [0u8; 20];
        plain.generate(&mut a)?;
        tweaked.generate(&mut b)?;
        assert_ne!(a, b);
        Ok(())
    }

    #[cfg(feature = "fips")]
    #[test]
    fn fips186_continuous_test_is_fatal() -> Result<(), Error> {
        let key = [0x13u8; 20];
        let mut rng = Fips186::new(&key, None)?;
        let mut out = [0u8; 8];
        rng.generate(&mut out)?;

        rng.force_continuous_failure();
        let mut big = [0u8; 64];
        assert_eq!(
            rng.generate(&mut big).err(),
            Some(Error::RngSelfTestFailed)
        );
        // The instance stays poisoned for every later request.
        assert_eq!(
            rng.generate(&mut out).err(),
            Some(Error::RngSelfTestFailed)
        );
        Ok(())
    }
}
