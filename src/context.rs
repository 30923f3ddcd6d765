// SPDX-License-Identifier: MIT

//! A polymorphic front over the two generator implementations.
//!
//! A [`RandomContext`] wraps either a [`Fips186`] or a [`CtrDrbg`]
//! generator behind its own mutex, so independently acquired handles can
//! generate concurrently while each handle's state stays serialized.
//! Acquisition seeds the generator from an injected [`SeedDepot`]:
//! through the worker pool when the process-wide entropy source is
//! [`EntropySource::Internal`], or through the threadless mixing path
//! when it is [`EntropySource::External`].
//!
//! Dispatching an operation a variant does not support (reseeding a
//! FIPS 186 handle) is a caller bug and fails with
//! [`Error::InvalidArgument`] rather than being ignored.
use crate::ctr::{CtrCipher, CtrDrbg};
use crate::depot::SeedDepot;
use crate::error::Error;
use crate::fips186::{Fips186, DEFAULT_KEY_SIZE, MAX_KEY_SIZE};

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use zeroize::Zeroizing;

/// Entropy drawn from the depot when seeding or reseeding a CTR_DRBG
/// handle: the largest seed, for the maximum security strength.
const CTR_ENTROPY_LEN: usize = 48;

/// Entropy bits accumulated through `add_entropy_bit` before a CTR_DRBG
/// handle reseeds itself from the depot.
const CTR_RESEED_BITS: u32 = (CTR_ENTROPY_LEN * 8) as u32;

/// Generator algorithm backing a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Let the library choose ([`DEFAULT_ALGORITHM`]).
    Any,
    /// The legacy FIPS 186 SHA-1 generator.
    Fips186,
    /// NIST SP 800-90A CTR_DRBG (AES-256, no derivation function).
    CtrDrbg,
}

/// Algorithm used when the caller does not care.
pub const DEFAULT_ALGORITHM: Algorithm = Algorithm::CtrDrbg;

/// Where acquisition gets its seed entropy from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropySource {
    /// The in-process jitter worker pool.
    Internal,
    /// Caller-supplied entropy only; the worker pool is never started.
    External,
}

static ENTROPY_SOURCE: AtomicU8 = AtomicU8::new(0);

/// Select the process-wide entropy source. Takes effect for subsequent
/// acquisitions; existing handles are unaffected.
pub fn set_entropy_source(source: EntropySource) {
    let value = match source {
        EntropySource::Internal => 0,
        EntropySource::External => 1,
    };
    ENTROPY_SOURCE.store(value, Ordering::SeqCst);
}

/// The currently selected process-wide entropy source.
pub fn get_entropy_source() -> EntropySource {
    match ENTROPY_SOURCE.load(Ordering::SeqCst) {
        1 => EntropySource::External,
        _ => EntropySource::Internal,
    }
}

fn gather_entropy(depot: &Arc<SeedDepot>, out: &mut [u8]) -> Result<(), Error> {
    match get_entropy_source() {
        EntropySource::Internal => depot.extract_bits(out),
        EntropySource::External => depot.extract_initial_bits(out),
    }
}

enum Generator {
    Fips186(Fips186),
    Ctr(CtrDrbg),
}

struct Inner {
    generator: Generator,
    /// Entropy bits folded in since the last depot-driven reseed.
    reseed_bit_counter: u32,
}

/// A random-generation handle dispatching to one generator variant.
///
/// # Example
///
/// ```
/// use fips_rng::context::{set_entropy_source, EntropySource, RandomContext};
/// use fips_rng::depot::SeedDepot;
/// use std::sync::Arc;
///
/// # use fips_rng::Error;
/// #
/// # fn main() -> Result<(), Error> {
/// #
/// set_entropy_source(EntropySource::External);
/// let depot = Arc::new(SeedDepot::new());
/// let ctx = RandomContext::acquire(&depot)?;
///
/// let mut random_data = [0u8; 32];
/// ctx.generate(&mut random_data)?;
/// #
/// # Ok(())
/// # }
/// ```
pub struct RandomContext {
    depot: Arc<SeedDepot>,
    inner: Mutex<Inner>,
}

impl RandomContext {
    /// Acquire a context backed by the default algorithm.
    pub fn acquire(depot: &Arc<SeedDepot>) -> Result<Self, Error> {
        Self::acquire_with(depot, DEFAULT_ALGORITHM)
    }

    /// Acquire a context backed by an explicit algorithm, seeded from
    /// the depot according to the process-wide entropy source.
    pub fn acquire_with(depot: &Arc<SeedDepot>, algorithm: Algorithm) -> Result<Self, Error> {
        let algorithm = match algorithm {
            Algorithm::Any => DEFAULT_ALGORITHM,
            other => other,
        };
        let generator = match algorithm {
            Algorithm::Fips186 => {
                Generator::Fips186(acquire_fips186(depot, DEFAULT_KEY_SIZE)?)
            }
            _ => Generator::Ctr(acquire_ctr_drbg(depot)?),
        };
        Ok(Self::with_generator(depot, generator))
    }

    fn with_generator(depot: &Arc<SeedDepot>, generator: Generator) -> Self {
        Self {
            depot: Arc::clone(depot),
            inner: Mutex::new(Inner {
                generator,
                reseed_bit_counter: 0,
            }),
        }
    }

    /// The algorithm this handle dispatches to.
    pub fn algorithm(&self) -> Algorithm {
        match &self.lock().generator {
            Generator::Fips186(_) => Algorithm::Fips186,
            Generator::Ctr(_) => Algorithm::CtrDrbg,
        }
    }

    /// Fill `out` with random bytes. On any error the buffer contents
    /// are not usable; there is no partial success.
    pub fn generate(&self, out: &mut [u8]) -> Result<(), Error> {
        let mut guard = self.lock();
        match &mut guard.generator {
            Generator::Fips186(generator) => generator.generate(out),
            Generator::Ctr(generator) => generator.generate(None, out),
        }
    }

    /// Reseed the underlying CTR_DRBG with caller-supplied entropy.
    ///
    /// # Error
    ///
    /// [`Error::InvalidArgument`] when dispatched to a FIPS 186 handle,
    /// which has no reseed operation.
    pub fn reseed(&self, entropy: &[u8], additional: Option<&[u8]>) -> Result<(), Error> {
        let mut guard = self.lock();
        match &mut guard.generator {
            Generator::Ctr(generator) => generator.reseed(entropy, additional),
            Generator::Fips186(_) => Err(Error::InvalidArgument),
        }
    }

    /// Fold one entropy bit into the handle. FIPS 186 handles mix the
    /// bit straight into their key; CTR_DRBG handles feed the depot and
    /// reseed from it once enough bits have accumulated.
    pub fn add_entropy_bit(&self, bit: u8) -> Result<(), Error> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match &mut inner.generator {
            Generator::Fips186(generator) => {
                inner.reseed_bit_counter += 1;
                generator.add_entropy_bit(bit);
                Ok(())
            }
            Generator::Ctr(generator) => {
                self.depot.add_entropy_bit(bit)?;
                inner.reseed_bit_counter += 1;
                if inner.reseed_bit_counter >= CTR_RESEED_BITS {
                    let mut entropy = Zeroizing::new([0u8; CTR_ENTROPY_LEN]);
                    self.depot.extract_bits(&mut entropy[..])?;
                    generator.reseed(&entropy[..], None)?;
                    inner.reseed_bit_counter = 0;
                }
                Ok(())
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(feature = "rand_core")]
#[cfg_attr(docsrs, doc(cfg(feature = "rand_core")))]
impl rand_core::TryRngCore for RandomContext {
    type Error = Error;

    fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
        let mut bytes = [0u8; 4];
        self.generate(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
        let mut bytes = [0u8; 8];
        self.generate(&mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn try_fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.generate(bytes)
    }
}

#[cfg(feature = "rand_core")]
#[cfg_attr(docsrs, doc(cfg(feature = "rand_core")))]
impl rand_core::TryCryptoRng for RandomContext {}

/// Seed a FIPS 186 generator: depot bytes for the key, then a
/// jitter-churn pass that regenerates the key from the generator's own
/// output once per key byte.
fn acquire_fips186(depot: &Arc<SeedDepot>, key_size: usize) -> Result<Fips186, Error> {
    let mut key = Zeroizing::new([0u8; MAX_KEY_SIZE]);
    gather_entropy(depot, &mut key[..key_size])?;
    let mut generator = Fips186::new(&key[..key_size], None)?;

    let start = Instant::now();
    for i in 0..key_size {
        generator.jitter_mix(i, start.elapsed().as_millis() as u32);
        let mut fresh = Zeroizing::new([0u8; MAX_KEY_SIZE]);
        generator.generate(&mut fresh[..])?;
        generator.reset_key_material(&fresh);
    }
    Ok(generator)
}

/// Seed an AES-256 no-df CTR_DRBG from 48 depot bytes with an empty
/// personalization string.
fn acquire_ctr_drbg(depot: &Arc<SeedDepot>) -> Result<CtrDrbg, Error> {
    let mut entropy = Zeroizing::new([0u8; CTR_ENTROPY_LEN]);
    gather_entropy(depot, &mut entropy[..])?;
    CtrDrbg::new(CtrCipher::Aes256, &entropy[..], &[])
}

#[cfg(test)]
mod tests {
    use super::{
        set_entropy_source, Algorithm, EntropySource, Generator, RandomContext,
    };
    use crate::ctr::{CtrCipher, CtrDrbg};
    use crate::depot::SeedDepot;
    use crate::error::Error;
    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    #[test]
    fn acquire_dispatches_by_algorithm() {
        set_entropy_source(EntropySource::External);
        let depot = Arc::new(SeedDepot::new());

        let ctx = RandomContext::acquire_with(&depot, Algorithm::CtrDrbg).unwrap();
        assert_eq!(ctx.algorithm(), Algorithm::CtrDrbg);
        let mut buf = [0u8; 32];
        ctx.generate(&mut buf).unwrap();
        assert_ne!([0u8; 32], buf);
        ctx.reseed(&[0x44u8; 48], None).unwrap();
        ctx.generate(&mut buf).unwrap();

        let ctx = RandomContext::acquire_with(&depot, Algorithm::Fips186).unwrap();
        assert_eq!(ctx.algorithm(), Algorithm::Fips186);
        ctx.generate(&mut buf).unwrap();
        assert_eq!(
            ctx.reseed(&[0u8; 48], None).err(),
            Some(Error::InvalidArgument)
        );
        ctx.add_entropy_bit(1).unwrap();

        let ctx = RandomContext::acquire_with(&depot, Algorithm::Any).unwrap();
        assert_eq!(ctx.algorithm(), Algorithm::CtrDrbg);
    }

    #[test]
    fn ctr_entropy_bits_trigger_depot_reseed() {
        set_entropy_source(EntropySource::External);
        let depot = Arc::new(SeedDepot::with_rounds(1));
        let ctx = RandomContext::acquire(&depot).unwrap();

        // the final bit crosses the threshold and pulls a depot reseed
        for i in 0..(48 * 8) {
            ctx.add_entropy_bit((i & 1) as u8).unwrap();
        }
        let mut buf = [0u8; 16];
        ctx.generate(&mut buf).unwrap();

        depot.kill_workers();
        depot.join_workers();
    }

    #[test]
    fn concurrent_handles_keep_streams_independent() {
        const RUNS: usize = 500;
        let entropy_a = [0xa1u8; 48];
        let entropy_b = [0xb2u8; 48];
        let depot = Arc::new(SeedDepot::new());

        let ctx_a = Arc::new(RandomContext::with_generator(
            &depot,
            Generator::Ctr(CtrDrbg::new(CtrCipher::Aes256, &entropy_a, &[]).unwrap()),
        ));
        let ctx_b = Arc::new(RandomContext::with_generator(
            &depot,
            Generator::Ctr(CtrDrbg::new(CtrCipher::Aes256, &entropy_b, &[]).unwrap()),
        ));

        let spawn = |ctx: Arc<RandomContext>| {
            thread::spawn(move || {
                let mut stream = Vec::with_capacity(RUNS * 16);
                let mut block = [0u8; 16];
                for _ in 0..RUNS {
                    ctx.generate(&mut block).unwrap();
                    stream.extend_from_slice(&block);
                }
                stream
            })
        };
        let handle_a = spawn(Arc::clone(&ctx_a));
        let handle_b = spawn(Arc::clone(&ctx_b));
        let stream_a = handle_a.join().unwrap();
        let stream_b = handle_b.join().unwrap();

        // each handle must reproduce the stream a serial run yields
        for (entropy, stream) in [(entropy_a, stream_a), (entropy_b, stream_b)] {
            let mut reference = CtrDrbg::new(CtrCipher::Aes256, &entropy, &[]).unwrap();
            let mut expected = Vec::with_capacity(RUNS * 16);
            let mut block = [0u8; 16];
            for _ in 0..RUNS {
                reference.generate(None, &mut block).unwrap();
                expected.extend_from_slice(&block);
            }
            assert_eq!(expected, stream);
        }
    }
}
