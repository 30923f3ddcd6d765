// SPDX-License-Identifier: MIT

//! Traits and types for defining entropy sources.
use crate::error::Error;

/// Represents a source of seed material for the random number
/// generators. Implementations are expected to either fill the whole
/// buffer or fail; partial fills are never a success outcome.
pub trait Entropy {
    /// Fill `bytes` with random data from the entropy source.
    ///
    /// # Error
    ///
    /// Returns an error if there is a problem with the underlying
    /// entropy source.
    fn fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Error>;
}

/// An entropy source that draws random data from the host operating
/// system.
///
/// ```
/// use fips_rng::entropy::{Entropy, OsEntropy};
///
/// # use fips_rng::Error;
/// #
/// # fn main() -> Result<(), Error> {
/// #
/// let mut entropy = OsEntropy::default();
/// let mut random_data = [0u8; 32];
/// entropy.fill_bytes(&mut random_data)?;
/// #
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct OsEntropy {}

impl OsEntropy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Entropy for OsEntropy {
    /// Fill `bytes` with random data from the operating system using
    /// [`getrandom`](getrandom::getrandom).
    ///
    /// # Error
    ///
    /// Returns [`Error::EntropySource`] if the OS facility fails.
    fn fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        getrandom::getrandom(bytes).map_err(|_| Error::EntropySource)
    }
}

#[cfg(test)]
mod tests {
    use super::{Entropy, OsEntropy};

    #[test]
    fn os_entropy_fills() {
        let mut entropy = OsEntropy::new();
        let mut buf = [0u8; 32];
        entropy.fill_bytes(&mut buf).unwrap();
        assert_ne!([0u8; 32], buf);
    }
}
