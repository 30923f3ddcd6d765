// SPDX-License-Identifier: MIT

//! The crate-wide error type.
use core::fmt::{self, Display, Formatter};

/// Error returned by generator, depot, and context operations.
///
/// Self-test failures are fatal for the instance that reported them: the
/// generator refuses further requests until it is re-instantiated. The
/// policy errors [`ReseedRequired`](Error::ReseedRequired) and
/// [`RequestTooLarge`](Error::RequestTooLarge) are recoverable by caller
/// action (reseed, or split the request).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A malformed argument, or an operation dispatched to a generator
    /// variant that does not support it.
    InvalidArgument,
    /// The entropy input length does not equal the seed length required
    /// by a no-df CTR_DRBG instance.
    BadEntropyLength,
    /// The personalization string exceeds the seed length.
    BadPersonalizationLength,
    /// The reseed interval was exhausted; call `reseed` and retry.
    ReseedRequired,
    /// A single request asked for more bits than the per-call ceiling.
    RequestTooLarge,
    /// FIPS 140-2 continuous test failure in the FIPS 186 generator or
    /// the entropy depot: an output repeated its predecessor.
    RngSelfTestFailed,
    /// FIPS 140-2 continuous test failure in a CTR_DRBG instance.
    CtrDrbgSelfTestFailed,
    /// Entropy subsystem shutdown has been requested; stop drawing
    /// entropy and proceed to release.
    ThreadsTerminating,
    /// The underlying entropy source failed to produce bytes.
    EntropySource,
    /// An operating system resource (e.g. a thread) could not be created.
    Resource,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument => write!(f, "invalid argument"),
            Error::BadEntropyLength => write!(f, "entropy input length mismatch"),
            Error::BadPersonalizationLength => {
                write!(f, "personalization string too long")
            }
            Error::ReseedRequired => write!(f, "reseed interval exhausted"),
            Error::RequestTooLarge => write!(f, "request exceeds per-call bit limit"),
            Error::RngSelfTestFailed => write!(f, "rng continuous self-test failed"),
            Error::CtrDrbgSelfTestFailed => {
                write!(f, "ctr-drbg continuous self-test failed")
            }
            Error::ThreadsTerminating => write!(f, "entropy threads terminating"),
            Error::EntropySource => write!(f, "entropy source failure"),
            Error::Resource => write!(f, "resource allocation failure"),
        }
    }
}

impl core::error::Error for Error {}
