// SPDX-License-Identifier: MIT

//! Random number generation for FIPS 140-2 minded deployments: the
//! legacy NIST FIPS 186 SHA-1 generator and the NIST [SP 800-90A
//! Rev. 1](https://csrc.nist.gov/publications/detail/sp/800-90a/rev-1/final)
//! CTR_DRBG, seeded from a shared jitter-entropy depot.
//!
//! The crate has three layers:
//!
//! - [`fips186`] and [`ctr`] are the generator cores. They take entropy
//!   as explicit byte slices, run on `core` + `alloc`, and reproduce the
//!   published NIST test vectors.
//! - [`depot`] collects seed entropy from timing jitter between three
//!   worker threads perturbing a shared scratch buffer (`std` only).
//! - [`context`] and [`global`] tie the two together: a mutex-guarded
//!   handle dispatching to either generator, and a process-wide shared
//!   instance with background seeding.
//!
//! Under the default `fips` feature every generator runs the FIPS 140-2
//! continuous test: output that repeats its predecessor is a fatal,
//! instance-poisoning error.
//!
//! # Quick Example
//!
//! The simplest way to obtain cryptographic random data is the global
//! context. This example selects the external entropy source, which
//! skips the in-process jitter pool; the default
//! ([`Internal`](context::EntropySource::Internal)) source instead runs
//! the worker threads and takes several seconds of wall-clock jitter
//! gathering on first use.
//!
//! ```
//! # #[cfg(feature = "std")]
//! # {
//! use fips_rng::context::{set_entropy_source, EntropySource};
//! use fips_rng::global;
//!
//! # fn run() -> Result<(), fips_rng::Error> {
//! set_entropy_source(EntropySource::External);
//! let rng = global::acquire_global_context()?;
//!
//! let mut random_data = [0u8; 32];
//! rng.generate(&mut random_data)?;
//! # global::release_global_context();
//! # Ok(())
//! # }
//! # run().unwrap();
//! # }
//! ```
//!
//! Otherwise the generator cores can be driven by hand with
//! caller-supplied entropy; see [`ctr::CtrDrbg`] and
//! [`fips186::Fips186`].
#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod ctr;
pub mod entropy;
pub mod error;
pub mod fips186;

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod context;

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod depot;

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod global;

pub use error::Error;
