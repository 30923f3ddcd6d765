// SPDX-License-Identifier: MIT

//! The process-wide random context.
//!
//! [`acquire_global_context`] lazily builds one shared
//! [`RandomContext`] over one shared [`SeedDepot`] and hands out clones
//! of the same `Arc` from then on. Construction always runs with the
//! entropy source forced to [`EntropySource::External`], so seeding can
//! never recurse into the global context it is building. When the
//! configured source is [`EntropySource::Internal`], a background thread
//! then tops the context up: it acquires a short-lived internally-seeded
//! context, draws 48 bytes, and feeds them in one bit at a time.
//!
//! [`release_global_context`] blocks until that background thread has
//! exited before tearing anything down, then stops the depot workers and
//! drops the context. The global can be acquired again afterwards.
use crate::context::{get_entropy_source, set_entropy_source, EntropySource, RandomContext};
use crate::depot::SeedDepot;
use crate::error::Error;

use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use zeroize::Zeroizing;

const GLOBAL_SEED_LEN: usize = 48;

struct GlobalRandom {
    depot: Arc<SeedDepot>,
    inner: Mutex<GlobalInner>,
    seed_done: AtomicBool,
}

#[derive(Default)]
struct GlobalInner {
    context: Option<Arc<RandomContext>>,
    seeder: Option<JoinHandle<()>>,
    seed_init: bool,
}

impl GlobalRandom {
    fn lock(&self) -> MutexGuard<'_, GlobalInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn global() -> &'static GlobalRandom {
    static GLOBAL: OnceLock<GlobalRandom> = OnceLock::new();
    GLOBAL.get_or_init(|| GlobalRandom {
        depot: Arc::new(SeedDepot::new()),
        inner: Mutex::new(GlobalInner::default()),
        seed_done: AtomicBool::new(false),
    })
}

/// Acquire the shared process-wide context, creating and seeding it on
/// first use. Idempotent: every call returns a clone of the same
/// handle.
///
/// ```
/// use fips_rng::context::{set_entropy_source, EntropySource};
/// use fips_rng::global;
///
/// # use fips_rng::Error;
/// #
/// # fn main() -> Result<(), Error> {
/// #
/// set_entropy_source(EntropySource::External);
/// let rng = global::acquire_global_context()?;
/// let mut random_data = [0u8; 32];
/// rng.generate(&mut random_data)?;
/// # global::release_global_context();
/// #
/// # Ok(())
/// # }
/// ```
pub fn acquire_global_context() -> Result<Arc<RandomContext>, Error> {
    let g = global();

    if g.seed_done.load(Ordering::SeqCst) {
        if let Some(context) = g.lock().context.as_ref() {
            return Ok(Arc::clone(context));
        }
    }

    let mut inner = g.lock();
    if !inner.seed_init {
        // Build the context on external entropy; the background seeder
        // is what pulls from the internal pool.
        let source = get_entropy_source();
        set_entropy_source(EntropySource::External);
        let context = RandomContext::acquire(&g.depot);
        set_entropy_source(source);
        let context = Arc::new(context?);

        inner.context = Some(Arc::clone(&context));
        inner.seed_init = true;

        if source == EntropySource::Internal {
            debug!("global random context created; starting background seeding");
            let seed_ctx = Arc::clone(&context);
            let handle = thread::Builder::new()
                .name("entropy-seeder".into())
                .spawn(move || background_seed(seed_ctx))
                .map_err(|_| Error::Resource)?;
            inner.seeder = Some(handle);
        } else {
            debug!("global random context created on external entropy");
            g.seed_done.store(true, Ordering::SeqCst);
        }
        return Ok(context);
    }

    inner
        .context
        .as_ref()
        .map(Arc::clone)
        .ok_or(Error::InvalidArgument)
}

/// Release the shared context. Waits for the background seeder to
/// finish, stops and joins the depot workers, and drops the context
/// (zeroizing its state). A later [`acquire_global_context`] starts
/// over.
pub fn release_global_context() {
    let g = global();

    // The seeder may still be running if the application is ending
    // abnormally quickly; wait for it before tearing anything down.
    let seeder = g.lock().seeder.take();
    if let Some(handle) = seeder {
        let _ = handle.join();
    }

    let mut inner = g.lock();
    g.seed_done.store(false, Ordering::SeqCst);
    inner.seed_init = false;
    inner.context = None;
    drop(inner);

    g.depot.kill_workers();
    g.depot.join_workers();
    g.depot.reset();
    debug!("global random context released");
}

/// Background seeding pass: draw fresh bytes through a throwaway
/// internally-seeded context and feed them into the global context one
/// bit at a time.
fn background_seed(context: Arc<RandomContext>) {
    let g = global();
    let result = (|| -> Result<(), Error> {
        let mut bits = Zeroizing::new([0u8; GLOBAL_SEED_LEN]);
        let source = get_entropy_source();
        set_entropy_source(EntropySource::Internal);
        let temp = RandomContext::acquire(&g.depot);
        set_entropy_source(source);
        temp?.generate(&mut bits[..])?;

        for byte in bits.iter() {
            for shift in 0..8 {
                context.add_entropy_bit(byte >> shift)?;
            }
        }
        Ok(())
    })();
    if let Err(err) = result {
        warn!("background entropy seeding failed: {}", err);
    }
    g.seed_done.store(true, Ordering::SeqCst);
    debug!("global random context seeding complete");
}

#[cfg(test)]
mod tests {
    use super::{acquire_global_context, release_global_context};
    use crate::context::{set_entropy_source, EntropySource};
    use std::sync::Arc;

    // One combined lifecycle test: the global context is process state,
    // so splitting this up would race between test threads.
    #[test]
    fn global_context_lifecycle() {
        set_entropy_source(EntropySource::External);

        let a = acquire_global_context().unwrap();
        let b = acquire_global_context().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let mut buf = [0u8; 32];
        a.generate(&mut buf).unwrap();
        assert_ne!([0u8; 32], buf);

        release_global_context();

        // re-acquirable after release, as a fresh instance
        let c = acquire_global_context().unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        c.generate(&mut buf).unwrap();
        release_global_context();
    }
}
