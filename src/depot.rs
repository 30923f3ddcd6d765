// SPDX-License-Identifier: MIT

//! The shared entropy depot and its jitter worker pool.
//!
//! The depot is a fixed 64-byte buffer refilled in batches from a scratch
//! buffer that three cooperating worker threads perturb with deliberately
//! cheap, timing-dependent transforms between jitter-derived sleeps. The
//! unpredictability claim rests on OS scheduling jitter between the
//! sleeping workers, not on the mixing transforms themselves; the
//! SHA-1-based scramble only burns CPU time in data-dependent amounts.
//!
//! Batches are coordinated through a small per-worker state machine
//! (`Init -> Start -> Working -> Done -> Idle`): no worker begins its
//! main pass until all three have reached `Start`, and the scratch is
//! folded into the depot only after all three report `Done`. Consumed
//! depot bytes are zeroized in place.
//!
//! One depot instance per process is the intended lifecycle; the global
//! context owns one and everything else borrows it.
use crate::entropy::{Entropy, OsEntropy};
use crate::error::Error;
use crate::fips186::{sha1_g, SHA1_BLOCK_SIZE, SHA1_DIGEST_SIZE};

use log::{debug, trace};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use std::vec::Vec;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of the depot proper; one batch of entropy.
pub const SEED_BUFFER_SIZE: usize = 64;
/// Perturbation passes each worker makes per batch.
pub const SEED_ROUNDS: usize = 8;

const DEPOT_LEN: usize = SEED_BUFFER_SIZE + SHA1_DIGEST_SIZE;
const NUM_SHA1_ROUNDS: usize = (SEED_BUFFER_SIZE + SHA1_DIGEST_SIZE - 1) / SHA1_DIGEST_SIZE;
const BIT_IN_MOD: usize = 8 * SEED_BUFFER_SIZE;

const BARRIER_POLL: Duration = Duration::from_millis(50);
const KILLWAIT_1: Duration = Duration::from_millis(100);
const KILLWAIT_2: Duration = Duration::from_millis(300);
const KILLWAIT_3: Duration = Duration::from_millis(700);

/// Milliseconds since the process first touched the depot subsystem.
pub(crate) fn uptime_ms() -> u32 {
    static PROCESS_START: OnceLock<Instant> = OnceLock::new();
    PROCESS_START.get_or_init(Instant::now).elapsed().as_millis() as u32
}

/// Jitter-derived sleep interval: the low bits of the elapsed time plus a
/// per-worker base. The sleep itself is the entropy source.
fn jitter_sleep(since: &Instant, base: u64) -> Duration {
    let delta = since.elapsed().as_millis() as u64;
    Duration::from_millis(((delta >> 1) & 0x3) + base)
}

fn spin_sleep(since: &Instant) -> Duration {
    let delta = since.elapsed().as_millis() as u64;
    Duration::from_millis(((delta >> 1) & 0xff) + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum WorkerState {
    Init = 0,
    Start = 1,
    Working = 2,
    Done = 3,
    Idle = 4,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Start,
            2 => WorkerState::Working,
            3 => WorkerState::Done,
            4 => WorkerState::Idle,
            _ => WorkerState::Init,
        }
    }
}

/// The buffers and indices every thread shares, always behind the
/// buffers mutex.
#[derive(Zeroize, ZeroizeOnDrop)]
struct DepotBuffers {
    depot: [u8; DEPOT_LEN],
    scratch: [u8; DEPOT_LEN],
    depot_index: usize,
    bit_in_index: usize,
    #[cfg(feature = "fips")]
    history: [u8; DEPOT_LEN],
}

impl DepotBuffers {
    /// Chained SHA-1 compressions over the scratch buffer. Burns a
    /// data-dependent amount of CPU time; not a cryptographic mixer.
    fn scramble(&mut self) {
        for i in 0..NUM_SHA1_ROUNDS {
            let mut block = [0u8; SHA1_BLOCK_SIZE];
            block.copy_from_slice(&self.scratch[..SHA1_BLOCK_SIZE]);
            let w = sha1_g(&block);
            self.scratch[i * SHA1_DIGEST_SIZE..(i + 1) * SHA1_DIGEST_SIZE].copy_from_slice(&w);
        }
    }

    /// XOR the freshly generated scratch into the depot, rescramble so
    /// the served bytes cannot be read back out of the scratch, and mark
    /// the whole batch available.
    fn fold_scratch_into_depot(&mut self) {
        for i in 0..SEED_BUFFER_SIZE {
            self.depot[i] ^= self.scratch[i];
        }
        self.scramble();
        self.depot_index = 0;
    }

    /// Quick seed mix for the threadless path: uptime, wall-clock time, a
    /// fixed per-index pattern, and OS random bytes, then a scramble.
    fn simple_seed_mix(&mut self) -> Result<(), Error> {
        let up = uptime_ms();
        for (i, byte) in up.to_le_bytes().iter().enumerate() {
            self.scratch[i] ^= *byte;
        }

        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let mut clock = [0u8; 12];
        clock[..8].copy_from_slice(&now.as_secs().to_le_bytes());
        clock[8..].copy_from_slice(&now.subsec_nanos().to_le_bytes());
        for i in 1..=clock.len() {
            self.scratch[SEED_BUFFER_SIZE - i] ^= clock[i - 1];
        }

        for i in 0..SEED_BUFFER_SIZE {
            self.scratch[(i + 4) % SEED_BUFFER_SIZE] ^= ((0x67 + i) & 0xff) as u8;
        }

        let mut noise = Zeroizing::new([0u8; 2 * SEED_BUFFER_SIZE]);
        OsEntropy::new().fill_bytes(&mut noise[..])?;
        for i in 0..2 * SEED_BUFFER_SIZE {
            self.scratch[i % SEED_BUFFER_SIZE] ^= noise[i];
        }

        self.scramble();
        Ok(())
    }

    /// Copy out as many unconsumed bytes as are available, zeroizing the
    /// served region. Returns the number of bytes copied.
    fn serve(&mut self, out: &mut [u8]) -> usize {
        let avail = SEED_BUFFER_SIZE - self.depot_index;
        let n = avail.min(out.len());
        if n > 0 {
            let at = self.depot_index;
            out[..n].copy_from_slice(&self.depot[at..at + n]);
            self.depot[at..at + n].fill(0);
            self.depot_index += n;
        }
        n
    }

    /// FIPS 140-2 continuous test on an extracted request: it must
    /// differ from the previous one. Requests longer than the history
    /// window always fail.
    #[cfg(feature = "fips")]
    fn continuous_check(&mut self, extracted: &[u8]) -> Result<(), Error> {
        if extracted.len() > self.history.len() {
            return Err(Error::RngSelfTestFailed);
        }
        if self.history[..extracted.len()] == *extracted {
            return Err(Error::RngSelfTestFailed);
        }
        self.history[..extracted.len()].copy_from_slice(extracted);
        Ok(())
    }
}

/// The shared entropy depot.
///
/// Create one per process (the global context does this for you) and
/// share it via `Arc`. [`extract_bits`](SeedDepot::extract_bits) runs the
/// worker pool; [`extract_initial_bits`](SeedDepot::extract_initial_bits)
/// is the threadless fallback used for externally-seeded deployments and
/// for bootstrapping.
///
/// Shutdown is cooperative: [`kill_workers`](SeedDepot::kill_workers)
/// raises the termination flag, [`join_workers`](SeedDepot::join_workers)
/// waits for the threads to observe it at their next checkpoint, and
/// [`reset`](SeedDepot::reset) (only after a join) makes the depot
/// re-armable.
pub struct SeedDepot {
    /// Serializes consumers; never touched by the workers.
    gate: Mutex<()>,
    buffers: Mutex<DepotBuffers>,
    worker_states: [AtomicU8; 3],
    pool_state: AtomicU8,
    should_die: AtomicBool,
    workers_launched: AtomicBool,
    rounds: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for SeedDepot {
    fn default() -> Self {
        Self::new()
    }
}

impl SeedDepot {
    /// A depot with the standard number of perturbation passes per
    /// batch.
    pub fn new() -> Self {
        Self::with_rounds(SEED_ROUNDS)
    }

    /// A depot with a custom pass count. Fewer passes produce batches
    /// faster at the cost of less accumulated jitter.
    pub fn with_rounds(rounds: usize) -> Self {
        Self {
            gate: Mutex::new(()),
            buffers: Mutex::new(DepotBuffers {
                depot: [0u8; DEPOT_LEN],
                scratch: [0u8; DEPOT_LEN],
                // empty until the first batch lands
                depot_index: SEED_BUFFER_SIZE,
                bit_in_index: 0,
                #[cfg(feature = "fips")]
                history: [0u8; DEPOT_LEN],
            }),
            worker_states: [AtomicU8::new(0), AtomicU8::new(0), AtomicU8::new(0)],
            pool_state: AtomicU8::new(0),
            should_die: AtomicBool::new(false),
            workers_launched: AtomicBool::new(false),
            rounds,
            workers: Mutex::new(Vec::new()),
        }
    }

    fn state(&self, index: usize) -> WorkerState {
        WorkerState::from_u8(self.worker_states[index].load(Ordering::SeqCst))
    }

    fn set_state(&self, index: usize, state: WorkerState) {
        self.worker_states[index].store(state as u8, Ordering::SeqCst);
    }

    fn pool(&self) -> WorkerState {
        WorkerState::from_u8(self.pool_state.load(Ordering::SeqCst))
    }

    fn set_pool(&self, state: WorkerState) {
        self.pool_state.store(state as u8, Ordering::SeqCst);
    }

    fn all_states(&self, state: WorkerState) -> bool {
        (0..3).all(|i| self.state(i) == state)
    }

    fn dying(&self) -> bool {
        self.should_die.load(Ordering::SeqCst)
    }

    fn lock_buffers(&self) -> MutexGuard<'_, DepotBuffers> {
        // The buffers hold no invariants a panicked sibling could break;
        // absorb poisoning rather than propagate it.
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Threadless extraction: one simple seed-mixing pass feeds the
    /// depot, looping with fresh mixes until the request is satisfied.
    /// Used when the entropy source is external and while bootstrapping
    /// the seeding path itself.
    pub fn extract_initial_bits(&self, out: &mut [u8]) -> Result<(), Error> {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let mut buf = self.lock_buffers();

        buf.simple_seed_mix()?;
        buf.fold_scratch_into_depot();
        buf.scramble();

        let mut filled = 0;
        while filled < out.len() {
            let n = buf.serve(&mut out[filled..]);
            filled += n;
            if n == 0 {
                buf.simple_seed_mix()?;
                buf.fold_scratch_into_depot();
            }
        }

        #[cfg(feature = "fips")]
        buf.continuous_check(out)?;

        Ok(())
    }

    /// Extract entropy produced by the worker pool, launching the
    /// workers on first use. Blocks until the request is satisfied,
    /// re-arming the pool or scramble-spinning while a batch is in
    /// flight.
    ///
    /// # Error
    ///
    /// [`Error::ThreadsTerminating`] once shutdown has been requested;
    /// [`Error::Resource`] if the worker threads cannot be spawned.
    pub fn extract_bits(self: &Arc<Self>, out: &mut [u8]) -> Result<(), Error> {
        if self.dying() {
            return Err(Error::ThreadsTerminating);
        }
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.workers_launched.swap(true, Ordering::SeqCst) {
            if let Err(err) = self.launch_workers() {
                self.workers_launched.store(false, Ordering::SeqCst);
                return Err(err);
            }
        }

        let start = Instant::now();
        let mut filled = 0;
        while filled < out.len() {
            if self.dying() {
                return Err(Error::ThreadsTerminating);
            }
            let n = self.lock_buffers().serve(&mut out[filled..]);
            filled += n;
            if filled == out.len() {
                break;
            }
            if n == 0 {
                if self.pool() == WorkerState::Idle && self.all_states(WorkerState::Idle) {
                    self.rearm();
                } else if self.pool() != WorkerState::Idle {
                    // keep consuming CPU time while the batch completes
                    self.lock_buffers().scramble();
                    thread::sleep(spin_sleep(&start));
                } else {
                    // workers are still parking themselves
                    thread::sleep(BARRIER_POLL);
                }
            }
        }

        // have the pool refill behind us if it is resting
        if self.pool() == WorkerState::Idle && self.all_states(WorkerState::Idle) {
            self.rearm();
        }

        #[cfg(feature = "fips")]
        self.lock_buffers().continuous_check(out)?;

        Ok(())
    }

    /// Fold one caller-supplied bit into the scratch buffer at a
    /// rotating bit position. A zero bit advances the position without
    /// touching the buffer.
    pub fn add_entropy_bit(&self, bit: u8) -> Result<(), Error> {
        if self.dying() {
            return Err(Error::ThreadsTerminating);
        }
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let mut buf = self.lock_buffers();
        buf.bit_in_index = (buf.bit_in_index + 1) % BIT_IN_MOD;
        if bit & 1 != 0 {
            let pos = buf.bit_in_index;
            let index = (pos >> 3) % SEED_BUFFER_SIZE;
            buf.scratch[index] ^= 1 << (pos & 7);
        }
        Ok(())
    }

    /// Raise the cooperative termination flag. Workers observe it at
    /// their next checkpoint and exit; extraction calls fail with
    /// [`Error::ThreadsTerminating`] from this point on.
    pub fn kill_workers(&self) {
        self.should_die.store(true, Ordering::SeqCst);
        debug!("entropy workers asked to terminate");
    }

    /// Wait for every worker thread to exit. Implies
    /// [`kill_workers`](SeedDepot::kill_workers).
    pub fn join_workers(&self) {
        self.should_die.store(true, Ordering::SeqCst);
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Return the depot to a launchable state. Only valid after
    /// [`join_workers`](SeedDepot::join_workers); the next extraction
    /// spawns a fresh pool.
    pub fn reset(&self) {
        self.should_die.store(false, Ordering::SeqCst);
        self.workers_launched.store(false, Ordering::SeqCst);
        for i in 0..3 {
            self.set_state(i, WorkerState::Init);
        }
        self.set_pool(WorkerState::Init);
        self.lock_buffers().depot_index = SEED_BUFFER_SIZE;
    }

    fn rearm(&self) {
        self.set_pool(WorkerState::Start);
        for i in 0..3 {
            self.set_state(i, WorkerState::Start);
        }
        trace!("entropy pool re-armed");
    }

    fn launch_workers(self: &Arc<Self>) -> Result<(), Error> {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for i in 0..3 {
            self.set_state(i, WorkerState::Init);
        }
        self.set_pool(WorkerState::Start);

        let d = Arc::clone(self);
        workers.push(
            thread::Builder::new()
                .name("entropy-1".into())
                .spawn(move || d.worker_one())
                .map_err(|_| Error::Resource)?,
        );
        let d = Arc::clone(self);
        workers.push(
            thread::Builder::new()
                .name("entropy-2".into())
                .spawn(move || d.worker_two())
                .map_err(|_| Error::Resource)?,
        );
        let d = Arc::clone(self);
        workers.push(
            thread::Builder::new()
                .name("entropy-3".into())
                .spawn(move || d.worker_three())
                .map_err(|_| Error::Resource)?,
        );
        debug!("entropy worker threads launched");
        Ok(())
    }

    /// Rendezvous at batch start: everyone must reach `Start` before any
    /// worker begins its main pass. Keeps scrambling while it waits so
    /// the wait itself consumes CPU time.
    fn wait_for_start(&self, seed_index: usize, tag: u8) -> Result<(), Error> {
        let mut index = seed_index;
        while self.pool() != WorkerState::Working {
            if self.dying() {
                return Err(Error::ThreadsTerminating);
            }
            {
                let mut buf = self.lock_buffers();
                index = (index + 1) % SEED_BUFFER_SIZE;
                buf.scratch[index] ^= tag;
                buf.scramble();
            }
            thread::sleep(BARRIER_POLL);
            if self.pool() != WorkerState::Working && self.all_states(WorkerState::Start) {
                let _buf = self.lock_buffers();
                if self.pool() != WorkerState::Working && self.all_states(WorkerState::Start) {
                    self.set_pool(WorkerState::Working);
                }
            }
        }
        Ok(())
    }

    /// Rendezvous at batch end: the worker that observes all three at
    /// `Done` folds the scratch into the depot and idles the pool.
    fn wait_for_done(&self, seed_index: usize, tag: u8) -> Result<(), Error> {
        let mut index = seed_index;
        while self.pool() != WorkerState::Idle {
            if self.dying() {
                return Err(Error::ThreadsTerminating);
            }
            {
                let mut buf = self.lock_buffers();
                index = (index + 1) % SEED_BUFFER_SIZE;
                buf.scratch[index] ^= tag;
                buf.scramble();
            }
            thread::sleep(BARRIER_POLL);
            if self.pool() != WorkerState::Idle && self.all_states(WorkerState::Done) {
                let mut buf = self.lock_buffers();
                if self.pool() != WorkerState::Idle && self.all_states(WorkerState::Done) {
                    buf.fold_scratch_into_depot();
                    self.set_pool(WorkerState::Idle);
                    trace!("entropy depot refilled");
                }
            }
        }
        Ok(())
    }

    /// Worker 1: forward sweep, XOR with a fixed mask, 13 ms-base jitter
    /// sleeps. Keeps perturbing after its passes until worker 3 is done.
    fn worker_one(self: Arc<Self>) {
        'main: loop {
            self.set_state(0, WorkerState::Start);
            if self.wait_for_start(0, 0x11).is_err() {
                break 'main;
            }
            self.set_state(0, WorkerState::Working);

            for _ in 0..self.rounds {
                let start = Instant::now();
                for j in 0..SEED_BUFFER_SIZE {
                    if self.dying() {
                        break 'main;
                    }
                    self.lock_buffers().scratch[j] ^= 0x10;
                    thread::sleep(jitter_sleep(&start, 13));
                }
            }

            self.set_state(0, WorkerState::Done);

            let start = Instant::now();
            while self.state(2) != WorkerState::Done {
                for j in 0..SEED_BUFFER_SIZE {
                    if self.dying() {
                        break 'main;
                    }
                    if self.state(2) == WorkerState::Done {
                        break;
                    }
                    self.lock_buffers().scratch[j] ^= 0x10;
                    thread::sleep(jitter_sleep(&start, 13));
                }
            }

            if self.wait_for_done(0, 0x90).is_err() {
                break 'main;
            }
            self.set_state(0, WorkerState::Idle);

            while !self.dying() && self.state(0) == WorkerState::Idle {
                thread::sleep(KILLWAIT_1);
            }
            if self.dying() {
                break 'main;
            }
        }
        self.should_die.store(true, Ordering::SeqCst);
        trace!("entropy worker 1 exiting");
    }

    /// Worker 2: backward sweep with a nonlinear byte transform, 7
    /// ms-base jitter sleeps.
    fn worker_two(self: Arc<Self>) {
        'main: loop {
            self.set_state(1, WorkerState::Start);
            if self.wait_for_start(1, 0x22).is_err() {
                break 'main;
            }
            self.set_state(1, WorkerState::Working);

            for _ in 0..self.rounds {
                let start = Instant::now();
                for j in (0..SEED_BUFFER_SIZE).rev() {
                    if self.dying() {
                        break 'main;
                    }
                    {
                        let mut buf = self.lock_buffers();
                        let x = buf.scratch[j] as u32;
                        buf.scratch[j] = (x
                            ^ (x >> 2)
                            ^ (x >> 5)
                            ^ x.wrapping_mul(13)
                            ^ x.wrapping_mul(37)
                            ^ x.wrapping_mul(57)) as u8;
                    }
                    thread::sleep(jitter_sleep(&start, 7));
                }
            }

            self.set_state(1, WorkerState::Done);

            let start = Instant::now();
            while self.state(2) != WorkerState::Done {
                for j in (0..SEED_BUFFER_SIZE).rev() {
                    if self.dying() {
                        break 'main;
                    }
                    if self.state(2) == WorkerState::Done {
                        break;
                    }
                    {
                        let mut buf = self.lock_buffers();
                        let x = buf.scratch[j] as u32;
                        buf.scratch[j] = (x
                            ^ (x >> 2)
                            ^ (x >> 5)
                            ^ x.wrapping_mul(13)
                            ^ x.wrapping_mul(37)
                            ^ x.wrapping_mul(57)) as u8;
                    }
                    thread::sleep(jitter_sleep(&start, 7));
                }
            }

            if self.wait_for_done(1, 0xa2).is_err() {
                break 'main;
            }
            self.set_state(1, WorkerState::Idle);

            while !self.dying() && self.state(1) == WorkerState::Idle {
                thread::sleep(KILLWAIT_2);
            }
            if self.dying() {
                break 'main;
            }
        }
        self.should_die.store(true, Ordering::SeqCst);
        trace!("entropy worker 2 exiting");
    }

    /// Worker 3: timed scramble bursts with 3 ms-base sleeps. Its
    /// completion gates the other two workers.
    fn worker_three(self: Arc<Self>) {
        'main: loop {
            self.set_state(2, WorkerState::Start);
            if self.wait_for_start(2, 0x33).is_err() {
                break 'main;
            }
            self.set_state(2, WorkerState::Working);

            for _ in 0..self.rounds {
                for j in (0..SEED_BUFFER_SIZE).step_by(7) {
                    if self.dying() {
                        break 'main;
                    }
                    let start = Instant::now();
                    while start.elapsed().as_millis() < ((j + 1) * 7) as u128 {
                        if self.dying() {
                            break 'main;
                        }
                        self.lock_buffers().scramble();
                    }
                    thread::sleep(jitter_sleep(&start, 3));
                }
            }

            self.set_state(2, WorkerState::Done);

            if self.wait_for_done(2, 0x3b).is_err() {
                break 'main;
            }
            self.set_state(2, WorkerState::Idle);

            while !self.dying() && self.state(2) == WorkerState::Idle {
                thread::sleep(KILLWAIT_3);
            }
            if self.dying() {
                break 'main;
            }
        }
        self.should_die.store(true, Ordering::SeqCst);
        trace!("entropy worker 3 exiting");
    }

    #[cfg(test)]
    fn depot_snapshot(&self) -> Vec<u8> {
        self.lock_buffers().depot.to_vec()
    }

    #[cfg(test)]
    fn scratch_snapshot(&self) -> Vec<u8> {
        self.lock_buffers().scratch.to_vec()
    }

    #[cfg(test)]
    fn depot_index(&self) -> usize {
        self.lock_buffers().depot_index
    }
}

impl Entropy for Arc<SeedDepot> {
    fn fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        SeedDepot::extract_bits(self, bytes)
    }
}
