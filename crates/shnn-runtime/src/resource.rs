//! ResourceManager: process-wide registry of devices, streams, the worker
//! pool, and per-device RNG state (spec.md §4.2)

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::device::{DeviceId, Event, Stream};
use crate::error::{Result, RuntimeError};

/// A small worker pool used for the "parallel" half of host [`crate::kernel::Kernel`]s
///
/// Backed by `rayon` behind the optional `parallel` feature; `install` is
/// the pool's only suspension point (spec.md §5,
/// `worker_pool.wait_for_completion`) since `rayon::ThreadPool::install`
/// blocks the caller until the closure (and anything it `join`s) finishes.
pub struct WorkerPool {
    #[cfg(feature = "parallel")]
    pool: rayon::ThreadPool,
    #[cfg(not(feature = "parallel"))]
    threads: usize,
}

impl WorkerPool {
    /// Build a pool with `threads` workers (0 = let rayon pick a default)
    pub fn new(threads: usize) -> Result<Self> {
        #[cfg(feature = "parallel")]
        {
            let mut builder = rayon::ThreadPoolBuilder::new();
            if threads > 0 {
                builder = builder.num_threads(threads);
            }
            let pool = builder
                .build()
                .map_err(|e| RuntimeError::resource_exhausted(e.to_string()))?;
            Ok(Self { pool })
        }
        #[cfg(not(feature = "parallel"))]
        {
            Ok(Self {
                threads: threads.max(1),
            })
        }
    }

    /// Number of worker threads available
    pub fn size(&self) -> usize {
        #[cfg(feature = "parallel")]
        {
            self.pool.current_num_threads()
        }
        #[cfg(not(feature = "parallel"))]
        {
            self.threads
        }
    }

    /// Run `op` on the pool, blocking until it (and anything it spawns)
    /// completes
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        #[cfg(feature = "parallel")]
        {
            self.pool.install(op)
        }
        #[cfg(not(feature = "parallel"))]
        {
            op()
        }
    }

    /// Split `items` into chunks and run `f` over each chunk concurrently,
    /// blocking until every chunk has completed
    pub fn parallel_for_each_mut<T: Send>(&self, items: &mut [T], f: impl Fn(&mut T) + Sync) {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            self.pool.install(|| {
                items.par_iter_mut().for_each(|item| f(item));
            });
        }
        #[cfg(not(feature = "parallel"))]
        {
            for item in items.iter_mut() {
                f(item);
            }
        }
    }
}

/// Process-wide invariants kept off free-function globals (spec.md §9):
/// the single-engine-at-a-time lock and the interrupt flag. Owned by the
/// [`ResourceManager`], not a `static`.
#[derive(Debug, Default)]
pub struct Runtime {
    engine_running: AtomicBool,
    interrupt_signaled: AtomicBool,
}

impl Runtime {
    fn new() -> Self {
        Self::default()
    }

    /// Claim the single-engine-at-a-time lock, or fail with `DuplicateEngine`
    pub fn try_start_engine(&self) -> Result<()> {
        if self
            .engine_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Ok(())
        } else {
            Err(RuntimeError::DuplicateEngine)
        }
    }

    /// Release the single-engine-at-a-time lock
    pub fn finish_engine(&self) {
        self.engine_running.store(false, Ordering::SeqCst);
    }

    /// Signal an interrupt; double-signalling is a no-op (spec.md §6)
    pub fn signal_interrupt(&self) {
        self.interrupt_signaled.store(true, Ordering::SeqCst);
    }

    /// Whether an interrupt has been signalled since the last `clear`
    pub fn interrupt_signaled(&self) -> bool {
        self.interrupt_signaled.load(Ordering::SeqCst)
    }

    /// Reset the interrupt flag (called once a run has finished reporting it)
    pub fn clear_interrupt(&self) {
        self.interrupt_signaled.store(false, Ordering::SeqCst);
    }
}

/// Process-wide registry of devices, default streams, and the worker pool
/// (spec.md §4.2)
pub struct ResourceManager {
    devices: Vec<DeviceId>,
    streams: HashMap<DeviceId, Stream>,
    worker_pool: WorkerPool,
    rng_pools: HashMap<DeviceId, Mutex<StdRng>>,
    allocated_bytes: HashMap<DeviceId, AtomicUsize>,
    peak_bytes: HashMap<DeviceId, AtomicUsize>,
    runtime: Arc<Runtime>,
}

impl ResourceManager {
    /// Discover `accelerator_count` accelerator devices plus the host
    /// (host id always sorts last, spec.md §4.2), size the worker pool to
    /// `worker_threads` (0 = default), and seed per-device RNG from `seed`.
    pub fn new(accelerator_count: u32, worker_threads: usize, seed: u64) -> Result<Self> {
        let mut devices: Vec<DeviceId> = (0..accelerator_count)
            .map(DeviceId::accelerator)
            .collect();
        devices.push(DeviceId::HOST);

        let mut streams = HashMap::new();
        let mut rng_pools = HashMap::new();
        let mut allocated_bytes = HashMap::new();
        let mut peak_bytes = HashMap::new();
        for (i, &device) in devices.iter().enumerate() {
            streams.insert(device, Stream::new(device));
            rng_pools.insert(device, Mutex::new(StdRng::seed_from_u64(seed.wrapping_add(i as u64))));
            allocated_bytes.insert(device, AtomicUsize::new(0));
            peak_bytes.insert(device, AtomicUsize::new(0));
        }

        Ok(Self {
            devices,
            streams,
            worker_pool: WorkerPool::new(worker_threads)?,
            rng_pools,
            allocated_bytes,
            peak_bytes,
            runtime: Arc::new(Runtime::new()),
        })
    }

    /// All known devices, accelerators first, host last
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    /// The host device id
    pub fn host(&self) -> DeviceId {
        DeviceId::HOST
    }

    /// Whether any non-host device is present
    pub fn has_accelerator(&self) -> bool {
        self.devices.len() > 1
    }

    fn validate_device(&self, device: DeviceId) -> Result<()> {
        if self.streams.contains_key(&device) {
            Ok(())
        } else {
            Err(RuntimeError::InvalidDevice {
                device_id: device.0,
                device_count: self.devices.len() as u32,
            })
        }
    }

    /// The default stream bound to `device`
    pub fn stream(&self, device: DeviceId) -> Result<&Stream> {
        self.validate_device(device)?;
        Ok(&self.streams[&device])
    }

    /// Create a fresh, unrecorded event
    pub fn create_event(&self) -> Event {
        Event::new()
    }

    /// The shared worker pool used for parallel host kernels
    pub fn worker_pool(&self) -> &WorkerPool {
        &self.worker_pool
    }

    /// This device's RNG, guarded by a mutex for thread-safe concurrent use
    pub fn rng(&self, device: DeviceId) -> Result<&Mutex<StdRng>> {
        self.validate_device(device)?;
        Ok(&self.rng_pools[&device])
    }

    /// Record `bytes` as allocated on `device`, updating the peak counter
    pub fn track_alloc(&self, device: DeviceId, bytes: usize) {
        if let Some(counter) = self.allocated_bytes.get(&device) {
            let now = counter.fetch_add(bytes, Ordering::SeqCst) + bytes;
            if let Some(peak) = self.peak_bytes.get(&device) {
                peak.fetch_max(now, Ordering::SeqCst);
            }
        }
    }

    /// Record `bytes` as freed on `device`
    pub fn track_free(&self, device: DeviceId, bytes: usize) {
        if let Some(counter) = self.allocated_bytes.get(&device) {
            counter.fetch_sub(bytes, Ordering::SeqCst);
        }
    }

    /// Peak bytes ever allocated on `device`, for the engine's memory report
    pub fn peak_bytes(&self, device: DeviceId) -> usize {
        self.peak_bytes
            .get(&device)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// The process-wide invariants (single-engine lock, interrupt flag)
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// A cheap, thread-safe handle to the process-wide invariants, usable to
    /// signal an interrupt from outside the thread running [`crate::engine::Engine::run`]
    /// (spec.md §6, the interrupt path)
    pub fn runtime_handle(&self) -> Arc<Runtime> {
        Arc::clone(&self.runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_always_present_and_sorts_last() {
        let rm = ResourceManager::new(2, 0, 1).unwrap();
        assert_eq!(rm.devices().len(), 3);
        assert_eq!(*rm.devices().last().unwrap(), DeviceId::HOST);
    }

    #[test]
    fn invalid_device_id_is_rejected() {
        let rm = ResourceManager::new(0, 0, 1).unwrap();
        let err = rm.stream(DeviceId::accelerator(5)).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidDevice { .. }));
    }

    #[test]
    fn duplicate_engine_start_is_rejected() {
        let rm = ResourceManager::new(0, 0, 1).unwrap();
        rm.runtime().try_start_engine().unwrap();
        assert!(matches!(
            rm.runtime().try_start_engine(),
            Err(RuntimeError::DuplicateEngine)
        ));
        rm.runtime().finish_engine();
        assert!(rm.runtime().try_start_engine().is_ok());
    }

    #[test]
    fn double_interrupt_signal_is_a_no_op() {
        let rm = ResourceManager::new(0, 0, 1).unwrap();
        rm.runtime().signal_interrupt();
        rm.runtime().signal_interrupt();
        assert!(rm.runtime().interrupt_signaled());
    }
}
