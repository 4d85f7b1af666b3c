//! Kernel: a polymorphic operation carrying both a host-serial and a
//! device-parallel implementation (spec.md §4.3)

use crate::device::Stream;
use crate::resource::WorkerPool;

/// A kernel's serial (single-thread) implementation
pub type SerialFn<A> = fn(&mut A);
/// A kernel's data-parallel implementation, given the host worker pool
pub type ParallelFn<A> = fn(&mut A, &WorkerPool);

/// A value carrying two function pointers over the same argument tuple
/// `A` — one serial, one parallel — dispatched according to the
/// [`Stream`] it is scheduled on (spec.md §4.3).
///
/// Unlike a virtual method, both implementations are plain function
/// values: spec.md §9 calls this out explicitly ("this avoids the need
/// for runtime polymorphism in hot paths"). A pure host build simply
/// never constructs the device half; there is no device function pointer
/// here because this codebase has no accelerator backend (spec.md §1
/// treats concrete device execution as out of scope), but the host/
/// parallel split itself is real and exercised by every kernel below.
pub struct Kernel<A> {
    name: &'static str,
    serial: SerialFn<A>,
    parallel: Option<ParallelFn<A>>,
    /// Host-only kernels (e.g. cross-device pointer transfer) always run
    /// serially regardless of the stream's device (spec.md §4.3).
    host_only: bool,
}

impl<A> Kernel<A> {
    /// A kernel with both a serial and a parallel implementation
    pub fn new(name: &'static str, serial: SerialFn<A>, parallel: ParallelFn<A>) -> Self {
        Self {
            name,
            serial,
            parallel: Some(parallel),
            host_only: false,
        }
    }

    /// A kernel with only a serial implementation, forced to run serially
    pub fn host_only(name: &'static str, serial: SerialFn<A>) -> Self {
        Self {
            name,
            serial,
            parallel: None,
            host_only: true,
        }
    }

    /// The distinguished null kernel: panics if ever run or scheduled
    pub fn null(name: &'static str) -> Self {
        fn panic_serial<A>(_: &mut A) {
            panic!("null kernel scheduled");
        }
        Self {
            name,
            serial: panic_serial::<A>,
            parallel: None,
            host_only: true,
        }
    }

    /// This kernel's name, for logging
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Execute immediately on the calling thread, choosing the parallel
    /// path when the pool has more than one worker and this kernel isn't
    /// host-only-serial.
    pub fn run(&self, args: &mut A, pool: &WorkerPool) {
        if !self.host_only {
            if let Some(parallel) = self.parallel {
                if pool.size() > 1 {
                    parallel(args, pool);
                    return;
                }
            }
        }
        (self.serial)(args)
    }

    /// Submit this kernel's work onto `stream`
    ///
    /// Submitting never blocks the caller (spec.md §4.1): on the host the
    /// "stream" dispatches into the worker pool synchronously from the
    /// calling thread (there is no true host async queue), and since this
    /// build has no accelerator backend every stream is, in practice, a
    /// host stream.
    pub fn schedule(&self, args: &mut A, stream: &Stream, pool: &WorkerPool) {
        debug_assert!(stream.is_host(), "device streams are not implemented in this build");
        self.run(args, pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: u32,
    }

    fn bump_serial(a: &mut Counter) {
        a.value += 1;
    }

    fn bump_parallel(a: &mut Counter, _pool: &WorkerPool) {
        a.value += 2;
    }

    #[test]
    fn single_threaded_pool_uses_serial_path() {
        let pool = WorkerPool::new(1).unwrap();
        let kernel = Kernel::new("bump", bump_serial, bump_parallel);
        let mut counter = Counter { value: 0 };
        kernel.run(&mut counter, &pool);
        assert_eq!(counter.value, 1);
    }

    #[test]
    #[should_panic(expected = "null kernel scheduled")]
    fn null_kernel_panics() {
        let pool = WorkerPool::new(1).unwrap();
        let kernel: Kernel<Counter> = Kernel::null("nothing");
        let mut counter = Counter { value: 0 };
        kernel.run(&mut counter, &pool);
    }

    #[test]
    fn host_only_kernel_never_takes_parallel_path() {
        let pool = WorkerPool::new(4).unwrap();
        let kernel = Kernel::host_only("bump", bump_serial);
        let mut counter = Counter { value: 0 };
        kernel.run(&mut counter, &pool);
        assert_eq!(counter.value, 1);
    }
}
