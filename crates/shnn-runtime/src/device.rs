//! Pointer, Stream, and Event: the host/accelerator memory and command
//! abstraction (spec.md §4.1)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, RuntimeError};

/// A device the [`crate::resource::ResourceManager`] can allocate on
///
/// The host is always `DeviceId::HOST`, fixed to sort "last" among known
/// devices (spec.md §4.2) so that device-indexed arrays can be sized
/// `accelerator_count + 1` with the host trailing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// The host device; always sorts last among known devices (spec.md §4.2)
    pub const HOST: Self = Self(u32::MAX);

    /// Build an accelerator device id
    pub const fn accelerator(index: u32) -> Self {
        Self(index)
    }

    /// Whether this id refers to the host
    pub const fn is_host(&self) -> bool {
        self.0 == u32::MAX
    }
}

/// Whether a [`Pointer`] lives on the host (optionally pinned) or on an
/// accelerator device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// Plain heap allocation
    HostPlain,
    /// Page-locked host allocation; only meaningful when an accelerator is
    /// present, otherwise falls back to `HostPlain` (spec.md §4.1)
    HostPinned,
    /// Device-resident allocation
    Device,
}

/// A typed, owning-or-borrowing pointer into host or device memory
///
/// A typed, device-resident allocation generalized to arbitrary element
/// types and to device residency per spec.md §4.1.
#[derive(Debug)]
pub struct Pointer<T> {
    data: *mut T,
    len: usize,
    unit_size: usize,
    device: DeviceId,
    kind: MemoryKind,
    owns: bool,
}

// SAFETY: Pointer<T> is a thin wrapper used exactly like a Vec<T> would be;
// it is Send/Sync when T is, because access is externally synchronized by
// the Stream/Event dependency graph (spec.md §5).
unsafe impl<T: Send> Send for Pointer<T> {}
unsafe impl<T: Sync> Sync for Pointer<T> {}

impl<T: Clone + Default> Pointer<T> {
    /// Allocate `len` zero-initialized elements on the host
    pub fn allocate_host(len: usize, pinned: bool, has_accelerator: bool) -> Result<Self> {
        let kind = if pinned && has_accelerator {
            MemoryKind::HostPinned
        } else {
            MemoryKind::HostPlain
        };
        Self::allocate(len, DeviceId::HOST, kind)
    }

    /// Allocate `len` zero-initialized elements on `device`
    pub fn allocate_device(len: usize, device: DeviceId) -> Result<Self> {
        Self::allocate(len, device, MemoryKind::Device)
    }

    fn allocate(len: usize, device: DeviceId, kind: MemoryKind) -> Result<Self> {
        let mut v: Vec<T> = Vec::new();
        v.try_reserve_exact(len)
            .map_err(|e| RuntimeError::resource_exhausted(e.to_string()))?;
        v.resize(len, T::default());
        let mut v = std::mem::ManuallyDrop::new(v);
        Ok(Self {
            data: v.as_mut_ptr(),
            len,
            unit_size: std::mem::size_of::<T>(),
            device,
            kind,
            owns: true,
        })
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this pointer holds zero elements
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size, in bytes, of one element
    pub fn unit_size(&self) -> usize {
        self.unit_size
    }

    /// The device this pointer's memory lives on
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Memory residency kind
    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    /// Borrow the whole buffer as a slice
    pub fn as_slice(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }

    /// Borrow the whole buffer as a mutable slice
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.data, self.len) }
    }

    /// A non-owning view over `range`
    pub fn slice(&self, range: std::ops::Range<usize>) -> Pointer<T> {
        assert!(range.end <= self.len);
        Pointer {
            data: unsafe { self.data.add(range.start) },
            len: range.end - range.start,
            unit_size: self.unit_size,
            device: self.device,
            kind: self.kind,
            owns: false,
        }
    }

    /// A non-owning mutable view over `range`
    pub fn slice_mut(&mut self, range: std::ops::Range<usize>) -> Pointer<T> {
        assert!(range.end <= self.len);
        Pointer {
            data: unsafe { self.data.add(range.start) },
            len: range.end - range.start,
            unit_size: self.unit_size,
            device: self.device,
            kind: self.kind,
            owns: false,
        }
    }

    /// Broadcast `value` into every element
    pub fn fill(&mut self, value: T) {
        for slot in self.as_mut_slice() {
            *slot = value.clone();
        }
    }

    /// Copy `self` into `dst`; sizes and unit sizes must match
    pub fn copy_to(&self, dst: &mut Pointer<T>) -> Result<()> {
        if self.len != dst.len || self.unit_size != dst.unit_size {
            return Err(RuntimeError::invalid_config(
                "Pointer::copy_to requires matching size and unit size",
            ));
        }
        dst.as_mut_slice().clone_from_slice(self.as_slice());
        Ok(())
    }

    /// Copy `self` to a new pointer on `device`, optionally claiming
    /// ownership of the destination allocation
    pub fn transfer(&self, device: DeviceId, claim_ownership: bool) -> Result<Pointer<T>> {
        let kind = if device == DeviceId::HOST {
            MemoryKind::HostPlain
        } else {
            MemoryKind::Device
        };
        let mut dst = Self::allocate(self.len, device, kind)?;
        dst.as_mut_slice().clone_from_slice(self.as_slice());
        dst.owns = claim_ownership;
        Ok(dst)
    }
}

impl<T> Drop for Pointer<T> {
    fn drop(&mut self) {
        if self.owns && !self.data.is_null() {
            unsafe {
                drop(Vec::from_raw_parts(self.data, self.len, self.len));
            }
            self.data = std::ptr::null_mut();
        }
    }
}

/// A monotonic barrier recorded into one [`Stream`] and waited on by others
///
/// On the host this is a counter plus condvar (spec.md §4.1); a device
/// implementation would wrap the native event handle instead.
#[derive(Debug, Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

#[derive(Debug)]
struct EventInner {
    target: AtomicU64,
    reached: AtomicU64,
    condvar: Condvar,
    lock: Mutex<()>,
}

impl Event {
    /// Create a fresh, unrecorded event
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EventInner {
                target: AtomicU64::new(1),
                reached: AtomicU64::new(0),
                condvar: Condvar::new(),
                lock: Mutex::new(()),
            }),
        }
    }

    /// Record this event: release anyone waiting on it
    pub fn record(&self) {
        let guard = self.inner.lock.lock();
        self.inner.reached.fetch_add(1, Ordering::SeqCst);
        self.inner.condvar.notify_all();
        drop(guard);
    }

    /// Block the calling thread until this event has been recorded at least
    /// once since the last reset
    pub fn wait(&self) {
        let mut guard = self.inner.lock.lock();
        let target = self.inner.target.load(Ordering::SeqCst);
        while self.inner.reached.load(Ordering::SeqCst) < target {
            self.inner.condvar.wait(&mut guard);
        }
    }

    /// Reset so the event must be recorded again before `wait` returns
    pub fn reset(&self) {
        let _guard = self.inner.lock.lock();
        self.inner.target.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

/// An ordered command queue bound to a device
///
/// A `Stream` on the host executes synchronously within its scheduling
/// thread (by design: the ResourceManager's worker pool *is* the "device"
/// for parallel host kernels); a `Stream` on an accelerator would execute
/// asynchronously on that device's native queue. Submitting work never
/// blocks; `wait_event` blocks the calling thread (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct Stream {
    device: DeviceId,
}

impl Stream {
    /// Build a stream bound to `device`
    pub fn new(device: DeviceId) -> Self {
        Self { device }
    }

    /// The device this stream is bound to
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Whether this stream dispatches on the host
    pub fn is_host(&self) -> bool {
        self.device == DeviceId::HOST
    }

    /// Block the calling thread until `event` has been recorded
    pub fn wait_event(&self, event: &Event) {
        event.wait();
    }

    /// Record `event` as completed on this stream
    pub fn record_event(&self, event: &Event) {
        event.record();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_fill_and_copy_roundtrip() {
        let mut a: Pointer<f32> = Pointer::allocate_host(4, false, false).unwrap();
        a.fill(2.5);
        let mut b: Pointer<f32> = Pointer::allocate_host(4, false, false).unwrap();
        a.copy_to(&mut b).unwrap();
        assert_eq!(b.as_slice(), &[2.5, 2.5, 2.5, 2.5]);
    }

    #[test]
    fn pointer_slice_is_a_view() {
        let mut a: Pointer<f32> = Pointer::allocate_host(4, false, false).unwrap();
        a.as_mut_slice().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        let view = a.slice(1..3);
        assert_eq!(view.as_slice(), &[2.0, 3.0]);
    }

    #[test]
    fn event_wait_blocks_until_recorded() {
        let event = Event::new();
        let event2 = event.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            event2.record();
        });
        event.wait();
        handle.join().unwrap();
    }

    #[test]
    fn pinned_without_accelerator_falls_back_to_plain() {
        let p: Pointer<f32> = Pointer::allocate_host(2, true, false).unwrap();
        assert_eq!(p.kind(), MemoryKind::HostPlain);
    }
}
