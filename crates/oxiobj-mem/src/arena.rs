//! Thread-safe bump arena for process-lifetime runtime metadata.
//!
//! Class runtime records and their composed dispatch tables are created once
//! per class and are never freed while the process runs. They are allocated
//! here so that their addresses are stable and allocation from many threads
//! initializing different classes at once never takes a lock on the fast path.
//!
//! - [`GlobalArena`]: the arena itself, a list of chunks plus a current chunk
//! - `Chunk`: a fixed block of memory with an atomic bump pointer
//! - [`global_arena`]: the shared instance used by the runtime
//!
//! # Example
//!
//! ```
//! use oxiobj_mem::arena::GlobalArena;
//!
//! let arena = GlobalArena::new(16 * 1024);
//!
//! let record = arena.alloc(42u64);
//! assert_eq!(*record, 42);
//!
//! // Dispatch tables start out zero-filled.
//! let table = arena.alloc_zeroed_bytes(64, 8);
//! let words = unsafe { std::slice::from_raw_parts(table.as_ptr(), 64) };
//! assert!(words.iter().all(|b| *b == 0));
//! ```

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

/// Error type for arena allocation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArenaAllocError;

impl std::fmt::Display for ArenaAllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Arena allocation failed: out of memory")
    }
}

impl std::error::Error for ArenaAllocError {}

/// Alignment of every chunk and the minimum alignment of every allocation.
const DEFAULT_ALIGNMENT: usize = 16;

/// Smallest chunk the arena will request from the system allocator.
const MIN_CHUNK_SIZE: usize = 4096;

/// Largest chunk size reached by doubling.
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Arena allocation statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    /// Bytes handed out across all chunks.
    pub total_allocated: usize,
    /// Number of chunks owned by the arena.
    pub chunk_count: usize,
    /// Combined capacity of all chunks.
    pub total_capacity: usize,
}

/// A fixed-size memory block with an atomic bump pointer.
///
/// Multiple threads may allocate from the same chunk; the bump pointer is
/// advanced with a compare-and-swap loop, so each successful allocation owns a
/// disjoint, aligned range.
struct Chunk {
    start: NonNull<u8>,
    ptr: AtomicPtr<u8>,
    end: NonNull<u8>,
    capacity: usize,
}

impl Chunk {
    fn new(size: usize) -> Result<NonNull<Self>, ArenaAllocError> {
        let size = size.max(MIN_CHUNK_SIZE);
        let layout = Layout::from_size_align(size, DEFAULT_ALIGNMENT)
            .map_err(|_| ArenaAllocError)?;

        // SAFETY: layout has a non-zero size.
        let start = unsafe { alloc::alloc(layout) };
        let start = NonNull::new(start).ok_or(ArenaAllocError)?;

        // SAFETY: one past the end of the allocation is a valid pointer for
        // comparisons and is never null.
        let end = unsafe { NonNull::new_unchecked(start.as_ptr().add(size)) };

        let chunk = Box::new(Chunk {
            start,
            ptr: AtomicPtr::new(start.as_ptr()),
            end,
            capacity: size,
        });

        Ok(NonNull::from(Box::leak(chunk)))
    }

    /// Carves `size` bytes aligned to `align` out of this chunk.
    #[must_use]
    #[inline]
    fn try_alloc(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let size_aligned = size.checked_add(align - 1)? & !(align - 1);

        loop {
            let current = self.ptr.load(Ordering::Acquire);
            let aligned_start = current.addr().checked_add(align - 1)? & !(align - 1);
            let new_addr = aligned_start.checked_add(size_aligned)?;

            if new_addr > self.end.addr().get() {
                return None;
            }

            let new_ptr = current.with_addr(new_addr);
            if self
                .ptr
                .compare_exchange_weak(
                    current,
                    new_ptr,
                    Ordering::Release,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                // SAFETY: aligned_start lies inside [start, end) and is
                // non-zero because the chunk itself is non-null.
                return Some(unsafe {
                    NonNull::new_unchecked(current.with_addr(aligned_start))
                });
            }
        }
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // SAFETY: the same layout was used for the allocation in `Chunk::new`.
        unsafe {
            let layout =
                Layout::from_size_align_unchecked(self.capacity, DEFAULT_ALIGNMENT);
            alloc::dealloc(self.start.as_ptr(), layout);
        }
    }
}

/// Thread-safe arena whose allocations live as long as the arena.
///
/// The runtime uses a single instance (see [`global_arena`]) that is never
/// dropped, so pointers into it are effectively `'static`. There is no reset
/// and no per-allocation free.
pub struct GlobalArena {
    chunks: Mutex<Vec<NonNull<Chunk>>>,
    current_chunk: AtomicPtr<Chunk>,
    chunk_size: usize,
    total_allocated: AtomicUsize,
}

// SAFETY: chunks are only mutated through atomics (bump pointer) or under the
// `chunks` mutex; allocations never overlap.
unsafe impl Send for GlobalArena {}
unsafe impl Sync for GlobalArena {}

impl GlobalArena {
    /// Creates an arena whose first chunk holds `chunk_size` bytes (rounded
    /// up to a power of two, at least 4 KiB).
    ///
    /// # Panics
    ///
    /// Panics if the first chunk cannot be allocated.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        let size = chunk_size.max(MIN_CHUNK_SIZE).next_power_of_two();
        let first = Chunk::new(size).expect("Failed to allocate initial arena chunk");

        GlobalArena {
            chunks: Mutex::new(vec![first]),
            current_chunk: AtomicPtr::new(first.as_ptr()),
            chunk_size: size,
            total_allocated: AtomicUsize::new(0),
        }
    }

    /// Moves `value` into the arena and returns a reference that lives as
    /// long as the arena.
    ///
    /// # Panics
    ///
    /// Panics if a new chunk is needed and the system allocator fails.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc<T>(&self, value: T) -> &mut T {
        let ptr = self
            .raw_alloc(std::mem::size_of::<T>(), std::mem::align_of::<T>())
            .cast::<T>();

        // SAFETY: ptr is freshly carved, suitably aligned and sized for T, and
        // not shared with any other allocation.
        unsafe {
            ptr.as_ptr().write(value);
            &mut *ptr.as_ptr()
        }
    }

    /// Allocates `size` zero-filled bytes aligned to at least `align`.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two, or if a new chunk is needed
    /// and the system allocator fails.
    pub fn alloc_zeroed_bytes(&self, size: usize, align: usize) -> NonNull<u8> {
        assert!(align.is_power_of_two(), "alignment {align} is not a power of two");
        let ptr = self.raw_alloc(size, align);

        // SAFETY: the range [ptr, ptr + size) belongs exclusively to us.
        unsafe { ptr.as_ptr().write_bytes(0, size) };
        ptr
    }

    fn raw_alloc(&self, size: usize, align: usize) -> NonNull<u8> {
        let align = align.max(DEFAULT_ALIGNMENT);
        // Zero-sized requests still get a unique address.
        let size = size.max(1);

        loop {
            let current = self.current_chunk.load(Ordering::Acquire);

            // SAFETY: current_chunk always points at a live chunk owned by
            // `self.chunks`.
            let chunk = unsafe { &*current };
            if let Some(ptr) = chunk.try_alloc(size, align) {
                self.total_allocated.fetch_add(size, Ordering::Relaxed);
                return ptr;
            }

            self.allocate_new_chunk(current, size + align);
        }
    }

    #[cold]
    fn allocate_new_chunk(&self, exhausted: *mut Chunk, min_size: usize) {
        let mut chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);

        // Another thread may have already replaced the exhausted chunk.
        if self.current_chunk.load(Ordering::Acquire) != exhausted {
            return;
        }

        let grown = (self.chunk_size << chunks.len().min(8)).min(MAX_CHUNK_SIZE);
        let new_chunk = Chunk::new(grown.max(min_size.next_power_of_two()))
            .expect("Failed to allocate arena chunk");

        chunks.push(new_chunk);
        self.current_chunk.store(new_chunk.as_ptr(), Ordering::Release);
    }

    /// Returns allocation statistics.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: every pointer in `chunks` is a live chunk.
        let total_capacity = chunks.iter().map(|c| unsafe { c.as_ref().capacity }).sum();

        ArenaStats {
            total_allocated: self.total_allocated.load(Ordering::Relaxed),
            chunk_count: chunks.len(),
            total_capacity,
        }
    }
}

impl Drop for GlobalArena {
    fn drop(&mut self) {
        let chunks = self.chunks.get_mut().unwrap_or_else(|e| e.into_inner());
        for chunk in chunks.drain(..) {
            // SAFETY: each chunk was leaked from a Box in `Chunk::new` and is
            // released exactly once here.
            drop(unsafe { Box::from_raw(chunk.as_ptr()) });
        }
    }
}

/// The arena shared by the whole runtime, created on first use.
///
/// ```
/// use oxiobj_mem::arena::global_arena;
///
/// let a = global_arena();
/// let b = global_arena();
/// assert!(std::ptr::eq(a, b));
/// ```
#[must_use]
pub fn global_arena() -> &'static GlobalArena {
    static ARENA: OnceLock<GlobalArena> = OnceLock::new();
    ARENA.get_or_init(|| GlobalArena::new(16 * 1024))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_alloc_values() {
        let arena = GlobalArena::new(4096);

        let a = arena.alloc(1u32);
        let b = arena.alloc(2u64);
        let c = arena.alloc([3u8; 5]);

        assert_eq!(*a, 1);
        assert_eq!(*b, 2);
        assert_eq!(*c, [3; 5]);
    }

    #[test]
    fn test_alloc_respects_alignment() {
        #[repr(align(64))]
        struct Wide(#[allow(dead_code)] u8);

        let arena = GlobalArena::new(4096);
        let _pad = arena.alloc(1u8);
        let wide: *const Wide = arena.alloc(Wide(7));

        assert_eq!(wide as usize % 64, 0);
    }

    #[test]
    fn test_zeroed_bytes_are_zero() {
        let arena = GlobalArena::new(4096);

        // Dirty the chunk first so zeroing is observable.
        for _ in 0..32 {
            arena.alloc(u64::MAX);
        }

        let table = arena.alloc_zeroed_bytes(256, 8);
        // SAFETY: 256 bytes were just allocated.
        let bytes = unsafe { std::slice::from_raw_parts(table.as_ptr(), 256) };
        assert!(bytes.iter().all(|b| *b == 0));
        assert_eq!(table.as_ptr() as usize % 8, 0);
    }

    #[test]
    fn test_grows_past_first_chunk() {
        let arena = GlobalArena::new(4096);

        for i in 0..2048u64 {
            assert_eq!(*arena.alloc(i), i);
        }

        let stats = arena.stats();
        assert!(stats.chunk_count > 1);
        assert!(stats.total_capacity >= stats.total_allocated);
    }

    #[test]
    fn test_oversized_request_gets_own_chunk() {
        let arena = GlobalArena::new(4096);
        let big = arena.alloc_zeroed_bytes(64 * 1024, 16);

        // SAFETY: the whole range was just allocated.
        unsafe { big.as_ptr().add(64 * 1024 - 1).write(1) };
        assert!(arena.stats().total_capacity >= 64 * 1024);
    }

    #[test]
    fn test_concurrent_allocations_are_disjoint() {
        let arena = Arc::new(GlobalArena::new(4096));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let arena = Arc::clone(&arena);
                thread::spawn(move || {
                    (0..500u64)
                        .map(|i| arena.alloc(t * 1000 + i) as *mut u64 as usize)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut addrs: Vec<usize> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = addrs.len();
        addrs.sort_unstable();
        addrs.dedup();

        assert_eq!(addrs.len(), total);
    }

    #[test]
    fn test_global_arena_singleton() {
        assert!(std::ptr::eq(global_arena(), global_arena()));
    }
}
