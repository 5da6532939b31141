//! C allocation API over a process-wide, sbrk-backed [`Heap`].
//!
//! With the `malloc-abi` feature the four functions are exported unmangled,
//! so the cdylib can stand in for the C library allocator
//! (`LD_PRELOAD=libflalloc.so`). Without it they are ordinary Rust
//! functions.
//!
//! # Safety
//!
//! The process heap is unsynchronized: callers must not enter these
//! functions from more than one thread at a time, nor reenter them from a
//! signal handler. Pointers passed to `free` and `realloc` must come from
//! `malloc`, `calloc` or `realloc` of this module. Payloads are only 4-byte
//! aligned.

use std::{
  cell::{Cell, UnsafeCell},
  fmt,
  fmt::Write,
  ptr,
};

use libc::{c_void, size_t};

use crate::{
  block::Payload,
  error::HeapError,
  heap::Heap,
  source::SbrkSource,
};

struct ProcessHeap {
  heap: UnsafeCell<Option<Heap<SbrkSource>>>,
  report_registered: Cell<bool>,
}

// Sharing across threads is excluded by the module's contract.
unsafe impl Sync for ProcessHeap {}

static PROCESS: ProcessHeap = ProcessHeap {
  heap: UnsafeCell::new(None),
  report_registered: Cell::new(false),
};

/// The process heap, created (and the exit report registered) on first use.
///
/// The heap exists and the flag is set before `atexit` runs, so an `atexit`
/// that allocates finds a ready heap instead of building a second one.
unsafe fn process_heap() -> &'static mut Heap<SbrkSource> {
  let slot = PROCESS.heap.get();

  unsafe {
    if !PROCESS.report_registered.replace(true) {
      (*slot).get_or_insert_with(|| Heap::new(SbrkSource::new()));
      libc::atexit(print_statistics);
    }

    (*slot).get_or_insert_with(|| Heap::new(SbrkSource::new()))
  }
}

fn address_of(
  heap: &Heap<SbrkSource>,
  payload: Payload,
) -> *mut c_void {
  heap.source().address(payload.offset()) as *mut c_void
}

fn payload_of(
  heap: &Heap<SbrkSource>,
  address: *mut c_void,
) -> Result<Payload, HeapError> {
  heap
    .source()
    .offset_of(address as *const u8)
    .map(Payload::from_offset)
    .ok_or(HeapError::InvalidPointer {
      offset: address as usize,
    })
}

/// Writes a diagnostic to stderr and aborts the process.
fn fatal(err: HeapError) -> ! {
  let mut out = StackWriter::<256>::new();
  let _ = writeln!(out, "flalloc: fatal: {err}");
  out.write_to(libc::STDERR_FILENO);

  unsafe { libc::abort() }
}

extern "C" fn print_statistics() {
  let Some(heap) = (unsafe { &*PROCESS.heap.get() }).as_ref() else {
    return;
  };

  let mut out = StackWriter::<512>::new();
  let _ = write!(out, "{}", heap.stats());
  out.write_to(libc::STDOUT_FILENO);
}

#[cfg_attr(feature = "malloc-abi", unsafe(no_mangle))]
pub unsafe extern "C" fn malloc(size: size_t) -> *mut c_void {
  let heap = unsafe { process_heap() };

  match heap.allocate(size) {
    Some(payload) => address_of(heap, payload),
    None => ptr::null_mut(),
  }
}

#[cfg_attr(feature = "malloc-abi", unsafe(no_mangle))]
pub unsafe extern "C" fn free(address: *mut c_void) {
  if address.is_null() {
    return;
  }

  let heap = unsafe { process_heap() };

  if let Err(err) = payload_of(heap, address).and_then(|payload| heap.try_release(Some(payload))) {
    fatal(err);
  }
}

#[cfg_attr(feature = "malloc-abi", unsafe(no_mangle))]
pub unsafe extern "C" fn calloc(
  count: size_t,
  elem_size: size_t,
) -> *mut c_void {
  let heap = unsafe { process_heap() };

  match heap.allocate_zeroed(count, elem_size) {
    Some(payload) => address_of(heap, payload),
    None => ptr::null_mut(),
  }
}

#[cfg_attr(feature = "malloc-abi", unsafe(no_mangle))]
pub unsafe extern "C" fn realloc(
  address: *mut c_void,
  size: size_t,
) -> *mut c_void {
  let heap = unsafe { process_heap() };

  let payload = if address.is_null() {
    None
  } else {
    match payload_of(heap, address) {
      Ok(payload) => Some(payload),
      Err(err) => fatal(err),
    }
  };

  match heap.try_resize(payload, size) {
    Ok(payload) => address_of(heap, payload),
    Err(err @ (HeapError::DoubleRelease { .. } | HeapError::InvalidPointer { .. })) => fatal(err),
    Err(_) => ptr::null_mut(),
  }
}

/// Fixed-size formatting buffer; the report must not allocate from the heap
/// it describes. Output past `N` bytes is dropped.
struct StackWriter<const N: usize> {
  buf: [u8; N],
  len: usize,
}

impl<const N: usize> StackWriter<N> {
  fn new() -> Self {
    Self {
      buf: [0; N],
      len: 0,
    }
  }

  fn as_bytes(&self) -> &[u8] {
    &self.buf[..self.len]
  }

  fn write_to(
    &self,
    fd: libc::c_int,
  ) {
    let bytes = self.as_bytes();
    unsafe {
      libc::write(fd, bytes.as_ptr() as *const c_void, bytes.len());
    }
  }
}

impl<const N: usize> Write for StackWriter<N> {
  fn write_str(
    &mut self,
    s: &str,
  ) -> fmt::Result {
    let room = N - self.len;
    let take = s.len().min(room);

    self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
    self.len += take;

    if take < s.len() { Err(fmt::Error) } else { Ok(()) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{align::ALIGNMENT, stats::HeapStats};

  #[test]
  fn test_report_fits_stack_buffer() {
    let stats = HeapStats {
      mallocs: usize::MAX,
      frees: usize::MAX,
      reuses: usize::MAX,
      grows: usize::MAX,
      splits: usize::MAX,
      coalesces: usize::MAX,
      blocks: usize::MAX,
      requested: usize::MAX,
      max_heap: usize::MAX,
    };

    let mut out = StackWriter::<512>::new();

    assert!(write!(out, "{stats}").is_ok());
    assert_eq!(out.as_bytes(), stats.to_string().as_bytes());
  }

  #[test]
  fn test_stack_writer_truncates() {
    let mut out = StackWriter::<8>::new();

    assert!(write!(out, "abc").is_ok());
    assert!(write!(out, "defghij").is_err());
    assert_eq!(out.as_bytes(), b"abcdefgh");
  }

  // The only test touching the process heap: it is not safe to share
  // between test threads.
  #[test]
  fn test_c_surface_round_trip() {
    unsafe {
      // one growth up front keeps the rest of the session off sbrk
      let reserve = malloc(4096);
      assert!(!reserve.is_null());
      free(reserve);
      assert!(PROCESS.report_registered.get());

      let first = process_heap() as *mut Heap<SbrkSource>;
      let again = process_heap() as *mut Heap<SbrkSource>;
      assert_eq!(first, again);

      let small = malloc(8) as *mut u8;
      assert!(!small.is_null());
      assert_eq!(small as usize % ALIGNMENT, 0);
      for i in 0..8 {
        small.add(i).write(i as u8 + 1);
      }

      let grown = realloc(small as *mut c_void, 200) as *mut u8;
      assert!(!grown.is_null());
      assert_ne!(grown, small);
      for i in 0..8 {
        assert_eq!(grown.add(i).read(), i as u8 + 1);
      }

      let zeroed = calloc(10, 4) as *mut u8;
      assert!(!zeroed.is_null());
      assert!((0..40).all(|i| zeroed.add(i).read() == 0));

      let fresh = realloc(ptr::null_mut(), 16);
      assert!(!fresh.is_null());

      free(grown as *mut c_void);
      free(zeroed as *mut c_void);
      free(fresh);
      free(ptr::null_mut());

      assert!(calloc(usize::MAX, 2).is_null());
      assert!(malloc(0).is_null());

      let heap = &*first;
      assert_eq!(heap.stats().grows, 1);
      assert_eq!(heap.stats().mallocs, 5);
      assert_eq!(heap.stats().frees, 5);
      assert!(heap.blocks().all(|block| block.free));
    }
  }

  #[test]
  fn test_foreign_pointer_is_invalid() {
    let heap = Heap::new(SbrkSource::new());
    let mut local = 0u32;
    let address = &mut local as *mut u32 as *mut c_void;

    assert_eq!(
      payload_of(&heap, address),
      Err(HeapError::InvalidPointer {
        offset: address as usize,
      })
    );
  }
}
