use std::{env, io::Read, process};

use flalloc::{FitPolicy, HEADER_SIZE, Heap, HeapConfig, Payload, SbrkSource, program_break};

/// Waits until the user presses ENTER, when running interactively.
/// Useful to inspect the process with `pmap` or `gdb` between steps.
fn block_until_enter_pressed(interactive: bool) {
  if !interactive {
    return;
  }
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    process::id(),
    program_break(),
  );
}

fn print_alloc(
  heap: &Heap<SbrkSource>,
  label: &str,
  payload: Payload,
) {
  println!(
    "[{}] payload offset = {:#x}, address = {:?}, capacity = {} bytes",
    label,
    payload.offset(),
    heap.source().address(payload.offset()),
    heap.payload_size(payload).unwrap_or(0),
  );
}

fn print_blocks(heap: &Heap<SbrkSource>) {
  for block in heap.blocks() {
    println!(
      "    block @ {:#06x}  size {:>6}  {}",
      block.offset,
      block.size,
      if block.free { "free" } else { "used" }
    );
  }
}

fn main() {
  env_logger::init();

  // usage: free_list [first|best|worst|next] [--interactive]
  let mut policy = FitPolicy::BUILD;
  let mut interactive = false;
  for arg in env::args().skip(1) {
    if arg == "--interactive" {
      interactive = true;
      continue;
    }
    policy = match arg.parse() {
      Ok(policy) => policy,
      Err(err) => {
        eprintln!("{err}");
        process::exit(2);
      }
    };
  }

  println!("free-list allocator demo, {policy} fit, header = {HEADER_SIZE} bytes");

  let mut heap = Heap::with_config(SbrkSource::new(), HeapConfig::with_policy(policy));

  print_program_break("start");
  block_until_enter_pressed(interactive);

  // 1) Three neighbouring allocations, each one grows the heap.
  let Some(a) = heap.allocate(32) else {
    eprintln!("out of memory");
    process::exit(1);
  };
  let b = heap.allocate(12).expect("allocate b");
  let c = heap.allocate(64).expect("allocate c");
  println!("\n[1] Allocate 32, 12 and 64 bytes");
  print_alloc(&heap, "a", a);
  print_alloc(&heap, "b", b);
  print_alloc(&heap, "c", c);
  print_blocks(&heap);
  print_program_break("after growth");
  block_until_enter_pressed(interactive);

  // 2) Release `a` and allocate something smaller: the freed block is reused.
  heap.release(Some(a));
  let d = heap.allocate(8).expect("allocate d");
  println!("\n[2] Release a, allocate 8 bytes");
  print_alloc(&heap, "d", d);
  println!("[2] d reused a's block? {}", if d == a { "yes" } else { "no" });
  print_blocks(&heap);
  block_until_enter_pressed(interactive);

  // 3) Release b and c: the neighbours coalesce into one free block.
  heap.release(Some(b));
  heap.release(Some(c));
  println!("\n[3] Release b and c");
  print_blocks(&heap);
  block_until_enter_pressed(interactive);

  // 4) Resize past the block's capacity: the contents move to a new block.
  heap.bytes_mut(d).expect("live payload")[..8].copy_from_slice(b"freelist");
  let e = heap.resize(Some(d), 256).expect("resize d");
  println!("\n[4] Resize d to 256 bytes");
  print_alloc(&heap, "e", e);
  println!(
    "[4] contents kept: {:?}",
    String::from_utf8_lossy(&heap.bytes(e).expect("live payload")[..8])
  );
  print_blocks(&heap);
  print_program_break("end");

  println!("{}", heap.stats());
}
