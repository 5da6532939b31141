use flalloc::{ArenaSource, FitPolicy, HEADER_SIZE, Heap, HeapConfig, HeapSource, Payload};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
  Allocate(usize),
  Zeroed(usize, usize),
  Release(usize),
  Resize(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    3 => (0usize..300).prop_map(Op::Allocate),
    1 => (0usize..16, 0usize..16).prop_map(|(count, size)| Op::Zeroed(count, size)),
    3 => any::<usize>().prop_map(Op::Release),
    2 => (any::<usize>(), 0usize..400).prop_map(|(i, size)| Op::Resize(i, size)),
  ]
}

fn policy() -> impl Strategy<Value = FitPolicy> {
  prop::sample::select(FitPolicy::ALL.to_vec())
}

/// A live allocation and the byte pattern written over its requested bytes.
struct Live {
  payload: Payload,
  requested: usize,
  fill: u8,
}

fn check_layout(heap: &Heap<ArenaSource>) {
  let blocks: Vec<_> = heap.blocks().collect();

  assert_eq!(blocks.len(), heap.stats().blocks);

  let mut end = 0;
  for pair in blocks.windows(2) {
    assert!(!(pair[0].free && pair[1].free), "adjacent free blocks: {pair:?}");
  }
  for block in &blocks {
    assert_eq!(block.offset, end, "blocks must tile the region");
    assert_eq!(block.size % 4, 0);
    end = block.offset + HEADER_SIZE + block.size;
  }
  assert_eq!(end, heap.source().len());
  assert_eq!(heap.stats().max_heap, heap.source().len());
}

fn check_live(
  heap: &Heap<ArenaSource>,
  live: &[Live],
) {
  for entry in live {
    let bytes = heap.bytes(entry.payload).unwrap();

    assert_eq!(entry.payload.offset() % 4, 0);
    assert!(bytes.len() >= entry.requested);
    assert!(
      bytes[..entry.requested].iter().all(|&b| b == entry.fill),
      "payload {:?} was clobbered",
      entry.payload
    );
  }
}

fn write_fill(
  heap: &mut Heap<ArenaSource>,
  entry: &Live,
) {
  heap.bytes_mut(entry.payload).unwrap()[..entry.requested].fill(entry.fill);
}

proptest! {
  #[test]
  fn random_sessions_keep_the_heap_consistent(
    policy in policy(),
    ops in prop::collection::vec(op(), 1..120),
  ) {
    let mut heap = Heap::with_config(ArenaSource::default(), HeapConfig::with_policy(policy));
    let mut live: Vec<Live> = Vec::new();
    let mut next_fill = 1u8;

    for op in ops {
      match op {
        Op::Allocate(size) => match heap.allocate(size) {
          Some(payload) => {
            let entry = Live { payload, requested: size, fill: next_fill };
            write_fill(&mut heap, &entry);
            live.push(entry);
          }
          None => prop_assert_eq!(size, 0),
        },
        Op::Zeroed(count, elem_size) => match heap.allocate_zeroed(count, elem_size) {
          Some(payload) => {
            prop_assert!(heap.bytes(payload).unwrap().iter().all(|&b| b == 0));
            let entry = Live { payload, requested: count * elem_size, fill: next_fill };
            write_fill(&mut heap, &entry);
            live.push(entry);
          }
          None => prop_assert_eq!(count * elem_size, 0),
        },
        Op::Release(i) if !live.is_empty() => {
          let entry = live.swap_remove(i % live.len());
          heap.release(Some(entry.payload));
        }
        Op::Resize(i, size) if !live.is_empty() => {
          let i = i % live.len();
          let old = &live[i];

          match heap.resize(Some(old.payload), size) {
            Some(payload) => {
              let kept = old.requested.min(size);
              prop_assert!(heap.bytes(payload).unwrap()[..kept].iter().all(|&b| b == old.fill));

              live[i] = Live { payload, requested: size, fill: next_fill };
              write_fill(&mut heap, &live[i]);
            }
            None => prop_assert!(false, "unbounded arena refused a resize"),
          }
        }
        _ => {}
      }

      next_fill = next_fill.wrapping_add(1).max(1);
      check_layout(&heap);
      check_live(&heap, &live);
    }

    prop_assert_eq!(
      heap.blocks().filter(|block| !block.free).count(),
      live.len()
    );
  }

  #[test]
  fn allocations_never_exceed_a_bounded_arena(
    sizes in prop::collection::vec(1usize..200, 1..60),
  ) {
    let limit = 1024;
    let mut heap = Heap::new(ArenaSource::new(limit));

    for size in sizes {
      if let Some(payload) = heap.allocate(size) {
        prop_assert!(heap.payload_size(payload).unwrap() >= size);
      }
      prop_assert!(heap.source().len() <= limit);
      check_layout(&heap);
    }
  }
}
