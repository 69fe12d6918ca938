//! Barrier worker pool driven the way the BGZF producer drives it: ordered
//! batches of independent jobs, with results collected in submission order.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use linestream_thread::{BlockSync, CondvarSync, EventSync, ThreadGroup, WorkerIndex, num_cpu};
use parking_lot::Mutex;

/// One batch of jobs; worker `tidx` handles slots `tidx, tidx + n, ...`.
struct Batch {
    inputs: Mutex<Vec<u64>>,
    outputs: Vec<Mutex<Option<u64>>>,
    blocks_run: AtomicUsize,
}

impl Batch {
    fn new(slots: usize) -> Self {
        Self {
            inputs: Mutex::new(Vec::new()),
            outputs: (0..slots).map(|_| Mutex::new(None)).collect(),
            blocks_run: AtomicUsize::new(0),
        }
    }
}

fn square_slots(index: WorkerIndex, batch: &Batch) {
    let inputs = batch.inputs.lock().clone();
    for slot in (index.tidx..inputs.len()).step_by(index.thread_ct) {
        *batch.outputs[slot].lock() = Some(inputs[slot] * inputs[slot]);
    }
    if index.tidx == 0 {
        batch.blocks_run.fetch_add(1, Ordering::SeqCst);
    }
}

fn run_ordered<S: BlockSync>(thread_ct: usize, values: &[u64], batch_len: usize) -> Vec<u64> {
    let batch = Arc::new(Batch::new(batch_len));
    let mut group: ThreadGroup<Batch, S> = ThreadGroup::new(thread_ct).unwrap();
    group.set_work(square_slots, Arc::clone(&batch));

    let mut results = Vec::with_capacity(values.len());
    let chunks: Vec<&[u64]> = values.chunks(batch_len).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        *batch.inputs.lock() = chunk.to_vec();
        if i + 1 == chunks.len() {
            group.declare_last_block();
        }
        group.spawn().unwrap();
        group.join().unwrap();
        for slot in &batch.outputs[..chunk.len()] {
            results.push(slot.lock().take().unwrap());
        }
    }
    assert!(!group.is_active());
    assert_eq!(batch.blocks_run.load(Ordering::SeqCst), chunks.len());
    results
}

#[test]
fn test_ordered_results_across_batches() {
    let values: Vec<u64> = (0..1_000).collect();
    let expected: Vec<u64> = values.iter().map(|v| v * v).collect();
    for threads in [1, 3, num_cpu().min(8)] {
        assert_eq!(run_ordered::<CondvarSync>(threads, &values, 64), expected);
        assert_eq!(run_ordered::<EventSync>(threads, &values, 64), expected);
    }
}

#[test]
fn test_zero_threads_is_clipped_to_one() {
    let values = [2, 3, 4];
    assert_eq!(run_ordered::<CondvarSync>(0, &values, 2), vec![4, 9, 16]);
}

#[test]
fn test_terminate_then_reuse_for_another_file() {
    let batch = Arc::new(Batch::new(4));
    let mut group: ThreadGroup<Batch> = ThreadGroup::new(2).unwrap();
    group.set_work(square_slots, Arc::clone(&batch));

    *batch.inputs.lock() = vec![1, 2, 3, 4];
    group.spawn().unwrap();
    group.join().unwrap();
    // Abandon the stream: workers are parked and must exit promptly.
    group.terminate().unwrap();
    assert!(!group.is_active());

    // Same group, new work.
    let next = Arc::new(Batch::new(2));
    group.set_work(square_slots, Arc::clone(&next));
    *next.inputs.lock() = vec![5, 6];
    group.declare_last_block();
    group.spawn().unwrap();
    group.join().unwrap();
    assert_eq!(*next.outputs[0].lock(), Some(25));
    assert_eq!(*next.outputs[1].lock(), Some(36));
    group.cleanup().unwrap();
    group.cleanup().unwrap();
}
