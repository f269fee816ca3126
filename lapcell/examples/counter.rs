//! Simple example demonstrating the AtomicCell API: many threads bump a
//! shared counter that is far wider than a machine word.

use lapcell::AtomicCell;
use std::sync::Arc;
use std::thread;

const THREADS: u32 = 8;
const ITERATIONS: u32 = 100_000;

fn main() {
    // A counter plus its update history tail — deliberately multi-word.
    let cell: Arc<AtomicCell<(u64, [u32; 8]), 16>> = Arc::new(AtomicCell::new((0, [0; 8])));

    println!("starting {THREADS} threads x {ITERATIONS} updates");

    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let cell = cell.clone();
            thread::spawn(move || {
                for _ in 0..ITERATIONS {
                    cell.update(|(total, per_thread)| {
                        *total += 1;
                        per_thread[tid as usize] += 1;
                        true
                    });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let (total, per_thread) = cell.read(|v| *v);
    println!("total = {total}, per thread = {per_thread:?}");
    assert_eq!(total, u64::from(THREADS * ITERATIONS));
    println!("conserved: {} == {THREADS} x {ITERATIONS}", total);
}
