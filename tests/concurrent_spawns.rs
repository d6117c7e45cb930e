// tests/concurrent_spawns.rs

mod common;
use crate::common::echo;
use childspawn_test_utils::init_tracing;

use std::thread;

use childspawn::{SpawnErrorKind, SpawnFlags, SpawnRequest, spawn, spawn_sync};

const THREADS: usize = 8;
const ROUNDS: usize = 24;
const MISSING: &str = "/nonexistent/childspawn/program";

fn one_round(thread: usize, round: usize) {
    match round % 3 {
        0 => {
            let text = format!("thread {thread} round {round}");
            let output = spawn_sync(&echo().arg(&text).build())
                .unwrap_or_else(|e| panic!("{text}: {e}"));
            assert_eq!(output.stdout, Some(text.into_bytes()));
            assert!(output.report.success());
        }
        1 => {
            let err = spawn(&SpawnRequest::new([MISSING]).flags(SpawnFlags::DO_NOT_REAP_CHILD))
                .expect_err("program does not exist");
            assert_eq!(err.kind(), SpawnErrorKind::NoEnt, "thread {thread}: {err}");
        }
        _ => {
            // Through the intermediate child.
            let err = spawn(&SpawnRequest::new([MISSING]))
                .expect_err("program does not exist");
            assert_eq!(err.kind(), SpawnErrorKind::NoEnt, "thread {thread}: {err}");
        }
    }
}

#[test]
fn spawns_from_many_threads_keep_their_reports_apart() {
    init_tracing();

    let workers: Vec<_> = (0..THREADS)
        .map(|thread| {
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    // Stagger so threads are in different phases at once.
                    one_round(thread, round + thread);
                }
            })
        })
        .collect();

    for worker in workers {
        if let Err(panic) = worker.join() {
            std::panic::resume_unwind(panic);
        }
    }
}
