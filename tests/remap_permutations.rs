// tests/remap_permutations.rs

mod common;
use crate::common::echo;
use childspawn_test_utils::{fixtures, init_tracing};

use std::os::fd::AsRawFd;

use childspawn::{Stdio, spawn};
use proptest::prelude::*;

// A permutation of 0..k for k pipes.
fn permutation_strategy() -> impl Strategy<Value = Vec<usize>> {
    (2..6usize).prop_flat_map(|k| Just((0..k).collect::<Vec<_>>()).prop_shuffle())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Remap every pipe's write end onto another pipe's write-end number.
    /// Whatever the cycle structure, each pipe must receive exactly what the
    /// child wrote to the number it was moved to.
    #[test]
    fn permuted_write_ends_reach_the_right_pipe(perm in permutation_strategy()) {
        init_tracing();
        let pipes: Vec<_> = perm.iter().map(|_| fixtures::cloexec_pipe()).collect();
        let writes: Vec<i32> = pipes.iter().map(|(_, w)| w.as_raw_fd()).collect();

        let mut builder = echo().stdout(Stdio::Null);
        for (i, &p) in perm.iter().enumerate() {
            let target = writes[p];
            builder = builder
                .remap(writes[i], target)
                .arg(&format!("--fd={target}"))
                .arg(&i.to_string());
        }

        let child = spawn(&builder.build())?;
        let reads: Vec<_> = pipes.into_iter().map(|(r, _)| r).collect();

        for (i, read) in reads.into_iter().enumerate() {
            let out = fixtures::read_all(read);
            prop_assert_eq!(out, i.to_string().into_bytes());
        }
        prop_assert!(child.reap()?.success());
    }
}
