use std::sync::Arc;

use scan::{
    Backend, DataProvider, RunConfig, ScanErr, run_reduce, run_scan,
    partition::PartitionTable,
    provider::{Uniform, from_fn, materialize},
    verify::{sequential_scan, verify_scan, verify_sum},
};

const BACKENDS: [Backend; 2] = [Backend::MessagePassing, Backend::SharedMemory];

fn one_to_n() -> Arc<dyn DataProvider> {
    Arc::new(from_fn(|i| i as i32 + 1))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scan_matches_sequential_for_every_split() {
    for backend in BACKENDS {
        for elems in 0..=12 {
            let provider: Arc<dyn DataProvider> = Arc::new(Uniform::new(elems as u64, 100));
            let input = materialize(&*provider, elems);

            for workers in 1..=elems + 5 {
                let cfg = RunConfig::new(elems, workers, 2, backend).unwrap();
                let outcome = run_scan(&cfg, provider.clone()).await.unwrap();

                assert_eq!(outcome.scans.len(), workers);
                let v = verify_scan(&input, &outcome.concatenated());
                assert!(v.valid, "{backend:?} N={elems} W={workers}: {:?}", v.mismatch);
                assert_eq!(outcome.stats.len(), 2);
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sum_matches_sequential_for_every_split() {
    for backend in BACKENDS {
        for elems in [0, 1, 7, 100] {
            let provider: Arc<dyn DataProvider> = Arc::new(Uniform::for_elems(9, elems));
            let input = materialize(&*provider, elems);

            for workers in 1..=8 {
                let cfg = RunConfig::new(elems, workers, 3, backend).unwrap();
                let outcome = run_reduce(&cfg, provider.clone()).await.unwrap();

                assert!(verify_sum(&input, outcome.sum).valid, "{backend:?} N={elems} W={workers}");
                assert_eq!(outcome.stats.len(), 3);
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_elements_over_three_workers() {
    let table = PartitionTable::new(10, 3).unwrap();
    assert_eq!(table.counts(), [4, 3, 3]);

    for backend in BACKENDS {
        let cfg = RunConfig::new(10, 3, 1, backend).unwrap();
        let outcome = run_scan(&cfg, one_to_n()).await.unwrap();

        assert_eq!(outcome.scans, [vec![1, 3, 6, 10], vec![15, 21, 28], vec![36, 45, 55]]);
        assert_eq!(outcome.carries, 2);
    }
}

#[tokio::test]
async fn empty_input() {
    for backend in BACKENDS {
        let cfg = RunConfig::new(0, 4, 1, backend).unwrap();

        let outcome = run_scan(&cfg, one_to_n()).await.unwrap();
        assert!(outcome.concatenated().is_empty());

        let outcome = run_reduce(&cfg, one_to_n()).await.unwrap();
        assert_eq!(outcome.sum, 0);
    }
}

#[tokio::test]
async fn single_worker_sends_no_carries() {
    for backend in BACKENDS {
        let cfg = RunConfig::new(6, 1, 4, backend).unwrap();
        let outcome = run_scan(&cfg, one_to_n()).await.unwrap();

        assert_eq!(outcome.concatenated(), [1, 3, 6, 10, 15, 21]);
        assert_eq!(outcome.carries, 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn idle_workers_forward_the_carry() {
    let table = PartitionTable::new(3, 5).unwrap();
    assert_eq!(table.counts(), [1, 1, 1, 0, 0]);

    for backend in BACKENDS {
        let cfg = RunConfig::new(3, 5, 1, backend).unwrap();
        let outcome = run_scan(&cfg, one_to_n()).await.unwrap();

        assert_eq!(outcome.scans, [vec![1], vec![3], vec![6], vec![], vec![]]);
        assert_eq!(outcome.carries, 4);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_trials_start_from_the_input() {
    let provider: Arc<dyn DataProvider> = Arc::new(Uniform::new(5, 1000));
    let expected = sequential_scan(&materialize(&*provider, 50));

    for backend in BACKENDS {
        let once = RunConfig::new(50, 4, 1, backend).unwrap();
        let many = RunConfig::new(50, 4, 7, backend).unwrap();

        let once = run_scan(&once, provider.clone()).await.unwrap();
        let many = run_scan(&many, provider.clone()).await.unwrap();

        assert_eq!(once.concatenated(), expected);
        assert_eq!(many.concatenated(), expected);
        assert_eq!(many.carries, 3 * 7);
    }
}

#[tokio::test]
async fn all_ones_input() {
    let provider: Arc<dyn DataProvider> = scan::InputSpec::default().build(80).into();
    let cfg = RunConfig::new(80, 8, 1, Backend::MessagePassing).unwrap();

    let outcome = run_scan(&cfg, provider).await.unwrap();
    let expected: Vec<i64> = (1..=80).collect();
    assert_eq!(outcome.concatenated(), expected);
}

#[test]
fn invalid_runs_are_rejected_up_front() {
    assert!(matches!(
        RunConfig::new(10, 0, 1, Backend::SharedMemory),
        Err(ScanErr::Config(_))
    ));
    assert!(matches!(
        RunConfig::new(10, 2, 0, Backend::MessagePassing),
        Err(ScanErr::Config(_))
    ));
}
