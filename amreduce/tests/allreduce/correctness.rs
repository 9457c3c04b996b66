use super::helpers::{ENGINES, rank_inputs, reference, run_sim};
use amreduce::sim::{DeliveryOrder, SimCluster};
use amreduce::{Algorithm, ReduceOp, combiner_fn};

#[test]
fn test_sum_all_world_sizes() {
    for p in [1u32, 2, 3, 4, 5, 6, 7, 8, 9, 13, 16, 31, 100] {
        for len in [1usize, 7, 64] {
            for alg in ENGINES {
                let inputs = rank_inputs(p, len);
                let combiner = ReduceOp::Sum.combiner();
                let want = reference(&inputs, &combiner);
                let out = run_sim(inputs, combiner, alg, DeliveryOrder::Fifo);
                assert_eq!(out.len(), p as usize);
                for (rank, v) in out.iter().enumerate() {
                    assert_eq!(*v, want, "{alg} P={p} len={len} rank={rank}");
                }
            }
        }
    }
}

#[test]
fn test_vector_shorter_than_world() {
    // Slices go empty well before reduce-scatter ends.
    for alg in ENGINES {
        let inputs = rank_inputs(16, 3);
        let combiner = ReduceOp::Sum.combiner();
        let want = reference(&inputs, &combiner);
        let out = run_sim(inputs, combiner, alg, DeliveryOrder::Fifo);
        assert!(out.iter().all(|v| *v == want), "{alg}");
    }
}

#[test]
fn test_empty_vector() {
    for alg in ENGINES {
        let inputs: Vec<Vec<i32>> = vec![Vec::new(); 5];
        let out = run_sim(inputs, ReduceOp::Sum.combiner(), alg, DeliveryOrder::Fifo);
        assert!(out.iter().all(Vec::is_empty), "{alg}");
    }
}

#[test]
fn test_min_max_prod() {
    let inputs: Vec<Vec<i32>> = (0..7)
        .map(|r| vec![r - 3, 10 - r, (r % 3) + 1, -r])
        .collect();
    for op in [ReduceOp::Min, ReduceOp::Max, ReduceOp::Prod] {
        for alg in ENGINES {
            let combiner = op.combiner();
            let want = reference(&inputs, &combiner);
            let out = run_sim(inputs.clone(), combiner, alg, DeliveryOrder::Fifo);
            assert!(out.iter().all(|v| *v == want), "{op} {alg}: {out:?}");
        }
    }
}

#[test]
fn test_custom_combiner() {
    // Bitwise OR of one-hot vectors sets every bit.
    let p = 13u32;
    let inputs: Vec<Vec<u64>> = (0..p).map(|r| vec![1u64 << r, 1u64 << (r + 20)]).collect();
    for alg in ENGINES {
        let out = run_sim(
            inputs.clone(),
            combiner_fn(|a: u64, b: u64| a | b),
            alg,
            DeliveryOrder::Fifo,
        );
        let want = vec![(1u64 << p) - 1, ((1u64 << p) - 1) << 20];
        assert!(out.iter().all(|v| *v == want), "{alg}");
    }
}

#[test]
fn test_float_results_identical_on_every_rank() {
    for p in [3u32, 6, 8, 11] {
        let inputs: Vec<Vec<f64>> = (0..p)
            .map(|r| (0..9).map(|i| 0.1 * (r as f64 + 1.0) + 1e-3 * i as f64).collect())
            .collect();
        for alg in ENGINES {
            let out = run_sim(
                inputs.clone(),
                ReduceOp::Sum.combiner(),
                alg,
                DeliveryOrder::Fifo,
            );
            for v in &out[1..] {
                let same = v
                    .iter()
                    .zip(&out[0])
                    .all(|(a, b)| a.to_bits() == b.to_bits());
                assert!(same, "{alg} P={p}: {v:?} vs {:?}", out[0]);
            }
        }
    }
}

#[test]
fn test_single_participant_completes_synchronously() {
    for alg in ENGINES {
        let mut cluster = SimCluster::new(1, DeliveryOrder::Fifo).unwrap();
        let results = cluster
            .launch(1, vec![vec![4.5f32, -1.0]], ReduceOp::Sum.combiner(), alg)
            .unwrap();
        assert!(results.is_complete(), "{alg}");
        assert_eq!(cluster.in_flight(), 0);
        assert_eq!(results.get(0), Some(vec![4.5, -1.0]));
    }
}

#[test]
fn test_auto_picks_an_engine_that_works() {
    for len in [4usize, 40_000] {
        let inputs = rank_inputs(6, len);
        let combiner = ReduceOp::Sum.combiner();
        let want = reference(&inputs, &combiner);
        let out = run_sim(inputs, combiner, Algorithm::Auto, DeliveryOrder::Fifo);
        assert!(out.iter().all(|v| *v == want), "len={len}");
    }
}

#[test]
fn test_small_element_types() {
    let inputs: Vec<Vec<u8>> = (0..5u8).map(|r| vec![r, 200, 1]).collect();
    for alg in ENGINES {
        let out = run_sim(inputs.clone(), ReduceOp::Sum.combiner(), alg, DeliveryOrder::Fifo);
        // Integer sums wrap.
        assert!(out.iter().all(|v| *v == vec![10u8, 232, 5]), "{alg}: {out:?}");
    }
}
