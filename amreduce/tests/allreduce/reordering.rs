use super::helpers::{ENGINES, rank_inputs, reference, run_sim};
use amreduce::sim::{DeliveryOrder, SimCluster};
use amreduce::{Algorithm, ReduceOp};

#[test]
fn test_shuffled_delivery_matches_fifo() {
    for p in [2u32, 3, 5, 8, 12, 17] {
        for alg in ENGINES {
            let fifo = run_sim(
                rank_inputs(p, 11),
                ReduceOp::Sum.combiner(),
                alg,
                DeliveryOrder::Fifo,
            );
            for seed in 0..40 {
                let shuffled = run_sim(
                    rank_inputs(p, 11),
                    ReduceOp::Sum.combiner(),
                    alg,
                    DeliveryOrder::Shuffled { seed },
                );
                assert_eq!(shuffled, fifo, "{alg} P={p} seed={seed}");
            }
        }
    }
}

#[test]
fn test_delivery_order_does_not_change_float_bits() {
    // Each engine combines in a fixed order regardless of arrival order.
    let inputs: Vec<Vec<f32>> = (0..7)
        .map(|r| (0..5).map(|i| 1.0 / (r as f32 + 3.0) + i as f32 * 0.37).collect())
        .collect();
    for alg in ENGINES {
        let fifo = run_sim(
            inputs.clone(),
            ReduceOp::Sum.combiner(),
            alg,
            DeliveryOrder::Fifo,
        );
        for seed in 100..120 {
            let shuffled = run_sim(
                inputs.clone(),
                ReduceOp::Sum.combiner(),
                alg,
                DeliveryOrder::Shuffled { seed },
            );
            for (a, b) in shuffled.iter().flatten().zip(fifo.iter().flatten()) {
                assert_eq!(a.to_bits(), b.to_bits(), "{alg} seed={seed}");
            }
        }
    }
}

#[test]
fn test_concurrent_stamps_interleave() {
    let p = 6u32;
    for seed in 0..10 {
        let mut cluster = SimCluster::new(p, DeliveryOrder::Shuffled { seed }).unwrap();
        let a_in = rank_inputs(p, 9);
        let b_in: Vec<Vec<i64>> = (0..p as i64).map(|r| vec![r; 3]).collect();
        let c_in = rank_inputs(p, 2);
        let sum = ReduceOp::Sum.combiner();
        let max = ReduceOp::Max.combiner();

        let a = cluster
            .launch(1, a_in.clone(), sum.clone(), Algorithm::ReduceScatterAllgather)
            .unwrap();
        let b = cluster
            .launch(2, b_in.clone(), max.clone(), Algorithm::DistanceDoubling)
            .unwrap();
        let c = cluster
            .launch(3, c_in.clone(), sum.clone(), Algorithm::DistanceDoubling)
            .unwrap();
        assert_eq!(cluster.router(0).live_count(), 3);

        cluster.run().unwrap();
        for rank in 0..p {
            assert!(!cluster.router(rank).is_live(1));
        }
        let want_a = reference(&a_in, &sum);
        let want_b = reference(&b_in, &max);
        let want_c = reference(&c_in, &sum);
        assert!(a.into_results().unwrap().iter().all(|v| *v == want_a));
        assert!(b.into_results().unwrap().iter().all(|v| *v == want_b));
        assert!(c.into_results().unwrap().iter().all(|v| *v == want_c));
    }
}

#[test]
fn test_step_by_step_progress() {
    let mut cluster = SimCluster::new(8, DeliveryOrder::Shuffled { seed: 7 }).unwrap();
    let results = cluster
        .launch(
            1,
            rank_inputs(8, 4),
            ReduceOp::Sum.combiner(),
            Algorithm::DistanceDoubling,
        )
        .unwrap();
    let mut last = 0;
    while cluster.step().unwrap() {
        let now = results.completed();
        assert!(now >= last, "completion count went backwards");
        last = now;
    }
    assert_eq!(last, 8);
    assert_eq!(cluster.in_flight(), 0);
}
