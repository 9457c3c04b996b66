use super::helpers::rank_inputs;
use amreduce::sim::{DeliveryOrder, SimCluster};
use amreduce::{AmReduceError, Algorithm, Phase, ReduceOp, StepMessage};

#[test]
fn test_wrong_sender_rejected() {
    let mut cluster = SimCluster::new(4, DeliveryOrder::Fifo).unwrap();
    // Rank 0's step-0 partner is rank 1.
    let forged = StepMessage::new(1, Phase::DistanceDouble, 0, 0, &[0i64; 3]);
    cluster.inject(3, 0, forged).unwrap();
    cluster.step().unwrap();
    assert_eq!(cluster.router(0).parked_count(), 1);

    let err = cluster
        .launch(
            1,
            rank_inputs(4, 3),
            ReduceOp::Sum.combiner(),
            Algorithm::DistanceDoubling,
        )
        .err()
        .unwrap();
    assert!(matches!(err, AmReduceError::ProtocolViolation { .. }), "{err}");
    assert!(err.is_fatal());
}

#[test]
fn test_duplicate_step_message_rejected() {
    let mut cluster = SimCluster::new(4, DeliveryOrder::Fifo).unwrap();
    let inputs = rank_inputs(4, 2);
    let dup = StepMessage::new(1, Phase::DistanceDouble, 0, 0, &inputs[1]);
    let _results = cluster
        .launch(
            1,
            inputs,
            ReduceOp::Sum.combiner(),
            Algorithm::DistanceDoubling,
        )
        .unwrap();
    cluster.inject(1, 0, dup).unwrap();
    let err = cluster.run().unwrap_err();
    assert!(err.to_string().contains("duplicate"), "{err}");
}

#[test]
fn test_duplicate_slice_rejected() {
    let mut cluster = SimCluster::new(2, DeliveryOrder::Fifo).unwrap();
    let _results = cluster
        .launch(
            1,
            rank_inputs(2, 4),
            ReduceOp::Sum.combiner(),
            Algorithm::ReduceScatterAllgather,
        )
        .unwrap();
    // Rank 0 keeps the lower half; a second copy of rank 1's step-0 slice
    // lands while rank 0 still waits for allgather.
    let dup = StepMessage::new(1, Phase::ReduceScatter, 0, 0, &[0i64, 0]);
    cluster.inject(1, 0, dup).unwrap();
    let err = cluster.run().unwrap_err();
    assert!(matches!(err, AmReduceError::ProtocolViolation { .. }), "{err}");
}

#[test]
fn test_message_for_completed_reduction_rejected() {
    let mut cluster = SimCluster::new(2, DeliveryOrder::Fifo).unwrap();
    let results = cluster
        .launch(
            9,
            rank_inputs(2, 2),
            ReduceOp::Sum.combiner(),
            Algorithm::DistanceDoubling,
        )
        .unwrap();
    cluster.run().unwrap();
    assert!(results.is_complete());

    let late = StepMessage::new(9, Phase::DistanceDouble, 0, 0, &[0i64, 0]);
    cluster.inject(1, 0, late).unwrap();
    let err = cluster.step().unwrap_err();
    assert!(matches!(
        err,
        AmReduceError::RetiredStamp {
            stamp: 9,
            rank: 0,
            src: 1
        }
    ));
}

#[test]
fn test_misaligned_payload_rejected() {
    let mut cluster = SimCluster::new(2, DeliveryOrder::Fifo).unwrap();
    let bad = StepMessage {
        stamp: 1,
        phase: Phase::DistanceDouble,
        step: 0,
        offset: 0,
        payload: vec![0u8; 3],
    };
    cluster.inject(1, 0, bad).unwrap();
    cluster.step().unwrap();
    let err = cluster
        .launch(
            1,
            vec![vec![1i32], vec![2i32]],
            ReduceOp::Sum.combiner(),
            Algorithm::DistanceDoubling,
        )
        .err()
        .unwrap();
    assert!(matches!(
        err,
        AmReduceError::PayloadMisaligned {
            len: 3,
            elem_size: 4
        }
    ));
}

#[test]
fn test_phase_foreign_to_engine_rejected() {
    let mut cluster = SimCluster::new(2, DeliveryOrder::Fifo).unwrap();
    let foreign = StepMessage::new(1, Phase::Allgather, 0, 0, &[0i64]);
    cluster.inject(1, 0, foreign).unwrap();
    cluster.step().unwrap();
    let err = cluster
        .launch(
            1,
            rank_inputs(2, 2),
            ReduceOp::Sum.combiner(),
            Algorithm::DistanceDoubling,
        )
        .err()
        .unwrap();
    assert!(err.to_string().contains("allgather"), "{err}");
}

#[test]
fn test_out_of_range_offset_rejected() {
    let mut cluster = SimCluster::new(2, DeliveryOrder::Fifo).unwrap();
    let mut forged = StepMessage::new(1, Phase::ReduceScatter, 0, 0, &[9i64]);
    forged.offset = u64::MAX;
    cluster.inject(0, 1, forged).unwrap();
    cluster.step().unwrap();
    assert_eq!(cluster.router(1).parked_count(), 1);

    let err = cluster
        .launch(
            1,
            rank_inputs(2, 4),
            ReduceOp::Sum.combiner(),
            Algorithm::ReduceScatterAllgather,
        )
        .err()
        .unwrap();
    assert!(matches!(err, AmReduceError::ProtocolViolation { .. }), "{err}");
    assert!(err.to_string().contains(&u64::MAX.to_string()), "{err}");
}
