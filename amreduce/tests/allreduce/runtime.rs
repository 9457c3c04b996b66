use super::helpers::run_collective;
use amreduce::{
    AmClient, AmReduceConfig, AmReduceError, Algorithm, ReduceOp, ReductionGroup, combiner_fn,
};
use std::sync::Arc;
use std::time::Duration;

/// Helper: bootstrap N clients as Arc.
async fn bootstrap_arc(n: u32, config: AmReduceConfig) -> Vec<Arc<AmClient>> {
    AmClient::bootstrap_local(n, config)
        .await
        .unwrap()
        .into_iter()
        .map(Arc::new)
        .collect()
}

#[tokio::test]
async fn test_all_reduce_sum() {
    run_collective(5, AmReduceConfig::default(), |c| async move {
        let rank = c.rank();
        let out = c
            .all_reduce(vec![(rank + 1) as f32; 8], ReduceOp::Sum)
            .await
            .unwrap();
        // 1 + 2 + 3 + 4 + 5
        assert_eq!(out, vec![15.0f32; 8], "rank {rank}");
    })
    .await;
}

#[tokio::test]
async fn test_all_reduce_both_engines() {
    for alg in [Algorithm::ReduceScatterAllgather, Algorithm::DistanceDoubling] {
        run_collective(7, AmReduceConfig::default(), move |c| async move {
            let rank = c.rank() as i64;
            let data: Vec<i64> = (0..33).map(|i| rank * 100 + i).collect();
            let out = c
                .all_reduce_with(1, data, ReduceOp::Sum.combiner(), alg)
                .await
                .unwrap();
            let want: Vec<i64> = (0..33).map(|i| 2100 + 7 * i).collect();
            assert_eq!(out, want, "{alg} rank {rank}");
        })
        .await;
    }
}

#[tokio::test]
async fn test_successive_reductions_use_fresh_stamps() {
    run_collective(3, AmReduceConfig::default(), |c| async move {
        let first = c.next_stamp();
        let mut acc = vec![c.rank() as u64 + 1];
        for _ in 0..5 {
            acc = c.all_reduce(acc, ReduceOp::Max).await.unwrap();
        }
        assert_eq!(acc, vec![3]);
        // One stamp taken by hand, five by `all_reduce`.
        assert_eq!(c.next_stamp(), first + 6);
    })
    .await;
}

/// Launch 2 allreduces concurrently via _nb, verify both correct.
#[tokio::test]
async fn test_two_concurrent_allreduces() {
    let clients = bootstrap_arc(4, AmReduceConfig::default()).await;

    let mut handles = Vec::new();
    for client in &clients {
        let c = Arc::clone(client);
        handles.push(tokio::spawn(async move {
            let rank = c.rank();
            let h_a = c
                .all_reduce_nb(
                    10,
                    vec![(rank + 1) as i32; 4],
                    ReduceOp::Sum.combiner(),
                    Algorithm::ReduceScatterAllgather,
                )
                .unwrap();
            let h_b = c
                .all_reduce_nb(
                    11,
                    vec![(10 * (rank + 1)) as i32; 4],
                    ReduceOp::Sum.combiner(),
                    Algorithm::DistanceDoubling,
                )
                .unwrap();

            let mut group = ReductionGroup::new();
            group.push(h_a);
            group.push(h_b);
            assert_eq!(group.len(), 2);
            let out = group.wait_all().await.unwrap();
            assert_eq!(out[0], vec![10; 4], "rank {rank} a mismatch");
            assert_eq!(out[1], vec![100; 4], "rank {rank} b mismatch");
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
}

/// Ranks launch the same two stamps in opposite orders, so some messages
/// arrive for stamps a rank has not initialized yet.
#[tokio::test]
async fn test_launch_order_differs_across_ranks() {
    let clients = bootstrap_arc(6, AmReduceConfig::default()).await;
    let mut handles = Vec::new();
    for client in &clients {
        let c = Arc::clone(client);
        handles.push(tokio::spawn(async move {
            let rank = c.rank();
            let mut stamps = [21u64, 22];
            if rank % 2 == 1 {
                stamps.reverse();
            }
            let mut pending = Vec::new();
            for stamp in stamps {
                let h = c
                    .all_reduce_nb(
                        stamp,
                        vec![stamp as u32 * (rank + 1)],
                        ReduceOp::Sum.combiner(),
                        Algorithm::DistanceDoubling,
                    )
                    .unwrap();
                pending.push(h);
            }
            for h in pending {
                let stamp = h.stamp() as u32;
                // 1 + 2 + ... + 6
                assert_eq!(h.wait().await.unwrap(), vec![stamp * 21]);
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
}

#[tokio::test]
async fn test_custom_combiner_over_runtime() {
    run_collective(4, AmReduceConfig::default(), |c| async move {
        let mask = 1u64 << c.rank();
        let out = c
            .all_reduce_with(
                5,
                vec![mask],
                combiner_fn(|a: u64, b: u64| a | b),
                Algorithm::Auto,
            )
            .await
            .unwrap();
        assert_eq!(out, vec![0b1111]);
    })
    .await;
}

#[tokio::test]
async fn test_single_client() {
    let clients = AmClient::bootstrap_local(1, AmReduceConfig::default())
        .await
        .unwrap();
    let c = &clients[0];
    assert_eq!(c.world_size(), 1);
    let out = c.all_reduce(vec![1.5f64, -2.0], ReduceOp::Sum).await.unwrap();
    assert_eq!(out, vec![1.5, -2.0]);
}

#[tokio::test]
async fn test_is_finished_reports_completion() {
    let clients = AmClient::bootstrap_local(1, AmReduceConfig::default())
        .await
        .unwrap();
    let h = clients[0]
        .all_reduce_nb(3, vec![1u8], ReduceOp::Sum.combiner(), Algorithm::Auto)
        .unwrap();
    while !h.is_finished() {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.wait().await.unwrap(), vec![1]);
}

#[tokio::test]
async fn test_reused_stamp_reported() {
    let clients = AmClient::bootstrap_local(1, AmReduceConfig::default())
        .await
        .unwrap();
    let c = &clients[0];
    c.all_reduce_with(4, vec![1i32], ReduceOp::Sum.combiner(), Algorithm::Auto)
        .await
        .unwrap();
    let err = c
        .all_reduce_with(4, vec![1i32], ReduceOp::Sum.combiner(), Algorithm::Auto)
        .await
        .unwrap_err();
    assert!(matches!(err, AmReduceError::DuplicateStamp { stamp: 4, rank: 0 }));
    // Not fatal: the participant keeps serving.
    assert!(c.is_running());
    assert_eq!(
        c.all_reduce(vec![2i32], ReduceOp::Sum).await.unwrap(),
        vec![2]
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_peer_times_out() {
    let config = AmReduceConfig {
        completion_timeout: Duration::from_secs(2),
        ..AmReduceConfig::default()
    };
    let clients = AmClient::bootstrap_local(2, config).await.unwrap();
    // Rank 1 never joins the reduction.
    let err = clients[0]
        .all_reduce(vec![1i64; 4], ReduceOp::Sum)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AmReduceError::Timeout {
            stamp: 1,
            timeout_ms: 2000
        }
    ));
}

#[tokio::test]
async fn test_bootstrap_zero_rejected() {
    let err = AmClient::bootstrap_local(0, AmReduceConfig::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        AmReduceError::InvalidParticipantCount { world_size: 0 }
    ));
}

#[tokio::test]
async fn test_config_is_shared() {
    let config = AmReduceConfig {
        algorithm: Algorithm::DistanceDoubling,
        ..AmReduceConfig::default()
    };
    let clients = AmClient::bootstrap_local(3, config).await.unwrap();
    for (rank, c) in clients.iter().enumerate() {
        assert_eq!(c.rank(), rank as u32);
        assert_eq!(c.config().algorithm, Algorithm::DistanceDoubling);
    }
}
