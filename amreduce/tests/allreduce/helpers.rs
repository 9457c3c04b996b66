use amreduce::sim::{DeliveryOrder, simulate_allreduce};
use amreduce::{AmClient, AmReduceConfig, Algorithm, Combiner, Element};
use std::sync::Arc;

/// Both concrete engines.
pub const ENGINES: [Algorithm; 2] = [Algorithm::ReduceScatterAllgather, Algorithm::DistanceDoubling];

/// Distinct per-rank, per-index values so misplaced slices show up.
pub fn rank_inputs(world_size: u32, len: usize) -> Vec<Vec<i64>> {
    (0..world_size)
        .map(|r| {
            (0..len)
                .map(|i| (r as i64 + 1) * 1000 + i as i64)
                .collect()
        })
        .collect()
}

/// Sequential fold over ranks in order.
pub fn reference<T: Element>(inputs: &[Vec<T>], combiner: &Combiner<T>) -> Vec<T> {
    let mut acc = inputs[0].clone();
    for v in &inputs[1..] {
        for (a, &x) in acc.iter_mut().zip(v) {
            *a = combiner(*a, x);
        }
    }
    acc
}

/// Simulate one reduction and return every rank's result.
pub fn run_sim<T: Element>(
    inputs: Vec<Vec<T>>,
    combiner: Combiner<T>,
    algorithm: Algorithm,
    order: DeliveryOrder,
) -> Vec<Vec<T>> {
    simulate_allreduce(inputs, combiner, algorithm, order).unwrap()
}

/// Helper: run a closure on every client concurrently.
/// Keeps all clients alive until every task completes.
pub async fn run_collective<F, Fut>(world_size: u32, config: AmReduceConfig, f: F)
where
    F: Fn(Arc<AmClient>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let clients = AmClient::bootstrap_local(world_size, config).await.unwrap();
    let clients: Vec<Arc<AmClient>> = clients.into_iter().map(Arc::new).collect();

    let f = Arc::new(f);
    let mut handles = Vec::new();
    for c in &clients {
        let c = Arc::clone(c);
        let f = Arc::clone(&f);
        handles.push(tokio::spawn(async move { f(c).await }));
    }
    for h in handles {
        h.await.unwrap();
    }
}
