//! Allreduce across 5 ranks, once on the tokio runtime and once in the
//! deterministic simulator with shuffled delivery.
//!
//! Each rank starts with its own data. After allreduce(Sum), every rank holds
//! the element-wise sum of all inputs.
//!
//! ```bash
//! cargo run --example allreduce
//! ```

use amreduce::sim::{DeliveryOrder, simulate_allreduce};
use amreduce::{AmClient, AmReduceConfig, Algorithm, ReduceOp};
use std::sync::Arc;

#[tokio::main]
async fn main() -> amreduce::Result<()> {
    let world_size = 5u32;
    let clients: Vec<Arc<AmClient>> =
        AmClient::bootstrap_local(world_size, AmReduceConfig::from_env())
            .await?
            .into_iter()
            .map(Arc::new)
            .collect();

    let count = 8usize;

    // rank 0: [0.0, 0.0, ...], rank 1: [1.0, 1.0, ...], etc.
    let mut handles = Vec::new();
    for client in &clients {
        let c = Arc::clone(client);
        let rank = c.rank();
        handles.push(tokio::spawn(async move {
            let data = c.all_reduce(vec![rank as f32; count], ReduceOp::Sum).await?;
            amreduce::Result::Ok((rank, data))
        }));
    }

    for h in handles {
        let (rank, data) = h.await.expect("reduction task panicked")?;
        println!("rank {rank}: {data:?}");
    }
    // Output (all ranks identical):
    // rank 0: [10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0]
    // ...

    // Same reduction, single-threaded, messages delivered in random order.
    let inputs: Vec<Vec<f32>> = (0..world_size).map(|r| vec![r as f32; count]).collect();
    let results = simulate_allreduce(
        inputs,
        ReduceOp::Sum.combiner(),
        Algorithm::ReduceScatterAllgather,
        DeliveryOrder::Shuffled { seed: 42 },
    )?;
    println!("simulated rank 1: {:?}", results[1]);

    Ok(())
}
