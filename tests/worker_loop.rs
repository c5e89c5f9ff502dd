use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pow_lab::batch::BatchSearchEngine;
use pow_lab::config::CoordinatorConfig;
use pow_lab::coordinator::{Coordinator, LocalApi};
use pow_lab::engine::SearchEngine;
use pow_lab::metrics::WorkerStats;
use pow_lab::types::Role;

fn coordinator(difficulty_bits: u32) -> Arc<Coordinator> {
    Arc::new(Coordinator::new(&CoordinatorConfig {
        difficulty_bits,
        ..CoordinatorConfig::default()
    }))
}

async fn wait_for_generations(coordinator: &Coordinator, target: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        if coordinator.stats().generations_closed >= target {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "workers did not close {target} generations in time"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequential_engine_closes_generations_end_to_end() {
    let coordinator = coordinator(4);
    let stop = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(WorkerStats::new());

    let mut engine = SearchEngine::new(
        LocalApi::new(Arc::clone(&coordinator), "cpu-1", Role::Sequential),
        "cpu-1",
        2048,
        Arc::clone(&stop),
        Arc::clone(&stats),
    );
    let handle = tokio::spawn(async move { engine.run().await });

    wait_for_generations(&coordinator, 5).await;
    stop.store(true, Ordering::Relaxed);
    handle.await.unwrap().unwrap();

    let snapshot = coordinator.stats();
    assert!(snapshot.generations_closed >= 5);
    assert!(
        snapshot
            .recent_log_entries
            .iter()
            .all(|e| e.winning_miner_id == "cpu-1")
    );
    let worker = stats.snapshot();
    assert_eq!(worker.accepted, snapshot.generations_closed);
    assert!(worker.attempts >= worker.accepted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn heterogeneous_engines_share_one_coordinator() {
    let coordinator = coordinator(4);
    let stop = Arc::new(AtomicBool::new(false));

    let cpu_stats = Arc::new(WorkerStats::new());
    let mut cpu = SearchEngine::new(
        LocalApi::new(Arc::clone(&coordinator), "cpu-1", Role::Sequential),
        "cpu-1",
        2048,
        Arc::clone(&stop),
        Arc::clone(&cpu_stats),
    );

    let gpu_stats = Arc::new(WorkerStats::new());
    let mut gpu = BatchSearchEngine::new(
        LocalApi::new(Arc::clone(&coordinator), "gpu-1", Role::Batch),
        "gpu-1",
        512,
        1,
        Arc::clone(&stop),
        Arc::clone(&gpu_stats),
    );

    let cpu_handle = tokio::spawn(async move { cpu.run().await });
    let gpu_handle = tokio::spawn(async move { gpu.run().await });

    wait_for_generations(&coordinator, 8).await;
    stop.store(true, Ordering::Relaxed);
    cpu_handle.await.unwrap().unwrap();
    gpu_handle.await.unwrap().unwrap();

    let snapshot = coordinator.stats();
    assert!(snapshot.generations_closed >= 8);

    // The coordinator credited only the two engines, one winner per closed
    // generation.
    let credited: u64 = snapshot.records.iter().map(|r| r.accepted_solutions).sum();
    assert_eq!(credited, snapshot.generations_closed);
    assert!(
        snapshot
            .recent_log_entries
            .iter()
            .all(|e| e.winning_miner_id == "cpu-1" || e.winning_miner_id == "gpu-1")
    );

    // Both roles registered through their polls.
    let roles: Vec<(String, Role)> = snapshot
        .records
        .iter()
        .map(|r| (r.miner_id.clone(), r.role))
        .collect();
    assert!(roles.contains(&("cpu-1".to_string(), Role::Sequential)));
    assert!(roles.contains(&("gpu-1".to_string(), Role::Batch)));

    // Accepted counts agree between worker-side stats and the registry.
    let accepted_locally = cpu_stats.snapshot().accepted + gpu_stats.snapshot().accepted;
    assert_eq!(accepted_locally, snapshot.generations_closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn polls_report_attempt_counts_to_the_registry() {
    let coordinator = coordinator(4);
    let stop = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(WorkerStats::new());

    let mut engine = SearchEngine::new(
        LocalApi::new(Arc::clone(&coordinator), "cpu-1", Role::Sequential),
        "cpu-1",
        256,
        Arc::clone(&stop),
        Arc::clone(&stats),
    );
    let handle = tokio::spawn(async move { engine.run().await });

    wait_for_generations(&coordinator, 3).await;
    stop.store(true, Ordering::Relaxed);
    handle.await.unwrap().unwrap();

    let snapshot = coordinator.stats();
    let record = snapshot
        .records
        .iter()
        .find(|r| r.miner_id == "cpu-1")
        .expect("worker registered");
    assert!(record.total_attempts > 0, "polls carry attempt deltas");
    // Deltas are reported on fetch, so the registry can lag the worker's
    // own counter but never exceed it.
    assert!(record.total_attempts <= stats.snapshot().attempts);
}
