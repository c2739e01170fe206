use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use llm_gateway::load_balancer::LoadBalancer;
use llm_gateway::models::domain::{LbTactic, Rule, Service, ServiceStats};
use uuid::Uuid;

fn make_rule(n: usize, tactic: LbTactic) -> Rule {
    let now = Utc::now();
    let services = (0..n)
        .map(|i| {
            let provider = Uuid::new_v4();
            let model = format!("model-{i}");
            Service {
                provider,
                model: model.clone(),
                weight: 1,
                active: true,
                time_window: 60,
                stats: ServiceStats::new(format!("{provider}:{model}"), 60, now),
            }
        })
        .collect();

    Rule {
        id: Uuid::new_v4(),
        request_model: "bench-model".to_string(),
        response_model: None,
        services,
        lb_tactic: tactic,
        current_service_index: 0,
        active: true,
    }
}

fn bench_round_robin(c: &mut Criterion) {
    let mut rule = make_rule(8, LbTactic::RoundRobin { request_threshold: 50 });
    c.bench_function("round_robin_select_8_services", |b| {
        b.iter(|| {
            let now = Utc::now();
            black_box(LoadBalancer::select(&mut rule, now))
        });
    });
}

fn bench_hybrid(c: &mut Criterion) {
    let mut rule = make_rule(8, LbTactic::Hybrid { request_threshold: 50, token_threshold: 100_000 });
    c.bench_function("hybrid_select_8_services", |b| {
        b.iter(|| {
            let now = Utc::now();
            black_box(LoadBalancer::select(&mut rule, now))
        });
    });
}

fn bench_random_weighted(c: &mut Criterion) {
    let mut rule = make_rule(8, LbTactic::Random);
    c.bench_function("random_weighted_select_8_services", |b| {
        b.iter(|| {
            let now = Utc::now();
            black_box(LoadBalancer::select(&mut rule, now))
        });
    });
}

fn bench_window_rollover(c: &mut Criterion) {
    c.bench_function("service_stats_window_rollover", |b| {
        b.iter(|| {
            let t0 = Utc::now();
            let mut stats = ServiceStats::new("bench-service", 60, t0);
            for _ in 0..100 {
                stats.record_usage(black_box(120), black_box(340), t0);
            }
            black_box(&stats);
        });
    });
}

criterion_group!(benches, bench_round_robin, bench_hybrid, bench_random_weighted, bench_window_rollover);
criterion_main!(benches);
