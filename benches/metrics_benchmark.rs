use chrono::{DateTime, Duration, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use uuid::Uuid;
use workout_tracker::models::{
    ActivitySet, Session, SessionActivity, SessionSnapshot, SessionStatus,
};
use workout_tracker::services::{metrics, CatalogService};

const ACTIVITIES: [&str; 6] = [
    "barbell_bench_press",
    "barbell_squat",
    "deadlift",
    "pull_up",
    "rowing_machine",
    "hamstring_stretch",
];

/// A long finished-looking workout: 6 activities x 5 completed sets, repeated.
fn workout(rounds: u32) -> SessionSnapshot {
    let start = DateTime::from_timestamp(1_767_261_600, 0).unwrap_or_else(Utc::now);
    let mut session = Session::new(Uuid::new_v4(), "bench".into(), None, SessionStatus::Active, start);
    let mut activities = Vec::new();
    let mut sets = Vec::new();
    let mut clock = start;

    for round in 0..rounds {
        for (i, id) in ACTIVITIES.iter().enumerate() {
            let order = session.next_activity_order();
            let activity = SessionActivity::new(session.id, id.to_string(), order);
            for n in 1..=5 {
                let mut set = ActivitySet::blank(session.id, activity.id, n);
                set.started_at = Some(clock);
                clock += Duration::seconds(45 + (round as i64 + i as i64 + n as i64) % 30);
                set.ended_at = Some(clock);
                set.duration_secs = Some(45.0);
                set.reps = Some(5 + n);
                set.weight = Some(40.0 + (n * 10) as f64);
                set.rpe = Some(7.5);
                sets.push(set);
                clock += Duration::seconds(90);
            }
            activities.push(activity);
        }
    }
    SessionSnapshot::new(session, activities, sets)
}

fn benchmark_finish_metrics(c: &mut Criterion) {
    let catalog = CatalogService::load_from_file("data/catalog.json").expect("Failed to load catalog");
    let small = workout(1);
    let large = workout(20);

    let mut group = c.benchmark_group("finish_metrics");

    group.bench_function("calories_30_sets", |b| {
        b.iter(|| metrics::calories_burnt(black_box(&small), |id| catalog.kcal_per_minute(id, 72.0)))
    });

    group.bench_function("calories_600_sets", |b| {
        b.iter(|| metrics::calories_burnt(black_box(&large), |id| catalog.kcal_per_minute(id, 72.0)))
    });

    group.bench_function("record_observations_600_sets", |b| {
        b.iter(|| metrics::record_observations(black_box(&large)))
    });

    group.finish();
}

criterion_group!(benches, benchmark_finish_metrics);
criterion_main!(benches);
