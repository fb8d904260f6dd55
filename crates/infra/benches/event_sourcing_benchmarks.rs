use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use tally_core::{IdGenerator, SequentialIdGenerator};
use tally_gl::{
    AccountType, AddSegmentValue, CreateStructure, NewSegment, NewSegmentValue, SegmentId,
    SegmentValueId, StructureCommand, StructureId,
};
use tally_infra::handlers::{ProjectHandler, StructureHandler};
use tally_infra::{InMemoryDirectory, InMemoryEventStore, Settings};
use tally_projects::{ActivityId, ActivityKind, AddActivity, CreateProject, ProjectId};

type Store = Arc<InMemoryEventStore>;

fn ids() -> Arc<dyn IdGenerator> {
    Arc::new(SequentialIdGenerator::starting_at(1))
}

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// A project stream with one creation event and `activities` added activities.
fn project_with_history(activities: usize) -> (ProjectHandler<Store>, ProjectId) {
    let store: Store = Arc::new(InMemoryEventStore::new());
    let handler = ProjectHandler::new(store, ids(), InMemoryDirectory::shared());
    let project_id = ProjectId::from_uuid(Uuid::from_u128(1));
    handler
        .create(CreateProject {
            project_id,
            name: "Season".to_string(),
            description: None,
            sequence: 1,
            start_date: None,
            completion_date: None,
            occurred_at: Utc::now(),
        })
        .unwrap();
    for n in 0..activities {
        let day = 1 + (n % 28) as u32;
        handler
            .add_activity(AddActivity {
                project_id,
                activity_id: ActivityId::from_uuid(Uuid::from_u128(100 + n as u128)),
                name: format!("Rehearsal {n}"),
                description: None,
                kind: ActivityKind::Rehearsal,
                scheduled_start: at(day, 10),
                scheduled_end: at(day, 14),
                parent_id: None,
                occurred_at: Utc::now(),
            })
            .unwrap();
    }
    (handler, project_id)
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");
    group.sample_size(200);

    group.bench_function("create_project_fresh", |b| {
        b.iter_with_setup(
            || {
                let store: Store = Arc::new(InMemoryEventStore::new());
                ProjectHandler::new(store, ids(), InMemoryDirectory::shared())
            },
            |handler| {
                let project = handler
                    .create(CreateProject {
                        project_id: ProjectId::from_uuid(Uuid::from_u128(1)),
                        name: "Season".to_string(),
                        description: None,
                        sequence: 1,
                        start_date: None,
                        completion_date: None,
                        occurred_at: Utc::now(),
                    })
                    .unwrap();
                black_box(project);
            },
        );
    });

    group.bench_function("add_activity_with_history", |b| {
        b.iter_with_setup(
            || project_with_history(100),
            |(handler, project_id)| {
                let project = handler
                    .add_activity(AddActivity {
                        project_id,
                        activity_id: ActivityId::from_uuid(Uuid::from_u128(99)),
                        name: "Dress".to_string(),
                        description: None,
                        kind: ActivityKind::Performance,
                        scheduled_start: at(29, 18),
                        scheduled_end: at(29, 22),
                        parent_id: None,
                        occurred_at: Utc::now(),
                    })
                    .unwrap();
                black_box(project);
            },
        );
    });

    group.finish();
}

fn bench_stream_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_replay");

    for event_count in [10usize, 100, 1000].iter() {
        let (handler, project_id) = project_with_history(*event_count);
        group.throughput(Throughput::Elements(*event_count as u64 + 1));
        group.bench_with_input(
            BenchmarkId::new("load_project", event_count),
            event_count,
            |b, _| {
                b.iter(|| black_box(handler.repository().load(project_id).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_chart_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("chart_generation");

    for values in [5u128, 20, 50].iter() {
        group.throughput(Throughput::Elements((*values * *values) as u64));
        group.bench_with_input(
            BenchmarkId::new("two_segments", values),
            values,
            |b, &values| {
                b.iter_with_setup(
                    || structure_with_values(values),
                    |(handler, structure_id)| {
                        black_box(handler.generate_chart(structure_id, Utc::now()).unwrap());
                    },
                );
            },
        );
    }

    group.finish();
}

/// A structure whose chart has `values * values` combinations.
fn structure_with_values(values: u128) -> (StructureHandler<Store>, StructureId) {
    let store: Store = Arc::new(InMemoryEventStore::new());
    let handler = StructureHandler::new(
        store,
        ids(),
        InMemoryDirectory::shared(),
        &Settings::default(),
    );
    let structure_id = StructureId::from_uuid(Uuid::from_u128(1));
    let natural = SegmentId::from_uuid(Uuid::from_u128(2));
    let department = SegmentId::from_uuid(Uuid::from_u128(3));
    handler
        .create(CreateStructure {
            structure_id,
            name: "Operating".to_string(),
            description: None,
            segments: vec![
                NewSegment {
                    segment_id: natural,
                    name: "Account".to_string(),
                    sequence: 1,
                    length: 4,
                    natural_account: true,
                    cost_center: false,
                },
                NewSegment {
                    segment_id: department,
                    name: "Department".to_string(),
                    sequence: 2,
                    length: 3,
                    natural_account: false,
                    cost_center: true,
                },
            ],
            occurred_at: Utc::now(),
        })
        .unwrap();

    for n in 0..values {
        for (segment_id, value, offset, account_type) in [
            (natural, format!("{:04}", 1000 + n), 1000, Some(AccountType::Expense)),
            (department, format!("{:03}", 100 + n), 2000, None),
        ] {
            handler
                .dispatch(
                    structure_id,
                    StructureCommand::AddSegmentValue(AddSegmentValue {
                        structure_id,
                        segment_id,
                        value: NewSegmentValue {
                            value_id: SegmentValueId::from_uuid(Uuid::from_u128(offset + n)),
                            value: Some(value),
                            min: None,
                            max: None,
                            description: format!("Value {n}"),
                            account_type,
                        },
                        occurred_at: Utc::now(),
                    }),
                )
                .unwrap();
        }
    }
    (handler, structure_id)
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_stream_replay,
    bench_chart_generation
);
criterion_main!(benches);
