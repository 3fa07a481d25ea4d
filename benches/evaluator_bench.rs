use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use crowdstore::ast::{Datum, Record, Table};
use crowdstore::evaluator::Evaluator;
use crowdstore::parser::parse_statement;
use crowdstore::planner::{Plan, Planner};
use crowdstore::storage::{Config, Database, JsonFileStorage, StorageBackend};
use std::hint::black_box;

fn plan(sql: &str) -> Plan {
    Planner::new().plan(&parse_statement(sql).unwrap()).unwrap()
}

fn seeded(size: usize) -> Database {
    let mut db = Database::new();
    for i in 0..size {
        let record: Record = [
            ("id", Datum::from(format!("post-{i}"))),
            ("community_id", Datum::from(format!("c{}", i % 10))),
            ("goal_amount", Datum::from(i64::try_from(i).unwrap())),
            ("created_at", Datum::from(format!("2024-01-01T00:00:{:02}.000Z", i % 60))),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        db.append(Table::Posts, record);

        let user: Record = [
            ("id", Datum::from(format!("u{i}"))),
            ("email", Datum::from(format!("u{i}@example.com"))),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        db.append(Table::Users, user);

        let session: Record = [
            ("id", Datum::from(format!("s{i}"))),
            ("user_id", Datum::from(format!("u{i}"))),
            ("expires_at", Datum::from("2999-01-01T00:00:00.000Z")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        db.append(Table::Sessions, session);
    }
    db
}

fn bench_select(c: &mut Criterion) {
    let filtered = plan("SELECT * FROM posts WHERE community_id = ? ORDER BY created_at DESC LIMIT 20");
    let joined = plan(
        "SELECT s.*, u.email FROM sessions s JOIN users u ON s.user_id = u.id \
         WHERE s.id = ? AND s.expires_at > datetime('now')",
    );

    let mut group = c.benchmark_group("evaluator_select");
    for size in &[100, 1_000, 10_000] {
        let mut db = seeded(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("filter_sort_limit", size), size, |b, _| {
            b.iter(|| {
                let result = Evaluator::new(&mut db).eval(black_box(&filtered), &[Datum::from("c3")]);
                black_box(result).unwrap();
            });
        });
        group.bench_with_input(BenchmarkId::new("session_join", size), size, |b, &size| {
            let key = Datum::from(format!("s{}", size / 2));
            b.iter(|| {
                let result = Evaluator::new(&mut db).eval(black_box(&joined), std::slice::from_ref(&key));
                black_box(result).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_mutations(c: &mut Criterion) {
    let insert = plan("INSERT INTO comments (id, post_id, body) VALUES (?, ?, ?)");
    let update = plan("UPDATE posts SET status = ? WHERE community_id = ?");

    c.bench_function("evaluator_insert", |b| {
        let mut db = Database::new();
        let params = [Datum::from("x"), Datum::from("post-1"), Datum::from("hello")];
        b.iter(|| {
            let result = Evaluator::new(&mut db).eval(black_box(&insert), &params);
            black_box(result).unwrap();
        });
    });

    c.bench_function("evaluator_update_1000", |b| {
        let mut db = seeded(1_000);
        let params = [Datum::from("funded"), Datum::from("c1")];
        b.iter(|| {
            let result = Evaluator::new(&mut db).eval(black_box(&update), &params);
            black_box(result).unwrap();
        });
    });
}

fn bench_json_save(c: &mut Criterion) {
    let temp_dir = tempfile::tempdir().unwrap();
    let storage = JsonFileStorage::open(&Config {
        data_file: temp_dir.path().join("database.json"),
        pretty: true,
    });
    let db = seeded(1_000);

    c.bench_function("json_file_save_1000", |b| {
        b.iter(|| storage.save(black_box(&db)).unwrap());
    });
    c.bench_function("json_file_load_1000", |b| {
        b.iter(|| black_box(storage.load()).unwrap());
    });
}

criterion_group!(benches, bench_select, bench_mutations, bench_json_save);
criterion_main!(benches);
