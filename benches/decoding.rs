//! Value Decoding Benchmarks
//!
//! Typed reads, nullable reads and enum label parsing over in-memory values.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sprocket::value::{read_enum_from_label, read_enum_from_value};
use sprocket::{db_enum, read, read_nullable, DbValue};

db_enum! {
    pub enum Status {
        Pending = 1,
        InTransit = 2,
        Delivered = 3,
        ReturnedToSender = 4,
    }
}

fn bench_typed_reads(c: &mut Criterion) {
    let values: Vec<DbValue> =
        (0..1000).map(|i| if i % 10 == 0 { DbValue::Null } else { DbValue::BigInt(i) }).collect();

    c.bench_function("read_nullable_i32_1000", |b| {
        b.iter(|| {
            let sum: i64 = values
                .iter()
                .filter_map(|v| read_nullable::<i32>(black_box(v)).ok().flatten())
                .map(i64::from)
                .sum();
            black_box(sum)
        });
    });

    let text = DbValue::Text("2024-03-01 12:30:00".into());
    c.bench_function("read_datetime_from_text", |b| {
        b.iter(|| black_box(read::<chrono::NaiveDateTime>(black_box(&text))));
    });
}

fn bench_enum_decoding(c: &mut Criterion) {
    let label = DbValue::Text("Returned To Sender".into());
    let lower = DbValue::Text("returnedtosender".into());
    let numeric = DbValue::Int(3);

    c.bench_function("enum_from_label", |b| {
        b.iter(|| black_box(read_enum_from_label::<Status>(black_box(&label), false)));
    });
    c.bench_function("enum_from_label_ignore_case", |b| {
        b.iter(|| black_box(read_enum_from_label::<Status>(black_box(&lower), true)));
    });
    c.bench_function("enum_from_value", |b| {
        b.iter(|| black_box(read_enum_from_value::<Status>(black_box(&numeric))));
    });
}

criterion_group!(benches, bench_typed_reads, bench_enum_decoding);
criterion_main!(benches);
