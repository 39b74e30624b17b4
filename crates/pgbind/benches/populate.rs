use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pgbind::qb::{SelectQuery, expr};
use pgbind::{Params, Value, populate};

/// Template with `n` `:pN:` placeholders and a matching parameter map:
/// SELECT * FROM t WHERE c0 = :p0: AND c1 = :p1: ...
fn template_with_params(n: usize) -> (String, Params) {
    let mut sql = String::from("SELECT * FROM t WHERE ");
    let mut params = Params::new();
    for i in 0..n {
        if i > 0 {
            sql.push_str(" AND ");
        }
        sql.push_str(&format!("c{i} = :p{i}:"));
        let value = if i % 2 == 0 {
            Value::from(i as i64)
        } else {
            Value::from(format!("it's value {i}"))
        };
        params.insert(format!("p{i}"), value);
    }
    (sql, params)
}

fn bench_populate(c: &mut Criterion) {
    let mut group = c.benchmark_group("template/populate");

    for n in [1, 5, 10, 50, 100] {
        let input = template_with_params(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &input, |b, (sql, params)| {
            b.iter(|| black_box(populate(sql, params)));
        });
    }

    group.finish();
}

fn bench_populate_in_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("template/in_list");

    for n in [5, 20, 100, 500] {
        let mut params = Params::new();
        params.insert("ids".to_string(), Value::from((0..n).collect::<Vec<i64>>()));
        group.bench_with_input(BenchmarkId::from_parameter(n), &params, |b, params| {
            b.iter(|| black_box(populate("SELECT * FROM t WHERE id IN :ids:", params)));
        });
    }

    group.finish();
}

fn bench_select_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("qb/select_compile");

    for n in [1, 5, 20] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut query = SelectQuery::new().from("users", "u").all_columns("u");
                for i in 0..n {
                    let mut params = Params::new();
                    params.insert("v".to_string(), Value::from(i as i64));
                    query = query.and_where(expr(format!("u.c{i} = :v:"), params));
                }
                black_box(query.to_sql())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_populate,
    bench_populate_in_list,
    bench_select_compile
);
criterion_main!(benches);
