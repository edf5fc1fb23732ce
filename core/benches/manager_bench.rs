use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use transactron::body::MethodDef;
use transactron::elab::{Design, ElabContext};
use transactron::layout::Layout;
use transactron::netlist::NetTable;
use transactron::pipeline::{elaborate, ElabOptions};
use transactron::registry::MethodParams;
use transactron::schedule::SchedulerKind;

// ── Design generators ───────────────────────────────────────────────────────

/// `n_transactions` contenders sharing one exclusive method: the worst
/// case for the arbiter cascade (a single connected component).
fn generate_contention(n_transactions: usize) -> (Design, NetTable) {
    let mut ctx = ElabContext::new();
    let put = ctx
        .add_method("put", Layout::empty(), Layout::empty(), MethodParams::default())
        .unwrap();
    ctx.def_method(put, |ctx, _| {
        let ready = ctx.nets().true_();
        let out = ctx.nets().wire_zero(&Layout::empty());
        Ok(MethodDef {
            ready,
            data_out: out,
        })
    })
    .unwrap();
    for i in 0..n_transactions {
        let t = ctx.add_transaction(&format!("t{i}")).unwrap();
        let req = ctx.input(format!("t{i}_req"));
        ctx.def_transaction(t, req, |ctx| {
            let args = ctx.nets().wire_zero(&Layout::empty());
            ctx.call(put, args).map(|_| ())
        })
        .unwrap();
    }
    ctx.finalize().unwrap()
}

/// `n_chains` independent producer/consumer pairs, each with a two-level
/// method chain: many small connected components.
fn generate_independent_chains(n_chains: usize) -> (Design, NetTable) {
    let mut ctx = ElabContext::new();
    for i in 0..n_chains {
        let ready = ctx.input(format!("leaf{i}_ready"));
        let leaf = ctx
            .add_method(
                &format!("leaf{i}"),
                Layout::empty(),
                Layout::empty(),
                MethodParams::default(),
            )
            .unwrap();
        ctx.def_method(leaf, |ctx, _| {
            let out = ctx.nets().wire_zero(&Layout::empty());
            Ok(MethodDef {
                ready,
                data_out: out,
            })
        })
        .unwrap();
        let relay = ctx
            .add_method(
                &format!("relay{i}"),
                Layout::empty(),
                Layout::empty(),
                MethodParams::default(),
            )
            .unwrap();
        ctx.def_method(relay, |ctx, _| {
            let args = ctx.nets().wire_zero(&Layout::empty());
            ctx.call(leaf, args)?;
            let ready = ctx.nets().true_();
            let out = ctx.nets().wire_zero(&Layout::empty());
            Ok(MethodDef {
                ready,
                data_out: out,
            })
        })
        .unwrap();
        let t = ctx.add_transaction(&format!("t{i}")).unwrap();
        let req = ctx.input(format!("t{i}_req"));
        ctx.def_transaction(t, req, |ctx| {
            let args = ctx.nets().wire_zero(&Layout::empty());
            ctx.call(relay, args).map(|_| ())
        })
        .unwrap();
    }
    ctx.finalize().unwrap()
}

// ── Benchmarks ──────────────────────────────────────────────────────────────

fn bench_contention_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    for n in [4, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let (design, table) = generate_contention(black_box(n));
                let result = elaborate(design, table, &ElabOptions::default()).unwrap();
                black_box(&result.netlist);
            });
        });
    }
    group.finish();
}

fn bench_independent_chains(c: &mut Criterion) {
    let mut group = c.benchmark_group("independent_chains");
    for n in [8, 32, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let (design, table) = generate_independent_chains(black_box(n));
                let result = elaborate(design, table, &ElabOptions::default()).unwrap();
                black_box(&result.netlist);
            });
        });
    }
    group.finish();
}

fn bench_scheduler_kinds(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_kind");
    for (name, kind) in [
        ("eager", SchedulerKind::EagerDeterministic),
        ("round_robin", SchedulerKind::RoundRobin),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &kind, |b, &kind| {
            b.iter(|| {
                let (design, table) = generate_contention(black_box(16));
                let options = ElabOptions {
                    scheduler: kind,
                    ..Default::default()
                };
                let result = elaborate(design, table, &options).unwrap();
                black_box(&result.netlist);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_contention_scaling,
    bench_independent_chains,
    bench_scheduler_kinds,
);
criterion_main!(benches);
