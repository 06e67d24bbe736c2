use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use nalgebra::dmatrix;
use dk_circuit::prelude::*;

fn resistor(r: Scalar) -> Arc<Element> {
    Arc::new(
        Element::builder()
            .mv(dmatrix![1.0])
            .mi(dmatrix![-r])
            .build()
            .expect("valid element"),
    )
}

fn capacitor(c: Scalar) -> Arc<Element> {
    Arc::new(
        Element::builder()
            .mv(dmatrix![1.0; 0.0])
            .mi(dmatrix![0.0; 1.0])
            .mx(dmatrix![-1.0 / c; 0.0])
            .mxd(dmatrix![0.0; -1.0])
            .build()
            .expect("valid element"),
    )
}

/// RC ladder with `sections` series resistors, each with a shunt capacitor.
fn build_ladder(sections: usize) -> Circuit {
    let mut circuit = Circuit::new();
    let mut upstream = Connector::from("in");
    for section in 0..sections {
        let r = resistor(1.0e3);
        let c = capacitor(100.0e-9);
        let node = format!("n{section}");
        circuit.connect([upstream, r.pin("1").expect("pin").into()]);
        circuit.connect([
            r.pin("2").expect("pin").into(),
            c.pin("1").expect("pin").into(),
            Connector::from(node.as_str()),
        ]);
        circuit.connect([c.pin("2").expect("pin").into(), Connector::from("gnd")]);
        upstream = Connector::from(node.as_str());
    }
    circuit
}

fn bench_ladder_topomat(c: &mut Criterion) {
    let mut group = c.benchmark_group("ladder_topomat");
    for sections in [8usize, 64, 256] {
        group.bench_function(BenchmarkId::new("sections", sections), |b| {
            b.iter_batched(
                || build_ladder(sections),
                |circuit| {
                    let _ = circuit.topomat().expect("well-formed ladder");
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ladder_topomat);
criterion_main!(benches);
