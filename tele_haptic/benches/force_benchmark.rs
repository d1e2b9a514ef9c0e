//! Force-field micro-benchmark.
//!
//! Measures per-tick cost of the individual fixture kernels and of a full
//! composed field evaluation, which must stay a small fraction of the
//! 1 ms cycle period.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use tele_common::math::Vec3;
use tele_haptic::force::{
    Fixture, ForceField, box_containment_force, damping_force, sphere_barrier_force,
    sphere_well_force,
};

const CENTER: Vec3 = Vec3::new(0.0, -0.14, 0.2);

fn reference_field() -> ForceField {
    ForceField::from_fixtures(
        &[
            Fixture::SphereBarrier {
                center: CENTER,
                radius: 0.08,
                stiffness: 100.0,
            },
            Fixture::SphereWell {
                center: CENTER,
                radius: 0.1,
                stiffness: 200.0,
            },
            Fixture::BoxContainment {
                center: CENTER,
                half_extents: Vec3::new(0.1, 0.1, 0.1),
                stiffness: 80.0,
            },
        ],
        2.0,
    )
    .expect("fits within fixture capacity")
}

fn bench_fixture_kernels(c: &mut Criterion) {
    let inside = CENTER + Vec3::new(0.04, 0.01, -0.02);
    let outside = CENTER + Vec3::new(0.2, 0.0, 0.1);
    let velocity = Vec3::new(0.05, -0.2, 0.1);

    c.bench_function("sphere_barrier_force", |b| {
        b.iter(|| sphere_barrier_force(black_box(CENTER), 0.08, black_box(inside), 100.0))
    });
    c.bench_function("sphere_well_force", |b| {
        b.iter(|| sphere_well_force(black_box(CENTER), 0.1, black_box(outside), 200.0))
    });
    c.bench_function("box_containment_force", |b| {
        b.iter(|| {
            box_containment_force(
                black_box(CENTER),
                Vec3::new(0.1, 0.1, 0.1),
                black_box(outside),
                80.0,
            )
        })
    });
    c.bench_function("damping_force", |b| {
        b.iter(|| damping_force(black_box(velocity), 2.0))
    });
}

fn bench_field_evaluate(c: &mut Criterion) {
    let field = reference_field();
    let position = CENTER + Vec3::new(0.04, 0.01, -0.02);
    let velocity = Vec3::new(0.05, -0.2, 0.1);

    c.bench_function("force_field_evaluate", |b| {
        b.iter(|| field.evaluate(black_box(position), black_box(velocity)))
    });
}

criterion_group!(benches, bench_fixture_kernels, bench_field_evaluate);
criterion_main!(benches);
