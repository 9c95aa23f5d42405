//! Tick-loop benchmark: a populated arena with mixed melee/ranged
//! combatants running the full system pipeline.
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use wasteland_sim::{
    AttackConfig, BrainKind, Disposition, NpcSpec, SimWorld, TileGrid, ZoneId,
};

fn populated_sim(npcs: usize) -> SimWorld {
    let mut sim = SimWorld::new();
    let mut grid = TileGrid::new(80, 60, wasteland_sim::zone::TILE_GRASS);
    grid.wall_border();
    let zone = sim.add_zone("bench", grid);
    sim.spawn_player(zone, 40.0, 30.0);

    for i in 0..npcs {
        let ranged = i % 3 == 0;
        spawn_combatant(&mut sim, zone, i, ranged);
    }
    sim
}

fn spawn_combatant(sim: &mut SimWorld, zone: ZoneId, i: usize, ranged: bool) {
    let cols = 12;
    let x = 5.0 + (i % cols) as f32 * 6.0;
    let y = 5.0 + (i / cols) as f32 * 6.0;
    sim.spawn_npc(NpcSpec {
        name: format!("npc_{i}"),
        zone,
        x,
        y,
        kind: if ranged {
            BrainKind::HostileRanged
        } else {
            BrainKind::HostileMelee
        },
        group: if i % 2 == 0 { "raiders" } else { "settlers" }.to_string(),
        disposition: Disposition::Hostile,
        hp: 10_000.0,
        attack: if ranged {
            AttackConfig::ranged(10.0, 1.0)
        } else {
            AttackConfig::melee(1.5, 0.6)
        },
        ..Default::default()
    });
}

fn bench_tick(c: &mut Criterion) {
    c.bench_function("tick_60_npcs", |b| {
        let mut sim = populated_sim(60);
        // Warm the FSMs so the measured ticks include live combat.
        for _ in 0..120 {
            sim.tick_systems(1.0 / 60.0);
        }
        b.iter(|| sim.tick_systems(1.0 / 60.0));
    });

    c.bench_function("tick_200_npcs", |b| {
        let mut sim = populated_sim(200);
        for _ in 0..120 {
            sim.tick_systems(1.0 / 60.0);
        }
        b.iter(|| sim.tick_systems(1.0 / 60.0));
    });
}

criterion_group!(benches, bench_tick);
criterion_main!(benches);
