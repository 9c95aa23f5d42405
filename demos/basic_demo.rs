//! Basic demonstration of the Wasteland simulation core.
//!
//! Run with: cargo run --example basic_demo

use wasteland_sim::{
    AttackConfig, BrainKind, Disposition, NpcSpec, SimWorld, Threat, TileGrid, ZoneId,
};

fn main() {
    println!("=== Wasteland - Simulation Demo ===\n");

    let mut sim = SimWorld::new();
    let mut grid = TileGrid::new(50, 30, wasteland_sim::zone::TILE_GRASS);
    grid.wall_border();
    // A wall segment for the raiders to flank around
    for r in 8..22 {
        grid.set_tile(r, 25, wasteland_sim::zone::TILE_WALL);
    }
    let zone = sim.add_zone("outskirts", grid);

    sim.spawn_player(zone, 5.0, 15.0);
    spawn_guards(&mut sim, zone);
    spawn_raiders(&mut sim, zone);
    sim.spawn_container(zone, 6.0, 6.0, &[("stew", 5), ("ration", 10)]);

    println!("Initial state:");
    print_snapshot(&mut sim);

    println!("\nRunning simulation for 600 ticks (10 seconds at 60 ticks/sec)...\n");
    for tick in 0..600 {
        sim.step(1.0 / 60.0);
        if (tick + 1) % 120 == 0 {
            println!(
                "--- Tick {} (t={:.1}s) ---",
                sim.current_tick(),
                sim.current_time()
            );
            print_snapshot(&mut sim);
        }
    }

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", sim.snapshot().to_json_pretty().unwrap());
}

fn spawn_guards(sim: &mut SimWorld, zone: ZoneId) {
    for i in 0..3 {
        sim.spawn_npc(NpcSpec {
            name: format!("guard_{i}"),
            zone,
            x: 35.0,
            y: 10.0 + i as f32 * 4.0,
            kind: BrainKind::Guard,
            group: "settlers".to_string(),
            disposition: Disposition::Neutral,
            attack: AttackConfig::ranged(9.0, 1.0),
            threat: Threat {
                flee_threshold: 0.15,
                ..Default::default()
            },
            ..Default::default()
        });
    }
}

fn spawn_raiders(sim: &mut SimWorld, zone: ZoneId) {
    for i in 0..4 {
        sim.spawn_npc(NpcSpec {
            name: format!("raider_{i}"),
            zone,
            x: 12.0,
            y: 8.0 + i as f32 * 4.0,
            kind: if i % 2 == 0 {
                BrainKind::HostileMelee
            } else {
                BrainKind::HostileRanged
            },
            group: "raiders".to_string(),
            attack: if i % 2 == 0 {
                AttackConfig::melee(1.5, 0.6)
            } else {
                AttackConfig::ranged(8.0, 1.2)
            },
            ..Default::default()
        });
    }
}

fn print_snapshot(sim: &mut SimWorld) {
    let snapshot = sim.snapshot();
    for ent in &snapshot.entities {
        println!(
            "    {:<10} [{:<8}] pos=({:5.1}, {:5.1}) hp={:3.0}/{:3.0} mode={}",
            ent.name, ent.faction, ent.x, ent.y, ent.health, ent.health_max, ent.mode
        );
    }
}
