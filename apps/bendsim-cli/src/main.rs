mod demo;

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use bendsim_ability::{
    AbilityRegistry, ActivationMethod, ActorState, Element, EngineConfig, TickReport, WorldSession,
};
use bendsim_common::{BlockAccess, BlockPos, BlockState, EntityId, ManualClock, Material};
use bendsim_kernel::{EntityData, World};
use clap::{Parser, Subcommand};
use glam::DVec3;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bendsim-cli", about = "Run reference abilities against an in-memory world")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and the registered reference archetypes
    Info,
    /// Run the demo scenario for a number of ticks
    Run {
        /// Number of ticks to simulate
        #[arg(short, long, default_value = "200")]
        ticks: u64,
        /// World seed
        #[arg(short, long, default_value = "42")]
        seed: u64,
        /// Engine config (JSON). Defaults to the built-in demo config.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Step a world of drifting entities and check that replay matches
    Replay {
        #[arg(short, long, default_value = "50")]
        ticks: u64,
        #[arg(short, long, default_value = "42")]
        seed: u64,
        #[arg(short, long, default_value = "5")]
        entities: usize,
    },
    /// Validate an engine config and print the attributes it resolves to
    Config {
        /// Engine config (JSON). Defaults to the built-in demo config.
        path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("bendsim-cli v{}", env!("CARGO_PKG_VERSION"));
            let registry = registry()?;
            for (id, descriptor) in registry.iter() {
                println!(
                    "{id} {:<12} element={} activations={:?}",
                    descriptor.name, descriptor.element, descriptor.activations
                );
            }
        }
        Commands::Run {
            ticks,
            seed,
            config,
        } => run(ticks, seed, load_config(config.as_ref())?)?,
        Commands::Replay {
            ticks,
            seed,
            entities,
        } => replay(ticks, seed, entities),
        Commands::Config { path } => {
            let config = load_config(path.as_ref())?;
            let mut registry = registry()?;
            registry.apply_config(&config);
            for (id, descriptor) in registry.iter() {
                let enabled = registry.is_enabled(id);
                let attributes = registry
                    .attributes(id)
                    .map(serde_json::to_string)
                    .transpose()?
                    .unwrap_or_default();
                println!("{} enabled={enabled} {attributes}", descriptor.name);
            }
        }
    }

    Ok(())
}

fn registry() -> anyhow::Result<AbilityRegistry> {
    let mut registry = AbilityRegistry::new();
    demo::register_all(&mut registry)?;
    Ok(registry)
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(demo::config());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config = EngineConfig::from_json(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

struct Cast {
    actor: EntityId,
    archetype: &'static str,
    method: ActivationMethod,
    every: u64,
}

impl Cast {
    fn new(actor: EntityId, archetype: &'static str, method: ActivationMethod, every: u64) -> Self {
        Self {
            actor,
            archetype,
            method,
            every,
        }
    }
}

fn run(ticks: u64, seed: u64, config: EngineConfig) -> anyhow::Result<()> {
    let clock = Rc::new(ManualClock::new());
    let step = config.tick();
    let mut session = WorldSession::new(registry()?, config, Rc::clone(&clock))?;
    let mut world = World::with_seed(seed);

    // A pool to draw water from and a few bystanders to push around.
    world.fill(
        BlockPos::new(2, 63, -1),
        BlockPos::new(4, 63, 1),
        BlockState::of(Material::Water),
    );
    world.spawn(EntityData::living(DVec3::new(6.0, 64.0, 0.5)));
    for x in [8.0, 9.5] {
        world.spawn(EntityData::living(DVec3::new(x, 64.0, 2.5)));
    }

    let mut actor = |world: &mut World, at: DVec3, look: DVec3, element: Element, sneaking: bool| {
        let mut state = ActorState::new(EntityId::new(), at).with_element(element);
        state.look(look);
        state.sneaking = sneaking;
        world.spawn_with_id(state.id, EntityData::living(at));
        let id = state.id;
        session.upsert_actor(state);
        id
    };
    let gust = actor(&mut world, DVec3::new(0.5, 64.0, 0.5), DVec3::X, Element::Air, false);
    let warden = actor(&mut world, DVec3::new(16.5, 64.0, 0.5), -DVec3::X, Element::Air, true);
    let digger = actor(
        &mut world,
        DVec3::new(0.5, 64.0, 8.5),
        DVec3::new(1.0, -1.0, 0.0),
        Element::Earth,
        true,
    );
    let tide = actor(&mut world, DVec3::new(-1.5, 64.0, 0.5), DVec3::X, Element::Water, true);

    let casts = [
        Cast::new(gust, demo::AIR_BLAST, ActivationMethod::Punch, 30),
        Cast::new(warden, demo::AIR_SHIELD, ActivationMethod::Sneak, 100),
        Cast::new(digger, demo::EARTH_TUNNEL, ActivationMethod::Sneak, 60),
        Cast::new(tide, demo::TORRENT, ActivationMethod::Sneak, 80),
    ];

    // Casts requested from a worker thread land through the handoff.
    let handoff = session.handoff();
    let worker = std::thread::spawn(move || {
        handoff.submit(move |session, world| {
            let cast =
                session.activate_named(world, gust, demo::AIR_BLAST, ActivationMethod::Punch);
            if let Err(reason) = cast {
                tracing::info!(%reason, "handoff cast rejected");
            }
        })
    });
    if !worker.join().map_err(|_| anyhow::anyhow!("handoff worker panicked"))? {
        anyhow::bail!("session dropped before the handoff was delivered");
    }

    let mut totals = TickReport::default();
    for tick in 0..ticks {
        for cast in casts.iter().filter(|c| tick % c.every == 0) {
            match session.activate_named(&mut world, cast.actor, cast.archetype, cast.method) {
                Ok(id) => tracing::info!(tick, %id, archetype = cast.archetype, "cast"),
                Err(reason) => {
                    tracing::info!(tick, archetype = cast.archetype, %reason, "cast rejected")
                }
            }
        }

        let report = session.run_tick(&mut world);
        world.step();
        clock.advance(step);

        for fault in &report.faults {
            tracing::warn!(%fault, "fault");
        }
        if report.collisions + report.entity_hits + report.reverted > 0 {
            tracing::info!(
                tick = report.tick,
                collisions = report.collisions,
                entity_hits = report.entity_hits,
                reverted = report.reverted,
                active = report.active,
                "tick"
            );
        }
        totals.updated += report.updated;
        totals.collisions += report.collisions;
        totals.entity_hits += report.entity_hits;
        totals.removed += report.removed;
        totals.reverted += report.reverted;
        totals.handoffs += report.handoffs;
        totals.faults.extend(report.faults);
    }

    println!("Ran {ticks} ticks (seed={seed})");
    println!(
        "updates={} collisions={} entity_hits={} removed={} reverted={} handoffs={} faults={}",
        totals.updated,
        totals.collisions,
        totals.entity_hits,
        totals.removed,
        totals.reverted,
        totals.handoffs,
        totals.faults.len()
    );
    println!(
        "live instances={} overlay records={} edited blocks={}",
        session.abilities().count(),
        session.overlay().len(),
        world.edited_block_count()
    );

    let (destroyed, reverted) = session.teardown(&mut world);
    println!("Teardown: destroyed={destroyed} reverted={reverted}");
    println!("Edited blocks after teardown: {}", world.edited_block_count());
    Ok(())
}

fn replay(ticks: u64, seed: u64, entities: usize) {
    println!("Deterministic replay: seed={seed}, ticks={ticks}, entities={entities}");

    let mut w1 = World::with_seed(seed);
    for i in 0..entities {
        let mut data = EntityData::living(DVec3::new(i as f64 * 2.0, 64.0, 0.0));
        data.velocity = DVec3::new(0.0, 0.0, 0.1 * (i + 1) as f64);
        w1.spawn(data);
    }
    w1.set_block(BlockPos::new(0, 63, 0), BlockState::AIR);
    for _ in 0..ticks {
        w1.step();
    }

    let w2 = World::replay_onto(World::with_seed(seed), w1.events());

    println!(
        "Run 1: tick={}, entities={}, hash={:#x}",
        w1.tick(),
        w1.entity_count(),
        w1.state_hash()
    );
    println!(
        "Replay: tick={}, entities={}, hash={:#x}",
        w2.tick(),
        w2.entity_count(),
        w2.state_hash()
    );
    println!(
        "Match: {}",
        if w1.state_hash() == w2.state_hash() {
            "OK"
        } else {
            "MISMATCH"
        }
    );
}
