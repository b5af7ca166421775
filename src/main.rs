// src/main.rs
//! meshsim driver
//!
//! Loads a configuration (optional first argument, YAML), builds a
//! three-tier demo topology, runs it to the horizon, and writes monitoring
//! reports next to the working directory.

use anyhow::Result;
use meshsim::model::program::AutoScalerSpec;
use meshsim::monitoring::report::{CsvSink, JsonLinesSink};
use meshsim::{
    BackoffStrategy, Behavior, ClientDef, Program, RuleBasedStrategy, ServiceDef, Simulation,
    SimulationConfig,
};
use meshsim::model::signal::{Periodic, Signal};
use std::rc::Rc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("meshsim v{}", meshsim::VERSION);

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!(path, "loading configuration");
            SimulationConfig::load(path)?
        }
        None => SimulationConfig::default(),
    };

    let mut simulation = Simulation::new(config);
    simulation.add_sink(CsvSink::create("report.csv")?);
    simulation.add_sink(JsonLinesSink::create("report.jsonl")?);
    simulation.load(demo_topology())?;

    let fired = simulation.run()?;
    info!(fired, "simulation complete, reports written");

    let frontend = simulation
        .service("frontend")
        .expect("frontend loaded above");
    info!(
        workers = frontend.workers().capacity(),
        queued = frontend.queue().size(),
        "frontend at horizon"
    );
    Ok(())
}

/// Browser traffic → frontend → product + inventory, with a flaky inventory
/// dependency retried under exponential backoff and an autoscaled frontend.
fn demo_topology() -> Program {
    let inventory_call = Behavior::retry(
        Behavior::query_with("inventory", "check", 0, Some(50)),
        3,
        BackoffStrategy::exponential(5),
    )
    .expect("limit >= 1");

    let diurnal: Rc<dyn Signal> = Rc::new(Periodic {
        base: 8.0,
        amplitude: 4.0,
        period: 2_000.0,
    });

    Program::new()
        .service(
            ServiceDef::new("product", 2)
                .operation("lookup", Behavior::think(12)),
        )
        .service(
            ServiceDef::new("inventory", 2).tail_drop(16).operation(
                "check",
                Behavior::sequence(vec![Behavior::think(8), Behavior::fail(0.05).expect("p in range")]),
            ),
        )
        .service(
            ServiceDef::new("frontend", 4)
                .tail_drop(32)
                .operation(
                    "render",
                    Behavior::sequence(vec![
                        Behavior::think(3),
                        Behavior::query("product", "lookup"),
                        Behavior::ignore_error(inventory_call),
                        Behavior::think(2),
                    ]),
                )
                .autoscaler(
                    AutoScalerSpec::new(200, 2, 8, Box::new(RuleBasedStrategy::new(0.3, 0.8)))
                        .expect("band well-formed"),
                ),
        )
        .client(
            ClientDef::new("browsers", Behavior::query("frontend", "render"))
                .start(0)
                .period(diurnal),
        )
}
