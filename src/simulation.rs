// src/simulation.rs
//! Simulation facade
//!
//! Owns the kernel (scheduler, root environment, evaluator), loads a
//! [`Program`] into live runtime entities, wires monitoring, and drives the
//! run. Loading validates the program as a whole: definition names must be
//! unique, and every remote call in every behavior body must name a service
//! and operation that exist. A program that loads cannot fail at runtime
//! for a dangling name.

use crate::kernel::clock::Tick;
use crate::kernel::env::{Env, Value};
use crate::kernel::scheduler::Scheduler;
use crate::model::program::{Definition, Program, ThrottlingSpec};
use crate::monitoring::report::ReportSink;
use crate::monitoring::monitor::ServiceMonitor;
use crate::runtime::autoscaler;
use crate::runtime::client::ClientStub;
use crate::runtime::evaluator::Evaluator;
use crate::runtime::service::Service;
use crate::runtime::task_pool::{PriorityTaskPool, TaskPool};
use crate::runtime::throttling::{NoThrottling, TailDrop};
use crate::utils::config::SimulationConfig;
use crate::utils::errors::{EngineError, Result};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::{debug, info};

/// A configured, loadable, runnable simulation
pub struct Simulation {
    config: SimulationConfig,
    scheduler: Rc<Scheduler>,
    root: Rc<Env>,
    evaluator: Rc<Evaluator>,
    services: Vec<Rc<Service>>,
    clients: Vec<Rc<ClientStub>>,
    monitors: Rc<RefCell<Vec<Rc<ServiceMonitor>>>>,
    sinks: Rc<RefCell<Vec<Rc<dyn ReportSink>>>>,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        let scheduler = Scheduler::new(config.stream_seed("scheduler"));
        let root = Env::root();
        let evaluator = Evaluator::new(&scheduler, &root, config.stream_seed("evaluator"));
        Self {
            config,
            scheduler,
            root,
            evaluator,
            services: Vec::new(),
            clients: Vec::new(),
            monitors: Rc::new(RefCell::new(Vec::new())),
            sinks: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Look up a loaded service by name
    pub fn service(&self, name: &str) -> Option<&Rc<Service>> {
        self.services.iter().find(|service| service.name() == name)
    }

    /// Look up a loaded client stub by name
    pub fn client(&self, name: &str) -> Option<&Rc<ClientStub>> {
        self.clients.iter().find(|client| client.name() == name)
    }

    /// Register a sink for monitoring records
    pub fn add_sink(&self, sink: Rc<dyn ReportSink>) {
        self.sinks.borrow_mut().push(sink);
    }

    /// Materialize a program into live entities
    ///
    /// Validates name uniqueness and call-target resolution, builds every
    /// service and client, installs monitors, attaches autoscalers, arms
    /// client emission and the monitoring loop.
    pub fn load(&mut self, program: Program) -> Result<()> {
        validate(&program)?;

        for definition in program.definitions {
            match definition {
                Definition::Service(def) => {
                    let inner = PriorityTaskPool::new(def.discipline);
                    let queue: Rc<dyn TaskPool> = match def.throttling {
                        ThrottlingSpec::None => NoThrottling::new(inner),
                        ThrottlingSpec::TailDrop { capacity } => TailDrop::new(capacity, inner)?,
                    };
                    let service = Service::build(&def.name, &self.root, queue, &self.scheduler);
                    service.bind_evaluator(&self.evaluator);
                    service.workers().set_capacity(def.workers);
                    for operation in def.operations {
                        service.define_operation(&operation.name, operation.body);
                    }
                    if let Some(spec) = def.autoscaler {
                        autoscaler::attach(&service, spec);
                    }
                    self.root
                        .define(&def.name, Value::Service(Rc::clone(&service)));
                    self.monitors
                        .borrow_mut()
                        .push(ServiceMonitor::install(&service));
                    debug!(service = def.name, workers = def.workers, "service loaded");
                    self.services.push(service);
                }
                Definition::Client(def) => {
                    let client = ClientStub::build(
                        &def.name,
                        &self.root,
                        def.body,
                        def.period,
                        &self.scheduler,
                    );
                    client.bind_evaluator(&self.evaluator);
                    self.root
                        .define(&def.name, Value::Client(Rc::clone(&client)));
                    client.start(def.start);
                    debug!(client = def.name, start = def.start, "client loaded");
                    self.clients.push(client);
                }
            }
        }

        self.arm_monitoring();
        info!(
            services = self.services.len(),
            clients = self.clients.len(),
            "program loaded"
        );
        Ok(())
    }

    fn arm_monitoring(&self) {
        let period = self.config.monitor_period;
        let monitors = Rc::clone(&self.monitors);
        let sinks = Rc::clone(&self.sinks);
        self.scheduler.schedule_every(period, move |tick| {
            for monitor in monitors.borrow().iter() {
                let Some(record) = monitor.sample(tick, period) else {
                    continue;
                };
                for sink in sinks.borrow().iter() {
                    if let Err(err) = sink.report(&record) {
                        tracing::warn!(error = %err, "report sink failed");
                    }
                }
            }
        });
    }

    /// Run to the configured horizon; returns the number of events fired
    pub fn run(&self) -> Result<u64> {
        self.run_until(self.config.horizon)
    }

    /// Run to an explicit limit, logging progress along the way
    pub fn run_until(&self, limit: Tick) -> Result<u64> {
        let every = self.config.progress_every.max(1);
        let mut last_logged = 0;
        let fired = self.scheduler.run_until_with(limit, |tick| {
            if tick / every > last_logged {
                last_logged = tick / every;
                info!(tick, "simulation progress");
            }
        })?;
        for sink in self.sinks.borrow().iter() {
            sink.flush()?;
        }
        info!(fired, now = self.scheduler.now(), "run finished");
        Ok(fired)
    }
}

/// Whole-program validation: unique names, resolvable call targets
fn validate(program: &Program) -> Result<()> {
    let mut operations: HashMap<&str, HashSet<&str>> = HashMap::new();
    let mut names: HashSet<&str> = HashSet::new();

    for definition in &program.definitions {
        let name = match definition {
            Definition::Service(def) => {
                let ops = operations.entry(def.name.as_str()).or_default();
                for operation in &def.operations {
                    ops.insert(operation.name.as_str());
                }
                def.name.as_str()
            }
            Definition::Client(def) => def.name.as_str(),
        };
        if !names.insert(name) {
            return Err(EngineError::DuplicateDefinition(name.to_string()));
        }
    }

    let mut dangling = None;
    let mut check = |service: &str, operation: &str| {
        if dangling.is_some() {
            return;
        }
        match operations.get(service) {
            None => dangling = Some(EngineError::UnknownService(service.to_string())),
            Some(ops) if !ops.contains(operation) => {
                dangling = Some(EngineError::UnknownOperation(
                    service.to_string(),
                    operation.to_string(),
                ))
            }
            Some(_) => {}
        }
    };
    for definition in &program.definitions {
        match definition {
            Definition::Service(def) => {
                for operation in &def.operations {
                    operation.body.for_each_call(&mut check);
                }
            }
            Definition::Client(def) => def.body.for_each_call(&mut check),
        }
    }
    match dangling {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::behavior::Behavior;
    use crate::model::program::{AutoScalerSpec, ClientDef, ServiceDef};
    use crate::monitoring::listener::Listener;
    use crate::monitoring::report::MemorySink;
    use crate::runtime::autoscaler::{LoadSnapshot, ScalingStrategy};
    use crate::runtime::backoff::BackoffStrategy;
    use crate::runtime::task::Task;
    use std::cell::Cell;

    fn config(horizon: Tick) -> SimulationConfig {
        SimulationConfig {
            seed: 7,
            horizon,
            monitor_period: 100,
            progress_every: 1_000,
        }
    }

    /// Counts distinguished lifecycle events on a service
    #[derive(Default)]
    struct Tally {
        created: Cell<u64>,
        rejected: Cell<u64>,
        successful: Cell<u64>,
        failed: Cell<u64>,
    }

    impl Listener for Tally {
        fn task_created(&self, _task: &Rc<Task>) {
            self.created.set(self.created.get() + 1);
        }
        fn task_rejected(&self, _task: &Rc<Task>) {
            self.rejected.set(self.rejected.get() + 1);
        }
        fn task_successful(&self, _task: &Rc<Task>) {
            self.successful.set(self.successful.get() + 1);
        }
        fn task_failed(&self, _task: &Rc<Task>) {
            self.failed.set(self.failed.get() + 1);
        }
    }

    fn tally(service: &Rc<Service>) -> Rc<Tally> {
        let tally = Rc::new(Tally::default());
        service
            .dispatcher()
            .register(Rc::clone(&tally) as Rc<dyn Listener>);
        tally
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut simulation = Simulation::new(config(100));
        let program = Program::new()
            .service(ServiceDef::new("svc", 1).operation("op", Behavior::think(1)))
            .client(ClientDef::new("svc", Behavior::think(1)));
        let err = simulation.load(program).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateDefinition(name) if name == "svc"));
    }

    #[test]
    fn test_dangling_call_targets_rejected() {
        let mut simulation = Simulation::new(config(100));
        let program = Program::new()
            .client(ClientDef::new("load", Behavior::query("ghost", "op")));
        let err = simulation.load(program).unwrap_err();
        assert!(matches!(err, EngineError::UnknownService(name) if name == "ghost"));

        let mut simulation = Simulation::new(config(100));
        let program = Program::new()
            .service(ServiceDef::new("svc", 1).operation("op", Behavior::think(1)))
            .client(ClientDef::new("load", Behavior::query("svc", "missing")));
        let err = simulation.load(program).unwrap_err();
        assert!(
            matches!(err, EngineError::UnknownOperation(service, op)
                if service == "svc" && op == "missing")
        );
    }

    /// Records the completion tick and response time of every successful
    /// task on a service
    struct ReplyLog {
        scheduler: Rc<Scheduler>,
        replies: RefCell<Vec<(Tick, Option<Tick>)>>,
    }

    impl Listener for ReplyLog {
        fn task_successful(&self, task: &Rc<Task>) {
            self.replies
                .borrow_mut()
                .push((self.scheduler.now(), task.request().response_time()));
        }
    }

    fn reply_log(service: &Rc<Service>) -> Rc<ReplyLog> {
        let log = Rc::new(ReplyLog {
            scheduler: Rc::clone(service.scheduler()),
            replies: RefCell::new(Vec::new()),
        });
        service
            .dispatcher()
            .register(Rc::clone(&log) as Rc<dyn Listener>);
        log
    }

    #[test]
    fn test_request_reply_timeline() {
        // One client querying a think(5) operation, emitting every 10 from
        // tick 10: sends at 10 and 20, each accepted on arrival, each
        // replied 5 ticks later. The run's last event is the reply at 25.
        let mut simulation = Simulation::new(config(1_000));
        let program = Program::new()
            .service(ServiceDef::new("svc", 1).operation("serve", Behavior::think(5)))
            .client(
                ClientDef::new("load", Behavior::query("svc", "serve"))
                    .start(10)
                    .every(10),
            );
        simulation.load(program).unwrap();
        let log = reply_log(simulation.service("svc").unwrap());

        simulation.run_until(25).unwrap();

        let client = simulation.client("load").unwrap();
        assert_eq!(client.emitted(), 2);
        assert_eq!(client.succeeded(), 2);
        assert_eq!(
            *log.replies.borrow(),
            vec![(15, Some(5)), (25, Some(5))]
        );
        assert_eq!(simulation.scheduler().now(), 25);
    }

    #[test]
    fn test_nested_query_response_time_compounds() {
        // Client queries a frontend whose operation thinks 5 then queries a
        // backend that thinks 5. Emission at 10 travels: frontend accepts at
        // 10, thinks until 15, backend query accepted at 15, replies at 20,
        // frontend replies at 20; the frontend task's response time is 10.
        let mut simulation = Simulation::new(config(1_000));
        let program = Program::new()
            .service(
                ServiceDef::new("backend", 1).operation("fetch", Behavior::think(5)),
            )
            .service(
                ServiceDef::new("frontend", 1).operation(
                    "render",
                    Behavior::sequence(vec![
                        Behavior::think(5),
                        Behavior::query("backend", "fetch"),
                    ]),
                ),
            )
            .client(
                ClientDef::new("browser", Behavior::query("frontend", "render"))
                    .start(10)
                    .every(500),
            );
        simulation.load(program).unwrap();
        let frontend = reply_log(simulation.service("frontend").unwrap());
        let backend = reply_log(simulation.service("backend").unwrap());

        simulation.run_until(100).unwrap();

        let client = simulation.client("browser").unwrap();
        assert_eq!(client.succeeded(), 1);
        assert_eq!(*backend.replies.borrow(), vec![(20, Some(5))]);
        assert_eq!(*frontend.replies.borrow(), vec![(20, Some(10))]);
    }

    #[test]
    fn test_rejection_under_load() {
        // One worker pinned by a think longer than the run, queue capacity
        // 2: of four back-to-back arrivals one is assigned, two queue, and
        // exactly one is turned away.
        let mut simulation = Simulation::new(config(1_000));
        let program = Program::new()
            .service(
                ServiceDef::new("svc", 1)
                    .tail_drop(2)
                    .operation("slow", Behavior::think(100_000)),
            )
            .client(
                ClientDef::new("burst", Behavior::trigger("svc", "slow"))
                    .start(0)
                    .every(1),
            );
        simulation.load(program).unwrap();
        let counts = tally(simulation.service("svc").unwrap());

        simulation.run_until(4).unwrap();

        assert_eq!(counts.created.get(), 4);
        assert_eq!(counts.rejected.get(), 1);
    }

    #[test]
    fn test_retry_recovers_after_timeouts() {
        // The backend's single worker is pinned until tick 31 by a warmup
        // call, so the caller's first query (timeout 10) expires queued at
        // 15 and the second at 27. The third attempt, queued at 29, is
        // answered at 32, inside its own timeout window.
        let mut simulation = Simulation::new(config(1_000));
        let query = Behavior::query_with("backend", "fetch", 0, Some(10));
        let program = Program::new()
            .service(
                ServiceDef::new("backend", 1)
                    .operation("fetch", Behavior::think(1))
                    .operation("warmup", Behavior::think(30)),
            )
            .client(
                ClientDef::new("warm", Behavior::trigger("backend", "warmup"))
                    .start(0)
                    .every(500),
            )
            .client(
                ClientDef::new(
                    "caller",
                    Behavior::retry(query, 4, BackoffStrategy::constant(2)).unwrap(),
                )
                .start(5)
                .every(500),
            );
        simulation.load(program).unwrap();

        simulation.run_until(100).unwrap();

        let caller = simulation.client("caller").unwrap();
        assert_eq!(caller.emitted(), 1);
        assert_eq!(caller.succeeded(), 1);
        assert_eq!(caller.failed(), 0);
    }

    #[test]
    fn test_ignore_error_turns_failure_into_success() {
        let mut simulation = Simulation::new(config(1_000));
        let program = Program::new()
            .service(
                ServiceDef::new("flaky", 1)
                    .operation("roll", Behavior::fail(1.0).unwrap()),
            )
            .client(
                ClientDef::new(
                    "stoic",
                    Behavior::ignore_error(Behavior::query("flaky", "roll")),
                )
                .start(0)
                .every(10),
            )
            .client(
                ClientDef::new("fragile", Behavior::query("flaky", "roll"))
                    .start(0)
                    .every(10),
            );
        simulation.load(program).unwrap();

        simulation.run_until(95).unwrap();

        let stoic = simulation.client("stoic").unwrap();
        let fragile = simulation.client("fragile").unwrap();
        assert_eq!(stoic.emitted(), 10);
        assert_eq!(stoic.succeeded(), 10);
        assert_eq!(fragile.failed(), 10);
    }

    struct DemandTen;

    impl ScalingStrategy for DemandTen {
        fn desired(&self, _snapshot: &LoadSnapshot) -> usize {
            10
        }
    }

    #[test]
    fn test_autoscaler_clamped_during_run() {
        let mut simulation = Simulation::new(config(1_000));
        let program = Program::new().service(
            ServiceDef::new("svc", 3)
                .operation("op", Behavior::think(1))
                .autoscaler(AutoScalerSpec::new(50, 2, 4, Box::new(DemandTen)).unwrap()),
        );
        simulation.load(program).unwrap();
        simulation.run_until(200).unwrap();

        assert_eq!(simulation.service("svc").unwrap().workers().capacity(), 4);
    }

    #[test]
    fn test_same_seed_reproduces_run() {
        let build = || {
            Program::new()
                .service(
                    ServiceDef::new("svc", 2)
                        .tail_drop(3)
                        .operation(
                            "op",
                            Behavior::sequence(vec![
                                Behavior::think(3),
                                Behavior::fail(0.3).unwrap(),
                            ]),
                        ),
                )
                .client(
                    ClientDef::new("load", Behavior::query("svc", "op"))
                        .start(0)
                        .every(2),
                )
        };

        let run = |seed: u64| {
            let mut simulation = Simulation::new(SimulationConfig {
                seed,
                horizon: 500,
                ..SimulationConfig::default()
            });
            simulation.load(build()).unwrap();
            simulation.run().unwrap();
            let client = simulation.client("load").unwrap();
            (
                simulation.scheduler().fired(),
                client.succeeded(),
                client.failed(),
            )
        };

        assert_eq!(run(11), run(11));
        // Failure draws make equality across seeds overwhelmingly unlikely
        assert_ne!(run(11).2, 0);
    }

    #[test]
    fn test_monitoring_records_flow_to_sink() {
        let mut simulation = Simulation::new(config(1_000));
        let sink = MemorySink::new();
        simulation.add_sink(sink.clone());
        let program = Program::new()
            .service(ServiceDef::new("svc", 1).operation("op", Behavior::think(2)))
            .client(
                ClientDef::new("load", Behavior::query("svc", "op"))
                    .start(0)
                    .every(5),
            );
        simulation.load(program).unwrap();
        simulation.run_until(450).unwrap();

        let records = sink.records();
        // Samples at 100, 200, 300, 400
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|record| record.service == "svc"));
        assert!(records[0].throughput > 0.0);
        assert_eq!(records[0].mean_response_time, 2.0);
    }
}
