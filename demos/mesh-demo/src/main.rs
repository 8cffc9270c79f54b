// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Load a JSON topology file, build it, and run the simulation to a given
//! end cycle (or to completion), printing a construction report and final
//! per-component traffic counts.
//!
//! ```text
//! mesh-demo --topology configs/ring.json --end-cycle 200
//! ```

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;
use weft_components::{Sink, Source, Store};
use weft_config::{ConfigError, Factory};
use weft_engine::{Engine, SimObject};

#[derive(Parser, Debug)]
#[command(about = "Run a WEFT topology from a JSON config file")]
struct Args {
    /// Path to the topology's root JSON file.
    #[arg(short, long)]
    topology: PathBuf,

    /// Cycle to stop the simulation at. Omit to run until the event queue
    /// drains on its own.
    #[arg(long)]
    end_cycle: Option<u64>,
}

fn register_types(factory: &mut Factory, engine: &Engine) {
    factory.register_simple_type("source", move |engine, name, params| {
        let count = params
            .get("count")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(10);
        let generator = Box::new((0..count).map(|i| (i as u32).to_le_bytes().to_vec()));
        let obj: Rc<RefCell<dyn SimObject>> = Source::new(name, engine.clone(), generator);
        Ok(obj)
    });

    factory.register_simple_type("sink", move |engine, name, _params| {
        let obj: Rc<RefCell<dyn SimObject>> = Sink::new(name, engine.clone());
        Ok(obj)
    });

    factory.register_simple_type("store", move |engine, name, params| {
        let cap = params
            .get("capacity")
            .and_then(serde_json::Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(4);
        let obj: Rc<RefCell<dyn SimObject>> = Store::new(name, engine.clone(), cap);
        Ok(obj)
    });

    let _ = engine;
}

fn main() -> Result<(), ConfigError> {
    env_logger::init();
    let args = Args::parse();

    let config = Factory::load_and_expand_includes(&args.topology)?;

    let engine = Engine::new();
    let mut factory = Factory::new(engine.clone());
    register_types(&mut factory, &engine);

    let reports = factory.instantiate_all(&config);
    let mut failed = 0;
    for report in &reports {
        match &report.result {
            Ok(()) => log::debug!("{}: ok", report.element),
            Err(err) => {
                failed += 1;
                log::error!("{}: {err}", report.element);
            }
        }
    }
    println!(
        "built {} element(s), {failed} failed",
        reports.len()
    );

    for name in factory.unconnected_instances() {
        log::warn!("{name}: one or more ports left unconnected");
    }

    factory.start_all_ticks();
    factory.run(args.end_cycle);

    println!("ran to cycle {}", factory.engine().cur_cycle());
    Ok(())
}
