//! Basic fanout usage
//!
//! Demonstrates construction, both submit paths, panic isolation, tracing and
//! graceful shutdown.
//!
//! Run with: RUST_LOG=fanout=debug cargo run --example basic_usage

use fanout::prelude::*;
use fanout::trace::{LogReporter, Span, Trace};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::init();
    println!("=== Fanout - Basic Usage Example ===\n");

    let fanout = Fanout::builder("demo").workers(4).buffer(8).build()?;
    println!(
        "1. Started fanout '{}' with {} workers, buffer {}",
        fanout.name(),
        fanout.config().workers,
        fanout.capacity()
    );

    println!("\n2. Non-blocking submits (rejected when the buffer is full):");
    let mut accepted = 0;
    let mut rejected = 0;
    for i in 0..20 {
        let result = fanout.try_execute(&Context::background(), move |_| {
            thread::sleep(Duration::from_millis(50));
            println!("  Task {} done on {:?}", i, thread::current().name());
        });
        match result {
            Ok(()) => accepted += 1,
            Err(e) if e.is_queue_full() => rejected += 1,
            Err(e) => return Err(e),
        }
    }
    println!("   accepted {}, rejected {}", accepted, rejected);

    println!("\n3. Blocking submits with a deadline:");
    let ctx = Context::background().with_timeout(Duration::from_millis(500));
    for i in 0..10 {
        match fanout.execute(&ctx, move |_| {
            println!("  Blocking task {} done", i);
        }) {
            Ok(()) => {}
            Err(e) if e.is_caller_abandoned() => println!("   gave up on task {}: {}", i, e),
            Err(e) => return Err(e),
        }
    }

    println!("\n4. A panicking task does not stop the workers:");
    fanout.try_execute(&Context::background(), |_| panic!("demo panic"))?;
    fanout.execute(&Context::background(), |_| println!("  Still running after the panic"))?;

    println!("\n5. Traced submit (span reported at debug level on target fanout::trace):");
    let root = Span::root("demo.request", Arc::new(LogReporter));
    let traced = Context::background().with_span(root);
    fanout.execute(&traced, |ctx| {
        let span = ctx.span().map(|s| s.span_id().to_string());
        println!("  Running under span {:?}", span);
    })?;

    println!("\n6. Shutting down (drains the queue)...");
    fanout.shutdown()?;
    println!("   state: {}", fanout.state());

    println!("\n7. Statistics:");
    println!("   {}", serde_json::to_string(&fanout.metrics().snapshot()).unwrap_or_default());
    for (i, stat) in fanout.worker_stats().iter().enumerate() {
        println!(
            "   Worker {}: {} processed, {} panicked, avg time: {:.2}μs",
            i,
            stat.get_tasks_processed(),
            stat.get_tasks_panicked(),
            stat.get_average_processing_time_us()
        );
    }

    match fanout.try_execute(&Context::background(), |_| {}) {
        Err(e) => println!("\n8. Submitting after shutdown fails: {}", e),
        Ok(()) => println!("\n8. Unexpectedly accepted work after shutdown"),
    }

    println!("\n=== Example completed successfully ===");
    Ok(())
}
