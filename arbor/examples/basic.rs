//! Wires a small application across an application and a request container.
//!
//! Run with `RUST_LOG=arbor_container=debug cargo run --example basic` to see
//! the registrations, productions and lifecycle transitions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arbor::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

struct TickingClock(AtomicU64);

impl Clock for TickingClock {
    fn now(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

struct ConnectionPool {
    url: String,
}

impl Startable for ConnectionPool {
    fn start(&self) -> std::result::Result<(), BoxError> {
        info!(url = %self.url, "Pool opened");
        Ok(())
    }

    fn stop(&self) -> std::result::Result<(), BoxError> {
        info!(url = %self.url, "Pool drained");
        Ok(())
    }
}

impl Disposable for ConnectionPool {
    fn dispose(&self) -> std::result::Result<(), BoxError> {
        info!(url = %self.url, "Pool closed");
        Ok(())
    }
}

struct RequestHandler {
    pool: Arc<ConnectionPool>,
    clock: Arc<dyn Clock>,
}

impl RequestHandler {
    fn handle(&self, path: &str) -> String {
        format!("{path} served from {} at tick {}", self.pool.url, self.clock.now())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("basic=info".parse().map_err(
            |err| ArborError::Composition(format!("bad log directive: {err}")),
        )?))
        .init();

    let app = Container::builder()
        .name("app")
        .behavior(Behavior::Caching)
        .build();

    app.add_instance("database-url", Component::of(String::from("postgres://localhost/app")))?
        .with(Characteristic::HIDE_IMPL)
        .add_instance(
            "clock",
            Value::new(TickingClock(AtomicU64::new(0))).implements::<dyn Clock>(|c| c),
        )?
        .add_component(
            ComponentKey::of::<ConnectionPool>(),
            Constructor::new(|args| {
                Ok(ConnectionPool {
                    url: args.get::<String>(0)?.to_string(),
                })
            })
            .depends_on(Dependency::on::<String>().keyed("database-url"))
            .implements::<dyn Startable>(|p| p)
            .implements::<dyn Disposable>(|p| p),
        )?;

    let request = app.make_child_container();
    request.set_name("request");
    request.add_component(
        ComponentKey::of::<RequestHandler>(),
        Constructor::new(|args| {
            Ok(RequestHandler {
                pool: args.get::<ConnectionPool>(0)?,
                clock: args.get::<dyn Clock>(1)?,
            })
        })
        .depends_on(Dependency::on::<ConnectionPool>())
        .depends_on(Dependency::on::<dyn Clock>()),
    )?;

    app.verify()?;
    app.start()?;

    let handler = request.component::<RequestHandler>()?;
    info!("{}", handler.handle("/health"));
    info!("{}", handler.handle("/users"));

    let clock = app.proxy::<dyn Clock>("clock")?;
    info!(tick = clock.invoke(|c| c.now())?, "Clock via proxy");

    info!(tree = %request, "Container tree");
    app.dispose()
}
