//! # Event Dispatch Tests
//!
//! Scene-scoped publish, end to end:
//!
//! 1. **Filtering**: tag handlers plus wildcard handlers, nothing else
//! 2. **Fan-in**: `publish_async` settles only after every handler, nested included
//! 3. **Cancellation**: one token stops the whole chain
//! 4. **Fixed points**: async handlers mutate the graph through queued commands
//! 5. **Registration**: static tables, order hints, the sync/async policy
//!
//! Run with: cargo test -p arbor --test event_dispatch

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arbor::arbor_core::{EventError, HandlerFailure};
use arbor::prelude::*;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

struct Ping;
struct Pong;

type Hits = Arc<Mutex<Vec<&'static str>>>;

fn game_world() -> (World, InstanceId) {
    let mut world = World::default();
    let game = world.create_scene("Game").unwrap();
    (world, game)
}

// ============================================================================
// FILTERING
// ============================================================================

#[test]
fn sync_publish_reaches_tag_and_wildcard_handlers_only() {
    let mut world = World::default();
    let game = world.create_scene("Game").unwrap();
    let battle = world.create_scene("Battle").unwrap();
    let unit = world.spawn(game).unwrap();
    let hits: Hits = Arc::default();

    for (name, filter) in [
        ("game", SceneFilter::only("Game")),
        ("battle", SceneFilter::only("Battle")),
        ("any", SceneFilter::Any),
    ] {
        let hits = Arc::clone(&hits);
        world
            .bus()
            .subscribe(filter, move |_: &mut World, _: &SceneRef, _: &Ping| {
                hits.lock().push(name);
                Ok(())
            });
    }

    let report = world.publish(game, Ping).unwrap();
    assert_eq!(report.invoked, 2);
    assert_eq!(std::mem::take(&mut *hits.lock()), vec!["game", "any"]);

    world.publish(unit, Ping).unwrap();
    assert_eq!(std::mem::take(&mut *hits.lock()), vec!["game", "any"]);

    world.publish(battle, Ping).unwrap();
    assert_eq!(std::mem::take(&mut *hits.lock()), vec!["battle", "any"]);
}

#[tokio::test]
async fn async_publish_reaches_tag_and_wildcard_handlers_only() {
    let mut world = World::default();
    let game = world.create_scene("Game").unwrap();
    world.create_scene("Battle").unwrap();
    let hits: Hits = Arc::default();

    for (name, filter) in [
        ("battle", SceneFilter::only("Battle")),
        ("game", SceneFilter::only("Game")),
        ("any", SceneFilter::Any),
    ] {
        let hits = Arc::clone(&hits);
        world
            .bus()
            .subscribe_async(filter, move |_: AsyncContext, _: Arc<Pong>| {
                hits.lock().push(name);
                async { Ok::<(), HandlerError>(()) }
            });
    }

    let report = world.publish_async(game, Pong).unwrap().await;

    assert_eq!(report.invoked, 2);
    assert_eq!(*hits.lock(), vec!["game", "any"]);
}

#[test]
fn publish_outside_any_scene_is_not_found() {
    let (mut world, game) = game_world();
    let unit = world.spawn(game).unwrap();
    world.remove_child(game, unit).unwrap();

    assert_eq!(world.publish(unit, Ping).unwrap_err(), EntityError::NotFound(unit));
}

// ============================================================================
// FAN-OUT / FAN-IN
// ============================================================================

#[tokio::test]
async fn completion_waits_for_slowest_handler() {
    let (mut world, game) = game_world();
    let started: Hits = Arc::default();

    for (name, delay_ms) in [("fast", 10), ("slow", 50)] {
        let started = Arc::clone(&started);
        world
            .bus()
            .subscribe_async(SceneFilter::only("Game"), move |_: AsyncContext, _: Arc<Ping>| {
                started.lock().push(name);
                async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok::<(), HandlerError>(())
                }
            });
    }

    let begin = Instant::now();
    let completion = world.publish_async(game, Ping).unwrap();
    assert_eq!(*started.lock(), vec!["fast", "slow"]);

    let report = completion.await;

    assert!(begin.elapsed() >= Duration::from_millis(50));
    assert_eq!(report.invoked, 2);
    assert!(report.is_ok());
}

#[tokio::test]
async fn completion_waits_for_nested_publish() {
    let (mut world, game) = game_world();
    let nested_done = Arc::new(AtomicBool::new(false));

    world
        .bus()
        .subscribe_async(SceneFilter::Any, |ctx: AsyncContext, _: Arc<Ping>| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            ctx.publish_async(Pong);
            Ok::<(), HandlerError>(())
        });
    let done = Arc::clone(&nested_done);
    world
        .bus()
        .subscribe_async(SceneFilter::Any, move |_: AsyncContext, _: Arc<Pong>| {
            let done = Arc::clone(&done);
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                done.store(true, Ordering::SeqCst);
                Ok::<(), HandlerError>(())
            }
        });

    let begin = Instant::now();
    let report = world.publish_async(game, Ping).unwrap().await;

    assert!(nested_done.load(Ordering::SeqCst));
    assert!(begin.elapsed() >= Duration::from_millis(35));
    assert_eq!(report.invoked, 2);
}

#[tokio::test]
async fn failing_async_handler_does_not_stop_siblings() {
    let (mut world, game) = game_world();
    let finished = Arc::new(AtomicUsize::new(0));

    world
        .bus()
        .subscribe_async(SceneFilter::Any, |_: AsyncContext, _: Arc<Ping>| async {
            Err::<(), HandlerError>(HandlerError::failed("no route"))
        });
    let counter = Arc::clone(&finished);
    world
        .bus()
        .subscribe_async(SceneFilter::Any, move |_: AsyncContext, _: Arc<Ping>| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), HandlerError>(())
            }
        });

    let report = world.publish_async(game, Ping).unwrap().await;

    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(report.invoked, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].error, HandlerError::failed("no route"));
}

fn faulty_step() -> HandlerResult {
    panic!("handler bug")
}

#[tokio::test]
async fn panicking_async_handler_is_reported_as_failure() {
    let (mut world, game) = game_world();
    let finished = Arc::new(AtomicUsize::new(0));

    world
        .bus()
        .subscribe_async(SceneFilter::Any, |_: AsyncContext, _: Arc<Ping>| async {
            tokio::task::yield_now().await;
            faulty_step()
        });
    let counter = Arc::clone(&finished);
    world
        .bus()
        .subscribe_async(SceneFilter::Any, move |_: AsyncContext, _: Arc<Ping>| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::task::yield_now().await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), HandlerError>(())
            }
        });

    let report = world.publish_async(game, Ping).unwrap().await;

    assert!(!report.is_ok());
    assert_eq!(report.invoked, 2);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(report.failures.len(), 1);
    match &report.failures[0].error {
        HandlerError::Failed(message) => assert!(message.contains("handler bug"), "{message}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[tokio::test]
async fn cancellation_settles_the_chain() {
    let (mut world, game) = game_world();
    world
        .bus()
        .subscribe_async(SceneFilter::Any, |_: AsyncContext, _: Arc<Ping>| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<(), HandlerError>(())
        });

    let token = CancellationToken::new();
    let begin = Instant::now();
    let completion = world
        .publish_async_with_cancel(game, Ping, token.clone())
        .unwrap();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let report = completion.await;

    assert!(begin.elapsed() < Duration::from_secs(5));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].error, HandlerError::Cancelled);
}

#[tokio::test]
async fn chain_cancelled_before_first_poll() {
    let (mut world, game) = game_world();
    let polled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&polled);
    world
        .bus()
        .subscribe_async(SceneFilter::Any, move |_: AsyncContext, _: Arc<Ping>| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok::<(), HandlerError>(())
            }
        });

    let token = CancellationToken::new();
    let completion = world
        .publish_async_with_cancel(game, Ping, token.clone())
        .unwrap();
    token.cancel();
    let report = completion.await;

    assert!(!polled.load(Ordering::SeqCst));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].error, HandlerError::Cancelled);
}

#[tokio::test]
async fn publish_without_async_handlers_is_settled_immediately() {
    let (mut world, game) = game_world();
    world
        .bus()
        .subscribe(SceneFilter::Any, |_: &mut World, _: &SceneRef, _: &Pong| Ok(()));

    let completion = world.publish_async(game, Pong).unwrap();
    assert!(completion.is_settled());

    let report = completion.await;
    assert_eq!(report.invoked, 1);
}

// ============================================================================
// FIXED POINTS
// ============================================================================

#[tokio::test]
async fn async_handler_mutates_graph_through_commands() {
    let (mut world, game) = game_world();
    let doomed = world.spawn(game).unwrap();

    world
        .bus()
        .subscribe_async(SceneFilter::Any, move |ctx: AsyncContext, _: Arc<Ping>| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            if !ctx.registry().contains(doomed) {
                return Err(HandlerError::failed("target already gone"));
            }
            if ctx.commands().dispose(doomed) {
                Ok(())
            } else {
                Err(HandlerError::failed("command queue closed"))
            }
        });

    let report = world.publish_async(game, Ping).unwrap().await;
    assert!(report.is_ok());
    assert!(world.contains(doomed));
    assert_eq!(world.pending_commands(), 1);

    let tick = LifecycleDriver::default().tick(&mut world, 0.016);

    assert_eq!(tick.commands_applied, 1);
    assert!(!world.contains(doomed));
}

#[tokio::test]
async fn sync_handlers_reached_from_async_context_run_at_next_fixed_point() {
    let (mut world, game) = game_world();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    world
        .bus()
        .subscribe(SceneFilter::Any, move |world: &mut World, scene: &SceneRef, _: &Pong| {
            world
                .spawn(scene.id)
                .map_err(|e| HandlerError::failed(e.to_string()))?;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    world
        .bus()
        .subscribe_async(SceneFilter::Any, |ctx: AsyncContext, _: Arc<Ping>| async move {
            ctx.publish_async(Pong);
            if ctx.publish(Pong) {
                Ok(())
            } else {
                Err(HandlerError::failed("command queue closed"))
            }
        });

    let report = world.publish_async(game, Ping).unwrap().await;
    assert_eq!(report.invoked, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    assert_eq!(world.apply_commands(), 2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(world.children(game).len(), 2);
}

#[test]
fn nested_sync_publish_from_handler() {
    let (mut world, game) = game_world();
    let pongs = Arc::new(AtomicUsize::new(0));

    world
        .bus()
        .subscribe(SceneFilter::Any, |world: &mut World, scene: &SceneRef, _: &Ping| {
            let report = world
                .publish(scene.id, Pong)
                .map_err(|e| HandlerError::failed(e.to_string()))?;
            if report.invoked == 1 {
                Ok(())
            } else {
                Err(HandlerError::failed("pong not delivered"))
            }
        });
    let counter = Arc::clone(&pongs);
    world
        .bus()
        .subscribe(SceneFilter::only("Game"), move |_: &mut World, _: &SceneRef, _: &Pong| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

    let report = world.publish(game, Ping).unwrap();

    assert!(report.is_ok());
    assert_eq!(pongs.load(Ordering::SeqCst), 1);
}

#[test]
fn handler_failures_are_published_when_enabled() {
    let mut world = World::new(WorldConfig {
        publish_handler_failures: true,
        ..WorldConfig::default()
    });
    let game = world.create_scene("Game").unwrap();
    let seen: Arc<Mutex<Vec<HandlerError>>> = Arc::default();

    world
        .bus()
        .subscribe(SceneFilter::only("Game"), |_: &mut World, _: &SceneRef, _: &Ping| {
            Err(HandlerError::failed("bad ping"))
        });
    let log = Arc::clone(&seen);
    world.bus().subscribe(
        SceneFilter::Any,
        move |_: &mut World, _: &SceneRef, failure: &HandlerFailure| {
            log.lock().push(failure.error.clone());
            // Failing here must not be published again.
            Err(HandlerError::failed("observer failed too"))
        },
    );

    let report = world.publish(game, Ping).unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(*seen.lock(), vec![HandlerError::failed("bad ping")]);

    world.publish(game, Ping).unwrap();
    assert_eq!(seen.lock().len(), 2);
}

#[test]
fn handler_failures_stay_in_report_by_default() {
    let (mut world, game) = game_world();
    let observed = Arc::new(AtomicUsize::new(0));

    world
        .bus()
        .subscribe(SceneFilter::Any, |_: &mut World, _: &SceneRef, _: &Ping| {
            Err(HandlerError::failed("bad ping"))
        });
    let counter = Arc::clone(&observed);
    world.bus().subscribe(
        SceneFilter::Any,
        move |_: &mut World, _: &SceneRef, _: &HandlerFailure| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    );

    let report = world.publish(game, Ping).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(observed.load(Ordering::SeqCst), 0);
}

#[test]
fn hooks_publish_in_their_own_domain() {
    struct Announcer;

    impl Behaviour for Announcer {
        fn capabilities(&self) -> Capabilities {
            Capabilities::UPDATE
        }

        fn update(&mut self, ctx: &mut HookContext<'_>, _dt: f32) -> HookResult {
            ctx.publish(Ping)
                .map(|_| ())
                .map_err(|e| HookError::failed(e.to_string()))
        }
    }

    let mut world = World::default();
    let game = world.create_scene("Game").unwrap();
    let battle = world.create_scene("Battle").unwrap();
    let squad = world.spawn(battle).unwrap();
    world.spawn_with(squad, Announcer).unwrap();
    let hits: Hits = Arc::default();

    for (name, tag) in [("game", "Game"), ("battle", "Battle")] {
        let hits = Arc::clone(&hits);
        world
            .bus()
            .subscribe(SceneFilter::only(tag), move |_: &mut World, _: &SceneRef, _: &Ping| {
                hits.lock().push(name);
                Ok(())
            });
    }

    LifecycleDriver::default().tick(&mut world, 0.016);

    assert_eq!(*hits.lock(), vec!["battle"]);
    assert!(world.is_alive(game));
}

// ============================================================================
// REGISTRATION
// ============================================================================

#[test]
fn handler_table_installs_in_order_hint_order() {
    let (mut world, game) = game_world();
    let hits: Hits = Arc::default();

    let late = Arc::clone(&hits);
    let early = Arc::clone(&hits);
    let table = HandlerTable::new()
        .with(
            HandlerDescriptor::sync::<Ping, _>("audit", move |_: &mut World, _: &SceneRef, _: &Ping| {
                late.lock().push("audit");
                Ok(())
            })
            .any_scene()
            .order(10),
        )
        .with(
            HandlerDescriptor::sync::<Ping, _>("input", move |_: &mut World, _: &SceneRef, _: &Ping| {
                early.lock().push("input");
                Ok(())
            })
            .scene(SceneFilter::only("Game"))
            .order(-10),
        );
    assert_eq!(table.len(), 2);

    let ids = table.install(world.bus()).unwrap();
    assert_eq!(ids.len(), 2);

    world.publish(game, Ping).unwrap();
    assert_eq!(*hits.lock(), vec!["input", "audit"]);
}

#[test]
fn table_with_unscoped_handler_installs_nothing() {
    let world = World::default();
    let table = HandlerTable::new()
        .with(
            HandlerDescriptor::sync::<Ping, _>("scoped", |_: &mut World, _: &SceneRef, _: &Ping| Ok(()))
                .any_scene(),
        )
        .with(HandlerDescriptor::sync::<Ping, _>(
            "unscoped",
            |_: &mut World, _: &SceneRef, _: &Ping| Ok(()),
        ));

    assert_eq!(
        table.install(world.bus()),
        Err(EventError::MissingSceneFilter("unscoped".into()))
    );
    assert_eq!(world.bus().handler_count(), 0);
}

#[test]
fn sync_publish_skips_async_handlers() {
    let (mut world, game) = game_world();
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    world
        .bus()
        .subscribe_async(SceneFilter::Any, move |_: AsyncContext, _: Arc<Ping>| {
            flag.store(true, Ordering::SeqCst);
            async { Ok::<(), HandlerError>(()) }
        });

    let report = world.publish(game, Ping).unwrap();

    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(report.invoked, 0);
    assert_eq!(report.failures[0].error, HandlerError::AsyncInSyncPublish);
}

#[test]
fn owned_handler_dies_with_its_owner() {
    let (mut world, game) = game_world();
    let listener = world.spawn(game).unwrap();
    world
        .bus()
        .register(
            HandlerDescriptor::sync::<Ping, _>("listener", |_: &mut World, _: &SceneRef, _: &Ping| Ok(()))
                .any_scene()
                .owned_by(listener),
        )
        .unwrap();

    assert_eq!(world.publish(game, Ping).unwrap().invoked, 1);
    world.dispose(listener);
    assert_eq!(world.publish(game, Ping).unwrap().invoked, 0);
    assert_eq!(world.bus().handler_count(), 0);
}
