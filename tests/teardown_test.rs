mod common;

use backdrop_ngin::{
    HeadlessBackend, LifecycleState, SceneHost, Session,
    backend::headless::HeadlessSurface,
    quality::DeviceCapabilities,
    render::FrameStatus,
    resources::{AssetLoader, registry::ResourceKind},
};
use common::test_utils::*;

#[tokio::test]
async fn teardown_releases_everything_exactly_once() {
    let mut session = default_running().await;
    let clock = Clock::new();
    for ms in [0, 16, 32] {
        session.frame(clock.at(ms));
    }
    assert!(session.graph().models().next().is_some());
    let live = session.registry().live_total();

    let report = session.teardown().expect("running session tears down");

    assert_eq!(report.released, live);
    assert_eq!(report.failed, 0);
    assert_eq!(report.skipped, 0);
    assert_eq!(session.state(), LifecycleState::TornDown);
    assert!(session.graph().is_empty());
    assert!(session.render_loop().is_cancelled());
    let backend = session.backend().unwrap();
    assert!(backend.context_lost());
    assert_eq!(backend.background(), None);
    assert_released_everything(&session);
}

#[tokio::test]
async fn second_teardown_is_a_no_op() {
    let mut session = default_running().await;
    session.frame(Clock::new().at(0));

    assert!(session.teardown().is_some());
    let disposed = session.backend().unwrap().disposed();
    assert!(session.teardown().is_none());

    let backend = session.backend().unwrap();
    assert_eq!(backend.disposed(), disposed);
    assert_eq!(backend.double_disposals(), 0);
    assert_released_everything(&session);
}

#[tokio::test]
async fn teardown_before_initialize_does_nothing() {
    let mut session = session(config(), DeviceCapabilities::default(), &assets());
    assert!(session.teardown().is_none());
    assert_eq!(session.state(), LifecycleState::Uninitialized);
}

#[tokio::test]
async fn failing_disposals_still_finish_the_teardown() {
    let mut session = running(
        config(),
        DeviceCapabilities::default(),
        &assets(),
        HeadlessSurface {
            fail_dispose: true,
            ..HeadlessSurface::default()
        },
    )
    .await;
    session.frame(Clock::new().at(0));

    let report = session.teardown().unwrap();

    // audio and the render target release without going through dispose
    assert_eq!(report.failed, report.released - 2);
    assert!(report.failed > 0);
    assert_eq!(session.state(), LifecycleState::TornDown);
    assert_eq!(session.registry().live_total(), 0);
    assert_eq!(session.backend().unwrap().live(), 0);
}

#[tokio::test]
async fn audio_is_released_at_teardown() {
    let mut session = default_running().await;
    session.set_audio_enabled(true).unwrap();

    session.teardown();

    let track = session.audio().expect("track kept for inspection");
    assert!(track.is_released());
    assert!(!track.is_playing());
    assert_eq!(session.registry().released(ResourceKind::Audio), 1);
}

#[tokio::test]
async fn teardown_disposes_every_allocation() {
    let mut session = default_running().await;
    session.frame(Clock::new().at(0));
    let before = session.backend().unwrap().created();

    session.teardown();

    let backend = session.backend().unwrap();
    // every allocation plus the render target
    assert_eq!(backend.disposed(), before + 1);
    assert!(backend.context_lost());
}

#[tokio::test]
async fn host_shutdown_is_idempotent() {
    let assets = assets();
    let mut host = SceneHost::<HeadlessBackend>::new();
    host.start(
        config(),
        DeviceCapabilities::default(),
        AssetLoader::new(assets.clone()),
        Some(HeadlessSurface::default()),
    )
    .await
    .unwrap();
    let clock = Clock::new();
    host.frame(clock.at(0));

    let report = host.shutdown().unwrap();
    assert!(report.released > 0);
    assert_eq!(host.state(), LifecycleState::TornDown);
    assert!(host.shutdown().is_none());
    assert_eq!(host.frame(clock.at(16)), FrameStatus::Skipped);
}

#[tokio::test]
async fn repeated_mount_cycles_do_not_leak() {
    let assets = assets();
    for _ in 0..3 {
        let mut session = running(
            config(),
            DeviceCapabilities::default(),
            &assets,
            HeadlessSurface::default(),
        )
        .await;
        let clock = Clock::new();
        session.frame(clock.at(0));
        session.resize(640, 480);
        session.frame(clock.at(16));
        session.teardown();
        assert_released_everything(&session);
    }
}

#[tokio::test]
async fn unmounted_host_adopts_the_next_mount() {
    let assets = assets();
    let mut host = SceneHost::<HeadlessBackend>::new();
    host.start(
        config(),
        DeviceCapabilities::default(),
        AssetLoader::new(assets.clone()),
        Some(HeadlessSurface::default()),
    )
    .await
    .unwrap();
    let clock = Clock::new();
    host.frame(clock.at(0));
    host.shutdown().unwrap();
    assert_eq!(host.frame(clock.at(16)), FrameStatus::Skipped);

    let mut next = Session::new(
        config(),
        DeviceCapabilities::default(),
        AssetLoader::new(assets.clone()),
    );
    next.initialize(Some(HeadlessSurface::default()))
        .await
        .unwrap();
    host.adopt(next);

    assert_eq!(host.state(), LifecycleState::Running);
    assert_eq!(host.frame(clock.at(32)), FrameStatus::Rendered);
    host.shutdown().unwrap();
    assert_released_everything(host.session().unwrap());
}
