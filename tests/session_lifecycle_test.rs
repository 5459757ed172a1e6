mod common;

use backdrop_ngin::{
    LifecycleState, SceneConfig, SceneError, SceneHost,
    backend::headless::{HeadlessBackend, HeadlessSurface},
    quality::{DeviceCapabilities, QualityLevel},
    render::FrameStatus,
    resources::{AssetLoader, MemoryAssets, registry::ResourceKind},
};
use common::test_utils::*;

#[tokio::test]
async fn session_starts_running_with_the_base_scene() {
    let session = default_running().await;

    assert_eq!(session.state(), LifecycleState::Running);
    let graph = session.graph();
    assert!(graph.ground().is_some());
    assert_eq!(graph.lights().count(), 2);
    let field = graph.particle_field().expect("particle field");
    assert_eq!(field.positions.len(), 600);

    let registry = session.registry();
    assert_eq!(registry.live(ResourceKind::RenderTarget), 1);
    assert_eq!(registry.live(ResourceKind::Light), 2);
    assert_eq!(registry.live(ResourceKind::Audio), 1);
    // ground and particles
    assert_eq!(registry.live(ResourceKind::Geometry), 2);
    assert_eq!(registry.live(ResourceKind::Material), 2);
}

#[tokio::test]
async fn particles_stay_inside_their_volume() {
    let session = default_running().await;
    let field = session.graph().particle_field().unwrap();
    for [x, y, z] in &field.positions {
        assert!((-30.0..30.0).contains(x), "x = {x}");
        assert!((-2.0..18.0).contains(y), "y = {y}");
        assert!((-30.0..30.0).contains(z), "z = {z}");
    }
}

#[tokio::test]
async fn same_seed_same_particles() {
    let a = default_running().await;
    let b = default_running().await;
    assert_eq!(
        a.graph().particle_field().unwrap().positions,
        b.graph().particle_field().unwrap().positions
    );
}

#[tokio::test]
async fn second_initialize_is_rejected() {
    let mut session = default_running().await;
    let err = session
        .initialize(Some(HeadlessSurface::default()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SceneError::InvalidStateTransition {
            action: "initialize",
            state: LifecycleState::Running
        }
    ));
    assert_eq!(session.state(), LifecycleState::Running);
}

#[tokio::test]
async fn unavailable_backend_fails_without_leaks() {
    let mut session = session(config(), DeviceCapabilities::default(), &assets());
    let err = session
        .initialize(Some(HeadlessSurface {
            supported: false,
            ..HeadlessSurface::default()
        }))
        .await
        .unwrap_err();

    assert!(matches!(err, SceneError::BackendUnavailable(_)));
    assert!(err.is_fatal());
    assert_eq!(session.state(), LifecycleState::Failed);
    assert_eq!(session.registry().registered_total(), 0);
    assert!(session.backend().is_none());
    assert_eq!(session.frame(Clock::new().at(0)), FrameStatus::Skipped);
}

#[tokio::test]
async fn missing_surface_fails() {
    let mut session = session(config(), DeviceCapabilities::default(), &assets());
    let err = session.initialize(None).await.unwrap_err();
    assert!(matches!(err, SceneError::BackendUnavailable(_)));
    assert_eq!(session.state(), LifecycleState::Failed);
}

#[tokio::test]
async fn failure_during_composition_releases_what_was_created() {
    let mut session = session(config(), DeviceCapabilities::default(), &assets());
    let err = session
        .initialize(Some(HeadlessSurface {
            fail_create_after: Some(3),
            ..HeadlessSurface::default()
        }))
        .await
        .unwrap_err();

    assert!(matches!(err, SceneError::BackendUnavailable(_)));
    assert_eq!(session.state(), LifecycleState::Failed);
    let backend = session.backend().expect("backend was acquired");
    assert_eq!(backend.created(), 3);
    assert!(backend.context_lost());
    assert_released_everything(&session);
    // nothing requested once composition failed
    assert!(session.pending().requests().is_empty());
}

#[tokio::test]
async fn invalid_config_fails_the_start() {
    let config = SceneConfig {
        particle_band: [5.0, 5.0],
        ..config()
    };
    let mut session = session(config, DeviceCapabilities::default(), &assets());
    let err = session
        .initialize(Some(HeadlessSurface::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, SceneError::InvalidConfig(_)));
    assert_eq!(session.state(), LifecycleState::Failed);
}

#[tokio::test]
async fn operations_outside_running_are_rejected() {
    let mut session = session(config(), DeviceCapabilities::default(), &assets());
    assert!(matches!(
        session.set_quality(QualityLevel::Low),
        Err(SceneError::InvalidStateTransition {
            state: LifecycleState::Uninitialized,
            ..
        })
    ));
    assert!(session.focus_camera().is_err());

    session
        .initialize(Some(HeadlessSurface::default()))
        .await
        .unwrap();
    session.teardown();

    assert!(matches!(
        session.set_audio_enabled(true),
        Err(SceneError::InvalidStateTransition {
            state: LifecycleState::TornDown,
            ..
        })
    ));
    // resize after teardown is ignored
    session.resize(100, 100);
    assert_eq!(session.frame(Clock::new().at(16)), FrameStatus::Skipped);
}

#[tokio::test]
async fn host_builds_a_fresh_session_after_teardown() {
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
    assert_eq!(host.frame(clock.at(0)), FrameStatus::Rendered);

    let first = host.shutdown().expect("first teardown releases");
    assert!(first.released > 0);
    assert_released_everything(host.session().unwrap());

    host.start(
        config(),
        DeviceCapabilities::default(),
        AssetLoader::new(assets),
        Some(HeadlessSurface::default()),
    )
    .await
    .unwrap();
    assert_eq!(host.state(), LifecycleState::Running);
    assert_eq!(host.frame(clock.at(16)), FrameStatus::Rendered);
    let session = host.session().unwrap();
    assert_eq!(session.render_loop().frames(), 1);
}

#[tokio::test]
async fn adopting_replaces_and_tears_down_the_previous_session() {
    let assets = MemoryAssets::new();
    let mut host = SceneHost::<HeadlessBackend>::new();
    host.adopt(running(config(), DeviceCapabilities::default(), &assets, HeadlessSurface::default()).await);
    host.adopt(running(config(), DeviceCapabilities::default(), &assets, HeadlessSurface::default()).await);
    assert_eq!(host.state(), LifecycleState::Running);
}

#[test]
fn config_loads_from_partial_json() {
    let config = SceneConfig::from_json(
        r#"{ "particle_count": 50, "quality": "medium", "camera": { "fovy_degrees": 60.0 } }"#,
    )
    .unwrap();
    assert_eq!(config.particle_count, 50);
    assert_eq!(config.quality, Some(QualityLevel::Medium));
    assert_eq!(config.camera.fovy_degrees, 60.0);
    assert_eq!(config.camera.focus_duration_ms, 900);
    assert_eq!(config.audio_volume, 0.18);

    assert!(matches!(
        SceneConfig::from_json(r#"{ "quality": "ultra" }"#),
        Err(SceneError::InvalidConfig(_))
    ));
}

#[test]
fn config_rejects_values_the_renderer_cannot_use() {
    for json in [
        r#"{ "camera": { "near": 0.0 } }"#,
        r#"{ "camera": { "near": -1.0 } }"#,
        r#"{ "camera": { "near": 10.0, "far": 5.0 } }"#,
        r#"{ "camera": { "fovy_degrees": 0.0 } }"#,
        r#"{ "camera": { "fovy_degrees": 180.0 } }"#,
        r#"{ "particle_spread": 3.0e38 }"#,
        r#"{ "particle_band": [-3.0e38, 3.0e38] }"#,
    ] {
        assert!(
            matches!(SceneConfig::from_json(json), Err(SceneError::InvalidConfig(_))),
            "{json} should be rejected"
        );
    }
    assert!(SceneConfig::from_json(r#"{ "camera": { "near": 0.5, "far": 100.0 } }"#).is_ok());
}

#[tokio::test]
async fn zero_near_plane_fails_the_start_instead_of_rendering() {
    let config = SceneConfig {
        camera: backdrop_ngin::config::CameraConfig {
            near: 0.0,
            ..Default::default()
        },
        ..config()
    };
    let mut session = session(config, DeviceCapabilities::default(), &assets());
    let err = session
        .initialize(Some(HeadlessSurface::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, SceneError::InvalidConfig(_)));
    assert_eq!(session.state(), LifecycleState::Failed);
    assert_eq!(session.registry().registered_total(), 0);
}
