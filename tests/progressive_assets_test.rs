mod common;

use backdrop_ngin::{
    HeadlessBackend, LifecycleState, SceneConfig, Session,
    backend::headless::HeadlessSurface,
    data_structures::scene_graph::NodeKind,
    quality::DeviceCapabilities,
    render::FrameStatus,
    resources::{
        RequestState,
        registry::{Owner, ResourceKind},
        texture::BackgroundVariant,
    },
};
use common::test_utils::*;

fn request_state(session: &Session<HeadlessBackend>, path: &str) -> RequestState {
    session
        .pending()
        .requests()
        .iter()
        .find(|r| r.path == path)
        .map(|r| r.state)
        .expect("request was made")
}

#[tokio::test]
async fn high_res_background_wins_when_both_arrive() {
    let mut session = default_running().await;
    assert_eq!(request_state(&session, LOW_RES), RequestState::Pending);

    session.frame(Clock::new().at(0));

    assert_eq!(session.background().variant(), BackgroundVariant::HighRes);
    let backend = session.backend().unwrap();
    assert_eq!(backend.background_source(), Some(HIGH_RES));
    assert_eq!(session.registry().live(ResourceKind::Texture), 1);
    assert_eq!(request_state(&session, HIGH_RES), RequestState::Resolved);
}

#[tokio::test]
async fn low_res_shows_first_then_upgrades() {
    let assets = assets();
    assets.hold(HIGH_RES);
    let mut session = running(
        config(),
        DeviceCapabilities::default(),
        &assets,
        HeadlessSurface::default(),
    )
    .await;
    let clock = Clock::new();

    session.frame(clock.at(0));
    assert_eq!(session.background().variant(), BackgroundVariant::LowRes);
    assert_eq!(session.backend().unwrap().background_source(), Some(LOW_RES));
    let low = session.background().texture().expect("low res texture");

    assets.release(HIGH_RES);
    session.frame(clock.at(16));

    assert_eq!(session.background().variant(), BackgroundVariant::HighRes);
    assert_eq!(session.backend().unwrap().background_source(), Some(HIGH_RES));
    // the low res texture is gone once replaced
    assert!(!session.registry().is_live(low));
    assert!(session.backend().unwrap().allocation(low.id).is_none());
    assert_eq!(session.registry().live(ResourceKind::Texture), 1);
}

#[tokio::test]
async fn late_low_res_never_downgrades() {
    let assets = assets();
    assets.hold(LOW_RES);
    let mut session = running(
        config(),
        DeviceCapabilities::default(),
        &assets,
        HeadlessSurface::default(),
    )
    .await;
    let clock = Clock::new();

    session.frame(clock.at(0));
    assert_eq!(session.background().variant(), BackgroundVariant::HighRes);
    let textures_created = session.registry().registered(ResourceKind::Texture);

    assets.release(LOW_RES);
    session.frame(clock.at(16));

    assert_eq!(session.background().variant(), BackgroundVariant::HighRes);
    assert_eq!(session.backend().unwrap().background_source(), Some(HIGH_RES));
    assert_eq!(
        session.registry().registered(ResourceKind::Texture),
        textures_created,
        "a late low res image must not be uploaded"
    );
    assert_eq!(request_state(&session, LOW_RES), RequestState::Resolved);
}

#[tokio::test]
async fn failed_high_res_keeps_low_res() {
    let assets = assets();
    let mut session = running(
        SceneConfig {
            high_res_background: Some("images/missing.png".to_string()),
            ..config()
        },
        DeviceCapabilities::default(),
        &assets,
        HeadlessSurface::default(),
    )
    .await;

    assert_eq!(session.frame(Clock::new().at(0)), FrameStatus::Rendered);

    assert_eq!(session.state(), LifecycleState::Running);
    assert_eq!(session.background().variant(), BackgroundVariant::LowRes);
    assert_eq!(session.backend().unwrap().background_source(), Some(LOW_RES));
    assert_eq!(request_state(&session, "images/missing.png"), RequestState::Failed);
}

#[tokio::test]
async fn corrupt_low_res_leaves_the_clear_colour() {
    let assets = assets();
    assets.insert(LOW_RES, b"definitely not a png".to_vec());
    assets.hold(HIGH_RES);
    let mut session = running(
        config(),
        DeviceCapabilities::default(),
        &assets,
        HeadlessSurface::default(),
    )
    .await;

    session.frame(Clock::new().at(0));
    assert_eq!(session.backend().unwrap().background(), None);
    assert_eq!(request_state(&session, LOW_RES), RequestState::Failed);
    assert_eq!(session.state(), LifecycleState::Running);
}

#[tokio::test]
async fn model_is_attached_when_it_arrives() {
    let mut session = default_running().await;
    assert!(!session.graph().contains(NodeKind::ModelRoot));

    session.frame(Clock::new().at(0));

    let graph = session.graph();
    let model = graph.models().next().expect("model attached");
    assert_eq!(model.source, MODEL);
    assert_eq!(model.meshes.len(), 1);
    let mesh = &model.meshes[0];
    assert!(mesh.cast_shadow, "high quality casts shadows");
    assert!(mesh.receive_shadow);
    assert_eq!(
        session.registry().owner(mesh.geometry),
        Some(Owner::Node(model.id))
    );
    assert_eq!(session.backend().unwrap().last_draw().unwrap().models, 1);
}

#[tokio::test]
async fn missing_model_is_not_fatal() {
    let assets = assets();
    let mut session = running(
        SceneConfig {
            model_path: Some("models/nowhere.glb".to_string()),
            ..config()
        },
        DeviceCapabilities::default(),
        &assets,
        HeadlessSurface::default(),
    )
    .await;
    let clock = Clock::new();

    for ms in [0, 16, 32] {
        assert_eq!(session.frame(clock.at(ms)), FrameStatus::Rendered);
    }
    assert_eq!(session.state(), LifecycleState::Running);
    assert!(!session.graph().contains(NodeKind::ModelRoot));
    assert_eq!(
        request_state(&session, "models/nowhere.glb"),
        RequestState::Failed
    );
    assert_eq!(session.render_loop().frames(), 3);

    // the rest of the scene is untouched
    let graph = session.graph();
    let registry = session.registry();
    let field = graph.particle_field().expect("particle field");
    assert_eq!(field.positions.len(), 600);
    assert!(registry.is_live(field.geometry));
    assert!(registry.is_live(field.material));
    let ground = graph.ground().expect("ground");
    assert!(registry.is_live(ground.geometry));
    assert!(registry.is_live(ground.material));
    assert_eq!(graph.lights().count(), 2);
    assert!(graph.lights().all(|l| registry.is_live(l.handle)));
    assert!(graph.shadows_cast());
    let last = session.backend().unwrap().last_draw().unwrap();
    assert!(last.particle_field);
    assert_eq!(last.models, 0);
}

#[tokio::test]
async fn model_upload_failure_releases_its_partial_resources() {
    let assets = assets();
    assets.hold(HIGH_RES);
    assets.hold(MODEL);
    // 6 allocations for the base scene and 2 background textures, then the
    // model's geometry succeeds and its material fails
    let mut session = running(
        config(),
        DeviceCapabilities::default(),
        &assets,
        HeadlessSurface {
            fail_create_after: Some(9),
            ..HeadlessSurface::default()
        },
    )
    .await;
    let clock = Clock::new();
    session.frame(clock.at(0));
    assets.release(HIGH_RES);
    session.frame(clock.at(16));
    assert_eq!(session.registry().registered(ResourceKind::Texture), 2);

    assets.release(MODEL);
    session.frame(clock.at(32));

    assert_eq!(session.state(), LifecycleState::Running);
    assert!(!session.graph().contains(NodeKind::ModelRoot));
    let registry = session.registry();
    assert_eq!(registry.registered(ResourceKind::Geometry), 3);
    assert_eq!(registry.live(ResourceKind::Geometry), 2);
    assert_eq!(registry.live(ResourceKind::Material), 2);
}

#[tokio::test]
async fn loads_still_in_flight_at_teardown_are_dropped() {
    let assets = assets();
    assets.hold(HIGH_RES);
    assets.hold(MODEL);
    let mut session = running(
        config(),
        DeviceCapabilities::default(),
        &assets,
        HeadlessSurface::default(),
    )
    .await;
    session.frame(Clock::new().at(0));
    assert_eq!(session.pending().outstanding(), 2);

    session.teardown();
    assert_eq!(session.pending().outstanding(), 0);

    assets.release(HIGH_RES);
    assets.release(MODEL);
    assert_eq!(session.frame(Clock::new().at(16)), FrameStatus::Skipped);
    assert!(!session.graph().contains(NodeKind::ModelRoot));
    assert_released_everything(&session);
}
