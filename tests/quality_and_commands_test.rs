mod common;

use approx::assert_relative_eq;
use backdrop_ngin::{
    Command, HeadlessBackend, LifecycleState, SceneConfig, Session, Subsystem,
    backend::{Light, Material, headless::HeadlessSurface},
    quality::{DeviceCapabilities, QualityLevel},
    render::FrameStatus,
};
use common::test_utils::*;
use instant::Duration;

#[tokio::test]
async fn applying_the_same_level_twice_changes_nothing() {
    let mut session = default_running().await;
    session.set_quality(QualityLevel::Medium).unwrap();
    let viewport = session.backend().unwrap().viewport();
    let shadows = session.backend().unwrap().shadows_enabled();
    let material = session.backend().unwrap().points_material().cloned();
    let live = session.registry().live_total();

    session.set_quality(QualityLevel::Medium).unwrap();

    let backend = session.backend().unwrap();
    assert_eq!(backend.viewport(), viewport);
    assert_eq!(backend.shadows_enabled(), shadows);
    assert_eq!(backend.points_material().cloned(), material);
    assert_eq!(session.registry().live_total(), live);
    assert_eq!(session.quality().level(), QualityLevel::Medium);
}

#[tokio::test]
async fn constrained_device_starts_low_without_shadows() {
    let session = running(
        config(),
        DeviceCapabilities::constrained(),
        &assets(),
        HeadlessSurface {
            pixel_ratio: 1.5,
            ..HeadlessSurface::default()
        },
    )
    .await;

    assert_eq!(session.quality().level(), QualityLevel::Low);
    let backend = session.backend().unwrap();
    assert!(!backend.shadows_enabled());
    assert_eq!(backend.viewport().unwrap().pixel_ratio, 1.0);
    assert!(matches!(
        backend.points_material(),
        Some(Material::Points { size, .. }) if *size == 0.08
    ));

    let directional = session
        .graph()
        .lights()
        .find_map(|l| match &l.light {
            Light::Directional {
                intensity, shadow, ..
            } => Some((*intensity, *shadow)),
            _ => None,
        })
        .expect("directional light");
    assert_eq!(directional, (0.8, None));
    assert!(!session.graph().shadows_cast());
}

#[tokio::test]
async fn constrained_device_never_casts_shadows_even_on_high() {
    let mut session = running(
        config(),
        DeviceCapabilities::constrained(),
        &assets(),
        HeadlessSurface::default(),
    )
    .await;
    session.set_quality(QualityLevel::High).unwrap();
    session
        .set_subsystem_enabled(Subsystem::Shadows, true)
        .unwrap();
    assert!(!session.backend().unwrap().shadows_enabled());
    assert!(!session.graph().shadows_cast());
}

#[tokio::test]
async fn pixel_ratio_is_capped_by_the_level() {
    let mut session = running(
        config(),
        DeviceCapabilities::default(),
        &assets(),
        HeadlessSurface {
            pixel_ratio: 3.0,
            ..HeadlessSurface::default()
        },
    )
    .await;
    let ratio = |s: &Session<HeadlessBackend>| s.backend().unwrap().viewport().unwrap().pixel_ratio;

    assert_eq!(ratio(&session), 2.0);
    session.set_quality(QualityLevel::Medium).unwrap();
    assert_eq!(ratio(&session), 1.5);
    session.set_quality(QualityLevel::Low).unwrap();
    assert_eq!(ratio(&session), 1.0);
    assert_eq!(
        session.backend().unwrap().viewport().unwrap().physical_size(),
        (1280, 720)
    );
}

#[tokio::test]
async fn moving_to_a_denser_display_rescales_the_viewport() {
    let mut session = default_running().await;
    session.resize(800, 600);
    let ratio = |s: &Session<HeadlessBackend>| s.backend().unwrap().viewport().unwrap().pixel_ratio;
    assert_eq!(ratio(&session), 1.0);

    session.backend_mut().unwrap().set_device_pixel_ratio(1.75);
    assert_eq!(ratio(&session), 1.0, "nothing changes until the scale event");

    session.rescale().unwrap();
    assert_eq!(ratio(&session), 1.75);
    assert_eq!(session.quality().level(), QualityLevel::High);
    let viewport = session.backend().unwrap().viewport().unwrap();
    assert_eq!((viewport.width, viewport.height), (800, 600));
    assert_eq!(viewport.physical_size(), (1400, 1050));

    session.backend_mut().unwrap().set_device_pixel_ratio(3.0);
    session.rescale().unwrap();
    assert_eq!(ratio(&session), 2.0, "the level still caps the ratio");
}

#[tokio::test]
async fn rescale_after_teardown_is_rejected() {
    let mut session = default_running().await;
    session.teardown();
    assert!(session.rescale().is_err());
}

#[tokio::test]
async fn shadow_toggle_and_level_combine() {
    let mut session = default_running().await;
    assert!(session.backend().unwrap().shadows_enabled());
    assert!(session.graph().shadows_cast());

    session
        .set_subsystem_enabled(Subsystem::Shadows, false)
        .unwrap();
    assert!(!session.backend().unwrap().shadows_enabled());
    assert!(!session.graph().shadows_cast());

    // a level change keeps the page's choice
    session.set_quality(QualityLevel::High).unwrap();
    assert!(!session.backend().unwrap().shadows_enabled());

    session.set_quality(QualityLevel::Low).unwrap();
    session
        .set_subsystem_enabled(Subsystem::Shadows, true)
        .unwrap();
    assert!(!session.backend().unwrap().shadows_enabled());

    session.set_quality(QualityLevel::High).unwrap();
    assert!(session.backend().unwrap().shadows_enabled());
    assert!(session.graph().shadows_cast());
}

#[tokio::test]
async fn particle_toggle_freezes_the_spin() {
    let mut session = default_running().await;
    let clock = Clock::new();
    session.frame(clock.at(0));
    session.frame(clock.at(100));
    let spun = session.render_loop().particle_rotation();
    assert!(spun > 0.0);

    session
        .set_subsystem_enabled(Subsystem::Particles, false)
        .unwrap();
    session.frame(clock.at(200));
    session.frame(clock.at(300));
    assert_eq!(session.render_loop().particle_rotation(), spun);
    // the field is still drawn
    assert!(session.backend().unwrap().last_draw().unwrap().particle_field);

    session
        .set_subsystem_enabled(Subsystem::Particles, true)
        .unwrap();
    session.frame(clock.at(400));
    assert!(session.render_loop().particle_rotation() > spun);
}

#[tokio::test]
async fn long_gaps_between_frames_are_clamped() {
    let mut session = default_running().await;
    let clock = Clock::new();
    session.frame(clock.at(0));
    session.frame(clock.at(60_000));
    let spin = QualityLevel::High.profile().particle_spin;
    assert_relative_eq!(
        session.render_loop().particle_rotation(),
        spin * 0.1,
        max_relative = 1e-5
    );
}

#[tokio::test]
async fn resize_updates_viewport_and_aspect() {
    let mut session = default_running().await;
    session.resize(800, 400);

    let viewport = session.backend().unwrap().viewport().unwrap();
    assert_eq!((viewport.width, viewport.height), (800, 400));
    assert_relative_eq!(session.render_loop().camera().aspect, 2.0);

    session.resize(0, 300);
    let viewport = session.backend().unwrap().viewport().unwrap();
    assert_eq!((viewport.width, viewport.height), (800, 400));
}

#[tokio::test]
async fn queued_commands_apply_on_the_next_frame() {
    let mut session = default_running().await;
    let commands = session.commands();
    commands.set_quality(QualityLevel::Low);
    commands.set_subsystem_enabled(Subsystem::Particles, false);
    commands.send(Command::SetAudioEnabled(true));

    assert_eq!(session.quality().level(), QualityLevel::High);
    assert!(!session.audio_enabled());

    assert_eq!(session.frame(Clock::new().at(0)), FrameStatus::Rendered);

    assert_eq!(session.quality().level(), QualityLevel::Low);
    assert!(!session.graph().particle_field().unwrap().motion_enabled);
    assert!(session.audio_enabled());
    assert!(session.audio().unwrap().is_playing());
}

#[tokio::test]
async fn commands_after_teardown_go_nowhere() {
    let mut session = default_running().await;
    let commands = session.commands();
    session.teardown();
    commands.set_quality(QualityLevel::Low);
    assert_eq!(session.frame(Clock::new().at(0)), FrameStatus::Skipped);
    assert_eq!(session.state(), LifecycleState::TornDown);
}

#[tokio::test]
async fn focus_camera_reaches_the_configured_point() {
    let mut session = default_running().await;
    let clock = Clock::new();
    session.commands().focus_camera();

    session.frame(clock.at(0));
    assert!(session.render_loop().is_tweening());
    session.frame(clock.at(450));
    session.frame(clock.at(1000));

    assert!(!session.render_loop().is_tweening());
    let position = session.render_loop().camera().position;
    let [x, y, z] = session.config().camera.focus_target;
    assert_relative_eq!(position.x, x, epsilon = 1e-3);
    assert_relative_eq!(position.y, y, epsilon = 1e-3);
    assert_relative_eq!(position.z, z, epsilon = 1e-3);
}

#[tokio::test]
async fn a_second_focus_supersedes_the_first() {
    let mut session = default_running().await;
    let clock = Clock::new();

    session
        .focus_camera_on([3.0, 1.0, 3.0], Some(Duration::from_millis(500)))
        .unwrap();
    session.frame(clock.at(0));
    session.frame(clock.at(200));

    session
        .focus_camera_on([-2.0, 2.0, 5.0], Some(Duration::from_millis(300)))
        .unwrap();
    for ms in [250, 400, 600, 900] {
        session.frame(clock.at(ms));
    }

    assert!(!session.render_loop().is_tweening());
    let position = session.render_loop().camera().position;
    assert_relative_eq!(position.x, -2.0, epsilon = 1e-3);
    assert_relative_eq!(position.y, 2.0, epsilon = 1e-3);
    assert_relative_eq!(position.z, 5.0, epsilon = 1e-3);
    assert_eq!(
        session.backend().unwrap().last_draw().unwrap().camera_position,
        [position.x, position.y, position.z]
    );
}

#[tokio::test]
async fn audio_toggles_play_and_pause() {
    let mut session = default_running().await;
    assert!(!session.audio().unwrap().is_playing());

    session.set_audio_enabled(true).unwrap();
    assert!(session.audio().unwrap().is_playing());

    session.set_audio_enabled(false).unwrap();
    assert!(!session.audio().unwrap().is_playing());
    assert!(!session.audio_enabled());
}

#[tokio::test]
async fn audio_toggle_without_a_track_is_accepted() {
    let mut session = running(
        SceneConfig {
            audio_path: None,
            ..config()
        },
        DeviceCapabilities::default(),
        &assets(),
        HeadlessSurface::default(),
    )
    .await;
    assert!(session.audio().is_none());
    session.set_audio_enabled(true).unwrap();
    assert!(session.audio_enabled());
}
