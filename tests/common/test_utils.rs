#![allow(dead_code)]

use std::io::Cursor;

use backdrop_ngin::{
    SceneConfig, Session,
    backend::headless::{HeadlessBackend, HeadlessSurface},
    quality::DeviceCapabilities,
    resources::{AssetLoader, MemoryAssets, registry::ResourceKind},
};
use instant::{Duration, Instant};

pub(crate) const LOW_RES: &str = "images/hero_bg-low.png";
pub(crate) const HIGH_RES: &str = "images/hero_bg.png";
pub(crate) const MODEL: &str = "models/triangle.glb";
pub(crate) const AUDIO: &str = "audio/theme_loop.mp3";

/// A solid colour PNG.
pub(crate) fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// A binary glTF holding a single triangle.
pub(crate) fn triangle_glb() -> Vec<u8> {
    let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    let bin: Vec<u8> = positions
        .iter()
        .flatten()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let json = format!(
        r#"{{"asset":{{"version":"2.0"}},"scene":0,"scenes":[{{"nodes":[0]}}],"nodes":[{{"mesh":0}}],"meshes":[{{"primitives":[{{"attributes":{{"POSITION":0}}}}]}}],"buffers":[{{"byteLength":{len}}}],"bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":{len}}}],"accessors":[{{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[0.0,0.0,0.0],"max":[1.0,1.0,0.0]}}]}}"#,
        len = bin.len()
    );
    let mut json = json.into_bytes();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = bin;
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json);
    glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(&bin);
    glb
}

/// Every asset the default test config asks for.
pub(crate) fn assets() -> MemoryAssets {
    MemoryAssets::new()
        .with(LOW_RES, png(4, 4, [10, 20, 30, 255]))
        .with(HIGH_RES, png(16, 16, [10, 20, 30, 255]))
        .with(MODEL, triangle_glb())
}

pub(crate) fn config() -> SceneConfig {
    SceneConfig {
        particle_seed: Some(42),
        low_res_background: LOW_RES.to_string(),
        high_res_background: Some(HIGH_RES.to_string()),
        model_path: Some(MODEL.to_string()),
        audio_path: Some(AUDIO.to_string()),
        ..SceneConfig::default()
    }
}

pub(crate) fn session(
    config: SceneConfig,
    caps: DeviceCapabilities,
    assets: &MemoryAssets,
) -> Session<HeadlessBackend> {
    Session::new(config, caps, AssetLoader::new(assets.clone()))
}

pub(crate) async fn running(
    config: SceneConfig,
    caps: DeviceCapabilities,
    assets: &MemoryAssets,
    surface: HeadlessSurface,
) -> Session<HeadlessBackend> {
    let mut session = session(config, caps, assets);
    session
        .initialize(Some(surface))
        .await
        .expect("session should start");
    session
}

pub(crate) async fn default_running() -> Session<HeadlessBackend> {
    running(
        config(),
        DeviceCapabilities::default(),
        &assets(),
        HeadlessSurface::default(),
    )
    .await
}

/// Monotonic clock for driving frames by hand.
pub(crate) struct Clock {
    start: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn at(&self, ms: u64) -> Instant {
        self.start + Duration::from_millis(ms)
    }
}

/// Everything registered was released exactly once and the backend holds
/// nothing any more.
pub(crate) fn assert_released_everything(session: &Session<HeadlessBackend>) {
    let registry = session.registry();
    assert_eq!(registry.live_total(), 0, "retained: {:?}", registry.retained());
    for kind in ResourceKind::ALL {
        assert_eq!(
            registry.registered(kind),
            registry.released(kind),
            "{kind:?} registrations and releases differ"
        );
    }
    if let Some(backend) = session.backend() {
        assert_eq!(backend.live(), 0, "backend still holds {:?}", backend.live_ids());
        assert_eq!(backend.double_disposals(), 0);
    }
}
