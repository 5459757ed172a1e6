//! Looping background audio track.
//!
//! On the web the track is an `<audio>` element streaming the file. Native
//! builds decode the file with rodio and loop it on the default output
//! device. Without a device, or without playable bytes, a detached track
//! stands in that only tracks its play state, so the rest of the session
//! behaves the same.

use log::{info, warn};

pub trait AudioTrack {
    fn path(&self) -> &str;
    /// Starts playback. Autoplay refusals are logged, not returned.
    fn play(&mut self) -> anyhow::Result<()>;
    fn pause(&mut self);
    fn is_playing(&self) -> bool;
    /// Stops playback and drops the media source. Idempotent.
    fn release(&mut self);
    fn is_released(&self) -> bool;
}

#[cfg(target_arch = "wasm32")]
pub fn open_track(path: &str, volume: f32) -> anyhow::Result<Box<dyn AudioTrack>> {
    Ok(Box::new(web::HtmlAudioTrack::new(path, volume)?))
}

/// Opens a looping track over `bytes`, falling back to a silent track when
/// they are missing, cannot be decoded or no output device is available.
#[cfg(not(target_arch = "wasm32"))]
pub fn open_track(
    path: &str,
    volume: f32,
    bytes: Option<Vec<u8>>,
) -> anyhow::Result<Box<dyn AudioTrack>> {
    #[cfg(feature = "audio")]
    if let Some(bytes) = bytes {
        match output::RodioTrack::new(path, bytes, volume) {
            Ok(track) => return Ok(Box::new(track)),
            Err(e) => warn!("audio `{path}` falls back to a silent track: {e:#}"),
        }
    }
    #[cfg(not(feature = "audio"))]
    if bytes.is_some() {
        warn!("built without audio output, `{path}` plays silently");
    }
    Ok(Box::new(DetachedTrack::new(path, volume)))
}

#[derive(Debug)]
pub struct DetachedTrack {
    path: String,
    volume: f32,
    playing: bool,
    released: bool,
}

impl DetachedTrack {
    pub fn new(path: &str, volume: f32) -> Self {
        Self {
            path: path.to_string(),
            volume: volume.clamp(0.0, 1.0),
            playing: false,
            released: false,
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }
}

impl AudioTrack for DetachedTrack {
    fn path(&self) -> &str {
        &self.path
    }

    fn play(&mut self) -> anyhow::Result<()> {
        if self.released {
            anyhow::bail!("audio track `{}` was released", self.path);
        }
        info!("no audio output available, `{}` plays silently", self.path);
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn release(&mut self) {
        self.playing = false;
        self.released = true;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

#[cfg(all(feature = "audio", not(target_arch = "wasm32")))]
mod output {
    use std::io::Cursor;

    use anyhow::Context;
    use rodio::{Decoder, OutputStream, Sink, Source};

    use super::*;

    /// A track looping on the default output device.
    pub struct RodioTrack {
        path: String,
        sink: Option<Sink>,
        // must outlive the sink
        stream: Option<OutputStream>,
    }

    impl RodioTrack {
        pub fn new(path: &str, bytes: Vec<u8>, volume: f32) -> anyhow::Result<Self> {
            let source = Decoder::new(Cursor::new(bytes))
                .with_context(|| format!("could not decode `{path}`"))?;
            let (stream, handle) =
                OutputStream::try_default().context("no audio output device")?;
            let sink = Sink::try_new(&handle).context("could not open an audio sink")?;
            sink.pause();
            sink.set_volume(volume.clamp(0.0, 1.0));
            sink.append(source.repeat_infinite());
            info!("audio `{path}` ready on the default output");
            Ok(Self {
                path: path.to_string(),
                sink: Some(sink),
                stream: Some(stream),
            })
        }

        pub fn volume(&self) -> Option<f32> {
            self.sink.as_ref().map(Sink::volume)
        }
    }

    impl AudioTrack for RodioTrack {
        fn path(&self) -> &str {
            &self.path
        }

        fn play(&mut self) -> anyhow::Result<()> {
            let Some(sink) = &self.sink else {
                anyhow::bail!("audio track `{}` was released", self.path);
            };
            sink.play();
            Ok(())
        }

        fn pause(&mut self) {
            if let Some(sink) = &self.sink {
                sink.pause();
            }
        }

        fn is_playing(&self) -> bool {
            self.sink
                .as_ref()
                .is_some_and(|sink| !sink.is_paused() && !sink.empty())
        }

        fn release(&mut self) {
            if let Some(sink) = self.sink.take() {
                sink.stop();
            }
            self.stream = None;
        }

        fn is_released(&self) -> bool {
            self.sink.is_none()
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod web {
    use super::*;
    use wasm_bindgen::JsValue;

    fn js_err(e: JsValue) -> anyhow::Error {
        anyhow::anyhow!("{e:?}")
    }

    pub struct HtmlAudioTrack {
        path: String,
        element: web_sys::HtmlAudioElement,
        playing: bool,
        released: bool,
    }

    impl HtmlAudioTrack {
        pub fn new(path: &str, volume: f32) -> anyhow::Result<Self> {
            let element = web_sys::HtmlAudioElement::new_with_src(path).map_err(js_err)?;
            element.set_loop(true);
            element.set_volume(volume.clamp(0.0, 1.0) as f64);
            element.set_preload("auto");
            Ok(Self {
                path: path.to_string(),
                element,
                playing: false,
                released: false,
            })
        }
    }

    impl AudioTrack for HtmlAudioTrack {
        fn path(&self) -> &str {
            &self.path
        }

        fn play(&mut self) -> anyhow::Result<()> {
            if self.released {
                anyhow::bail!("audio track `{}` was released", self.path);
            }
            let promise = self.element.play().map_err(js_err)?;
            let path = self.path.clone();
            wasm_bindgen_futures::spawn_local(async move {
                if let Err(e) = wasm_bindgen_futures::JsFuture::from(promise).await {
                    warn!("playback of `{path}` was blocked: {e:?}");
                }
            });
            self.playing = true;
            Ok(())
        }

        fn pause(&mut self) {
            if let Err(e) = self.element.pause() {
                warn!("could not pause `{}`: {e:?}", self.path);
            }
            self.playing = false;
        }

        fn is_playing(&self) -> bool {
            self.playing
        }

        fn release(&mut self) {
            if self.released {
                return;
            }
            self.pause();
            self.element.set_src("");
            self.released = true;
        }

        fn is_released(&self) -> bool {
            self.released
        }
    }
}
