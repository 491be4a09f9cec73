//! Managed-restart program switcher.
//!
//! Owns one ffmpeg child that publishes either the live ingest or a looping
//! offline file to the downstream endpoint. A scene change terminates the
//! current child (SIGTERM to its process group, SIGKILL after a grace
//! period), waits briefly for the downstream endpoint to quiesce, and spawns
//! a new child configured for the target scene. The child runs in its own
//! process group so termination reaches any transcoder sub-children.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::EncoderConfig;
use crate::switcher::{PipelineState, ProgramSwitcher};
use crate::{Error, Result, Scene};

/// Grace period between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(3);

/// Pause after stopping a child before publishing again, so the downstream
/// endpoint drops the previous session.
const QUIESCE_DELAY: Duration = Duration::from_millis(500);

struct Inner {
    child: Option<Child>,
    scene: Option<Scene>,
    respawns: u64,
}

/// Shape 2 of the switcher: scene changes restart the encoder process.
pub struct ProcessSwitcher {
    encoder: EncoderConfig,
    inner: Mutex<Inner>,
}

impl ProcessSwitcher {
    pub fn new(encoder: EncoderConfig) -> Self {
        Self {
            encoder,
            inner: Mutex::new(Inner {
                child: None,
                scene: None,
                respawns: 0,
            }),
        }
    }

    /// Build the encoder command line for a scene.
    ///
    /// Both scenes are normalised through the same scale/fps/resample filter
    /// graph and encode settings, so a restart never changes the downstream
    /// caps.
    fn command_for(&self, scene: Scene) -> Command {
        let enc = &self.encoder;
        let mut cmd = Command::new(&enc.ffmpeg_bin);
        cmd.args(["-hide_banner", "-loglevel", "warning"]);

        match scene {
            Scene::Live => {
                cmd.args([
                    "-reconnect",
                    "1",
                    "-reconnect_streamed",
                    "1",
                    "-reconnect_on_network_error",
                    "1",
                    "-rtmp_live",
                    "live",
                    "-i",
                    enc.live_source_url.as_str(),
                ]);
                cmd.arg("-filter_complex").arg(format!(
                    "[0:v]scale=1280:720:flags=bicubic,fps={fps}[v];\
                     [0:a]aresample={sr},adelay=0|0[a]",
                    fps = enc.out_fps,
                    sr = enc.audio_samplerate,
                ));
            }
            Scene::Fallback => {
                cmd.args(["-stream_loop", "-1", "-re", "-i"]);
                cmd.arg(&enc.offline_source);
                cmd.arg("-filter_complex").arg(format!(
                    "[0:v]scale=1280:720:flags=bicubic,fps={fps}[v];\
                     [0:a]aresample={sr}[a]",
                    fps = enc.out_fps,
                    sr = enc.audio_samplerate,
                ));
            }
        }

        let fps = enc.out_fps.to_string();
        let samplerate = enc.audio_samplerate.to_string();
        cmd.args(["-map", "[v]", "-map", "[a]"]);
        cmd.args([
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-profile:v",
            "high",
            "-tune",
            "zerolatency",
            "-b:v",
            enc.vid_bitrate.as_str(),
            "-maxrate",
            enc.max_bitrate.as_str(),
            "-bufsize",
            enc.buffer_size.as_str(),
            "-pix_fmt",
            "yuv420p",
            "-g",
            "120",
            "-keyint_min",
            "120",
            "-sc_threshold",
            "0",
            "-r",
            fps.as_str(),
        ]);
        cmd.args([
            "-c:a",
            "aac",
            "-b:a",
            enc.audio_bitrate.as_str(),
            "-ar",
            samplerate.as_str(),
            "-ac",
            "2",
        ]);
        cmd.args(["-f", "flv", enc.output_url.as_str()]);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .process_group(0)
            .kill_on_drop(true);
        cmd
    }

    fn spawn_locked(&self, inner: &mut Inner, scene: Scene) -> Result<()> {
        let mut cmd = self.command_for(scene);
        let child = cmd
            .spawn()
            .map_err(|e| Error::switcher(format!("failed to spawn encoder: {e}")))?;
        info!(scene = %scene, pid = child.id(), "encoder started");
        inner.child = Some(child);
        Ok(())
    }

    /// SIGTERM the child's process group, escalate to SIGKILL after the
    /// grace period.
    async fn stop_child_locked(inner: &mut Inner) {
        let Some(mut child) = inner.child.take() else {
            return;
        };

        let Some(pid) = child.id() else {
            // Already reaped.
            let _ = child.wait().await;
            return;
        };

        debug!(pid, "stopping encoder");
        unsafe {
            libc::killpg(pid as i32, libc::SIGTERM);
        }

        match tokio::time::timeout(TERM_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(pid, %status, "encoder stopped"),
            Ok(Err(e)) => warn!(pid, "error waiting for encoder: {e}"),
            Err(_) => {
                warn!(pid, "encoder did not stop gracefully, killing");
                unsafe {
                    libc::killpg(pid as i32, libc::SIGKILL);
                }
                let _ = child.kill().await;
                let _ = child.wait().await;
            }
        }
    }

    fn child_is_running(inner: &mut Inner) -> bool {
        match inner.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    debug!(%status, "encoder exit observed");
                    false
                }
                Err(e) => {
                    warn!("failed to poll encoder: {e}");
                    false
                }
            },
            None => false,
        }
    }
}

#[async_trait]
impl ProgramSwitcher for ProcessSwitcher {
    async fn set_scene(&self, scene: Scene) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if inner.scene == Some(scene) && Self::child_is_running(&mut inner) {
            debug!(scene = %scene, "scene already on program");
            return Ok(());
        }

        Self::stop_child_locked(&mut inner).await;
        tokio::time::sleep(QUIESCE_DELAY).await;

        // Record the target scene before spawning: a failed spawn leaves the
        // supervisor retrying in this scene.
        inner.scene = Some(scene);
        self.spawn_locked(&mut inner, scene)
    }

    async fn current_scene(&self) -> Option<Scene> {
        self.inner.lock().await.scene
    }

    async fn pipeline_state(&self) -> PipelineState {
        let mut inner = self.inner.lock().await;
        if Self::child_is_running(&mut inner) {
            PipelineState::Running
        } else {
            PipelineState::Stopped
        }
    }

    async fn supervise(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(scene) = inner.scene else {
            return Ok(());
        };
        if Self::child_is_running(&mut inner) {
            return Ok(());
        }

        inner.respawns += 1;
        error!(
            scene = %scene,
            respawns = inner.respawns,
            "encoder exited unexpectedly, restarting"
        );
        if let Some(mut child) = inner.child.take() {
            let _ = child.wait().await;
        }
        self.spawn_locked(&mut inner, scene)
    }

    async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        Self::stop_child_locked(&mut inner).await;
        inner.scene = None;
    }
}
