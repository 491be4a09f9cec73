//! Environment-driven configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Everything the switcher process needs to run.
#[derive(Debug, Clone)]
pub struct SwitcherSettings {
    pub probe: ProbeConfig,
    pub decider: DeciderConfig,
    pub encoder: EncoderConfig,
    /// Base URL of the fan-out server to notify after scene changes.
    pub peer_notify_url: Option<String>,
    pub bind_address: String,
    pub port: u16,
}

/// Probe target.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub stats_url: String,
    pub app_name: String,
    pub stream_name: String,
}

/// Scene decider tuning. The asymmetric dwell times keep brief camera
/// interruptions from flapping the program while letting a clean signal win
/// it back quickly.
#[derive(Debug, Clone, Copy)]
pub struct DeciderConfig {
    pub poll_interval: Duration,
    pub min_bitrate_kbps: u32,
    pub miss_timeout: Duration,
    pub back_stability: Duration,
}

impl Default for DeciderConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            min_bitrate_kbps: 300,
            miss_timeout: Duration::from_millis(3000),
            back_stability: Duration::from_millis(2000),
        }
    }
}

/// Encoder child configuration for the managed-restart switcher.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub ffmpeg_bin: String,
    /// Looping local file published while the camera is away.
    pub offline_source: PathBuf,
    /// Camera ingest URL.
    pub live_source_url: String,
    /// Downstream publish point.
    pub output_url: String,
    pub out_fps: u32,
    pub vid_bitrate: String,
    pub max_bitrate: String,
    pub buffer_size: String,
    pub audio_bitrate: String,
    pub audio_samplerate: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            offline_source: PathBuf::from("/opt/offline.mp4"),
            live_source_url: "rtmp://nginx-rtmp:1935/live/cam".to_string(),
            output_url: "rtmp://nginx-rtmp:1935/switch/out".to_string(),
            out_fps: 30,
            vid_bitrate: "6000k".to_string(),
            max_bitrate: "6000k".to_string(),
            buffer_size: "12M".to_string(),
            audio_bitrate: "160k".to_string(),
            audio_samplerate: 48000,
        }
    }
}

impl SwitcherSettings {
    /// Load settings from environment variables, falling back to defaults.
    pub fn from_env_or_default() -> Self {
        let decider_defaults = DeciderConfig::default();
        let encoder_defaults = EncoderConfig::default();

        Self {
            probe: ProbeConfig {
                stats_url: env_string("STATS_URL", "http://nginx-rtmp:8080/stat"),
                app_name: env_string("APP_NAME", "live"),
                stream_name: env_string("STREAM_NAME", "cam"),
            },
            decider: DeciderConfig {
                poll_interval: env_duration_ms("POLL_INTERVAL_MS", decider_defaults.poll_interval),
                min_bitrate_kbps: env_parse("MIN_BITRATE_KBPS", decider_defaults.min_bitrate_kbps),
                miss_timeout: env_duration_ms("CAM_MISS_TIMEOUT_MS", decider_defaults.miss_timeout),
                back_stability: env_duration_ms(
                    "CAM_BACK_STABILITY_MS",
                    decider_defaults.back_stability,
                ),
            },
            encoder: EncoderConfig {
                ffmpeg_bin: env_string("FFMPEG_BIN", &encoder_defaults.ffmpeg_bin),
                offline_source: PathBuf::from(env_string(
                    "OFFLINE_SOURCE",
                    "/opt/offline.mp4",
                )),
                live_source_url: env_string("LIVE_SOURCE_URL", &encoder_defaults.live_source_url),
                output_url: env_string("OUTPUT_URL", &encoder_defaults.output_url),
                out_fps: env_parse("OUT_FPS", encoder_defaults.out_fps),
                vid_bitrate: env_string("VID_BITRATE", &encoder_defaults.vid_bitrate),
                max_bitrate: env_string("MAX_BITRATE", &encoder_defaults.max_bitrate),
                buffer_size: env_string("BUFFER_SIZE", &encoder_defaults.buffer_size),
                audio_bitrate: env_string("AUDIO_BITRATE", &encoder_defaults.audio_bitrate),
                audio_samplerate: env_parse("AUDIO_SAMPLERATE", encoder_defaults.audio_samplerate),
            },
            peer_notify_url: std::env::var("PEER_SCENE_NOTIFY_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            bind_address: env_string("SWITCHER_BIND_ADDRESS", "0.0.0.0"),
            port: env_parse("SWITCHER_PORT", 8088),
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_duration_ms(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decider_defaults_match_watchdog_tuning() {
        let config = DeciderConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.min_bitrate_kbps, 300);
        assert_eq!(config.miss_timeout, Duration::from_secs(3));
        assert_eq!(config.back_stability, Duration::from_secs(2));
    }

    #[test]
    fn settings_have_sane_defaults() {
        let settings = SwitcherSettings::from_env_or_default();
        assert!(settings.probe.stats_url.starts_with("http"));
        assert_eq!(settings.probe.app_name, "live");
        assert_eq!(settings.encoder.out_fps, 30);
        assert_eq!(settings.port, 8088);
    }
}
