use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub buffers: BufferConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MotionConfig {
    /// Per-frame anchor displacement (normalized units) that counts as movement
    #[serde(default = "default_movement_threshold")]
    pub movement_threshold: f32,

    /// Seconds of continuous movement before Dynamic mode is entered
    #[serde(default = "default_movement_duration_threshold")]
    pub movement_duration_threshold: f64,

    /// Seconds of stillness before Dynamic mode may fall back to Static
    #[serde(default = "default_static_stability_time")]
    pub static_stability_time: f64,

    /// Number of displacement samples kept for smoothing
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Samples required before movement is evaluated at all
    #[serde(default = "default_min_history")]
    pub min_history: usize,

    /// Anchor points kept for the trail display
    #[serde(default = "default_trail_size")]
    pub trail_size: usize,

    /// Seconds of stillness after which a qualifying movement episode is forgotten
    #[serde(default = "default_episode_expiry")]
    pub episode_expiry: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecognitionConfig {
    #[serde(default = "default_static_confidence_threshold")]
    pub static_confidence_threshold: f32,

    #[serde(default = "default_dynamic_confidence_threshold")]
    pub dynamic_confidence_threshold: f32,

    /// Seconds a pose must be held in Static mode before it is classified
    #[serde(default = "default_static_hold_time")]
    pub static_hold_time: f64,

    /// Seconds the sequence buffer must have been accumulating
    #[serde(default = "default_dynamic_sequence_time")]
    pub dynamic_sequence_time: f64,

    /// Seconds in Dynamic mode after which a movement counts as complete
    #[serde(default = "default_dynamic_completion_wait")]
    pub dynamic_completion_wait: f64,

    /// Seconds of stillness after which a movement counts as complete
    #[serde(default = "default_dynamic_stillness_time")]
    pub dynamic_stillness_time: f64,

    /// Seconds after an accepted prediction before the next may fire
    #[serde(default = "default_prediction_cooldown")]
    pub prediction_cooldown: f64,

    /// Cooldown multiplier applied when a dynamic gesture follows a dynamic gesture
    #[serde(default = "default_dynamic_cooldown_multiplier")]
    pub dynamic_cooldown_multiplier: f64,

    /// Seconds the last recognition stays on the status display
    #[serde(default = "default_display_time")]
    pub display_time: f64,

    /// Seconds without a hand before tracking loss is reported
    #[serde(default = "default_hand_loss_report_time")]
    pub hand_loss_report_time: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BufferConfig {
    /// Capacity of the static feature buffer
    #[serde(default = "default_static_capacity")]
    pub static_capacity: usize,

    /// Static vectors required before a static prediction
    #[serde(default = "default_static_min_samples")]
    pub static_min_samples: usize,

    /// Frames required by the dynamic classifier (and sequence buffer capacity)
    #[serde(default = "default_sequence_length")]
    pub sequence_length: usize,

    /// Length of every feature vector
    #[serde(default = "default_feature_dim")]
    pub feature_dim: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChannelConfig {
    /// Minimum seconds between two different values
    #[serde(default = "default_channel_delay")]
    pub delay: f64,

    /// Seconds after which an unchanged value is sent again
    #[serde(default = "default_channel_resend")]
    pub resend_interval: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DispatchConfig {
    #[serde(default)]
    pub gesture: ChannelConfig,

    #[serde(default)]
    pub voice: ChannelConfig,

    /// Value that is never forwarded to actuators
    #[serde(default = "default_noop_value")]
    pub noop_value: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_send_timeout")]
    pub send_timeout: f64,

    /// Number of concurrent sender tasks
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Log requests without sending them anywhere
    Log,
    /// POST JSON to the configured endpoints
    Http,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransportConfig {
    #[serde(default = "default_transport_kind")]
    pub kind: TransportKind,

    #[serde(default = "default_gesture_url")]
    pub gesture_url: String,

    #[serde(default = "default_voice_url")]
    pub voice_url: String,

    /// User id attached to every request
    #[serde(default)]
    pub uid: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    /// Path to the static (single pose) model file
    #[serde(default = "default_static_model")]
    pub static_model: Option<String>,

    /// Path to the dynamic (sequence) model file
    #[serde(default = "default_dynamic_model")]
    pub dynamic_model: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VoiceConfig {
    #[serde(default = "default_voice_enabled")]
    pub enabled: bool,

    /// Extra action → command aliases, merged over the built-in table
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InputConfig {
    /// JSON-lines file with pose and voice records, or "-" for stdin
    #[serde(default = "default_input_source")]
    pub source: String,

    /// Pace timestamped records in real time instead of replaying as fast as possible
    #[serde(default)]
    pub realtime: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Pending dispatch requests before new ones are dropped
    #[serde(default = "default_dispatch_queue_capacity")]
    pub dispatch_queue_capacity: usize,

    /// Seconds between session status log lines
    #[serde(default = "default_status_interval")]
    pub status_interval: f64,
}

impl BridgeConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("smartbridge.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("motion.movement_threshold", default_movement_threshold() as f64)?
            .set_default(
                "motion.movement_duration_threshold",
                default_movement_duration_threshold(),
            )?
            .set_default("motion.static_stability_time", default_static_stability_time())?
            .set_default("motion.history_size", default_history_size() as i64)?
            .set_default("motion.min_history", default_min_history() as i64)?
            .set_default("motion.trail_size", default_trail_size() as i64)?
            .set_default("motion.episode_expiry", default_episode_expiry())?
            .set_default(
                "recognition.static_confidence_threshold",
                default_static_confidence_threshold() as f64,
            )?
            .set_default(
                "recognition.dynamic_confidence_threshold",
                default_dynamic_confidence_threshold() as f64,
            )?
            .set_default("recognition.static_hold_time", default_static_hold_time())?
            .set_default(
                "recognition.dynamic_sequence_time",
                default_dynamic_sequence_time(),
            )?
            .set_default(
                "recognition.dynamic_completion_wait",
                default_dynamic_completion_wait(),
            )?
            .set_default(
                "recognition.dynamic_stillness_time",
                default_dynamic_stillness_time(),
            )?
            .set_default("recognition.prediction_cooldown", default_prediction_cooldown())?
            .set_default(
                "recognition.dynamic_cooldown_multiplier",
                default_dynamic_cooldown_multiplier(),
            )?
            .set_default("recognition.display_time", default_display_time())?
            .set_default(
                "recognition.hand_loss_report_time",
                default_hand_loss_report_time(),
            )?
            .set_default("buffers.static_capacity", default_static_capacity() as i64)?
            .set_default("buffers.static_min_samples", default_static_min_samples() as i64)?
            .set_default("buffers.sequence_length", default_sequence_length() as i64)?
            .set_default("buffers.feature_dim", default_feature_dim() as i64)?
            .set_default("dispatch.gesture.delay", default_channel_delay())?
            .set_default("dispatch.gesture.resend_interval", default_channel_resend())?
            .set_default("dispatch.voice.delay", default_channel_delay())?
            .set_default("dispatch.voice.resend_interval", default_channel_resend())?
            .set_default("dispatch.noop_value", default_noop_value())?
            .set_default("dispatch.send_timeout", default_send_timeout())?
            .set_default("dispatch.workers", default_workers() as i64)?
            .set_default("transport.kind", "log")?
            .set_default("transport.gesture_url", default_gesture_url())?
            .set_default("transport.voice_url", default_voice_url())?
            .set_default("transport.uid", "")?
            .set_default("voice.enabled", default_voice_enabled())?
            .set_default("input.source", default_input_source())?
            .set_default("input.realtime", false)?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "system.dispatch_queue_capacity",
                default_dispatch_queue_capacity() as i64,
            )?
            .set_default("system.status_interval", default_status_interval())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables, e.g. SMARTBRIDGE_TRANSPORT__UID
            .add_source(
                Environment::with_prefix("SMARTBRIDGE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: BridgeConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(name: &str, value: f64) -> Result<(), ConfigError> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Message(format!(
                    "{} must be greater than 0",
                    name
                )))
            }
        }

        fn probability(name: &str, value: f32) -> Result<(), ConfigError> {
            if value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(ConfigError::Message(format!(
                    "{} must be within (0, 1]",
                    name
                )))
            }
        }

        // Motion settings
        positive("motion.movement_threshold", self.motion.movement_threshold as f64)?;
        positive(
            "motion.movement_duration_threshold",
            self.motion.movement_duration_threshold,
        )?;
        positive("motion.static_stability_time", self.motion.static_stability_time)?;
        positive("motion.episode_expiry", self.motion.episode_expiry)?;

        if self.motion.min_history == 0 || self.motion.history_size < self.motion.min_history {
            return Err(ConfigError::Message(
                "motion.history_size must be at least motion.min_history (and both > 0)"
                    .to_string(),
            ));
        }

        // Recognition settings
        probability(
            "recognition.static_confidence_threshold",
            self.recognition.static_confidence_threshold,
        )?;
        probability(
            "recognition.dynamic_confidence_threshold",
            self.recognition.dynamic_confidence_threshold,
        )?;
        positive("recognition.static_hold_time", self.recognition.static_hold_time)?;
        positive(
            "recognition.dynamic_completion_wait",
            self.recognition.dynamic_completion_wait,
        )?;
        positive(
            "recognition.dynamic_stillness_time",
            self.recognition.dynamic_stillness_time,
        )?;

        if self.recognition.dynamic_sequence_time < 0.0
            || self.recognition.prediction_cooldown < 0.0
        {
            return Err(ConfigError::Message(
                "recognition durations must not be negative".to_string(),
            ));
        }

        if self.recognition.dynamic_cooldown_multiplier < 1.0 {
            return Err(ConfigError::Message(
                "recognition.dynamic_cooldown_multiplier must be at least 1".to_string(),
            ));
        }

        // Buffer settings
        if self.buffers.static_capacity == 0
            || self.buffers.sequence_length == 0
            || self.buffers.feature_dim == 0
        {
            return Err(ConfigError::Message(
                "Buffer capacities and feature_dim must be greater than 0".to_string(),
            ));
        }

        if self.buffers.static_min_samples == 0
            || self.buffers.static_min_samples > self.buffers.static_capacity
        {
            return Err(ConfigError::Message(
                "buffers.static_min_samples must be within 1..=static_capacity".to_string(),
            ));
        }

        // Dispatch settings
        for (name, channel) in [("gesture", &self.dispatch.gesture), ("voice", &self.dispatch.voice)] {
            if channel.delay < 0.0 {
                return Err(ConfigError::Message(format!(
                    "dispatch.{}.delay must not be negative",
                    name
                )));
            }
            if channel.resend_interval < channel.delay {
                return Err(ConfigError::Message(format!(
                    "dispatch.{}.resend_interval must not be shorter than delay",
                    name
                )));
            }
        }

        positive("dispatch.send_timeout", self.dispatch.send_timeout)?;

        if self.dispatch.workers == 0 {
            return Err(ConfigError::Message(
                "dispatch.workers must be greater than 0".to_string(),
            ));
        }

        if self.transport.kind == TransportKind::Http
            && (self.transport.gesture_url.is_empty() || self.transport.voice_url.is_empty())
        {
            return Err(ConfigError::Message(
                "HTTP transport requires gesture_url and voice_url".to_string(),
            ));
        }

        // System settings
        if self.system.event_bus_capacity == 0 || self.system.dispatch_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "System capacities must be greater than 0".to_string(),
            ));
        }

        positive("system.status_interval", self.system.status_interval)?;

        let durations = [
            ("motion.movement_duration_threshold", self.motion.movement_duration_threshold),
            ("motion.static_stability_time", self.motion.static_stability_time),
            ("motion.episode_expiry", self.motion.episode_expiry),
            ("recognition.static_hold_time", self.recognition.static_hold_time),
            ("recognition.dynamic_sequence_time", self.recognition.dynamic_sequence_time),
            ("recognition.dynamic_completion_wait", self.recognition.dynamic_completion_wait),
            ("recognition.dynamic_stillness_time", self.recognition.dynamic_stillness_time),
            (
                "recognition.prediction_cooldown * dynamic_cooldown_multiplier",
                self.recognition.prediction_cooldown * self.recognition.dynamic_cooldown_multiplier,
            ),
            ("recognition.display_time", self.recognition.display_time),
            ("recognition.hand_loss_report_time", self.recognition.hand_loss_report_time),
            ("dispatch.gesture.resend_interval", self.dispatch.gesture.resend_interval),
            ("dispatch.voice.resend_interval", self.dispatch.voice.resend_interval),
            ("dispatch.send_timeout", self.dispatch.send_timeout),
            ("system.status_interval", self.system.status_interval),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value > MAX_DURATION_SECS {
                return Err(ConfigError::Message(format!(
                    "{} must be at most {} seconds",
                    name, MAX_DURATION_SECS
                )));
            }
        }

        Ok(())
    }
}

/// Upper bound for every duration setting
pub const MAX_DURATION_SECS: f64 = 86_400.0;

/// Convert a seconds value from the configuration into a `Duration`
///
/// Negative and NaN values become zero; values too large to represent saturate.
pub fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

impl MotionConfig {
    pub fn movement_duration(&self) -> Duration {
        secs(self.movement_duration_threshold)
    }

    pub fn stability(&self) -> Duration {
        secs(self.static_stability_time)
    }

    pub fn episode_expiry(&self) -> Duration {
        secs(self.episode_expiry)
    }
}

impl ChannelConfig {
    pub fn delay(&self) -> Duration {
        secs(self.delay)
    }

    pub fn resend_interval(&self) -> Duration {
        secs(self.resend_interval)
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            movement_threshold: default_movement_threshold(),
            movement_duration_threshold: default_movement_duration_threshold(),
            static_stability_time: default_static_stability_time(),
            history_size: default_history_size(),
            min_history: default_min_history(),
            trail_size: default_trail_size(),
            episode_expiry: default_episode_expiry(),
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            static_confidence_threshold: default_static_confidence_threshold(),
            dynamic_confidence_threshold: default_dynamic_confidence_threshold(),
            static_hold_time: default_static_hold_time(),
            dynamic_sequence_time: default_dynamic_sequence_time(),
            dynamic_completion_wait: default_dynamic_completion_wait(),
            dynamic_stillness_time: default_dynamic_stillness_time(),
            prediction_cooldown: default_prediction_cooldown(),
            dynamic_cooldown_multiplier: default_dynamic_cooldown_multiplier(),
            display_time: default_display_time(),
            hand_loss_report_time: default_hand_loss_report_time(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            static_capacity: default_static_capacity(),
            static_min_samples: default_static_min_samples(),
            sequence_length: default_sequence_length(),
            feature_dim: default_feature_dim(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            delay: default_channel_delay(),
            resend_interval: default_channel_resend(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            gesture: ChannelConfig::default(),
            voice: ChannelConfig::default(),
            noop_value: default_noop_value(),
            send_timeout: default_send_timeout(),
            workers: default_workers(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            gesture_url: default_gesture_url(),
            voice_url: default_voice_url(),
            uid: String::new(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            static_model: default_static_model(),
            dynamic_model: default_dynamic_model(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: default_voice_enabled(),
            aliases: HashMap::new(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            source: default_input_source(),
            realtime: false,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
            dispatch_queue_capacity: default_dispatch_queue_capacity(),
            status_interval: default_status_interval(),
        }
    }
}

// Default value functions
fn default_movement_threshold() -> f32 {
    0.02
}
fn default_movement_duration_threshold() -> f64 {
    0.3
}
fn default_static_stability_time() -> f64 {
    0.3
}
fn default_history_size() -> usize {
    15
}
fn default_min_history() -> usize {
    5
}
fn default_trail_size() -> usize {
    50
}
fn default_episode_expiry() -> f64 {
    3.0
}

fn default_static_confidence_threshold() -> f32 {
    0.7
}
fn default_dynamic_confidence_threshold() -> f32 {
    0.6
}
fn default_static_hold_time() -> f64 {
    1.0
}
fn default_dynamic_sequence_time() -> f64 {
    1.0
}
fn default_dynamic_completion_wait() -> f64 {
    1.5
}
fn default_dynamic_stillness_time() -> f64 {
    1.0
}
fn default_prediction_cooldown() -> f64 {
    1.0
}
fn default_dynamic_cooldown_multiplier() -> f64 {
    3.0
}
fn default_display_time() -> f64 {
    3.0
}
fn default_hand_loss_report_time() -> f64 {
    5.0
}

fn default_static_capacity() -> usize {
    10
}
fn default_static_min_samples() -> usize {
    5
}
fn default_sequence_length() -> usize {
    60
}
fn default_feature_dim() -> usize {
    crate::frame::FEATURE_DIM
}

fn default_channel_delay() -> f64 {
    2.0
}
fn default_channel_resend() -> f64 {
    5.0
}
fn default_noop_value() -> String {
    "nothing".to_string()
}
fn default_send_timeout() -> f64 {
    10.0
}
fn default_workers() -> usize {
    4
}

fn default_transport_kind() -> TransportKind {
    TransportKind::Log
}
fn default_gesture_url() -> String {
    "http://127.0.0.1:5000/gesture".to_string()
}
fn default_voice_url() -> String {
    "http://127.0.0.1:5000/voice".to_string()
}

fn default_static_model() -> Option<String> {
    Some("models/static.json".to_string())
}
fn default_dynamic_model() -> Option<String> {
    Some("models/dynamic.json".to_string())
}

fn default_voice_enabled() -> bool {
    true
}

fn default_input_source() -> String {
    "-".to_string()
}

fn default_event_bus_capacity() -> usize {
    256
}
fn default_dispatch_queue_capacity() -> usize {
    32
}
fn default_status_interval() -> f64 {
    5.0
}
