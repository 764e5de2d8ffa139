use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_VOLUME: f64 = 0.0;
pub const DEFAULT_PORT: u16 = 8080;

/// Repeat preference in the settings document; `0`, `1`, `2` on the wire.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

impl TryFrom<u8> for RepeatMode {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Off),
            1 => Ok(Self::All),
            2 => Ok(Self::One),
            other => Err(format!("invalid repeat mode {other}, expected 0, 1 or 2")),
        }
    }
}

impl From<RepeatMode> for u8 {
    fn from(mode: RepeatMode) -> Self {
        match mode {
            RepeatMode::Off => 0,
            RepeatMode::All => 1,
            RepeatMode::One => 2,
        }
    }
}

/// Front-end preferences.
///
/// Every field is optional: absent means "use the default", which is not the
/// same as an explicit `false` or `0`. Saving replaces the whole document, and
/// keys this version does not know about are kept as they were sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shuffle: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualizer_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_visualizer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_play: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossfade: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gapless: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq_bass: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq_mid: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq_treble: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq_enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Settings {
    pub fn volume(&self) -> f64 {
        self.volume.unwrap_or(DEFAULT_VOLUME)
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle.unwrap_or(false)
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat.unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.last_port.unwrap_or(DEFAULT_PORT)
    }

    /// The document as front-ends receive it: fields that always have a value
    /// are filled with their defaults when absent. The stored file stays sparse.
    pub fn with_defaults(mut self) -> Self {
        self.volume.get_or_insert(DEFAULT_VOLUME);
        self.shuffle.get_or_insert(false);
        self.repeat.get_or_insert_default();
        self.last_port.get_or_insert(DEFAULT_PORT);
        self
    }

    /// Decode as much of `raw` as possible.
    ///
    /// Keys whose values do not fit their field are dropped one by one, so a
    /// single bad entry does not cost the user every other preference. Input
    /// that is not a JSON object yields the defaults.
    pub fn decode_lenient(raw: &[u8]) -> (Self, Vec<String>) {
        match serde_json::from_slice::<Self>(raw) {
            Ok(s) => (s, Vec::new()),
            Err(full_err) => {
                let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(raw) else {
                    return (Self::default(), vec![full_err.to_string()]);
                };
                let mut kept = Map::new();
                let mut dropped = Vec::new();
                for (key, value) in map {
                    let mut single = Map::new();
                    single.insert(key.clone(), value.clone());
                    match serde_json::from_value::<Self>(Value::Object(single)) {
                        Ok(_) => {
                            kept.insert(key, value);
                        }
                        Err(e) => dropped.push(format!("{key}: {e}")),
                    }
                }
                let settings = serde_json::from_value(Value::Object(kept)).unwrap_or_default();
                (settings, dropped)
            }
        }
    }
}

/// Playback queue snapshot owned by a front-end; stored as-is.
///
/// Values are not interpreted: `current_index` is `-1` when nothing is
/// selected, `repeat` is whatever integer the front-end uses, and unknown
/// keys round-trip untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueState {
    pub file_paths: Vec<String>,
    pub current_index: i64,
    pub shuffle: bool,
    pub repeat: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
