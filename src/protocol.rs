//! Wire format between the daemon and its clients.
//!
//! Every frame is one JSON object terminated by `\n`. A client sends a
//! [`Request`] and waits for exactly one [`Response`] before sending the next.

use std::fmt;
use std::io::{self, BufRead, Read, Write};
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::CachedLibrary;
use crate::store::{PlayStats, QueueState, Settings};

pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Ping,
    Library,
    Scan,
    CoverArt,
    GetFavorites,
    AddFavorite,
    RemoveFavorite,
    IsFavorite,
    GetSettings,
    SaveSettings,
    GetStats,
    RecordPlay,
    GetQueue,
    SaveQueue,
}

impl Action {
    pub const ALL: [Action; 14] = [
        Action::Ping,
        Action::Library,
        Action::Scan,
        Action::CoverArt,
        Action::GetFavorites,
        Action::AddFavorite,
        Action::RemoveFavorite,
        Action::IsFavorite,
        Action::GetSettings,
        Action::SaveSettings,
        Action::GetStats,
        Action::RecordPlay,
        Action::GetQueue,
        Action::SaveQueue,
    ];

    /// Canonical name sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Ping => "ping",
            Action::Library => "library",
            Action::Scan => "scan",
            Action::CoverArt => "cover-art",
            Action::GetFavorites => "get-favorites",
            Action::AddFavorite => "add-favorite",
            Action::RemoveFavorite => "remove-favorite",
            Action::IsFavorite => "is-favorite",
            Action::GetSettings => "get-settings",
            Action::SaveSettings => "save-settings",
            Action::GetStats => "get-stats",
            Action::RecordPlay => "record-play",
            Action::GetQueue => "get-queue",
            Action::SaveQueue => "save-queue",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get-library" => return Ok(Action::Library),
            "get-play-stats" => return Ok(Action::GetStats),
            _ => {}
        }
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// One client request. The action stays a plain string so an unknown name
/// still decodes and can be answered with a proper error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Document for `save-*` actions: a JSON object, or a string holding one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Request {
    pub fn new(action: Action) -> Self {
        Self {
            action: action.as_str().to_string(),
            ..Self::default()
        }
    }

    pub fn with_dir(mut self, dir: impl Into<String>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Decode `value` into `T`, unwrapping one level of string encoding.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, String> {
        match &self.value {
            None | Some(Value::Null) => Err("value is required".to_string()),
            Some(Value::String(s)) => serde_json::from_str(s).map_err(|e| e.to_string()),
            Some(v) => T::deserialize(v).map_err(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<Arc<CachedLibrary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorites: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<PlayStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_art: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_fav: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueState>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(msg.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    #[error("frame exceeds {max} bytes")]
    TooLong { max: usize },
}

/// Read one frame into `buf` without its line terminator.
///
/// Returns `Ok(false)` on a clean end of stream. A final line without a
/// trailing newline still counts as a frame.
pub fn read_frame<R: BufRead>(
    reader: &mut R,
    max: usize,
    buf: &mut Vec<u8>,
) -> Result<bool, FrameError> {
    buf.clear();
    let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);
    let n = reader.by_ref().take(limit).read_until(b'\n', buf)?;
    if n == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > max {
        return Err(FrameError::TooLong { max });
    }
    Ok(true)
}

/// Serialize `msg` and write it as a single newline-terminated frame.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> io::Result<()> {
    let mut line = serde_json::to_vec(msg)?;
    line.push(b'\n');
    writer.write_all(&line)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn action_names_parse_back() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>(), Ok(action));
        }
        assert_eq!("get-library".parse::<Action>(), Ok(Action::Library));
        assert_eq!("get-play-stats".parse::<Action>(), Ok(Action::GetStats));
        assert_eq!(
            "bogus".parse::<Action>().unwrap_err().to_string(),
            "unknown action: bogus"
        );
    }

    #[test]
    fn minimal_responses_are_compact() {
        assert_eq!(serde_json::to_string(&Response::ok()).unwrap(), r#"{"ok":true}"#);
        assert_eq!(
            serde_json::to_string(&Response::err("unknown action: bogus")).unwrap(),
            r#"{"ok":false,"error":"unknown action: bogus"}"#
        );
        let fav = Response {
            is_fav: Some(false),
            ..Response::ok()
        };
        assert_eq!(serde_json::to_string(&fav).unwrap(), r#"{"ok":true,"is_fav":false}"#);
    }

    #[test]
    fn request_decodes_with_only_an_action() {
        let req: Request = serde_json::from_str(r#"{"action":"ping"}"#).unwrap();
        assert_eq!(req, Request::new(Action::Ping));
        assert!(serde_json::from_str::<Request>(r#"{"dir":"/m"}"#).is_err());
    }

    #[test]
    fn payload_accepts_object_or_encoded_string() {
        let obj = Request::new(Action::SaveQueue).with_value(json!({"current_index": 3}));
        assert_eq!(obj.payload::<QueueState>().unwrap().current_index, 3);

        let encoded =
            Request::new(Action::SaveQueue).with_value(json!(r#"{"current_index": 4}"#));
        assert_eq!(encoded.payload::<QueueState>().unwrap().current_index, 4);

        assert!(Request::new(Action::SaveQueue).payload::<QueueState>().is_err());
        let bad = Request::new(Action::SaveQueue).with_value(json!("{nope"));
        assert!(bad.payload::<QueueState>().is_err());
    }

    #[test]
    fn read_frame_splits_lines_and_reports_eof() {
        let mut input = Cursor::new(b"{\"a\":1}\r\n\n{\"b\":2}".to_vec());
        let mut buf = Vec::new();

        assert!(read_frame(&mut input, 1024, &mut buf).unwrap());
        assert_eq!(buf, br#"{"a":1}"#);
        assert!(read_frame(&mut input, 1024, &mut buf).unwrap());
        assert!(buf.is_empty());
        assert!(read_frame(&mut input, 1024, &mut buf).unwrap());
        assert_eq!(buf, br#"{"b":2}"#);
        assert!(!read_frame(&mut input, 1024, &mut buf).unwrap());
    }

    #[test]
    fn read_frame_rejects_oversized_lines() {
        let mut line = vec![b'x'; 16];
        line.push(b'\n');
        let mut buf = Vec::new();

        let mut exact = Cursor::new(line.clone());
        assert!(read_frame(&mut exact, 16, &mut buf).unwrap());

        let mut over = Cursor::new(line);
        assert!(matches!(
            read_frame(&mut over, 15, &mut buf),
            Err(FrameError::TooLong { max: 15 })
        ));
    }

    #[test]
    fn write_frame_appends_newline() {
        let mut out = Vec::new();
        write_frame(&mut out, &Request::new(Action::Ping)).unwrap();
        assert_eq!(out, b"{\"action\":\"ping\"}\n");
    }
}
