use serde::{Deserialize, Serialize};
use serde_aux::prelude::*;
use serde_json::{Map, Value};

/// A track as it is stored in the queue and `current` namespaces.
///
/// Records are written by callers and other processes, so unknown keys are kept
/// in `extra` and numeric fields also accept numeric strings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrackRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_encoded: Option<String>,
    #[serde(default, deserialize_with = "deserialize_number_from_string")]
    pub duration: u64,
    #[serde(default)]
    pub is_seekable: bool,
    #[serde(default)]
    pub is_stream: bool,
    #[serde(default, deserialize_with = "deserialize_number_from_string")]
    pub position: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TrackRecord {
    pub fn new(encoded: impl ToString, duration: u64) -> Self {
        Self {
            encoded: Some(encoded.to_string()),
            duration,
            is_seekable: true,
            ..Default::default()
        }
    }

    /// First encoded form present, in `track`, `encoded`, `trackEncoded` order.
    pub fn encoded_track(&self) -> Option<&str> {
        self.track
            .as_deref()
            .or(self.encoded.as_deref())
            .or(self.track_encoded.as_deref())
    }

    /// Sets who asked for the track.
    pub fn requester(mut self, requester: impl Into<Value>) -> Self {
        self.requester = Some(requester.into());
        self
    }
}

impl From<RemoteTrack> for TrackRecord {
    fn from(track: RemoteTrack) -> TrackRecord {
        let info = track.info;

        TrackRecord {
            encoded: Some(track.encoded),
            duration: info.length,
            is_seekable: info.is_seekable,
            is_stream: info.is_stream,
            position: info.position,
            title: Some(info.title),
            author: Some(info.author),
            uri: info.uri,
            thumbnail: info.artwork_url,
            ..Default::default()
        }
    }
}

/// A track as the node returns it.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTrack {
    pub encoded: String,
    pub info: TrackInfo,
    #[serde(default)]
    pub plugin_info: Value,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    pub length: u64,
    pub is_stream: bool,
    pub position: u64,
    pub title: String,
    pub uri: Option<String>,
    pub artwork_url: Option<String>,
    pub isrc: Option<String>,
    pub source_name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    pub name: String,
    pub selected_track: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub info: PlaylistInfo,
    #[serde(default)]
    pub plugin_info: Value,
    pub tracks: Vec<RemoteTrack>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Exception {
    pub message: Option<String>,
    pub severity: String,
    pub cause: String,
}

/// Response of the `loadtracks` route.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "loadType", content = "data", rename_all = "camelCase")]
pub enum LoadResult {
    Track(RemoteTrack),
    Playlist(Playlist),
    Search(Vec<RemoteTrack>),
    Empty {},
    Error(Exception),
}

impl LoadResult {
    /// Every track in the result, in node order.
    pub fn into_tracks(self) -> Vec<RemoteTrack> {
        match self {
            Self::Track(track) => vec![track],
            Self::Playlist(playlist) => playlist.tracks,
            Self::Search(tracks) => tracks,
            Self::Empty {} | Self::Error(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encoded_track_prefers_track_then_encoded() {
        let mut record = TrackRecord::new("abc", 5000);
        assert_eq!(record.encoded_track(), Some("abc"));

        record.track = Some("xyz".into());
        assert_eq!(record.encoded_track(), Some("xyz"));

        let legacy = TrackRecord {
            track_encoded: Some("old".into()),
            ..Default::default()
        };
        assert_eq!(legacy.encoded_track(), Some("old"));
        assert_eq!(TrackRecord::default().encoded_track(), None);
    }

    #[test]
    fn record_keeps_unknown_keys_and_string_numbers() {
        let record: TrackRecord = serde_json::from_value(json!({
            "encoded": "abc",
            "duration": "5000",
            "isStream": true,
            "sourceName": "youtube"
        }))
        .unwrap();

        assert_eq!(record.duration, 5000);
        assert!(record.is_stream);
        assert_eq!(record.extra.get("sourceName"), Some(&json!("youtube")));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["sourceName"], json!("youtube"));
        assert_eq!(value["duration"], json!(5000));
    }

    #[test]
    fn load_result_search_converts_to_records() {
        let result: LoadResult = serde_json::from_value(json!({
            "loadType": "search",
            "data": [{
                "encoded": "QAAA",
                "info": {
                    "identifier": "dQw4w9WgXcQ",
                    "isSeekable": true,
                    "author": "Rick Astley",
                    "length": 212000,
                    "isStream": false,
                    "position": 0,
                    "title": "Never Gonna Give You Up",
                    "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                    "artworkUrl": null,
                    "isrc": null,
                    "sourceName": "youtube"
                },
                "pluginInfo": {}
            }]
        }))
        .unwrap();

        let records: Vec<TrackRecord> = result.into_tracks().into_iter().map(Into::into).collect();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].encoded.as_deref(), Some("QAAA"));
        assert_eq!(records[0].duration, 212000);
        assert_eq!(records[0].title.as_deref(), Some("Never Gonna Give You Up"));
    }

    #[test]
    fn load_result_empty() {
        let result: LoadResult =
            serde_json::from_value(json!({ "loadType": "empty", "data": {} })).unwrap();

        assert!(result.into_tracks().is_empty());
    }
}
