use crate::api::GenerateReply;
use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Revocable reference to generated audio bytes. Clones share the same
/// backing payload, so revoking any clone revokes them all; readers take a
/// cheap refcounted copy of the bytes rather than borrowing them.
#[derive(Debug, Clone)]
pub struct AudioHandle {
    bytes: Arc<Mutex<Option<Bytes>>>,
}

impl AudioHandle {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes: Arc::new(Mutex::new(Some(bytes))) }
    }

    /// The payload, or `None` once the handle has been revoked.
    pub fn bytes(&self) -> Option<Bytes> {
        self.lock().clone()
    }

    pub fn revoke(&self) {
        self.lock().take();
    }

    pub fn is_revoked(&self) -> bool {
        self.lock().is_none()
    }

    pub fn len(&self) -> usize {
        self.lock().as_ref().map_or(0, Bytes::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Option<Bytes>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The materialized result of a successful generation. Owned by the result
/// turn that carries it; dropping the artifact revokes the handle, which
/// keeps long sessions from accumulating dead payloads.
#[derive(Debug)]
pub struct Artifact {
    handle: AudioHandle,
    suggested_filename: String,
}

impl Artifact {
    pub fn new(body: Bytes, suggested_filename: String) -> Self {
        Self { handle: AudioHandle::new(body), suggested_filename }
    }

    pub fn handle(&self) -> &AudioHandle {
        &self.handle
    }

    /// Backend-suggested filename; empty when the reply carried none.
    pub fn suggested_filename(&self) -> &str {
        &self.suggested_filename
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        self.handle.revoke();
    }
}

/// Turns a raw generation reply into an artifact. Filename extraction can
/// only degrade to an empty name; it never fails the operation.
pub fn process_reply(reply: GenerateReply) -> Artifact {
    let suggested_filename = reply
        .disposition
        .as_deref()
        .and_then(filename_from_disposition)
        .unwrap_or_default();
    Artifact::new(reply.body, suggested_filename)
}

/// Extracts the filename parameter from a content-disposition style header.
/// Accepts `filename="<quoted>"` and `filename=<token>`; anything else,
/// including an unterminated quote or a `filename*=` extended parameter, is
/// no match.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    for segment in value.split(';') {
        let Some(raw) = parameter_value(segment.trim(), "filename") else {
            continue;
        };
        if let Some(rest) = raw.strip_prefix('"') {
            if let Some((quoted, _)) = rest.split_once('"') {
                if !quoted.is_empty() {
                    return Some(quoted.to_string());
                }
            }
            continue;
        }
        let token = raw.trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }
    None
}

fn parameter_value<'a>(segment: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = segment.split_once('=')?;
    if key.trim().eq_ignore_ascii_case(name) {
        Some(value.trim_start())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_quoted_filename() {
        assert_eq!(
            filename_from_disposition("attachment; filename=\"track_001.wav\""),
            Some("track_001.wav".to_string())
        );
    }

    #[test]
    fn handles_bare_token_filename() {
        assert_eq!(
            filename_from_disposition("attachment; filename=track.wav"),
            Some("track.wav".to_string())
        );
    }

    #[test]
    fn handles_case_insensitive_parameter_name() {
        assert_eq!(
            filename_from_disposition("attachment; FILENAME=\"Track.wav\""),
            Some("Track.wav".to_string())
        );
    }

    #[test]
    fn handles_missing_or_malformed_filename_degrades_to_none() {
        assert_eq!(filename_from_disposition("inline"), None);
        assert_eq!(filename_from_disposition("attachment; filename="), None);
        assert_eq!(filename_from_disposition("attachment; filename=\"\""), None);
        assert_eq!(filename_from_disposition("attachment; filename=\"unterminated"), None);
        assert_eq!(filename_from_disposition("attachment; filename*=UTF-8''x.wav"), None);
    }

    #[test]
    fn handles_reply_without_disposition_yields_empty_name() {
        let reply = GenerateReply { disposition: None, body: Bytes::from_static(b"RIFF") };
        let artifact = process_reply(reply);
        assert_eq!(artifact.suggested_filename(), "");
        assert_eq!(artifact.handle().len(), 4);
    }

    #[test]
    fn handles_revocation_is_shared_across_clones() {
        let handle = AudioHandle::new(Bytes::from_static(b"abc"));
        let clone = handle.clone();
        assert_eq!(clone.bytes().as_deref(), Some(b"abc".as_slice()));

        handle.revoke();

        assert!(clone.is_revoked());
        assert_eq!(clone.bytes(), None);
        assert_eq!(clone.len(), 0);
    }

    #[test]
    fn handles_dropping_artifact_revokes_handle() {
        let artifact = Artifact::new(Bytes::from_static(b"abc"), "a.wav".into());
        let handle = artifact.handle().clone();
        drop(artifact);
        assert!(handle.is_revoked());
    }
}
