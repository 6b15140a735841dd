//! Messages exchanged with the collaborators around the editor: the gallery
//! (consumes `SessionEvent`) and the camera ingestion tool (produces
//! `IngestEvent`).

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::session::SessionId;

/// Emitted by an edit session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// A file was written; the gallery should re-scan `dir`.
    Saved {
        session: SessionId,
        path: PathBuf,
        dir: PathBuf,
    },
}

/// Emitted by the camera ingestion collaborator.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestEvent {
    CameraConnected { model: String, serial: String },
    FileDownloaded(PathBuf),
}

/// What the editor should do in response to an ingest event.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestAction {
    Open(PathBuf),
    Announce(String),
}

/// Downloaded files become "open this file" only when they are images.
pub fn file_available(event: &IngestEvent) -> Option<IngestAction> {
    match event {
        IngestEvent::FileDownloaded(path) if crate::io::is_supported_image(path) => {
            Some(IngestAction::Open(path.clone()))
        }
        IngestEvent::FileDownloaded(path) => {
            crate::log_info!("Ignoring non-image download {}", path.display());
            None
        }
        IngestEvent::CameraConnected { model, serial } => Some(IngestAction::Announce(format!(
            "Camera connected: {} ({})",
            model, serial
        ))),
    }
}

/// Sending half handed to sessions. Sends never fail the caller; a dropped
/// receiver just means nobody is listening.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: Option<Sender<SessionEvent>>,
}

impl EventSink {
    pub fn channel() -> (EventSink, Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel();
        (EventSink { tx: Some(tx) }, rx)
    }

    /// A sink with no listener.
    pub fn detached() -> EventSink {
        EventSink { tx: None }
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.tx
            && tx.send(event).is_err()
        {
            crate::log_warn!("Session event dropped: no listener");
        }
    }
}

/// Directory the gallery should re-scan after `path` was written.
pub fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_image_downloads_open() {
        let img = IngestEvent::FileDownloaded(PathBuf::from("/photos/IMG_0001.JPG"));
        assert_eq!(
            file_available(&img),
            Some(IngestAction::Open(PathBuf::from("/photos/IMG_0001.JPG")))
        );
        let raw = IngestEvent::FileDownloaded(PathBuf::from("/photos/DSC_0002.NEF"));
        assert!(matches!(file_available(&raw), Some(IngestAction::Open(_))));

        let log = IngestEvent::FileDownloaded(PathBuf::from("/photos/transfer.log"));
        assert_eq!(file_available(&log), None);
    }

    #[test]
    fn camera_connection_is_announced() {
        let ev = IngestEvent::CameraConnected {
            model: "Canon EOS 90D".into(),
            serial: "0123".into(),
        };
        assert_eq!(
            file_available(&ev),
            Some(IngestAction::Announce("Camera connected: Canon EOS 90D (0123)".into()))
        );
    }

    #[test]
    fn parent_dir_of_bare_name_is_current_dir() {
        assert_eq!(parent_dir(Path::new("a.png")), PathBuf::from("."));
        assert_eq!(parent_dir(Path::new("/x/y/a.png")), PathBuf::from("/x/y"));
    }

    #[test]
    fn detached_sink_swallows_events() {
        let sink = EventSink::detached();
        sink.emit(SessionEvent::Saved {
            session: SessionId::new(),
            path: PathBuf::from("a.png"),
            dir: PathBuf::from("."),
        });
    }
}
