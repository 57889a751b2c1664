//! Change classification.
//!
//! Decides whether a filesystem change needs a full page reload or only a
//! stylesheet refresh.

use std::path::{Path, PathBuf};

use mime_guess::mime;
use notify::event::ModifyKind;
use notify::{Event, EventKind};

use super::command::Command;

/// Kind of filesystem change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// File contents changed.
    Changed,
    /// Rename, creation, removal or anything else.
    Renamed,
}

/// One filesystem notification for a single path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened to the file.
    pub kind: ChangeKind,
    /// Affected file, if the watcher reported one.
    pub path: Option<PathBuf>,
}

impl ChangeEvent {
    /// Split a `notify` event into one change event per path.
    pub fn from_notify(event: &Event) -> Vec<Self> {
        let kind = match event.kind {
            EventKind::Modify(modify) if !matches!(modify, ModifyKind::Name(_)) => {
                ChangeKind::Changed
            }
            _ => ChangeKind::Renamed,
        };

        if event.paths.is_empty() {
            return vec![Self { kind, path: None }];
        }

        event
            .paths
            .iter()
            .map(|path| Self {
                kind,
                path: Some(path.clone()),
            })
            .collect()
    }
}

/// Outcome of classifying a change event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Nothing to do.
    Ignore,
    /// Broadcast this command (after any configured build).
    Broadcast(Command),
}

/// Classify a change event.
///
/// Only content changes with a UTF-8 path are actionable. Stylesheets get a
/// [`Command::ReloadCss`], everything else a [`Command::Reload`].
pub fn classify(event: &ChangeEvent) -> Classification {
    if event.kind != ChangeKind::Changed {
        return Classification::Ignore;
    }
    let Some(path) = event.path.as_deref().and_then(Path::to_str) else {
        return Classification::Ignore;
    };

    if mime_guess::from_path(path).first_or_octet_stream() == mime::TEXT_CSS {
        Classification::Broadcast(Command::ReloadCss)
    } else {
        Classification::Broadcast(Command::Reload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};

    fn changed(path: &str) -> ChangeEvent {
        ChangeEvent {
            kind: ChangeKind::Changed,
            path: Some(PathBuf::from(path)),
        }
    }

    #[test]
    fn test_stylesheet_change_reloads_css() {
        assert_eq!(
            classify(&changed("/site/style.css")),
            Classification::Broadcast(Command::ReloadCss)
        );
    }

    #[test]
    fn test_other_change_reloads_page() {
        for path in ["/site/index.html", "/site/app.js", "/site/logo.png", "/site/README"] {
            assert_eq!(
                classify(&changed(path)),
                Classification::Broadcast(Command::Reload),
                "{path}"
            );
        }
    }

    #[test]
    fn test_rename_is_ignored() {
        let event = ChangeEvent {
            kind: ChangeKind::Renamed,
            path: Some(PathBuf::from("/site/style.css")),
        };
        assert_eq!(classify(&event), Classification::Ignore);
    }

    #[test]
    fn test_missing_path_is_ignored() {
        let event = ChangeEvent {
            kind: ChangeKind::Changed,
            path: None,
        };
        assert_eq!(classify(&event), Classification::Ignore);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_is_ignored() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let event = ChangeEvent {
            kind: ChangeKind::Changed,
            path: Some(PathBuf::from(OsStr::from_bytes(b"/site/\xff.css"))),
        };
        assert_eq!(classify(&event), Classification::Ignore);
    }

    #[test]
    fn test_from_notify_maps_kinds() {
        let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/site/a.css"))
            .add_path(PathBuf::from("/site/b.html"));
        let events = ChangeEvent::from_notify(&modify);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == ChangeKind::Changed));

        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/site/a.css"));
        assert_eq!(ChangeEvent::from_notify(&rename)[0].kind, ChangeKind::Renamed);

        let create = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/site/new.html"));
        assert_eq!(ChangeEvent::from_notify(&create)[0].kind, ChangeKind::Renamed);

        let remove = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/site/old.html"));
        assert_eq!(ChangeEvent::from_notify(&remove)[0].kind, ChangeKind::Renamed);
    }

    #[test]
    fn test_from_notify_without_paths() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any));
        assert_eq!(
            ChangeEvent::from_notify(&event),
            vec![ChangeEvent {
                kind: ChangeKind::Changed,
                path: None,
            }]
        );
    }
}
