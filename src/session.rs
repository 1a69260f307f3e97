//! Session identity, language catalogue, launch routes, and reload detection
//!
//! A session is opened when the user picks a language. Its identifier travels
//! to the talk screen inside the launch route and is sent unchanged with every
//! dialogue request, which lets the remote service keep conversation context.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use url::Url;

use crate::variant::Variant;
use crate::{Error, Result};

/// Opaque conversation identifier (UUID v4 string)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random session identifier
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as sent on the wire
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::Session("session id is empty".to_string()));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::Session(format!("invalid session id: {trimmed}")));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Languages offered on the selection screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Language {
    #[default]
    English,
    Hindi,
    Tamil,
    Marathi,
    Bengali,
    Kannada,
    Telugu,
    Malayalam,
}

impl Language {
    /// All languages in display order
    pub const ALL: [Self; 8] = [
        Self::English,
        Self::Hindi,
        Self::Tamil,
        Self::Marathi,
        Self::Bengali,
        Self::Kannada,
        Self::Telugu,
        Self::Malayalam,
    ];

    /// Display name, also used as the `language` route parameter
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Hindi => "Hindi",
            Self::Tamil => "Tamil",
            Self::Marathi => "Marathi",
            Self::Bengali => "Bengali",
            Self::Kannada => "Kannada",
            Self::Telugu => "Telugu",
            Self::Malayalam => "Malayalam",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|lang| lang.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::Session(format!("unknown language: {wanted}")))
    }
}

/// Client platform, which decides the capture strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    /// Detect the platform from the compile target
    #[must_use]
    pub const fn detect() -> Self {
        if cfg!(target_os = "ios") {
            Self::Ios
        } else {
            Self::Android
        }
    }

    /// Name sent in the `platform` request field
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "iOS",
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            other => Err(Error::Config(format!("unknown platform: {other}"))),
        }
    }
}

/// Route to the talk screen: flow variant plus `language` and `unique` query
/// parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub variant: Variant,
    pub language: Language,
    pub session: SessionId,
}

impl Route {
    #[must_use]
    pub const fn new(variant: Variant, language: Language, session: SessionId) -> Self {
        Self {
            variant,
            language,
            session,
        }
    }

    /// Parse a route such as `/talking-brochure?language=Hindi&unique=<id>`
    ///
    /// A missing `language` falls back to English and a missing or empty
    /// `unique` gets a freshly generated session.
    ///
    /// # Errors
    ///
    /// Returns error if the path names no known flow or the language is unknown
    pub fn parse(route: &str) -> Result<Self> {
        let base = Url::parse("http://localhost/")?;
        let url = base.join(route.trim())?;

        let variant = Variant::from_route_path(url.path())
            .ok_or_else(|| Error::Session(format!("unknown route: {}", url.path())))?;

        let mut language = Language::default();
        let mut session = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "language" => language = value.parse()?,
                "unique" if value.trim().is_empty() => {}
                "unique" => match value.parse::<SessionId>() {
                    Ok(id) => session = Some(id),
                    Err(e) => tracing::warn!(
                        value = %value,
                        error = %e,
                        "ignoring malformed session id"
                    ),
                },
                _ => {}
            }
        }

        Ok(Self {
            variant,
            language,
            session: session.unwrap_or_default(),
        })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("language", self.language.name())
            .append_pair("unique", self.session.as_str())
            .finish();
        write!(f, "{}?{query}", self.variant.route_path())
    }
}

/// Detects a talk screen being reopened for a session whose screen already
/// exited
///
/// A single marker naming the last unloaded session is written when the talk
/// screen unloads, replacing any earlier one. Starting again with that same
/// session consumes the marker and the caller sends the user back to the
/// entry screen. Normal navigation always opens a new session, so it never
/// matches the marker.
#[derive(Debug, Clone)]
pub struct RefreshGuard {
    marker: PathBuf,
}

impl RefreshGuard {
    /// Create a guard keeping its marker at `data_dir/refreshing`
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            marker: data_dir.join("refreshing"),
        }
    }

    /// Record that the talk screen for `session` is unloading
    ///
    /// # Errors
    ///
    /// Returns error if the marker cannot be written
    pub fn mark_unload(&self, session: &SessionId) -> Result<()> {
        if let Some(dir) = self.marker.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.marker, session.as_str())?;
        tracing::debug!(session = %session, "refresh marker written");
        Ok(())
    }

    /// Check whether `session` is being reopened, consuming the marker
    ///
    /// A marker left by another session stays in place.
    ///
    /// # Errors
    ///
    /// Returns error if the marker exists but cannot be read or removed
    pub fn take_reload(&self, session: &SessionId) -> Result<bool> {
        let marked = match std::fs::read_to_string(&self.marker) {
            Ok(marked) => marked,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if marked.trim() != session.as_str() {
            return Ok(false);
        }
        std::fs::remove_file(&self.marker)?;
        tracing::info!(session = %session, "reload detected");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique_uuids() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn empty_session_id_rejected() {
        assert!("  ".parse::<SessionId>().is_err());
        assert!("../etc".parse::<SessionId>().is_err());
    }

    #[test]
    fn language_parse_is_case_insensitive() {
        assert_eq!("hindi".parse::<Language>().unwrap(), Language::Hindi);
        assert_eq!(" MALAYALAM ".parse::<Language>().unwrap(), Language::Malayalam);
        assert!("klingon".parse::<Language>().is_err());
    }

    #[test]
    fn platform_wire_names() {
        assert_eq!(Platform::Ios.wire_name(), "iOS");
        assert_eq!(Platform::Android.wire_name(), "android");
        assert_eq!("IOS".parse::<Platform>().unwrap(), Platform::Ios);
    }

    #[test]
    fn route_round_trip() {
        let session = SessionId::new();
        let route = Route::new(Variant::Recording, Language::Tamil, session.clone());
        let rendered = route.to_string();
        assert!(rendered.starts_with("/talking-iOS-brochure?language=Tamil&unique="));

        let parsed = Route::parse(&rendered).unwrap();
        assert_eq!(parsed.variant, Variant::Recording);
        assert_eq!(parsed.language, Language::Tamil);
        assert_eq!(parsed.session, session);
    }

    #[test]
    fn route_defaults() {
        let parsed = Route::parse("/talking-brochure").unwrap();
        assert_eq!(parsed.variant, Variant::Speech);
        assert_eq!(parsed.language, Language::English);
        assert!(!parsed.session.as_str().is_empty());
    }

    #[test]
    fn route_rejects_unknown_path() {
        assert!(Route::parse("/explore?language=Hindi").is_err());
    }

    #[test]
    fn refresh_marker_is_consumed_once() {
        let dir = tempfile::tempdir().unwrap();
        let guard = RefreshGuard::new(dir.path());
        let session = SessionId::new();

        assert!(!guard.take_reload(&session).unwrap());
        guard.mark_unload(&session).unwrap();
        assert!(guard.take_reload(&session).unwrap());
        assert!(!guard.take_reload(&session).unwrap());
    }

    #[test]
    fn refresh_marker_is_per_session() {
        let dir = tempfile::tempdir().unwrap();
        let guard = RefreshGuard::new(dir.path());
        let left = SessionId::new();
        guard.mark_unload(&left).unwrap();

        assert!(!guard.take_reload(&SessionId::new()).unwrap());
        assert!(guard.take_reload(&left).unwrap());
    }

    #[test]
    fn refresh_marker_does_not_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let guard = RefreshGuard::new(dir.path());
        let sessions: Vec<SessionId> = (0..5).map(|_| SessionId::new()).collect();
        for session in &sessions {
            guard.mark_unload(session).unwrap();
        }

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert!(!guard.take_reload(&sessions[0]).unwrap());
        assert!(guard.take_reload(&sessions[4]).unwrap());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn malformed_session_id_gets_a_fresh_one() {
        let parsed = Route::parse("/talking-brochure?unique=../etc").unwrap();
        assert_ne!(parsed.session.as_str(), "../etc");
        assert!(uuid::Uuid::parse_str(parsed.session.as_str()).is_ok());
    }
}
