use std::sync::Arc;

use rill_model::{ConnectionSettings, SettingsError};
use tracing::{instrument, trace};

use crate::{collab::Source, error::CoreError, error::SourceError};

/// Builds a [`Source`] for the connection kinds it supports.
///
/// The host runtime registers one builder per connection kind it can serve.
pub trait SourceBuilder: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn supports(&self, conn: &ConnectionSettings) -> bool;

    fn build(&self, conn: &ConnectionSettings) -> Result<Arc<dyn Source>, SourceError>;
}

/// Dispatches connection settings to the first builder that supports them.
#[derive(Default)]
pub struct SourceRouter {
    builders: Vec<Arc<dyn SourceBuilder>>,
}

impl SourceRouter {
    #[inline]
    pub fn new() -> Self {
        Self {
            builders: Vec::new(),
        }
    }

    #[inline]
    pub fn register(&mut self, builder: Arc<dyn SourceBuilder>) {
        self.builders.push(builder);
    }

    #[inline]
    pub fn with(mut self, builder: Arc<dyn SourceBuilder>) -> Self {
        self.register(builder);
        self
    }

    pub fn pick(&self, conn: &ConnectionSettings) -> Option<&Arc<dyn SourceBuilder>> {
        self.builders.iter().find(|b| b.supports(conn))
    }

    #[instrument(level = "trace", skip(self, conn), fields(kind = conn.kind()))]
    pub fn build(&self, conn: &ConnectionSettings) -> Result<Arc<dyn Source>, CoreError> {
        let b = self
            .pick(conn)
            .ok_or_else(|| CoreError::NoSourceBuilder(conn.kind().to_string()))?;

        let source = b.build(conn).map_err(|e| match e {
            SourceError::InvalidSettings(msg) => {
                CoreError::Configuration(SettingsError::Invalid(msg))
            }
            other => CoreError::Source(other),
        })?;
        trace!(builder = b.name(), "source built successfully");
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ScriptedSource;

    struct LocalOnly;

    impl SourceBuilder for LocalOnly {
        fn name(&self) -> &'static str {
            "local-only"
        }

        fn supports(&self, conn: &ConnectionSettings) -> bool {
            matches!(conn, ConnectionSettings::Local)
        }

        fn build(&self, _conn: &ConnectionSettings) -> Result<Arc<dyn Source>, SourceError> {
            Ok(Arc::new(ScriptedSource::ok("{}")))
        }
    }

    #[test]
    fn builds_with_matching_builder() {
        let router = SourceRouter::new().with(Arc::new(LocalOnly));
        let source = router.build(&ConnectionSettings::Local).unwrap();
        assert_eq!(source.kind(), "scripted");
    }

    struct RejectsSettings;

    impl SourceBuilder for RejectsSettings {
        fn name(&self) -> &'static str {
            "rejects-settings"
        }

        fn supports(&self, _conn: &ConnectionSettings) -> bool {
            true
        }

        fn build(&self, _conn: &ConnectionSettings) -> Result<Arc<dyn Source>, SourceError> {
            Err(SourceError::InvalidSettings("bad address 'es-1:x'".into()))
        }
    }

    struct Unavailable;

    impl SourceBuilder for Unavailable {
        fn name(&self) -> &'static str {
            "unavailable"
        }

        fn supports(&self, _conn: &ConnectionSettings) -> bool {
            true
        }

        fn build(&self, _conn: &ConnectionSettings) -> Result<Arc<dyn Source>, SourceError> {
            Err(SourceError::Unavailable("pool exhausted".into()))
        }
    }

    #[test]
    fn rejected_connection_settings_are_a_configuration_error() {
        let router = SourceRouter::new().with(Arc::new(RejectsSettings));
        let err = router.build(&ConnectionSettings::Local).err().unwrap();
        assert!(matches!(
            err,
            CoreError::Configuration(SettingsError::Invalid(ref m)) if m.contains("es-1:x")
        ));
        assert!(err.is_configuration());

        let router = SourceRouter::new().with(Arc::new(Unavailable));
        let err = router.build(&ConnectionSettings::Local).err().unwrap();
        assert!(matches!(err, CoreError::Source(SourceError::Unavailable(_))));
        assert!(!err.is_configuration());
    }

    #[test]
    fn unsupported_kind_is_a_configuration_error() {
        let router = SourceRouter::new().with(Arc::new(LocalOnly));
        let conn = ConnectionSettings::Rest {
            url_base: "http://localhost/".into(),
            timeout: std::time::Duration::from_secs(1),
            username: None,
            pwd: None,
        };
        let err = router.build(&conn).err().unwrap();
        assert!(matches!(err, CoreError::NoSourceBuilder(ref k) if k == "rest"));
        assert!(err.is_configuration());
    }
}
