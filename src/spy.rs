//! Lifecycle listener that records build history.
//!
//! [`BuildEventSpy`] sits between the host build tool and the repository:
//! it decides which lifecycle events matter, feeds plugin events into the
//! current [`BuildInformation`], and hands the finished build to the
//! repository when the whole session succeeded.
//!
//! Recording is best effort. A failed save is logged and remembered in
//! [`last_save_error`](BuildEventSpy::last_save_error); it is never turned
//! into a failure of the build being observed.

use chrono::Utc;
use tracing::{debug, error, info};

use crate::build::BuildInformation;
use crate::error::{Result, WatcherError};
use crate::events::{EventKind, ExecutionEvent};
use crate::repository::{BuildInformationRepository, StartupContext};
use crate::scm::RevisionProvider;

pub struct BuildEventSpy {
    repository: Box<dyn BuildInformationRepository>,
    revision_provider: Box<dyn RevisionProvider>,
    build_data: Option<String>,
    current: Option<BuildInformation>,
    saved: bool,
    last_save_error: Option<String>,
}

impl BuildEventSpy {
    pub fn new(
        repository: Box<dyn BuildInformationRepository>,
        revision_provider: Box<dyn RevisionProvider>,
        build_data: Option<String>,
    ) -> Self {
        Self {
            repository,
            revision_provider,
            build_data,
            current: None,
            saved: false,
            last_save_error: None,
        }
    }

    /// Prepare the repository, removing partial builds of earlier runs.
    pub async fn init(&mut self, context: &StartupContext) -> Result<()> {
        info!("tracking build stats");
        let removed = self.repository.initialize(context).await?;
        if removed > 0 {
            info!(removed, "removed unfinished builds from previous runs");
        }
        Ok(())
    }

    pub async fn on_event(&mut self, event: &ExecutionEvent) -> Result<()> {
        if self.current.is_none() {
            self.start_build(event)?;
        }

        if event.kind.plugin_phase().is_some() {
            let build = self.current.as_mut().ok_or(WatcherError::NoActiveBuild {
                kind: event.kind.as_str(),
            })?;
            build.record_plugin_event(event)?;
        } else if event.kind == EventKind::SessionEnded && event.session.is_successful() {
            self.finish_build().await;
        }

        Ok(())
    }

    fn start_build(&mut self, event: &ExecutionEvent) -> Result<()> {
        let session = &event.session;
        if session.declared_projects().is_none() {
            return Ok(());
        }

        let revision = self
            .revision_provider
            .determine_revision_of(&session.base_directory);
        let build = BuildInformation::new(session, self.build_data.clone(), revision)?;
        debug!(
            build_id = build.id(),
            projects = build.projects().len(),
            "build started"
        );
        self.current = Some(build);
        Ok(())
    }

    async fn finish_build(&mut self) {
        let Some(build) = self.current.as_mut() else {
            return;
        };
        if self.saved {
            return;
        }

        build.set_end_time(Utc::now());
        match self.repository.save(build).await {
            Ok(()) => {
                self.saved = true;
                self.last_save_error = None;
            }
            Err(err) => {
                error!(build_id = build.id(), error = %err, "failed to save build history");
                self.last_save_error = Some(err.to_string());
            }
        }
    }

    /// Release the repository.
    pub async fn close(&mut self) -> Result<()> {
        self.repository.clean_up().await
    }

    pub fn current_build(&self) -> Option<&BuildInformation> {
        self.current.as_ref()
    }

    /// Whether the current build has been persisted.
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn last_save_error(&self) -> Option<&str> {
        self.last_save_error.as_deref()
    }
}
