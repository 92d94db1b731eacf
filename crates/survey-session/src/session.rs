use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use survey_spec::{
    Disposition, ErrorMap, FlagKind, ProgressReport, Questionnaire, ResponseMap, SectionKey,
    StepCounts, ValidationError, ViewPayload, build_view_payload, compute_progress, step_counts,
};

use crate::config::SessionConfig;
use crate::error::{LookupError, PersistenceError};
use crate::navigation::{Movement, Navigator, resume_point};
use crate::persistence::PersistenceGateway;
use crate::saver::{Clock, SaveScheduler, SystemClock};
use crate::store::{Applied, StateStore};
use crate::submission::Submission;

/// How a session was initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartKind {
    Restored,
    Fresh,
    /// Loading failed; the session started empty.
    LoadFailed,
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Validation failed; the cursor moved to the first failing section.
    Invalid {
        section: SectionKey,
        errors: Vec<ValidationError>,
    },
    Submitted {
        submission: Submission,
        version: Option<u32>,
    },
}

/// One user's pass through a questionnaire.
///
/// Owns the state store, the cursor and the persistence side effects. Edits
/// schedule a debounced save that `tick` flushes; dropping the session runs
/// the teardown save.
pub struct Session<G: PersistenceGateway, C: Clock = SystemClock> {
    store: StateStore,
    navigator: Navigator,
    gateway: G,
    clock: C,
    saver: SaveScheduler,
    start_kind: StartKind,
    torn_down: bool,
}

impl<G: PersistenceGateway> Session<G, SystemClock> {
    pub fn start(questionnaire: Questionnaire, gateway: G, config: &SessionConfig) -> Self {
        Self::start_with_clock(questionnaire, gateway, config, SystemClock)
    }
}

impl<G: PersistenceGateway, C: Clock> Session<G, C> {
    /// Loads the latest snapshot, falling back to an empty state when there is
    /// none or loading fails.
    pub fn start_with_clock(
        questionnaire: Questionnaire,
        mut gateway: G,
        config: &SessionConfig,
        clock: C,
    ) -> Self {
        let mut store = StateStore::new(questionnaire);
        let mut navigator = Navigator::new();

        let start_kind = match gateway.load_latest() {
            Ok(snapshot) => match snapshot.data.filter(|_| snapshot.exists) {
                Some(state) => {
                    store.restore(state);
                    navigator = Navigator::at(resume_point(store.questionnaire(), store.responses()));
                    info!(
                        cursor = %navigator.cursor(),
                        version_file = snapshot.version_file.as_deref().unwrap_or("-"),
                        "session restored"
                    );
                    StartKind::Restored
                }
                None => {
                    info!("no saved session; starting fresh");
                    StartKind::Fresh
                }
            },
            Err(err) => {
                warn!(error = %err, "failed to load saved session; starting empty");
                StartKind::LoadFailed
            }
        };

        Self {
            store,
            navigator,
            gateway,
            clock,
            saver: SaveScheduler::new(config.save_debounce()),
            start_kind,
            torn_down: false,
        }
    }

    pub fn start_kind(&self) -> StartKind {
        self.start_kind
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn questionnaire(&self) -> &Questionnaire {
        self.store.questionnaire()
    }

    pub fn responses(&self) -> &ResponseMap {
        self.store.responses()
    }

    pub fn errors(&self) -> &ErrorMap {
        self.store.errors()
    }

    pub fn cursor(&self) -> SectionKey {
        self.navigator.cursor()
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn save_pending(&self) -> bool {
        self.saver.is_pending()
    }

    pub fn progress(&self) -> ProgressReport {
        compute_progress(
            self.store.questionnaire(),
            self.store.responses(),
            self.store.errors(),
            self.cursor(),
        )
    }

    pub fn steps(&self) -> StepCounts {
        step_counts(self.store.questionnaire(), self.cursor())
    }

    pub fn view(&self) -> Option<ViewPayload> {
        build_view_payload(
            self.store.questionnaire(),
            self.store.responses(),
            self.store.errors(),
            self.cursor(),
        )
    }

    pub fn set_response(&mut self, field_id: &str, value: Value) -> Result<Applied, LookupError> {
        let applied = self.store.set_response(field_id, value)?;
        self.schedule_if(applied == Applied::Stored);
        Ok(applied)
    }

    pub fn add_entry(&mut self, group_id: &str) -> Result<Option<usize>, LookupError> {
        let index = self.store.add_entry(group_id)?;
        self.schedule_if(index.is_some());
        Ok(index)
    }

    pub fn remove_entry(&mut self, group_id: &str, index: usize) -> Result<Applied, LookupError> {
        let applied = self.store.remove_entry(group_id, index)?;
        self.schedule_if(applied == Applied::Stored);
        Ok(applied)
    }

    pub fn set_entry_value(
        &mut self,
        group_id: &str,
        index: usize,
        sub_id: &str,
        value: Value,
    ) -> Result<Applied, LookupError> {
        let applied = self.store.set_entry_value(group_id, index, sub_id, value)?;
        self.schedule_if(applied == Applied::Stored);
        Ok(applied)
    }

    /// Toggles `exclude` on a field of the current section.
    pub fn toggle_field_exclude(&mut self, field_id: &str) -> Result<Disposition, LookupError> {
        self.toggle_field(field_id, FlagKind::Exclude)
    }

    /// Toggles `skip` on a field of the current section.
    pub fn toggle_field_skip(&mut self, field_id: &str) -> Result<Disposition, LookupError> {
        self.toggle_field(field_id, FlagKind::Skip)
    }

    pub fn toggle_section_exclude(&mut self) -> Result<Disposition, LookupError> {
        self.toggle_section(self.cursor(), FlagKind::Exclude)
    }

    pub fn toggle_section_skip(&mut self) -> Result<Disposition, LookupError> {
        self.toggle_section(self.cursor(), FlagKind::Skip)
    }

    pub fn toggle_section(
        &mut self,
        key: SectionKey,
        kind: FlagKind,
    ) -> Result<Disposition, LookupError> {
        let disposition = self.store.toggle_section(key, kind)?;
        self.schedule_if(true);
        Ok(disposition)
    }

    fn toggle_field(&mut self, field_id: &str, kind: FlagKind) -> Result<Disposition, LookupError> {
        let disposition = self.store.toggle_field(self.cursor(), field_id, kind)?;
        self.schedule_if(true);
        Ok(disposition)
    }

    /// Validates the current section for feedback, then moves forward
    /// regardless of the outcome.
    pub fn advance(&mut self) -> Movement {
        let cursor = self.cursor();
        match self.store.validate_section(cursor) {
            Ok(valid) => debug!(section = %cursor, valid, "section validated"),
            Err(err) => warn!(error = %err, "could not validate current section"),
        }
        self.navigator.advance(self.store.questionnaire())
    }

    pub fn retreat(&mut self) -> Movement {
        self.navigator.retreat(self.store.questionnaire())
    }

    pub fn jump(&mut self, key: SectionKey) -> Movement {
        self.navigator.jump(self.store.questionnaire(), key)
    }

    /// Flushes the debounced save when its window has elapsed.
    ///
    /// Returns true when a save went out and succeeded.
    pub fn tick(&mut self) -> bool {
        if !self.saver.take_due(self.clock.now()) {
            return false;
        }
        self.save(false)
    }

    /// Saves immediately, dropping any pending debounced save.
    pub fn save_now(&mut self) -> bool {
        self.saver.cancel();
        self.save(false)
    }

    /// Clears persisted and local state. A gateway failure is logged and the
    /// local state is cleared anyway.
    pub fn reset(&mut self) {
        if let Err(err) = self.gateway.reset() {
            warn!(error = %err, "persisted state could not be reset; clearing local state");
        }
        self.store.clear();
        self.navigator.reset();
        self.saver.cancel();
        info!("session reset");
    }

    pub fn submit(&mut self) -> Result<SubmitOutcome, PersistenceError> {
        self.submit_at(Utc::now())
    }

    /// Validates everything and, when valid, archives the submission and
    /// clears the session. An archive failure leaves the state untouched.
    pub fn submit_at(&mut self, at: DateTime<Utc>) -> Result<SubmitOutcome, PersistenceError> {
        let result = self.store.validate_all();
        if let Some(section) = result.first_invalid {
            self.navigator.jump(self.store.questionnaire(), section);
            info!(
                section = %section,
                errors = result.errors.len(),
                "submission blocked by validation errors"
            );
            return Ok(SubmitOutcome::Invalid {
                section,
                errors: result.errors,
            });
        }

        let submission = self.store.submission(at);
        let version = match self.gateway.archive(&submission) {
            Ok(version) => version,
            Err(err) => {
                warn!(error = %err, "failed to archive submission");
                return Err(err);
            }
        };
        self.store.clear();
        self.navigator.reset();
        self.saver.cancel();
        info!(version = ?version, file = %submission.file_name(), "questionnaire submitted");
        Ok(SubmitOutcome::Submitted {
            submission,
            version,
        })
    }

    /// Unconditional final save marked `_unsaved`; runs at most once.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.saver.cancel();
        self.save(true);
    }

    fn schedule_if(&mut self, changed: bool) {
        if changed {
            self.saver.schedule(self.clock.now());
        }
    }

    fn save(&mut self, unsaved: bool) -> bool {
        let state = self.store.snapshot(unsaved);
        match self.gateway.save_version(&state) {
            Ok(()) => {
                debug!(unsaved, fields = state.responses.len(), "session saved");
                true
            }
            Err(err) => {
                warn!(error = %err, "save failed; retrying next cycle");
                if !self.torn_down {
                    self.saver.schedule(self.clock.now());
                }
                false
            }
        }
    }
}

impl<G: PersistenceGateway, C: Clock> Drop for Session<G, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
