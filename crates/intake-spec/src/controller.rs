//! One questionnaire instance: state, visibility, derived fields, drafts,
//! navigation and submission behind a single event-driven API.

use std::sync::Arc;

use jiff::tz::TimeZone;
use jiff::{SignedDuration, Timestamp};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::accessor;
use crate::clock::Clock;
use crate::derived::{AgeTrigger, update_age, update_bmi, update_fall_risk};
use crate::exclusive;
use crate::navigation::{NavOutcome, Navigator, Progress, StepState, progress};
use crate::payload::build_payload;
use crate::persist::{
    DEFAULT_SAVE_DEBOUNCE_MS, PersistedSnapshot, SaveScheduler, SnapshotStore, capture_snapshot,
};
use crate::preview::{Preview, build_preview, selection_summary};
use crate::spec::form::{FormSpec, SchemaError};
use crate::state::{FieldValue, FormState};
use crate::submit::{
    INVALID_FORM_MESSAGE, ResponseBody, SENDING_MESSAGE, SUCCESS_MESSAGE, SubmitError, Submission,
    Transport,
};
use crate::validate::{CustomValidity, ValidationResult, validate_form, validate_section};
use crate::visibility::{VisibilityMap, apply_visibility};

pub const RESET_MESSAGE: &str = "保存データを削除しました。";

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Quiet period before a draft is written.
    pub save_debounce: SignedDuration,
    pub endpoint: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            save_debounce: SignedDuration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS),
            endpoint: None,
        }
    }
}

/// What the controller is busy with. Writes made while `Restoring` do not
/// schedule saves; `Submitting` refuses a second submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Idle,
    Restoring,
    Saving,
    Submitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusState {
    Idle,
    Loading,
    Success,
    Error,
}

/// Message shown in the form's status area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub state: StatusState,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Status {
    fn new(state: StatusState, text: &str) -> Self {
        Self {
            state,
            text: text.to_string(),
            detail: None,
        }
    }

    fn idle() -> Self {
        Self::new(StatusState::Idle, "")
    }
}

pub struct FormController {
    spec: FormSpec,
    state: FormState,
    visibility: VisibilityMap,
    validity: CustomValidity,
    navigator: Navigator,
    scheduler: SaveScheduler,
    store: Box<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    endpoint: Option<String>,
    mode: Mode,
    status: Status,
    last_saved: Option<Timestamp>,
    preview_open: bool,
}

impl FormController {
    pub fn new(
        spec: FormSpec,
        store: Box<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Result<Self, SchemaError> {
        spec.check()?;
        let mut state = FormState::new();
        accessor::reset(&spec, &mut state);
        let navigator = Navigator::new(spec.sections.len());
        let mut controller = Self {
            spec,
            state,
            visibility: VisibilityMap::new(),
            validity: CustomValidity::new(),
            navigator,
            scheduler: SaveScheduler::new(options.save_debounce),
            store,
            clock,
            endpoint: options.endpoint.filter(|url| !url.trim().is_empty()),
            mode: Mode::Idle,
            status: Status::idle(),
            last_saved: None,
            preview_open: false,
        };
        controller.refresh(None);
        Ok(controller)
    }

    pub fn spec(&self) -> &FormSpec {
        &self.spec
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn visibility(&self) -> &VisibilityMap {
        &self.visibility
    }

    pub fn validity(&self) -> &CustomValidity {
        &self.validity
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn last_saved(&self) -> Option<Timestamp> {
        self.last_saved
    }

    /// `最終保存: 2026/04/15 18:00` in the given zone.
    pub fn last_saved_label(&self, tz: TimeZone) -> Option<String> {
        self.last_saved.map(|saved| {
            format!("最終保存: {}", saved.to_zoned(tz).strftime("%Y/%m/%d %H:%M"))
        })
    }

    pub fn save_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    pub fn current_section(&self) -> usize {
        self.navigator.current()
    }

    pub fn steps(&self) -> Vec<StepState> {
        self.navigator.steps(&self.spec)
    }

    pub fn actions_visible(&self) -> bool {
        self.navigator.actions_visible()
    }

    pub fn next_caption(&self) -> &'static str {
        self.navigator.next_caption()
    }

    pub fn preview_open(&self) -> bool {
        self.preview_open
    }

    pub fn read(&self, name: &str) -> FieldValue {
        accessor::read(&self.spec, &self.state, name)
    }

    pub fn progress(&self) -> Progress {
        progress(&self.spec, &self.state)
    }

    pub fn selection_summary(&self, name: &str) -> String {
        selection_summary(&self.spec, &self.state, name)
    }

    /// Keystroke-level edit.
    pub fn input(&mut self, name: &str, value: impl Into<FieldValue>) -> bool {
        if !self.editable(name) {
            return false;
        }
        let changed = accessor::write(&self.spec, &mut self.state, name, value.into());
        self.refresh(self.age_trigger(name, AgeTrigger::Input));
        self.schedule_save();
        changed
    }

    /// Committed edit: also applies the exclusivity rule to `name`.
    pub fn change(&mut self, name: &str, value: impl Into<FieldValue>) -> bool {
        if !self.editable(name) {
            return false;
        }
        let mut changed = accessor::write(&self.spec, &mut self.state, name, value.into());
        changed |= exclusive::enforce(&self.spec, &mut self.state, Some(name));
        self.refresh(self.age_trigger(name, AgeTrigger::Blur));
        self.schedule_save();
        changed
    }

    /// Checks or unchecks one option of a choice field.
    pub fn toggle(&mut self, name: &str, value: &str, checked: bool) -> bool {
        if !self.editable(name) {
            return false;
        }
        let changed = exclusive::toggle(&self.spec, &mut self.state, name, value, checked);
        self.refresh(None);
        self.schedule_save();
        changed
    }

    /// Focus left `name`. Only the birthdate reacts.
    pub fn blur(&mut self, name: &str) {
        if let Some(trigger) = self.age_trigger(name, AgeTrigger::Blur) {
            let before = self.state.text(name).to_string();
            self.refresh(Some(trigger));
            if self.state.text(name) != before {
                self.schedule_save();
            }
        }
    }

    /// Loads the stored draft, if any. Unreadable drafts count as absent.
    pub fn restore(&mut self) -> bool {
        let key = self.spec.storage_key.clone();
        let raw = match self.store.load(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(err) => {
                warn!(error = %err, "could not read saved draft");
                return false;
            }
        };
        let snapshot = match PersistedSnapshot::from_json(&raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(key = %key, error = %err, "ignoring malformed draft");
                return false;
            }
        };

        self.mode = Mode::Restoring;
        accessor::reset(&self.spec, &mut self.state);
        self.validity.clear();
        for (name, value) in snapshot.fields {
            accessor::write(&self.spec, &mut self.state, &name, value);
        }
        exclusive::enforce(&self.spec, &mut self.state, None);
        self.refresh(Some(AgeTrigger::Restore));
        self.last_saved = snapshot.timestamp;
        self.scheduler.cancel();
        self.mode = Mode::Idle;
        debug!(key = %key, fields = self.state.answered().count(), "restored draft");
        true
    }

    /// Writes the draft when the quiet period has elapsed.
    pub fn tick(&mut self) -> bool {
        let now = self.clock.now();
        if self.scheduler.take_due(now) {
            return self.save_now();
        }
        false
    }

    /// Writes the draft immediately. Storage errors are logged only.
    pub fn save_now(&mut self) -> bool {
        if self.mode == Mode::Restoring {
            return false;
        }
        let previous = self.mode;
        self.mode = Mode::Saving;
        self.scheduler.cancel();
        let now = self.clock.now();
        let snapshot = capture_snapshot(&self.spec, &self.state, &self.visibility, now);
        let result = snapshot
            .to_json()
            .and_then(|raw| self.store.save(&self.spec.storage_key, &raw));
        self.mode = previous;
        match result {
            Ok(()) => {
                self.last_saved = Some(now);
                debug!(fields = snapshot.fields.len(), "saved draft");
                true
            }
            Err(err) => {
                warn!(error = %err, "could not save draft");
                false
            }
        }
    }

    /// Clears the form and the stored draft.
    pub fn reset(&mut self) {
        self.clear_all();
        self.status = Status::new(StatusState::Success, RESET_MESSAGE);
    }

    pub fn next(&mut self) -> NavOutcome {
        let (spec, state, visibility, validity) =
            (&self.spec, &self.state, &self.visibility, &self.validity);
        let outcome = self
            .navigator
            .next(|index| validate_section(spec, state, visibility, validity, index));
        if outcome == NavOutcome::OpenPreview {
            self.preview_open = true;
        }
        debug!(?outcome, "next section");
        outcome
    }

    pub fn prev(&mut self) -> NavOutcome {
        self.preview_open = false;
        self.navigator.prev()
    }

    pub fn jump(&mut self, index: usize) -> NavOutcome {
        let (spec, state, visibility, validity) =
            (&self.spec, &self.state, &self.visibility, &self.validity);
        let outcome = self
            .navigator
            .jump(index, |section| validate_section(spec, state, visibility, validity, section));
        debug!(?outcome, target = index, "jump to section");
        outcome
    }

    pub fn preview(&self) -> Preview {
        build_preview(&self.spec, &self.state, &self.visibility)
    }

    pub fn open_preview(&mut self) -> Preview {
        self.preview_open = true;
        self.preview()
    }

    pub fn close_preview(&mut self) {
        self.preview_open = false;
    }

    pub fn validate(&self) -> ValidationResult {
        validate_form(&self.spec, &self.state, &self.visibility, &self.validity)
    }

    pub fn payload(&self) -> Value {
        build_payload(
            &self.spec,
            &self.state,
            &self.visibility,
            self.clock.now(),
            self.clock.today(),
        )
    }

    /// Finalizes derived fields, validates and builds the request. On
    /// success the controller stays `Submitting` until `finish_submission`.
    pub fn prepare_submission(&mut self) -> Result<Submission, SubmitError> {
        if self.mode == Mode::Submitting {
            return Err(SubmitError::InFlight);
        }
        self.refresh(self.spec.derived.age.as_ref().map(|_| AgeTrigger::Blur));

        if let Some(issue) = self.validate().issues.into_iter().next() {
            self.status = Status::new(StatusState::Error, INVALID_FORM_MESSAGE);
            return Err(SubmitError::Invalid { issue });
        }
        let Some(endpoint) = self.endpoint.clone() else {
            let err = SubmitError::MissingEndpoint;
            self.status = Status::new(StatusState::Error, err.user_message());
            return Err(err);
        };

        let payload = self.payload();
        self.mode = Mode::Submitting;
        self.status = Status::new(StatusState::Loading, SENDING_MESSAGE);
        Ok(Submission { endpoint, payload })
    }

    /// Applies the endpoint's verdict. Failures leave every answer in place.
    pub fn finish_submission(
        &mut self,
        result: Result<ResponseBody, SubmitError>,
    ) -> Result<(), SubmitError> {
        self.mode = Mode::Idle;
        match result {
            Ok(_) => {
                self.clear_all();
                self.status = Status::new(StatusState::Success, SUCCESS_MESSAGE);
                info!("submission accepted");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "submission failed");
                self.status = Status {
                    state: StatusState::Error,
                    text: err.user_message().to_string(),
                    detail: Some(err.to_string()),
                };
                Err(err)
            }
        }
    }

    pub fn submit(&mut self, transport: &dyn Transport) -> Result<(), SubmitError> {
        let submission = self.prepare_submission()?;
        let result = submission.send(transport);
        self.finish_submission(result)
    }

    fn editable(&self, name: &str) -> bool {
        let Some(field) = self.spec.field(name) else {
            debug!(field = name, "ignoring edit of unknown field");
            return false;
        };
        !(field.disabled || field.readonly || self.spec.is_derived_target(name))
    }

    fn age_trigger(&self, name: &str, trigger: AgeTrigger) -> Option<AgeTrigger> {
        self.spec
            .derived
            .age
            .as_ref()
            .filter(|binding| binding.birthdate == name)
            .map(|_| trigger)
    }

    fn schedule_save(&mut self) {
        if self.mode == Mode::Restoring {
            return;
        }
        self.scheduler.schedule(self.clock.now());
    }

    fn clear_all(&mut self) {
        if let Err(err) = self.store.remove(&self.spec.storage_key) {
            warn!(error = %err, "could not remove saved draft");
        }
        accessor::reset(&self.spec, &mut self.state);
        self.validity.clear();
        self.refresh(None);
        self.scheduler.cancel();
        self.navigator.reset();
        self.last_saved = None;
        self.preview_open = false;
    }

    /// Visibility, then derived fields, then visibility again: derived
    /// values can feed conditions.
    fn refresh(&mut self, age: Option<AgeTrigger>) {
        self.visibility = apply_visibility(&self.spec, &mut self.state);
        let today = self.clock.today();
        let derived = &self.spec.derived;
        if let Some(binding) = &derived.age {
            match age {
                Some(trigger) => update_age(
                    &self.spec,
                    binding,
                    &mut self.state,
                    &mut self.validity,
                    trigger,
                    today,
                ),
                None if self.state.text(&binding.birthdate).trim().is_empty() => {
                    accessor::write(&self.spec, &mut self.state, &binding.age, FieldValue::text(""));
                }
                None => {}
            }
        }
        if let Some(binding) = &derived.bmi {
            update_bmi(&self.spec, binding, &mut self.state);
        }
        if let Some(binding) = &derived.fall_risk {
            update_fall_risk(&self.spec, binding, &mut self.state);
        }
        exclusive::enforce(&self.spec, &mut self.state, None);
        self.visibility = apply_visibility(&self.spec, &mut self.state);
    }
}
