use std::io::{self, BufRead, Write};

use intake_spec::accessor::display_members;
use intake_spec::preview::resolve_label;
use intake_spec::visibility::is_group_visible;
use intake_spec::{
    FieldIssue, FieldKind, FieldSpec, FieldValue, FormController, FormSpec, GroupSpec, NavOutcome,
    Progress, Status, StatusState, StepState, render_text,
};

use crate::CliResult;

/// Controls which bits of state the wizard prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: section headers and prompts only.
    Clean,
    /// Verbose output: step list, save notices, error details, form description.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// Prints everything the wizard shows; the wizard itself only reads input.
pub struct WizardPresenter {
    verbosity: Verbosity,
    header_printed: bool,
}

impl WizardPresenter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            header_printed: false,
        }
    }

    pub fn show_header(&mut self, spec: &FormSpec) {
        if self.header_printed {
            return;
        }
        println!("Form: {} (v{})", spec.title, spec.version);
        if self.verbosity.is_verbose()
            && let Some(description) = &spec.description
        {
            println!("{}", description);
        }
        println!("Type 'back' for the previous section, 'exit' to stop. Empty input keeps the current answer.");
        self.header_printed = true;
    }

    pub fn show_restored(&self, label: Option<&str>) {
        match label {
            Some(label) => println!("Restored saved draft ({})", label),
            None => println!("Restored saved draft"),
        }
    }

    pub fn show_section(&self, steps: &[StepState], progress: &Progress) {
        if let Some(active) = steps.iter().find(|step| step.active) {
            println!();
            println!("[{}/{}] {}", active.index + 1, steps.len(), active.title);
        }
        if self.verbosity.is_verbose() {
            for step in steps {
                let marker = if step.active {
                    '>'
                } else if step.complete {
                    '+'
                } else {
                    ' '
                };
                println!(" {} {}. {}", marker, step.index + 1, step.title);
            }
        }
        println!("{}", progress.label());
    }

    pub fn show_prompt(&self, prompt: &PromptContext) {
        let mut line = format!("{}/{} {}", prompt.index, prompt.total, prompt.title);
        if prompt.required {
            line.push_str(" *");
        }
        if let Some(hint) = &prompt.hint {
            line.push(' ');
            line.push_str(hint);
        }
        println!("{}", line);
        for (position, choice) in prompt.choices.iter().enumerate() {
            println!("  {}) {}", position + 1, choice.label);
        }
        if let Some(current) = &prompt.current {
            println!("  [{}]", current);
        }
    }

    pub fn show_parse_error(&self, error: &AnswerParseError) {
        eprintln!("Invalid answer: {}", error.user_message);
        if self.verbosity.is_verbose()
            && let Some(debug) = &error.debug_message
        {
            eprintln!("  Expected: {}", debug);
        }
    }

    pub fn show_blocked(&self, label: &str, issue: &FieldIssue) {
        eprintln!("{}: {}", label, issue.message);
        if self.verbosity.is_verbose() {
            eprintln!("  ({} / {})", issue.name, issue.code);
        }
    }

    pub fn show_derived(&self, label: &str, value: &str) {
        println!("  {} = {}", label, value);
    }

    pub fn show_saved(&self, label: Option<String>) {
        if self.verbosity.is_verbose()
            && let Some(label) = label
        {
            println!("{}", label);
        }
    }

    pub fn show_preview(&self, text: &str) {
        println!();
        println!("{}", text);
        println!();
    }

    pub fn show_status(&self, status: &Status) {
        if status.state == StatusState::Error {
            eprintln!("{}", status.text);
        } else {
            println!("{}", status.text);
        }
        if self.verbosity.is_verbose()
            && let Some(detail) = &status.detail
        {
            eprintln!("  {}", detail);
        }
    }
}

/// One selectable option as shown in a prompt.
pub struct PromptChoice {
    pub value: String,
    pub label: String,
}

/// Context used to format a single prompt.
pub struct PromptContext {
    pub index: usize,
    pub total: usize,
    pub title: String,
    pub required: bool,
    pub hint: Option<String>,
    pub choices: Vec<PromptChoice>,
    pub current: Option<String>,
}

impl PromptContext {
    pub fn new(
        form: &FormController,
        group: &GroupSpec,
        field: &FieldSpec,
        index: usize,
        total: usize,
    ) -> Self {
        let choices = if matches!(field.kind, FieldKind::Text | FieldKind::Checkbox | FieldKind::Range) {
            Vec::new()
        } else {
            form.spec()
                .options_of(&field.name)
                .into_iter()
                .filter(|choice| !choice.value.is_empty())
                .map(|choice| PromptChoice {
                    value: choice.value.clone(),
                    label: choice.display().to_string(),
                })
                .collect()
        };
        let current = display_members(form.spec(), &field.name, &form.read(&field.name));
        Self {
            index: index.max(1),
            total,
            title: resolve_label(group, field),
            required: field.required,
            hint: hint_for(field),
            choices,
            current: (!current.is_empty()).then(|| current.join("、")),
        }
    }
}

fn hint_for(field: &FieldSpec) -> Option<String> {
    match field.kind {
        FieldKind::Checkbox => Some("(y/n)".to_string()),
        FieldKind::CheckboxGroup | FieldKind::MultiSelect => {
            Some("(numbers, comma separated; - to clear)".to_string())
        }
        FieldKind::RadioGroup | FieldKind::Select => Some("(number; - to clear)".to_string()),
        FieldKind::Range => {
            let (min, max) = field.range_bounds();
            Some(format!("({}-{})", min, max))
        }
        FieldKind::Text => match (field.min, field.max) {
            (Some(min), Some(max)) => Some(format!("(number {}-{})", min, max)),
            _ => None,
        },
    }
}

/// Error produced when parsing answers from the user.
#[derive(Debug)]
pub struct AnswerParseError {
    pub user_message: String,
    pub debug_message: Option<String>,
}

impl AnswerParseError {
    pub fn new(user_message: impl Into<String>, debug_message: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            debug_message,
        }
    }
}

/// Turns one line of input into a field value. `-` clears the field.
pub fn parse_answer(
    kind: FieldKind,
    choices: &[PromptChoice],
    raw: &str,
) -> Result<FieldValue, AnswerParseError> {
    let raw = raw.trim();
    if raw == "-" {
        return Ok(match kind {
            FieldKind::Checkbox => FieldValue::Flag(false),
            FieldKind::CheckboxGroup | FieldKind::MultiSelect => FieldValue::Set(Vec::new()),
            _ => FieldValue::Text(String::new()),
        });
    }
    match kind {
        FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
        FieldKind::Checkbox => parse_boolean(raw).map(FieldValue::Flag),
        FieldKind::RadioGroup | FieldKind::Select => parse_choice(choices, raw).map(FieldValue::Text),
        FieldKind::CheckboxGroup | FieldKind::MultiSelect => parse_choices(choices, raw),
        FieldKind::Range => raw
            .parse::<f64>()
            .map(|_| FieldValue::Text(raw.to_string()))
            .map_err(|_| {
                AnswerParseError::new("Please enter a number.", Some("expected number".to_string()))
            }),
    }
}

pub fn parse_boolean(raw: &str) -> Result<bool, AnswerParseError> {
    match raw.to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "はい" => Ok(true),
        "false" | "f" | "no" | "n" | "0" | "いいえ" => Ok(false),
        _ => Err(AnswerParseError::new(
            "Please enter yes or no.",
            Some("expected boolean (y/n/true/false)".to_string()),
        )),
    }
}

/// Accepts a 1-based option number or the option text itself.
fn parse_choice(choices: &[PromptChoice], raw: &str) -> Result<String, AnswerParseError> {
    if let Ok(number) = raw.parse::<usize>()
        && let Some(choice) = number.checked_sub(1).and_then(|index| choices.get(index))
    {
        return Ok(choice.value.clone());
    }
    choices
        .iter()
        .find(|choice| choice.value == raw || choice.label == raw)
        .map(|choice| choice.value.clone())
        .ok_or_else(|| {
            AnswerParseError::new(
                format!("'{}' is not one of the listed options.", raw),
                Some(format!("expected 1-{}", choices.len())),
            )
        })
}

fn parse_choices(choices: &[PromptChoice], raw: &str) -> Result<FieldValue, AnswerParseError> {
    let mut selected: Vec<String> = Vec::new();
    for part in raw
        .split([',', '、', ' ', '　'])
        .filter(|part| !part.is_empty())
    {
        let value = parse_choice(choices, part)?;
        if !selected.contains(&value) {
            selected.push(value);
        }
    }
    Ok(FieldValue::Set(selected))
}

enum Reply {
    Keep,
    Back,
    Answer(String),
}

enum Flow {
    Next,
    Back,
}

/// Walks the form section by section until the user confirms the preview.
pub struct Wizard<'a, R> {
    form: &'a mut FormController,
    input: R,
    presenter: WizardPresenter,
    asked: Vec<String>,
}

impl<'a, R: BufRead> Wizard<'a, R> {
    pub fn new(form: &'a mut FormController, input: R, presenter: WizardPresenter) -> Self {
        Self {
            form,
            input,
            presenter,
            asked: Vec::new(),
        }
    }

    pub fn into_presenter(self) -> WizardPresenter {
        self.presenter
    }

    /// Returns once the preview has been confirmed. Aborting or running out of
    /// input is an error; the caller decides what to persist.
    pub fn run(&mut self) -> CliResult<()> {
        self.presenter.show_header(self.form.spec());
        loop {
            self.presenter
                .show_section(&self.form.steps(), &self.form.progress());
            self.asked.clear();
            if let Flow::Back = self.fill_section(self.form.current_section())? {
                self.form.prev();
                continue;
            }
            if self.form.tick() {
                self.presenter.show_saved(self.saved_label());
            }
            if self.advance()? {
                return Ok(());
            }
        }
    }

    /// Tries to leave the current section. `true` when the preview was confirmed.
    fn advance(&mut self) -> CliResult<bool> {
        loop {
            match self.form.next() {
                NavOutcome::Moved { .. } | NavOutcome::Stayed => return Ok(false),
                NavOutcome::Blocked(issue) => {
                    if let Flow::Back = self.fix(&issue)? {
                        self.form.prev();
                        return Ok(false);
                    }
                    // The fix may have revealed groups that were skipped.
                    if let Flow::Back = self.fill_section(self.form.current_section())? {
                        self.form.prev();
                        return Ok(false);
                    }
                }
                NavOutcome::OpenPreview => {
                    let preview = self.form.open_preview();
                    self.presenter.show_preview(&render_text(&preview));
                    if self.confirm("Submit these answers?")? {
                        return Ok(true);
                    }
                    self.form.close_preview();
                    let target = self.pick_section()?;
                    if let NavOutcome::Blocked(issue) = self.form.jump(target) {
                        let label = self.label_of(&issue.name);
                        self.presenter.show_blocked(&label, &issue);
                    }
                    return Ok(false);
                }
            }
        }
    }

    /// Asks every visible, editable field of the section not yet asked in
    /// this pass, then shows the derived values it holds.
    fn fill_section(&mut self, index: usize) -> CliResult<Flow> {
        let section = self
            .form
            .spec()
            .sections
            .get(index)
            .cloned()
            .ok_or("section index out of range")?;
        let askable: Vec<&str> = {
            let mut names: Vec<&str> = Vec::new();
            for field in section.groups.iter().flat_map(|group| &group.fields) {
                if is_askable(self.form.spec(), field) && !names.contains(&field.name.as_str()) {
                    names.push(&field.name);
                }
            }
            names
        };

        for group in &section.groups {
            for field in &group.fields {
                let name = field.name.as_str();
                if !askable.contains(&name) || self.asked.iter().any(|asked| asked == name) {
                    continue;
                }
                if !is_group_visible(self.form.visibility(), &group.id) {
                    continue;
                }
                self.asked.push(name.to_string());
                let position = askable.iter().position(|candidate| *candidate == name);
                let index = position.map(|position| position + 1).unwrap_or(0);
                if let Flow::Back = self.ask(group, field, index, askable.len())? {
                    return Ok(Flow::Back);
                }
            }
        }

        for group in &section.groups {
            if !is_group_visible(self.form.visibility(), &group.id) {
                continue;
            }
            for field in group.fields.iter().filter(|field| !is_askable(self.form.spec(), field)) {
                let value = self.form.state().text(&field.name);
                if !value.is_empty() {
                    self.presenter
                        .show_derived(&resolve_label(group, field), value);
                }
            }
        }
        Ok(Flow::Next)
    }

    fn ask(
        &mut self,
        group: &GroupSpec,
        field: &FieldSpec,
        index: usize,
        total: usize,
    ) -> CliResult<Flow> {
        loop {
            let prompt = PromptContext::new(self.form, group, field, index, total);
            self.presenter.show_prompt(&prompt);
            let reply = self.read_reply()?;
            if self.form.tick() {
                self.presenter.show_saved(self.saved_label());
            }
            let raw = match reply {
                Reply::Keep => return Ok(Flow::Next),
                Reply::Back => return Ok(Flow::Back),
                Reply::Answer(raw) => raw,
            };
            let value = match parse_answer(field.kind, &prompt.choices, &raw) {
                Ok(value) => value,
                Err(err) => {
                    self.presenter.show_parse_error(&err);
                    continue;
                }
            };
            self.apply(field, value);
            if let Some(message) = self.form.validity().get(&field.name) {
                self.presenter
                    .show_parse_error(&AnswerParseError::new(message.clone(), None));
                continue;
            }
            return Ok(Flow::Next);
        }
    }

    /// Re-asks the field that blocked navigation.
    fn fix(&mut self, issue: &FieldIssue) -> CliResult<Flow> {
        let label = self.label_of(&issue.name);
        self.presenter.show_blocked(&label, issue);
        let target = self
            .form
            .spec()
            .descriptors(&issue.name)
            .find(|(_, group, _)| is_group_visible(self.form.visibility(), &group.id))
            .map(|(_, group, field)| (group.clone(), field.clone()));
        match target {
            Some((group, field)) => self.ask(&group, &field, 1, 1),
            None => Err(format!("field '{}' cannot be answered", issue.name).into()),
        }
    }

    fn apply(&mut self, field: &FieldSpec, value: FieldValue) {
        if field.kind == FieldKind::Text {
            self.form.input(&field.name, value);
            self.form.blur(&field.name);
        } else {
            self.form.change(&field.name, value);
        }
    }

    fn confirm(&mut self, question: &str) -> CliResult<bool> {
        loop {
            println!("{} (y/n)", question);
            match self.read_reply()? {
                Reply::Answer(raw) => match parse_boolean(&raw) {
                    Ok(answer) => return Ok(answer),
                    Err(err) => self.presenter.show_parse_error(&err),
                },
                Reply::Back => return Ok(false),
                Reply::Keep => {}
            }
        }
    }

    fn pick_section(&mut self) -> CliResult<usize> {
        let steps = self.form.steps();
        loop {
            println!("Section to edit (1-{})", steps.len());
            for step in &steps {
                println!("  {}) {}", step.index + 1, step.title);
            }
            let Reply::Answer(raw) = self.read_reply()? else {
                return Ok(self.form.current_section());
            };
            match raw.parse::<usize>() {
                Ok(number) if (1..=steps.len()).contains(&number) => return Ok(number - 1),
                _ => self.presenter.show_parse_error(&AnswerParseError::new(
                    format!("'{}' is not a section number.", raw),
                    Some(format!("expected 1-{}", steps.len())),
                )),
            }
        }
    }

    fn read_reply(&mut self) -> CliResult<Reply> {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err("input ended before the form was finished".into());
        }
        match line.trim() {
            "" => Ok(Reply::Keep),
            "back" => Ok(Reply::Back),
            "exit" | "quit" => Err("wizard aborted by user".into()),
            other => Ok(Reply::Answer(other.to_string())),
        }
    }

    fn label_of(&self, name: &str) -> String {
        self.form
            .spec()
            .descriptors(name)
            .next()
            .map(|(_, group, field)| resolve_label(group, field))
            .unwrap_or_else(|| name.to_string())
    }

    fn saved_label(&self) -> Option<String> {
        self.form.last_saved_label(jiff::tz::TimeZone::system())
    }
}

fn is_askable(spec: &FormSpec, field: &FieldSpec) -> bool {
    !(field.disabled || field.readonly || spec.is_derived_target(&field.name))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use intake_spec::{EngineOptions, ManualClock, MemoryStore, PHYSIO_FORM};

    use super::*;

    fn physio() -> FormController {
        let spec: FormSpec = serde_json::from_str(PHYSIO_FORM).expect("form");
        let clock = Arc::new(ManualClock::new("2026-04-15T09:00:00Z".parse().expect("ts")));
        FormController::new(spec, Box::new(MemoryStore::new()), clock, EngineOptions::default())
            .expect("controller")
    }

    fn choices(values: &[&str]) -> Vec<PromptChoice> {
        values
            .iter()
            .map(|value| PromptChoice {
                value: value.to_string(),
                label: value.to_string(),
            })
            .collect()
    }

    #[test]
    fn choices_accept_numbers_and_text() {
        let options = choices(&["首", "肩", "腰"]);
        assert_eq!(
            parse_answer(FieldKind::RadioGroup, &options, "2").expect("number"),
            FieldValue::text("肩")
        );
        assert_eq!(
            parse_answer(FieldKind::CheckboxGroup, &options, "1、腰").expect("list"),
            FieldValue::set(["首", "腰"])
        );
        assert!(parse_answer(FieldKind::RadioGroup, &options, "4").is_err());
        assert_eq!(
            parse_answer(FieldKind::CheckboxGroup, &options, "-").expect("clear"),
            FieldValue::Set(Vec::new())
        );
    }

    #[test]
    fn booleans_and_ranges_are_checked() {
        assert_eq!(
            parse_answer(FieldKind::Checkbox, &[], "yes").expect("bool"),
            FieldValue::Flag(true)
        );
        let err = parse_answer(FieldKind::Range, &[], "lots").unwrap_err();
        assert_eq!(err.user_message, "Please enter a number.");
    }

    #[test]
    fn walks_every_section_and_confirms() {
        let mut form = physio();
        let script = [
            // basic
            "山田 花子", "", "19800415", "2", "", "170", "65",
            // condition: skipping the required onset blocks, answering it
            // reveals the injury group
            "7", "2,3", "", "1", "2026年3月", "転倒",
            // falls
            "2", "2", "2",
            // history
            "5", "3", "y",
            // preview
            "y",
        ]
        .join("\n");
        let mut wizard = Wizard::new(
            &mut form,
            Cursor::new(script.into_bytes()),
            WizardPresenter::new(Verbosity::Clean),
        );
        wizard.run().expect("wizard");

        assert!(form.preview_open());
        assert_eq!(form.state().text("age"), "46");
        assert_eq!(form.state().text("bmi"), "22.5");
        assert_eq!(form.state().text("pain_level"), "7");
        assert_eq!(form.read("sensory_areas"), FieldValue::set(["肩", "腰"]));
        assert_eq!(form.state().text("onset"), "けが");
        assert_eq!(form.state().text("injury_cause"), "転倒");
        assert_eq!(form.read("conditions"), FieldValue::set(["なし"]));
        assert_eq!(form.state().text("referral"), "インターネット");
        assert_eq!(form.read("consent"), FieldValue::Flag(true));
        assert!(form.validate().valid);
    }

    #[test]
    fn invalid_birthdate_is_asked_again() {
        let mut form = physio();
        let script = ["山田", "", "1980", "19800415", "exit"].join("\n");
        let mut wizard = Wizard::new(
            &mut form,
            Cursor::new(script.into_bytes()),
            WizardPresenter::new(Verbosity::Clean),
        );
        let err = wizard.run().unwrap_err();
        assert_eq!(err.to_string(), "wizard aborted by user");
        assert_eq!(form.state().text("birthdate"), "1980-04-15");
        assert!(form.validity().is_empty());
    }

    #[test]
    fn running_out_of_input_is_an_error() {
        let mut form = physio();
        let mut wizard = Wizard::new(
            &mut form,
            Cursor::new(Vec::new()),
            WizardPresenter::new(Verbosity::Verbose),
        );
        assert!(wizard.run().is_err());
    }
}
