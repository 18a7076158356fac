use serde::Serialize;

use crate::spec::form::FormSpec;
use crate::state::FormState;
use crate::validate::{FieldIssue, ValidationResult};

pub const NEXT_CAPTION: &str = "次のセクションへ";
pub const REVIEW_CAPTION: &str = "確認画面へ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    Moved { from: usize, to: usize },
    Stayed,
    /// The move was refused; the issue names the field to focus.
    Blocked(FieldIssue),
    /// `next` on the last section: show the preview instead.
    OpenPreview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepState {
    pub index: usize,
    pub title: String,
    pub active: bool,
    pub complete: bool,
}

/// Current section of a stepped form. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigator {
    current: usize,
    count: usize,
}

impl Navigator {
    pub fn new(count: usize) -> Self {
        Self { current: 0, count }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 >= self.count
    }

    /// Shows `index`, clamped into range.
    pub fn show(&mut self, index: usize) -> usize {
        self.current = index.min(self.count.saturating_sub(1));
        self.current
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }

    pub fn next<F>(&mut self, mut validate: F) -> NavOutcome
    where
        F: FnMut(usize) -> ValidationResult,
    {
        if let Some(issue) = validate(self.current).issues.into_iter().next() {
            return NavOutcome::Blocked(issue);
        }
        if self.is_last() {
            return NavOutcome::OpenPreview;
        }
        let from = self.current;
        let to = self.show(from + 1);
        NavOutcome::Moved { from, to }
    }

    pub fn prev(&mut self) -> NavOutcome {
        if self.current == 0 {
            return NavOutcome::Stayed;
        }
        let from = self.current;
        let to = self.show(from - 1);
        NavOutcome::Moved { from, to }
    }

    /// Backward jumps are free. Forward jumps validate every section from
    /// the current one up to the target and stop at the first failure.
    pub fn jump<F>(&mut self, index: usize, mut validate: F) -> NavOutcome
    where
        F: FnMut(usize) -> ValidationResult,
    {
        let target = index.min(self.count.saturating_sub(1));
        if target == self.current {
            return NavOutcome::Stayed;
        }
        if target > self.current {
            for section in self.current..target {
                if let Some(issue) = validate(section).issues.into_iter().next() {
                    self.show(section);
                    return NavOutcome::Blocked(issue);
                }
            }
        }
        let from = self.current;
        let to = self.show(target);
        NavOutcome::Moved { from, to }
    }

    /// Step indicator: sections before the current one are complete.
    pub fn steps(&self, spec: &FormSpec) -> Vec<StepState> {
        spec.sections
            .iter()
            .enumerate()
            .map(|(index, section)| StepState {
                index,
                title: section.heading.clone(),
                active: index == self.current,
                complete: index < self.current,
            })
            .collect()
    }

    /// Preview and submit controls only show on the last section.
    pub fn actions_visible(&self) -> bool {
        self.is_last()
    }

    pub fn next_caption(&self) -> &'static str {
        if self.is_last() {
            REVIEW_CAPTION
        } else {
            NEXT_CAPTION
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percent: u32,
}

impl Progress {
    pub fn label(&self) -> String {
        format!("{}% 完了（必須項目）", self.percent)
    }
}

/// Share of distinct required names holding a non-empty value.
pub fn progress(spec: &FormSpec, state: &FormState) -> Progress {
    let mut required: Vec<&str> = Vec::new();
    for (_, _, field) in spec.fields() {
        if field.required && !required.contains(&field.name.as_str()) {
            required.push(field.name.as_str());
        }
    }
    let total = required.len();
    let completed = required
        .iter()
        .filter(|name| state.get(name).is_some_and(|value| !value.is_empty()))
        .count();
    let percent = if total == 0 {
        0
    } else {
        ((completed as f64 / total as f64) * 100.0).round() as u32
    };
    Progress {
        completed,
        total,
        percent,
    }
}
