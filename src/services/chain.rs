//! Constraint chain engine.
//!
//! A chain is an ordered list of named checks. Items run in order; a FAIL
//! item that does not pass stops the chain and later items never appear in
//! the report. WARN and INFORM items are recorded and never stop anything;
//! IGNORE items are not run.

use crate::domain::verification::{
    ChainReport, ConstraintResult, ConstraintStatus, Indication, Level,
};

/// What a single check found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub message: Option<String>,
    pub sub_results: Vec<ConstraintResult>,
}

impl CheckOutcome {
    #[must_use]
    pub fn pass() -> Self {
        Self {
            passed: true,
            message: None,
            sub_results: Vec::new(),
        }
    }

    #[must_use]
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: Some(message.into()),
            sub_results: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_bool(passed: bool, failure_message: impl Into<String>) -> Self {
        if passed {
            Self::pass()
        } else {
            Self::fail(failure_message)
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_sub_results(mut self, sub_results: Vec<ConstraintResult>) -> Self {
        self.sub_results = sub_results;
        self
    }
}

/// One named check of a chain.
pub trait ChainItem {
    /// Stable constraint name used in reports.
    fn name(&self) -> &str;
    fn level(&self) -> Level;
    fn check(&self) -> CheckOutcome;
}

/// Closure-backed item for checks that need no state of their own.
pub struct FnItem<F> {
    name: String,
    level: Level,
    check: F,
}

impl<F> FnItem<F>
where
    F: Fn() -> CheckOutcome,
{
    pub fn new(name: impl Into<String>, level: Level, check: F) -> Self {
        Self {
            name: name.into(),
            level,
            check,
        }
    }
}

impl<F> ChainItem for FnItem<F>
where
    F: Fn() -> CheckOutcome,
{
    fn name(&self) -> &str {
        &self.name
    }
    fn level(&self) -> Level {
        self.level
    }
    fn check(&self) -> CheckOutcome {
        (self.check)()
    }
}

/// Ordered, short-circuiting list of checks.
pub struct ConstraintChain<'a> {
    title: String,
    items: Vec<Box<dyn ChainItem + 'a>>,
}

impl<'a> ConstraintChain<'a> {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, item: impl ChainItem + 'a) {
        self.items.push(Box::new(item));
    }

    pub fn push_boxed(&mut self, item: Box<dyn ChainItem + 'a>) {
        self.items.push(item);
    }

    #[must_use]
    pub fn with(mut self, item: impl ChainItem + 'a) -> Self {
        self.push(item);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Run the items in order and build the report.
    #[must_use]
    pub fn execute(&self) -> ChainReport {
        let mut results = Vec::with_capacity(self.items.len());
        let mut conclusion = ConstraintStatus::Ok;
        let mut warned = false;

        for item in &self.items {
            let status_on_failure = match item.level() {
                Level::Ignore => {
                    log::trace!("[{}] {} ignored by policy", self.title, item.name());
                    continue;
                }
                Level::Fail => ConstraintStatus::NotOk,
                Level::Warn => ConstraintStatus::Warn,
                Level::Inform => ConstraintStatus::Inform,
            };

            let outcome = item.check();
            let status = if outcome.passed {
                ConstraintStatus::Ok
            } else {
                status_on_failure
            };
            log::debug!("[{}] {} -> {}", self.title, item.name(), status);

            results.push(ConstraintResult {
                name: item.name().to_string(),
                status,
                message: outcome.message,
                sub_results: outcome.sub_results,
            });

            match status {
                ConstraintStatus::NotOk => {
                    conclusion = ConstraintStatus::NotOk;
                    break;
                }
                ConstraintStatus::Warn => warned = true,
                _ => {}
            }
        }

        let indication = match (conclusion, warned) {
            (ConstraintStatus::NotOk, _) => Indication::Failed,
            (_, true) => Indication::PassedWithWarnings,
            _ => Indication::Passed,
        };

        ChainReport {
            title: self.title.clone(),
            results,
            conclusion,
            indication,
        }
    }
}
