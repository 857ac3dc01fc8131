//! YAML scenarios: a timeline of labelled items driven on a virtual clock.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use dispatch_log::{DispatchLogError, TraceRecorder};
use scheduler::{Clock, Scheduler, SchedulerConfig, VirtualTimeScheduler};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use vtime_core::{
    CalendarDomain, CalendarTime, Deadline, DispatchRecord, Millis, SchedulerError, TickDomain,
    TimeDomain,
};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("read {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("parse: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("item `{0}` needs exactly one of at, after, deadline, every")]
    Timing(String),
    #[error("item `{0}`: {1}")]
    Invalid(String, &'static str),
    #[error("periodic item `{0}` never ends; set runs, until, or scheduler.max_dispatches")]
    Unbounded(String),
    #[error("tick time {0} is negative")]
    NegativeTick(Millis),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Log(#[from] DispatchLogError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainKind {
    #[default]
    Tick,
    Calendar,
}

/// A scenario document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub domain: DomainKind,
    /// Initial clock in milliseconds (epoch milliseconds for calendar).
    #[serde(default)]
    pub start: Millis,
    /// Drive with `advance_to(until)` instead of draining the queue.
    #[serde(default)]
    pub until: Option<Millis>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub items: Vec<ItemSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemSpec {
    pub label: String,
    #[serde(default)]
    pub at: Option<Millis>,
    #[serde(default)]
    pub after: Option<Millis>,
    #[serde(default)]
    pub deadline: Option<DeadlineSpec>,
    /// Period of a periodic item; the first run is immediate.
    #[serde(default)]
    pub every: Option<Millis>,
    /// Number of periodic runs; unbounded when absent.
    #[serde(default)]
    pub runs: Option<u32>,
    /// Dispose the item when the clock reaches this reading.
    #[serde(default)]
    pub cancel_at: Option<Millis>,
}

/// `deadline: { at: <ms> }` or `deadline: { after: <ms> }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeadlineSpec {
    #[serde(default)]
    pub at: Option<Millis>,
    #[serde(default)]
    pub after: Option<Millis>,
}

impl DeadlineSpec {
    fn to_deadline(self, label: &str) -> Result<Deadline, ScenarioError> {
        match (self.at, self.after) {
            (Some(at), None) => Ok(Deadline::At(at)),
            (None, Some(after)) => Ok(Deadline::After(after)),
            _ => Err(ScenarioError::Invalid(
                label.to_owned(),
                "deadline needs exactly one of at, after",
            )),
        }
    }
}

enum Timing {
    At(Millis),
    After(Millis),
    Deadline(Deadline),
    Every { period: Millis, runs: Option<u32> },
}

impl ItemSpec {
    fn timing(&self) -> Result<Timing, ScenarioError> {
        let timing = match (self.at, self.after, self.deadline, self.every) {
            (Some(at), None, None, None) => Timing::At(at),
            (None, Some(after), None, None) => Timing::After(after),
            (None, None, Some(spec), None) => Timing::Deadline(spec.to_deadline(&self.label)?),
            (None, None, None, Some(period)) => Timing::Every { period, runs: self.runs },
            _ => return Err(ScenarioError::Timing(self.label.clone())),
        };
        if self.runs.is_some() && self.every.is_none() {
            return Err(ScenarioError::Invalid(self.label.clone(), "runs requires every"));
        }
        if self.runs == Some(0) {
            return Err(ScenarioError::Invalid(self.label.clone(), "runs must be at least 1"));
        }
        if matches!(self.every, Some(p) if p <= 0) {
            return Err(ScenarioError::Invalid(self.label.clone(), "every must be positive"));
        }
        Ok(timing)
    }
}

/// Result of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub domain: DomainKind,
    /// Item labels in invocation order; periodic items appear once per run.
    pub labels: Vec<String>,
    pub final_clock_ms: Millis,
    pub dispatched: u64,
    pub purged: u64,
    pub digest: String,
    #[serde(skip)]
    pub trace: Vec<DispatchRecord>,
}

impl Scenario {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.scheduler.validate()?;
        Ok(scenario)
    }

    pub fn from_yaml_path(path: &Path) -> Result<Self, ScenarioError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ScenarioError::Read { path: path.display().to_string(), source })?;
        Self::from_yaml_str(&raw)
    }

    /// Run with `config` in place of the document's own scheduler section.
    pub fn run_with(&self, config: SchedulerConfig) -> Result<RunSummary, ScenarioError> {
        for item in &self.items {
            if let Timing::Every { runs: None, .. } = item.timing()? {
                if self.until.is_none() && config.max_dispatches.is_none() {
                    return Err(ScenarioError::Unbounded(item.label.clone()));
                }
            }
        }
        match self.domain {
            DomainKind::Tick => self.run_in(TickDomain, config),
            DomainKind::Calendar => self.run_in(CalendarDomain, config),
        }
    }

    pub fn run(&self) -> Result<RunSummary, ScenarioError> {
        self.run_with(self.scheduler.clone())
    }

    fn run_in<D: ScenarioDomain>(
        &self,
        domain: D,
        config: SchedulerConfig,
    ) -> Result<RunSummary, ScenarioError>
    where
        D::Absolute: Default,
    {
        let sched = VirtualTimeScheduler::builder()
            .domain(domain)
            .initial_clock(D::absolute_from_ms(self.start)?)
            .config(config)
            .build()?;
        let recorder = Rc::new(TraceRecorder::new());
        sched.set_observer(recorder.clone());
        let labels = Rc::new(RefCell::new(Vec::<String>::new()));

        for item in &self.items {
            let handle = match item.timing()? {
                Timing::At(at) => {
                    let due = D::absolute_from_ms(at)?;
                    sched.schedule_absolute(item.label.clone(), due, record_once::<D>(&labels))
                }
                Timing::After(after) => {
                    let delay = sched.domain().to_relative(after);
                    sched.schedule_relative(item.label.clone(), delay, record_once::<D>(&labels))
                }
                Timing::Deadline(deadline) => {
                    sched.schedule_future(item.label.clone(), deadline, record_once::<D>(&labels))
                }
                Timing::Every { period, runs } => {
                    let period = sched.domain().to_relative(period);
                    let log = labels.clone();
                    let label = item.label.clone();
                    sched.schedule_periodic(runs, period, move |left| {
                        log.borrow_mut().push(label.clone());
                        match left {
                            None => Some(None),
                            Some(n) if n > 1 => Some(Some(n - 1)),
                            Some(_) => None,
                        }
                    })
                }
            };
            if let Some(cancel_at) = item.cancel_at {
                let at = D::absolute_from_ms(cancel_at)?;
                sched.schedule_absolute(handle, at, |_, handle| handle.dispose());
            }
        }
        debug!(items = self.items.len(), pending = sched.pending(), "scenario loaded");

        match self.until {
            Some(until) => sched.advance_to(D::absolute_from_ms(until)?)?,
            None => sched.start(),
        }
        sched.clear_observer();

        let stats = sched.stats();
        let trace = recorder.take();
        let summary = RunSummary {
            domain: self.domain,
            labels: labels.take(),
            final_clock_ms: sched.now_ms(),
            dispatched: stats.dispatched,
            purged: stats.purged,
            digest: dispatch_log::trace_digest(&trace)?,
            trace,
        };
        info!(
            dispatched = summary.dispatched,
            purged = summary.purged,
            clock_ms = summary.final_clock_ms,
            "scenario finished"
        );
        Ok(summary)
    }
}

fn record_once<D: TimeDomain>(
    labels: &Rc<RefCell<Vec<String>>>,
) -> impl FnOnce(&VirtualTimeScheduler<D>, String) + 'static {
    let log = labels.clone();
    move |_, label| log.borrow_mut().push(label)
}

/// Domains a scenario can name: absolute times come from millisecond readings.
trait ScenarioDomain: TimeDomain {
    fn absolute_from_ms(ms: Millis) -> Result<Self::Absolute, ScenarioError>;
}

impl ScenarioDomain for TickDomain {
    fn absolute_from_ms(ms: Millis) -> Result<u64, ScenarioError> {
        u64::try_from(ms).map_err(|_| ScenarioError::NegativeTick(ms))
    }
}

impl ScenarioDomain for CalendarDomain {
    fn absolute_from_ms(ms: Millis) -> Result<CalendarTime, ScenarioError> {
        Ok(CalendarTime::from_epoch_ms(ms))
    }
}
