//! Hour generation: turns an activity's schedule into timecard hours and
//! processed element entries for every position staffed on it.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use tally_core::{AggregateRoot, DateEffective, IdGenerator, TimeSpan};
use tally_hr::{Party, PartyId, WorkRules};
use tally_payroll::{
    CycleWindow, ElementEntry, ElementType, OpenTimecard, Payroll, ProcessedEntry, RecordHours,
    Timecard, TimecardCommand, TimecardId, WorkDay, apportioner,
};
use tally_projects::{Activity, ActivityId, ActivityResource, Project, ProjectId};

use crate::directory::{ElementDirectory, PayrollDirectory, TimecardDirectory};
use crate::error::CommandError;
use crate::event_store::EventStore;
use crate::handlers::logged;
use crate::repository::{AggregateRepository, Tracked};

/// A position's timecard for one pay cycle, held until every cycle is accepted.
struct StagedTimecard {
    position_id: PartyId,
    window: CycleWindow,
    timecard: Tracked<Timecard>,
}

pub struct TimecardHandler<S> {
    timecards: AggregateRepository<S, Timecard>,
    projects: AggregateRepository<S, Project>,
    parties: AggregateRepository<S, Party>,
    ids: Arc<dyn IdGenerator>,
    payrolls: Arc<dyn PayrollDirectory>,
    elements: Arc<dyn ElementDirectory>,
    index: Arc<dyn TimecardDirectory>,
}

impl<S: EventStore + Clone> TimecardHandler<S> {
    pub fn new<D>(store: S, ids: Arc<dyn IdGenerator>, directory: Arc<D>) -> Self
    where
        D: PayrollDirectory + ElementDirectory + TimecardDirectory + 'static,
    {
        Self {
            timecards: AggregateRepository::new(store.clone(), Arc::clone(&ids)),
            projects: AggregateRepository::new(store.clone(), Arc::clone(&ids)),
            parties: AggregateRepository::new(store, Arc::clone(&ids)),
            ids,
            payrolls: directory.clone(),
            elements: directory.clone(),
            index: directory,
        }
    }

    pub fn repository(&self) -> &AggregateRepository<S, Timecard> {
        &self.timecards
    }

    /// Record the activity's scheduled hours on the timecards of every
    /// assigned position and process the positions' element entries.
    ///
    /// Each pay cycle overlapping the schedule gets one timecard per position,
    /// opened on first use. Re-running replaces the hours recorded for the
    /// activity, so the result converges. Nothing is saved unless every
    /// cycle of every position accepts its hours.
    pub fn generate_hours(
        &self,
        project_id: ProjectId,
        activity_id: ActivityId,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<ProcessedEntry>, CommandError> {
        logged(
            "payroll.timecard.generate_hours",
            activity_id,
            self.try_generate_hours(project_id, activity_id, occurred_at),
        )
    }

    fn try_generate_hours(
        &self,
        project_id: ProjectId,
        activity_id: ActivityId,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<ProcessedEntry>, CommandError> {
        let project = self.projects.load(project_id)?;
        let activity = project.activity(activity_id).ok_or_else(|| {
            CommandError::NotFound(format!("activity {activity_id} in project {project_id}"))
        })?;

        let mut staged: Vec<StagedTimecard> = Vec::new();
        for resource in &activity.resources {
            self.stage_for(&mut staged, activity, resource, occurred_at)?;
        }

        let mut processed = Vec::new();
        for card in &staged {
            processed.extend(self.process_entries(&card.timecard, card.window)?);
        }

        for card in &mut staged {
            if card.timecard.observed_version() == 0 {
                self.timecards.add(&mut card.timecard)?;
                self.index
                    .record_timecard(card.position_id, card.window.start, *card.timecard.id())?;
            } else {
                self.timecards.save(&mut card.timecard)?;
            }
        }
        Ok(processed)
    }

    /// Record the position's hours for each cycle the schedule touches,
    /// in memory only.
    fn stage_for(
        &self,
        staged: &mut Vec<StagedTimecard>,
        activity: &Activity,
        resource: &ActivityResource,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), CommandError> {
        let position = self.parties.load(resource.position_id)?;
        let rules = position.work_rules().cloned().ok_or_else(|| {
            CommandError::Validation(format!("party {} is not a position", resource.position_id))
        })?;
        let payroll = self
            .payrolls
            .payroll(resource.payroll_id)?
            .ok_or_else(|| CommandError::NotFound(format!("payroll {}", resource.payroll_id)))?;

        for window in payroll.pay_cycle.calculator().cycles(&activity.scheduled)? {
            let at = match staged
                .iter()
                .position(|c| c.position_id == resource.position_id && c.window == window)
            {
                Some(at) => at,
                None => {
                    let timecard = self.timecard_for(resource, &payroll, window, occurred_at)?;
                    staged.push(StagedTimecard {
                        position_id: resource.position_id,
                        window,
                        timecard,
                    });
                    staged.len() - 1
                }
            };
            self.record_days(&mut staged[at].timecard, activity, &rules, window, occurred_at)?;
        }
        Ok(())
    }

    /// Load the position's timecard for the cycle, or open a new one.
    fn timecard_for(
        &self,
        resource: &ActivityResource,
        payroll: &Payroll,
        window: CycleWindow,
        occurred_at: DateTime<Utc>,
    ) -> Result<Tracked<Timecard>, CommandError> {
        if let Some(id) = self.index.timecard_for(resource.position_id, window.start)? {
            return self.timecards.load(id);
        }
        let id = TimecardId::generate(&*self.ids);
        let mut tracked = Tracked::<Timecard>::new(id);
        tracked.execute(TimecardCommand::Open(OpenTimecard {
            timecard_id: id,
            position_id: resource.position_id,
            payroll_id: payroll.id,
            frequency: payroll.pay_cycle.frequency,
            window,
            occurred_at,
        }))?;
        Ok(tracked)
    }

    /// Apportion every scheduled day inside the window through each element
    /// linked to the position on that day.
    fn record_days(
        &self,
        timecard: &mut Tracked<Timecard>,
        activity: &Activity,
        rules: &WorkRules,
        window: CycleWindow,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), CommandError> {
        let first = activity.scheduled_start().date();
        let last = activity.scheduled_end().date();
        let (from, to) = (activity.scheduled_start().time(), activity.scheduled_end().time());

        for date in window.days().filter(|d| (first..=last).contains(d)) {
            let span = TimeSpan::on(date, from, to)?;
            let prior = timecard.regular_hours_before(date);
            for element in self.elements.elements_for(timecard.position_id(), date)? {
                let day = WorkDay::new(span, activity.kind, rules, &element, prior);
                let spans = apportioner(element.kind)(&day);
                let recorded = timecard
                    .summary(date)
                    .and_then(|s| s.detail(activity.id, element.id))
                    .is_some();
                if spans.is_empty() && !recorded {
                    continue;
                }
                let timecard_id = *timecard.id();
                timecard.execute(TimecardCommand::RecordHours(RecordHours {
                    timecard_id,
                    date_worked: date,
                    activity_id: activity.id,
                    element_type_id: element.id,
                    element_kind: element.kind,
                    spans,
                    occurred_at,
                }))?;
            }
        }
        Ok(())
    }

    fn process_entries(
        &self,
        timecard: &Timecard,
        window: CycleWindow,
    ) -> Result<Vec<ProcessedEntry>, CommandError> {
        let mut elements: Vec<ElementType> = Vec::new();
        for date in window.days() {
            for element in self.elements.elements_for(timecard.position_id(), date)? {
                if !elements.iter().any(|e| e.id == element.id) {
                    elements.push(element);
                }
            }
        }

        let mut processed = Vec::with_capacity(elements.len());
        for element in &elements {
            let mut entry =
                ElementEntry::for_element(timecard.position_id(), element, *timecard.effective_range());
            processed.push(entry.process(element, timecard)?);
        }
        tracing::debug!(
            timecard_id = %timecard.id(),
            entries = processed.len(),
            hours = %timecard.total_hours(),
            "element entries processed"
        );
        Ok(processed)
    }
}
