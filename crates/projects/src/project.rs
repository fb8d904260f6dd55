use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::{Aggregate, AggregateRoot, DomainError, EventSourced, ParentMap, TimeSpan};
use tally_events::Event;
use tally_hr::PartyId;

tally_core::uuid_id!(
    /// Project identifier (aggregate id).
    pub ProjectId
);

tally_core::uuid_id!(
    /// Activity identifier, unique within its project.
    pub ActivityId
);

tally_core::uuid_id!(
    /// Budget version identifier, unique within its project.
    pub BudgetId
);

tally_core::uuid_id!(
    /// Payroll a position is paid through on an activity.
    pub PayrollId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Unapproved,
    Submitted,
    Approved,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Generic,
    Rehearsal,
    Performance,
}

impl ActivityKind {
    pub fn is_performance(self) -> bool {
        self == ActivityKind::Performance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityResource {
    pub position_id: PartyId,
    pub payroll_id: PayrollId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub name: String,
    pub description: Option<String>,
    pub kind: ActivityKind,
    pub scheduled: TimeSpan,
    pub resources: Vec<ActivityResource>,
}

impl Activity {
    pub fn scheduled_start(&self) -> NaiveDateTime {
        self.scheduled.start()
    }

    pub fn scheduled_end(&self) -> NaiveDateTime {
        self.scheduled.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    Draft,
    Submitted,
    Approved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub id: BudgetId,
    pub name: String,
    pub description: Option<String>,
    pub status: BudgetStatus,
    pub version_number: u32,
}

/// Aggregate root: Project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    id: ProjectId,
    name: String,
    description: Option<String>,
    status: ProjectStatus,
    sequence: u32,
    start_date: Option<NaiveDate>,
    completion_date: Option<NaiveDate>,
    activities: BTreeMap<ActivityId, Activity>,
    budgets: BTreeMap<BudgetId, Budget>,
    subtasks: ParentMap<ActivityId, ()>,
    budget_tree: ParentMap<BudgetId, ()>,
    version: u64,
    created: bool,
}

impl Project {
    pub fn empty(id: ProjectId) -> Self {
        Self {
            id,
            name: String::new(),
            description: None,
            status: ProjectStatus::Unapproved,
            sequence: 0,
            start_date: None,
            completion_date: None,
            activities: BTreeMap::new(),
            budgets: BTreeMap::new(),
            subtasks: ParentMap::new(),
            budget_tree: ParentMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn completion_date(&self) -> Option<NaiveDate> {
        self.completion_date
    }

    pub fn activity(&self, id: ActivityId) -> Option<&Activity> {
        self.activities.get(&id)
    }

    /// Activities ordered by scheduled start, then name.
    pub fn activities(&self) -> Vec<&Activity> {
        let mut activities: Vec<&Activity> = self.activities.values().collect();
        activities.sort_by(|a, b| {
            a.scheduled_start()
                .cmp(&b.scheduled_start())
                .then_with(|| a.name.cmp(&b.name))
        });
        activities
    }

    pub fn parent_activity(&self, id: ActivityId) -> Option<ActivityId> {
        self.subtasks.parents(id, &()).first().copied()
    }

    pub fn subtasks(&self, id: ActivityId) -> Vec<ActivityId> {
        self.subtasks.children(id, &())
    }

    pub fn budget(&self, id: BudgetId) -> Option<&Budget> {
        self.budgets.get(&id)
    }

    /// Budgets ordered by version number.
    pub fn budgets(&self) -> Vec<&Budget> {
        let mut budgets: Vec<&Budget> = self.budgets.values().collect();
        budgets.sort_by_key(|b| b.version_number);
        budgets
    }

    pub fn parent_budget(&self, id: BudgetId) -> Option<BudgetId> {
        self.budget_tree.parents(id, &()).first().copied()
    }

    pub fn child_budgets(&self, id: BudgetId) -> Vec<BudgetId> {
        self.budget_tree.children(id, &())
    }
}

impl AggregateRoot for Project {
    type Id = ProjectId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProject {
    pub project_id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub sequence: u32,
    pub start_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeProjectStatus. A closed project accepts no further changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProjectStatus {
    pub project_id: ProjectId,
    pub status: ProjectStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddActivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddActivity {
    pub project_id: ProjectId,
    pub activity_id: ActivityId,
    pub name: String,
    pub description: Option<String>,
    pub kind: ActivityKind,
    pub scheduled_start: NaiveDateTime,
    pub scheduled_end: NaiveDateTime,
    pub parent_id: Option<ActivityId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetActivityParent (`None` detaches the sub-task).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetActivityParent {
    pub project_id: ProjectId,
    pub activity_id: ActivityId,
    pub parent_id: Option<ActivityId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignPosition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignPosition {
    pub project_id: ProjectId,
    pub activity_id: ActivityId,
    pub resource: ActivityResource,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddBudget. The version number is assigned by the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddBudget {
    pub project_id: ProjectId,
    pub budget_id: BudgetId,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<BudgetId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetBudgetParent (`None` detaches the budget).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetBudgetParent {
    pub project_id: ProjectId,
    pub budget_id: BudgetId,
    pub parent_id: Option<BudgetId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectCommand {
    Create(CreateProject),
    ChangeStatus(ChangeProjectStatus),
    AddActivity(AddActivity),
    SetActivityParent(SetActivityParent),
    AssignPosition(AssignPosition),
    AddBudget(AddBudget),
    SetBudgetParent(SetBudgetParent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCreated {
    pub project_id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub sequence: u32,
    pub start_date: Option<NaiveDate>,
    pub completion_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatusChanged {
    pub project_id: ProjectId,
    pub status: ProjectStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityAdded {
    pub project_id: ProjectId,
    pub activity: Activity,
    pub parent_id: Option<ActivityId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityParentChanged {
    pub project_id: ProjectId,
    pub activity_id: ActivityId,
    pub parent_id: Option<ActivityId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionAssigned {
    pub project_id: ProjectId,
    pub activity_id: ActivityId,
    pub resource: ActivityResource,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetAdded {
    pub project_id: ProjectId,
    pub budget: Budget,
    pub parent_id: Option<BudgetId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetParentChanged {
    pub project_id: ProjectId,
    pub budget_id: BudgetId,
    pub parent_id: Option<BudgetId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectEvent {
    Created(ProjectCreated),
    StatusChanged(ProjectStatusChanged),
    ActivityAdded(ActivityAdded),
    ActivityParentChanged(ActivityParentChanged),
    PositionAssigned(PositionAssigned),
    BudgetAdded(BudgetAdded),
    BudgetParentChanged(BudgetParentChanged),
}

impl Event for ProjectEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProjectEvent::Created(_) => "projects.project.created",
            ProjectEvent::StatusChanged(_) => "projects.project.status_changed",
            ProjectEvent::ActivityAdded(_) => "projects.project.activity_added",
            ProjectEvent::ActivityParentChanged(_) => "projects.project.activity_parent_changed",
            ProjectEvent::PositionAssigned(_) => "projects.project.position_assigned",
            ProjectEvent::BudgetAdded(_) => "projects.project.budget_added",
            ProjectEvent::BudgetParentChanged(_) => "projects.project.budget_parent_changed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProjectEvent::Created(e) => e.occurred_at,
            ProjectEvent::StatusChanged(e) => e.occurred_at,
            ProjectEvent::ActivityAdded(e) => e.occurred_at,
            ProjectEvent::ActivityParentChanged(e) => e.occurred_at,
            ProjectEvent::PositionAssigned(e) => e.occurred_at,
            ProjectEvent::BudgetAdded(e) => e.occurred_at,
            ProjectEvent::BudgetParentChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Project {
    type Command = ProjectCommand;
    type Event = ProjectEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProjectEvent::Created(e) => {
                self.id = e.project_id;
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.sequence = e.sequence;
                self.start_date = e.start_date;
                self.completion_date = e.completion_date;
                self.created = true;
            }
            ProjectEvent::StatusChanged(e) => {
                self.status = e.status;
            }
            ProjectEvent::ActivityAdded(e) => {
                let id = e.activity.id;
                self.activities.insert(id, e.activity.clone());
                if let Some(parent) = e.parent_id {
                    self.subtasks.insert_unchecked(parent, id, ());
                }
            }
            ProjectEvent::ActivityParentChanged(e) => {
                self.subtasks.detach(e.activity_id, &());
                if let Some(parent) = e.parent_id {
                    self.subtasks.insert_unchecked(parent, e.activity_id, ());
                }
            }
            ProjectEvent::PositionAssigned(e) => {
                if let Some(activity) = self.activities.get_mut(&e.activity_id) {
                    activity.resources.push(e.resource);
                }
            }
            ProjectEvent::BudgetAdded(e) => {
                let id = e.budget.id;
                self.budgets.insert(id, e.budget.clone());
                if let Some(parent) = e.parent_id {
                    self.budget_tree.insert_unchecked(parent, id, ());
                }
            }
            ProjectEvent::BudgetParentChanged(e) => {
                self.budget_tree.detach(e.budget_id, &());
                if let Some(parent) = e.parent_id {
                    self.budget_tree.insert_unchecked(parent, e.budget_id, ());
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProjectCommand::Create(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("project already exists"));
                }
                if self.id != cmd.project_id {
                    return Err(DomainError::invariant("project_id mismatch"));
                }
                let name = non_empty(&cmd.name, "project name")?;
                if let (Some(start), Some(end)) = (cmd.start_date, cmd.completion_date) {
                    if end < start {
                        return Err(DomainError::validation(
                            "completion date cannot precede start date",
                        ));
                    }
                }
                Ok(vec![ProjectEvent::Created(ProjectCreated {
                    project_id: cmd.project_id,
                    name,
                    description: cmd.description.clone(),
                    sequence: cmd.sequence,
                    start_date: cmd.start_date,
                    completion_date: cmd.completion_date,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProjectCommand::ChangeStatus(cmd) => {
                self.ensure_open()?;
                if self.status == cmd.status {
                    return Err(DomainError::conflict(format!(
                        "project is already {:?}",
                        cmd.status
                    )));
                }
                Ok(vec![ProjectEvent::StatusChanged(ProjectStatusChanged {
                    project_id: cmd.project_id,
                    status: cmd.status,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProjectCommand::AddActivity(cmd) => self.handle_add_activity(cmd),
            ProjectCommand::SetActivityParent(cmd) => {
                self.ensure_open()?;
                self.ensure_activity(cmd.activity_id)?;
                if let Some(parent) = cmd.parent_id {
                    self.ensure_activity(parent)?;
                    if !self.subtasks.can_attach(parent, cmd.activity_id, &()) {
                        return Err(DomainError::invalid_parent());
                    }
                }
                Ok(vec![ProjectEvent::ActivityParentChanged(ActivityParentChanged {
                    project_id: cmd.project_id,
                    activity_id: cmd.activity_id,
                    parent_id: cmd.parent_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProjectCommand::AssignPosition(cmd) => {
                self.ensure_open()?;
                let activity = self.ensure_activity(cmd.activity_id)?;
                if activity
                    .resources
                    .iter()
                    .any(|r| r.position_id == cmd.resource.position_id)
                {
                    return Err(DomainError::conflict(format!(
                        "position {} already assigned to activity {}",
                        cmd.resource.position_id, cmd.activity_id
                    )));
                }
                Ok(vec![ProjectEvent::PositionAssigned(PositionAssigned {
                    project_id: cmd.project_id,
                    activity_id: cmd.activity_id,
                    resource: cmd.resource,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProjectCommand::AddBudget(cmd) => {
                self.ensure_open()?;
                if self.budgets.contains_key(&cmd.budget_id) {
                    return Err(DomainError::conflict(format!("budget {} already exists", cmd.budget_id)));
                }
                if let Some(parent) = cmd.parent_id {
                    self.ensure_budget(parent)?;
                }
                let name = non_empty(&cmd.name, "budget name")?;
                let version_number = self
                    .budgets
                    .values()
                    .map(|b| b.version_number)
                    .max()
                    .unwrap_or(0)
                    + 1;
                Ok(vec![ProjectEvent::BudgetAdded(BudgetAdded {
                    project_id: cmd.project_id,
                    budget: Budget {
                        id: cmd.budget_id,
                        name,
                        description: cmd.description.clone(),
                        status: BudgetStatus::Draft,
                        version_number,
                    },
                    parent_id: cmd.parent_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProjectCommand::SetBudgetParent(cmd) => {
                self.ensure_open()?;
                self.ensure_budget(cmd.budget_id)?;
                if let Some(parent) = cmd.parent_id {
                    self.ensure_budget(parent)?;
                    if !self.budget_tree.can_attach(parent, cmd.budget_id, &()) {
                        return Err(DomainError::invalid_parent());
                    }
                }
                Ok(vec![ProjectEvent::BudgetParentChanged(BudgetParentChanged {
                    project_id: cmd.project_id,
                    budget_id: cmd.budget_id,
                    parent_id: cmd.parent_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl EventSourced for Project {
    const AGGREGATE_TYPE: &'static str = "projects.project";

    fn empty(id: ProjectId) -> Self {
        Project::empty(id)
    }

    fn is_created(&self) -> bool {
        self.created
    }
}

impl Project {
    fn ensure_open(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("project {}", self.id)));
        }
        if self.status == ProjectStatus::Closed {
            return Err(DomainError::invariant("project is closed"));
        }
        Ok(())
    }

    fn ensure_activity(&self, id: ActivityId) -> Result<&Activity, DomainError> {
        self.activities.get(&id).ok_or_else(|| {
            DomainError::validation(format!("activity {id} does not belong to project {}", self.id))
        })
    }

    fn ensure_budget(&self, id: BudgetId) -> Result<&Budget, DomainError> {
        self.budgets.get(&id).ok_or_else(|| {
            DomainError::validation(format!("budget {id} does not belong to project {}", self.id))
        })
    }

    fn handle_add_activity(&self, cmd: &AddActivity) -> Result<Vec<ProjectEvent>, DomainError> {
        self.ensure_open()?;
        if self.activities.contains_key(&cmd.activity_id) {
            return Err(DomainError::conflict(format!(
                "activity {} already exists",
                cmd.activity_id
            )));
        }
        if let Some(parent) = cmd.parent_id {
            if parent == cmd.activity_id {
                return Err(DomainError::invalid_parent());
            }
            self.ensure_activity(parent)?;
        }
        let name = non_empty(&cmd.name, "activity name")?;
        let scheduled = TimeSpan::new(cmd.scheduled_start, cmd.scheduled_end)?;

        Ok(vec![ProjectEvent::ActivityAdded(ActivityAdded {
            project_id: cmd.project_id,
            activity: Activity {
                id: cmd.activity_id,
                name,
                description: cmd.description.clone(),
                kind: cmd.kind,
                scheduled,
                resources: Vec::new(),
            },
            parent_id: cmd.parent_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn non_empty(value: &str, what: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{what} cannot be empty")));
    }
    Ok(trimmed.to_string())
}
