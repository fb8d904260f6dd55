use std::sync::Arc;

use tally_core::IdGenerator;
use tally_hr::{Party, PartyKind};
use tally_projects::{
    AddActivity, AddBudget, AssignPosition, ChangeProjectStatus, CreateProject, Project,
    ProjectCommand, ProjectId, SetActivityParent, SetBudgetParent,
};

use crate::directory::PayrollDirectory;
use crate::error::CommandError;
use crate::event_store::EventStore;
use crate::handlers::logged;
use crate::repository::{AggregateRepository, Tracked};

pub struct ProjectHandler<S> {
    projects: AggregateRepository<S, Project>,
    parties: AggregateRepository<S, Party>,
    payrolls: Arc<dyn PayrollDirectory>,
}

impl<S: EventStore + Clone> ProjectHandler<S> {
    pub fn new(store: S, ids: Arc<dyn IdGenerator>, payrolls: Arc<dyn PayrollDirectory>) -> Self {
        Self {
            projects: AggregateRepository::new(store.clone(), Arc::clone(&ids)),
            parties: AggregateRepository::new(store, ids),
            payrolls,
        }
    }

    pub fn repository(&self) -> &AggregateRepository<S, Project> {
        &self.projects
    }

    pub fn create(&self, cmd: CreateProject) -> Result<Tracked<Project>, CommandError> {
        let id = cmd.project_id;
        logged(
            "projects.project.create",
            id,
            self.projects.create(id, ProjectCommand::Create(cmd)),
        )
    }

    pub fn change_status(&self, cmd: ChangeProjectStatus) -> Result<Tracked<Project>, CommandError> {
        self.run("projects.project.change_status", cmd.project_id, ProjectCommand::ChangeStatus(cmd))
    }

    pub fn add_activity(&self, cmd: AddActivity) -> Result<Tracked<Project>, CommandError> {
        self.run("projects.project.add_activity", cmd.project_id, ProjectCommand::AddActivity(cmd))
    }

    pub fn set_activity_parent(&self, cmd: SetActivityParent) -> Result<Tracked<Project>, CommandError> {
        self.run(
            "projects.project.set_activity_parent",
            cmd.project_id,
            ProjectCommand::SetActivityParent(cmd),
        )
    }

    /// Staff an activity with a position paid through a known payroll.
    pub fn assign_position(&self, cmd: AssignPosition) -> Result<Tracked<Project>, CommandError> {
        let id = cmd.project_id;
        logged("projects.project.assign_position", id, self.try_assign_position(cmd))
    }

    pub fn add_budget(&self, cmd: AddBudget) -> Result<Tracked<Project>, CommandError> {
        self.run("projects.project.add_budget", cmd.project_id, ProjectCommand::AddBudget(cmd))
    }

    pub fn set_budget_parent(&self, cmd: SetBudgetParent) -> Result<Tracked<Project>, CommandError> {
        self.run(
            "projects.project.set_budget_parent",
            cmd.project_id,
            ProjectCommand::SetBudgetParent(cmd),
        )
    }

    fn run(
        &self,
        command: &'static str,
        id: ProjectId,
        cmd: ProjectCommand,
    ) -> Result<Tracked<Project>, CommandError> {
        logged(command, id, self.projects.dispatch(id, cmd))
    }

    fn try_assign_position(&self, cmd: AssignPosition) -> Result<Tracked<Project>, CommandError> {
        let resource = cmd.resource;
        let party = self.parties.load(resource.position_id)?;
        if party.kind() != PartyKind::Position {
            return Err(CommandError::Validation(format!(
                "party {} is not a position",
                resource.position_id
            )));
        }
        if self.payrolls.payroll(resource.payroll_id)?.is_none() {
            return Err(CommandError::NotFound(format!("payroll {}", resource.payroll_id)));
        }
        self.projects.dispatch(cmd.project_id, ProjectCommand::AssignPosition(cmd))
    }
}
