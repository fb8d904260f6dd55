//! Projects (event-sourced).
//!
//! A project owns its activities and budget versions as id-keyed arenas.
//! Activity sub-tasking and budget nesting are kept acyclic inside the
//! aggregate; positions are assigned to activities with the payroll they are
//! paid through.

pub mod project;

pub use project::{
    Activity, ActivityId, ActivityKind, ActivityResource, AddActivity, AddBudget, AssignPosition,
    Budget, BudgetId, BudgetStatus, ChangeProjectStatus, CreateProject, PayrollId, Project,
    ProjectCommand, ProjectEvent, ProjectId, ProjectStatus, SetActivityParent, SetBudgetParent,
};
