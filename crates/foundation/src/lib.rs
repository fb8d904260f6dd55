//! Foundation aggregates (event-sourced): business units, locations and users.
//!
//! Cross-aggregate rules (sibling name uniqueness, parent cycles, children and
//! usage checks, username uniqueness) are enforced by the command handlers in
//! `tally-infra`; the aggregates here validate only their own state.

pub mod business_unit;
pub mod location;
pub mod user;

pub use business_unit::{
    BusinessUnit, BusinessUnitCommand, BusinessUnitEvent, BusinessUnitId, CreateBusinessUnit,
    DeleteBusinessUnit, UpdateBusinessUnit,
};
pub use location::{
    Address, CreateLocation, DeleteLocation, DisableLocation, Location, LocationCommand,
    LocationEvent, LocationId, UpdateLocation,
};
pub use user::{
    AuthenticateUser, ChangeUserCredentials, ChangeUserEmail, CreateUser, DisableUser, User,
    UserCommand, UserEvent, UserId, hash_credentials, validate_username,
};
