//! Business units, locations and users.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use tally_core::{HierarchyGuard, IdGenerator};
use tally_foundation::{
    AuthenticateUser, BusinessUnit, BusinessUnitCommand, BusinessUnitId, ChangeUserCredentials,
    ChangeUserEmail, CreateBusinessUnit, CreateLocation, CreateUser, DeleteBusinessUnit,
    DeleteLocation, DisableLocation, DisableUser, Location, LocationCommand, UpdateBusinessUnit,
    UpdateLocation, User, UserCommand, validate_username,
};

use crate::directory::{BusinessUnitDirectory, LocationUsage, UserDirectory};
use crate::error::CommandError;
use crate::event_store::EventStore;
use crate::handlers::logged;
use crate::repository::{AggregateRepository, Tracked};

pub struct BusinessUnitHandler<S> {
    units: AggregateRepository<S, BusinessUnit>,
    directory: Arc<dyn BusinessUnitDirectory>,
}

impl<S: EventStore> BusinessUnitHandler<S> {
    pub fn new(store: S, ids: Arc<dyn IdGenerator>, directory: Arc<dyn BusinessUnitDirectory>) -> Self {
        Self {
            units: AggregateRepository::new(store, ids),
            directory,
        }
    }

    pub fn repository(&self) -> &AggregateRepository<S, BusinessUnit> {
        &self.units
    }

    /// Create a unit. A unit without its own base currency takes its parent's.
    pub fn create(&self, cmd: CreateBusinessUnit) -> Result<Tracked<BusinessUnit>, CommandError> {
        let id = cmd.business_unit_id;
        logged("foundation.business_unit.create", id, self.try_create(cmd))
    }

    /// Update a unit; a new parent must not sit below the unit itself.
    pub fn update(&self, cmd: UpdateBusinessUnit) -> Result<Tracked<BusinessUnit>, CommandError> {
        let id = cmd.business_unit_id;
        logged("foundation.business_unit.update", id, self.try_update(cmd))
    }

    /// Delete a unit that no live unit still reports to.
    pub fn delete(&self, cmd: DeleteBusinessUnit) -> Result<Tracked<BusinessUnit>, CommandError> {
        let id = cmd.business_unit_id;
        logged("foundation.business_unit.delete", id, self.try_delete(cmd))
    }

    fn try_create(&self, mut cmd: CreateBusinessUnit) -> Result<Tracked<BusinessUnit>, CommandError> {
        let id = cmd.business_unit_id;
        if let Some(parent_id) = cmd.parent_id {
            let parent = self.live_parent(parent_id)?;
            if cmd.base_currency.is_none() {
                cmd.base_currency = parent.base_currency().cloned();
            }
            HierarchyGuard::ensure_can_attach(parent_id, id, &(), |node, _| self.parent_of(node))?;
        }
        self.ensure_unique_name(cmd.parent_id, id, &cmd.name)?;

        let tracked = self.units.create(id, BusinessUnitCommand::Create(cmd))?;
        self.directory.record_business_unit(&tracked)?;
        Ok(tracked)
    }

    fn try_update(&self, mut cmd: UpdateBusinessUnit) -> Result<Tracked<BusinessUnit>, CommandError> {
        let id = cmd.business_unit_id;
        let mut tracked = self.units.load(id)?;
        if let Some(parent_id) = cmd.parent_id {
            let parent = self.live_parent(parent_id)?;
            if cmd.base_currency.is_none() {
                cmd.base_currency = parent.base_currency().cloned();
            }
            if tracked.parent_id() != Some(parent_id) {
                HierarchyGuard::ensure_can_attach(parent_id, id, &(), |node, _| self.parent_of(node))?;
            }
        }
        self.ensure_unique_name(cmd.parent_id, id, &cmd.name)?;

        tracked.execute(BusinessUnitCommand::Update(cmd))?;
        self.units.save(&mut tracked)?;
        self.directory.record_business_unit(&tracked)?;
        Ok(tracked)
    }

    fn try_delete(&self, cmd: DeleteBusinessUnit) -> Result<Tracked<BusinessUnit>, CommandError> {
        let id = cmd.business_unit_id;
        if self.directory.has_children(id)? {
            return Err(CommandError::Validation(format!(
                "business unit {id} still has child units"
            )));
        }
        let tracked = self.units.dispatch(id, BusinessUnitCommand::Delete(cmd))?;
        self.directory.record_business_unit(&tracked)?;
        Ok(tracked)
    }

    fn live_parent(&self, parent_id: BusinessUnitId) -> Result<Tracked<BusinessUnit>, CommandError> {
        let parent = self.units.load(parent_id)?;
        if parent.is_deleted() {
            return Err(CommandError::Validation(format!(
                "parent business unit {parent_id} is deleted"
            )));
        }
        Ok(parent)
    }

    fn parent_of(&self, node: BusinessUnitId) -> Result<Vec<BusinessUnitId>, CommandError> {
        Ok(self
            .units
            .try_load(node)?
            .and_then(|unit| unit.parent_id())
            .into_iter()
            .collect())
    }

    fn ensure_unique_name(
        &self,
        parent: Option<BusinessUnitId>,
        unit: BusinessUnitId,
        name: &str,
    ) -> Result<(), CommandError> {
        if self.directory.unique_name(parent, unit, name)? {
            Ok(())
        } else {
            Err(CommandError::Validation(format!(
                "business unit name '{}' is already used by a sibling",
                name.trim()
            )))
        }
    }
}

pub struct LocationHandler<S> {
    locations: AggregateRepository<S, Location>,
    usage: Arc<dyn LocationUsage>,
}

impl<S: EventStore> LocationHandler<S> {
    pub fn new(store: S, ids: Arc<dyn IdGenerator>, usage: Arc<dyn LocationUsage>) -> Self {
        Self {
            locations: AggregateRepository::new(store, ids),
            usage,
        }
    }

    pub fn repository(&self) -> &AggregateRepository<S, Location> {
        &self.locations
    }

    pub fn create(&self, cmd: CreateLocation) -> Result<Tracked<Location>, CommandError> {
        let id = cmd.location_id;
        logged(
            "foundation.location.create",
            id,
            self.locations.create(id, LocationCommand::Create(cmd)),
        )
    }

    pub fn update(&self, cmd: UpdateLocation) -> Result<Tracked<Location>, CommandError> {
        let id = cmd.location_id;
        logged(
            "foundation.location.update",
            id,
            self.locations.dispatch(id, LocationCommand::Update(cmd)),
        )
    }

    pub fn disable(&self, cmd: DisableLocation) -> Result<Tracked<Location>, CommandError> {
        let id = cmd.location_id;
        logged(
            "foundation.location.disable",
            id,
            self.locations.dispatch(id, LocationCommand::Disable(cmd)),
        )
    }

    /// Delete a location no business unit or position refers to.
    pub fn delete(&self, cmd: DeleteLocation) -> Result<Tracked<Location>, CommandError> {
        let id = cmd.location_id;
        logged("foundation.location.delete", id, self.try_delete(cmd))
    }

    fn try_delete(&self, cmd: DeleteLocation) -> Result<Tracked<Location>, CommandError> {
        let id = cmd.location_id;
        if self.usage.location_in_use(id)? {
            return Err(CommandError::Validation(format!("location {id} is in use")));
        }
        self.locations.dispatch(id, LocationCommand::Delete(cmd))
    }
}

pub struct UserHandler<S> {
    users: AggregateRepository<S, User>,
    directory: Arc<dyn UserDirectory>,
}

impl<S: EventStore> UserHandler<S> {
    pub fn new(store: S, ids: Arc<dyn IdGenerator>, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            users: AggregateRepository::new(store, ids),
            directory,
        }
    }

    pub fn repository(&self) -> &AggregateRepository<S, User> {
        &self.users
    }

    /// Create a user whose username no other user holds.
    pub fn create(&self, cmd: CreateUser) -> Result<Tracked<User>, CommandError> {
        let id = cmd.user_id;
        logged("foundation.user.create", id, self.try_create(cmd))
    }

    /// Authenticate by username; unknown usernames are `NotFound`.
    pub fn authenticate(
        &self,
        username: &str,
        raw_credentials: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<Tracked<User>, CommandError> {
        logged(
            "foundation.user.authenticate",
            username,
            self.try_authenticate(username, raw_credentials, occurred_at),
        )
    }

    pub fn disable(&self, cmd: DisableUser) -> Result<Tracked<User>, CommandError> {
        let id = cmd.user_id;
        logged(
            "foundation.user.disable",
            id,
            self.users.dispatch(id, UserCommand::Disable(cmd)),
        )
    }

    pub fn change_credentials(&self, cmd: ChangeUserCredentials) -> Result<Tracked<User>, CommandError> {
        let id = cmd.user_id;
        logged(
            "foundation.user.change_credentials",
            id,
            self.users.dispatch(id, UserCommand::ChangeCredentials(cmd)),
        )
    }

    pub fn change_email(&self, cmd: ChangeUserEmail) -> Result<Tracked<User>, CommandError> {
        let id = cmd.user_id;
        logged(
            "foundation.user.change_email",
            id,
            self.users.dispatch(id, UserCommand::ChangeEmail(cmd)),
        )
    }

    fn try_create(&self, cmd: CreateUser) -> Result<Tracked<User>, CommandError> {
        let id = cmd.user_id;
        validate_username(&cmd.username)?;
        if let Some(existing) = self.directory.user_by_username(&cmd.username)? {
            if existing != id {
                return Err(CommandError::Validation(format!(
                    "username '{}' is already taken",
                    cmd.username
                )));
            }
        }
        let username = cmd.username.clone();
        let tracked = self.users.create(id, UserCommand::Create(cmd))?;
        self.directory.record_username(&username, id)?;
        Ok(tracked)
    }

    fn try_authenticate(
        &self,
        username: &str,
        raw_credentials: &str,
        occurred_at: DateTime<Utc>,
    ) -> Result<Tracked<User>, CommandError> {
        let user_id = self
            .directory
            .user_by_username(username)?
            .ok_or_else(|| CommandError::NotFound(format!("user '{username}'")))?;
        let cmd = AuthenticateUser {
            user_id,
            raw_credentials: raw_credentials.to_string(),
            occurred_at,
        };
        self.users.dispatch(user_id, UserCommand::Authenticate(cmd))
    }
}
