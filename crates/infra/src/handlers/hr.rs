use std::sync::Arc;

use tally_core::{HierarchyGuard, IdGenerator};
use tally_hr::{
    AccountabilityKind, AddAccountability, EndAccountability, Party, PartyCommand, PartyId,
    RegisterParty, UpdateWorkRules,
};

use crate::directory::LocationUsage;
use crate::error::CommandError;
use crate::event_store::EventStore;
use crate::handlers::logged;
use crate::repository::{AggregateRepository, Tracked};

pub struct PartyHandler<S> {
    parties: AggregateRepository<S, Party>,
    locations: Arc<dyn LocationUsage>,
}

impl<S: EventStore> PartyHandler<S> {
    pub fn new(store: S, ids: Arc<dyn IdGenerator>, locations: Arc<dyn LocationUsage>) -> Self {
        Self {
            parties: AggregateRepository::new(store, ids),
            locations,
        }
    }

    pub fn repository(&self) -> &AggregateRepository<S, Party> {
        &self.parties
    }

    pub fn register(&self, cmd: RegisterParty) -> Result<Tracked<Party>, CommandError> {
        let id = cmd.party_id;
        logged("hr.party.register", id, self.try_register(cmd))
    }

    pub fn update_work_rules(&self, cmd: UpdateWorkRules) -> Result<Tracked<Party>, CommandError> {
        let id = cmd.party_id;
        logged(
            "hr.party.update_work_rules",
            id,
            self.parties.dispatch(id, PartyCommand::UpdateWorkRules(cmd)),
        )
    }

    /// Attach the party under `parent_id`. The parent's kind is taken from the
    /// stored parent, and the edge may not close a cycle of the same kind.
    pub fn add_accountability(&self, cmd: AddAccountability) -> Result<Tracked<Party>, CommandError> {
        let id = cmd.party_id;
        logged("hr.party.add_accountability", id, self.try_add_accountability(cmd))
    }

    pub fn end_accountability(&self, cmd: EndAccountability) -> Result<Tracked<Party>, CommandError> {
        let id = cmd.party_id;
        logged(
            "hr.party.end_accountability",
            id,
            self.parties.dispatch(id, PartyCommand::EndAccountability(cmd)),
        )
    }

    fn try_register(&self, cmd: RegisterParty) -> Result<Tracked<Party>, CommandError> {
        let id = cmd.party_id;
        let tracked = self.parties.create(id, PartyCommand::Register(cmd))?;
        if let Some(position) = tracked.position() {
            self.locations.record_position_location(id, position.location_id)?;
        }
        Ok(tracked)
    }

    fn try_add_accountability(&self, mut cmd: AddAccountability) -> Result<Tracked<Party>, CommandError> {
        let id = cmd.party_id;
        let mut tracked = self.parties.load(id)?;
        let parent = self.parties.load(cmd.parent_id)?;
        cmd.parent_kind = parent.kind();

        HierarchyGuard::ensure_can_attach(cmd.parent_id, id, &cmd.kind, |node, kind| {
            self.parents_of(node, *kind)
        })?;

        tracked.execute(PartyCommand::AddAccountability(cmd))?;
        self.parties.save(&mut tracked)?;
        Ok(tracked)
    }

    fn parents_of(&self, node: PartyId, kind: AccountabilityKind) -> Result<Vec<PartyId>, CommandError> {
        Ok(self
            .parties
            .try_load(node)?
            .map(|party| party.parents(kind))
            .unwrap_or_default())
    }
}
