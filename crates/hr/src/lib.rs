//! HR parties (event-sourced): organizations, jobs, positions and people,
//! linked by typed accountabilities.
//!
//! An accountability is stored on its child party. Cycle checks across
//! parties need other aggregates and therefore run in the command handler;
//! this crate enforces everything a single party can decide alone.

pub mod party;

pub use party::{
    AddAccountability, Accountability, AccountabilityKind, EndAccountability, Party, PartyCommand,
    PartyEvent, PartyId, PartyKind, PositionDetails, PositionType, RegisterParty, UpdateWorkRules,
    WorkRules,
};
