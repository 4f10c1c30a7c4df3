use crate::debugger::error::Error;
use crate::debugger::trap::{TrapId, TrapKind};
use serde::{Serialize, Serializer};
use std::fmt::{Display, Formatter};
use strum_macros::{Display, IntoStaticStr};

/// Maximum number of breakpoints visible to a remote client.
pub const MAX_BREAKPOINTS: usize = 128;

/// Breakpoint kind as seen by a remote client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum BreakpointKind {
    #[strum(serialize = "pc")]
    Pc,
    #[strum(serialize = "mem")]
    Memory,
    #[strum(serialize = "io")]
    Io,
}

impl BreakpointKind {
    /// Numeric representation used on the wire.
    pub fn code(self) -> u8 {
        match self {
            BreakpointKind::Pc => 0,
            BreakpointKind::Memory => 1,
            BreakpointKind::Io => 2,
        }
    }

    /// Trap kind that materializes a breakpoint of this kind.
    pub fn trap_kind(self) -> TrapKind {
        match self {
            BreakpointKind::Memory => TrapKind::WATCHPOINT,
            BreakpointKind::Pc | BreakpointKind::Io => TrapKind::BREAKPOINT,
        }
    }
}

impl Serialize for BreakpointKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Remote-facing breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakpointRecord {
    pub id: usize,
    pub address: u16,
    #[serde(rename = "type")]
    pub kind: BreakpointKind,
    /// Trap that was set for this breakpoint.
    #[serde(skip)]
    pub trap: TrapId,
}

impl Display for BreakpointRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Breakpoint {} at {:04x} ({})", self.id, self.address, self.kind)
    }
}

/// Id addressable table of remote breakpoints. Every record mirrors exactly one trap.
pub struct BreakpointRegistry {
    slots: Vec<Option<BreakpointRecord>>,
}

impl Default for BreakpointRegistry {
    fn default() -> Self {
        Self {
            slots: vec![None; MAX_BREAKPOINTS],
        }
    }
}

impl BreakpointRegistry {
    /// Add a new breakpoint with the lowest free id.
    ///
    /// # Arguments
    ///
    /// * `address`: breakpoint address
    /// * `kind`: breakpoint kind
    /// * `set_trap`: materializes a trap for the breakpoint, the id stays free if it fails
    pub fn add(
        &mut self,
        address: u16,
        kind: BreakpointKind,
        set_trap: impl FnOnce(u16, TrapKind) -> Result<TrapId, Error>,
    ) -> Result<BreakpointRecord, Error> {
        let id = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::BreakpointLimitReached(MAX_BREAKPOINTS))?;

        let trap = set_trap(address, kind.trap_kind())?;
        let record = BreakpointRecord {
            id,
            address,
            kind,
            trap,
        };
        self.slots[id] = Some(record);
        Ok(record)
    }

    /// Remove breakpoint by id. Record is kept if its trap can't be cleared.
    ///
    /// # Arguments
    ///
    /// * `id`: breakpoint id
    /// * `clear_trap`: removes the trap that was set for the breakpoint
    pub fn remove(
        &mut self,
        id: usize,
        clear_trap: impl FnOnce(TrapId) -> Result<(), Error>,
    ) -> Result<BreakpointRecord, Error> {
        let slot = self
            .slots
            .get_mut(id)
            .ok_or(Error::BreakpointIdOutOfRange(id))?;
        let record = (*slot).ok_or(Error::BreakpointNotEnabled(id))?;

        clear_trap(record.trap)?;
        *slot = None;
        Ok(record)
    }

    pub fn get(&self, id: usize) -> Option<&BreakpointRecord> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    /// Iterate over enabled breakpoints in id order.
    pub fn iter(&self) -> impl Iterator<Item = &BreakpointRecord> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}
