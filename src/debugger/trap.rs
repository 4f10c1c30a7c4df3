use crate::debugger::error::Error;
use bitflags::bitflags;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Number of addressable bytes of the emulated machine.
pub const ADDRESS_SPACE: usize = 0x10000;

/// Maximum number of simultaneously valid traps.
pub const MAX_TRAPS: usize = 100;

/// Stable handle of a trap table slot.
pub type TrapId = usize;

bitflags! {
    /// Kinds of trap, a single trap may carry more than one.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TrapKind: u8 {
        const BREAKPOINT = 0x01;
        const TRACE = 0x02;
        const TRACE_ON = 0x04;
        const TRACE_OFF = 0x08;
        const BREAK_ONCE = 0x10;
        const WATCHPOINT = 0x20;
    }
}

const KIND_NAMES: [(TrapKind, &str); 6] = [
    (TrapKind::BREAKPOINT, "breakpoint"),
    (TrapKind::TRACE, "trace"),
    (TrapKind::TRACE_ON, "traceon"),
    (TrapKind::TRACE_OFF, "traceoff"),
    (TrapKind::BREAK_ONCE, "temporary breakpoint"),
    (TrapKind::WATCHPOINT, "watchpoint"),
];

impl Display for TrapKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("unknown trap");
        }
        let names = KIND_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .join(", ");
        f.write_str(&names)
    }
}

/// A single valid slot of the trap table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapEntry {
    pub address: u16,
    pub kind: TrapKind,
    /// Last seen byte at `address`, meaningful only for watchpoints.
    pub last_byte: u8,
}

impl Display for TrapEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x} ({})", self.address, self.kind)
    }
}

/// Observed change of a watched memory byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchpointChange {
    pub trap: TrapId,
    pub address: u16,
    pub old_value: u8,
    pub new_value: u8,
}

/// Fixed capacity trap arena plus a per-address flag cache.
///
/// Flag cache at address `A` is always equal to the bitwise OR of kinds of all valid
/// traps at `A`, so the execution loop needs a single array lookup per instruction.
pub struct TrapTable {
    slots: Vec<Option<TrapEntry>>,
    free: BTreeSet<TrapId>,
    flags: Box<[TrapKind]>,
    watchpoint_count: usize,
}

impl Default for TrapTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TrapTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_TRAPS],
            free: (0..MAX_TRAPS).collect(),
            flags: vec![TrapKind::empty(); ADDRESS_SPACE].into_boxed_slice(),
            watchpoint_count: 0,
        }
    }

    /// Set a new trap, return its id.
    ///
    /// # Arguments
    ///
    /// * `address`: trap address
    /// * `kind`: trap kind
    /// * `read_memory`: reader of live memory, used to snapshot the watched byte
    pub fn set_trap(
        &mut self,
        address: u16,
        kind: TrapKind,
        read_memory: impl FnOnce(u16) -> u8,
    ) -> Result<TrapId, Error> {
        let id = self.free.pop_first().ok_or(Error::TrapTableFull(MAX_TRAPS))?;

        let last_byte = if kind.contains(TrapKind::WATCHPOINT) {
            self.watchpoint_count += 1;
            read_memory(address)
        } else {
            0
        };

        self.slots[id] = Some(TrapEntry {
            address,
            kind,
            last_byte,
        });
        self.flags[address as usize] |= kind;

        Ok(id)
    }

    /// Remove trap by its id, return removed entry.
    pub fn clear_trap(&mut self, id: TrapId) -> Result<TrapEntry, Error> {
        let entry = self
            .slots
            .get_mut(id)
            .and_then(Option::take)
            .ok_or(Error::TrapNotFound(id))?;

        self.free.insert(id);
        if entry.kind.contains(TrapKind::WATCHPOINT) {
            self.watchpoint_count -= 1;
        }
        // another trap at the same address may still carry some of the flags
        self.flags[entry.address as usize] = self.kind_of_valid_at(entry.address);

        Ok(entry)
    }

    /// Remove all traps at address whose kind contains `filter`, or all traps at address
    /// if filter is `None`. Return number of removed traps.
    pub fn clear_traps_at(&mut self, address: u16, filter: Option<TrapKind>) -> usize {
        let ids = self
            .iter()
            .filter(|(_, entry)| {
                entry.address == address && filter.map_or(true, |f| entry.kind.contains(f))
            })
            .map(|(id, _)| id)
            .collect_vec();

        ids.iter()
            .filter(|&&id| self.clear_trap(id).is_ok())
            .count()
    }

    /// Remove all traps.
    pub fn clear_all(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.free = (0..MAX_TRAPS).collect();
        self.flags.fill(TrapKind::empty());
        self.watchpoint_count = 0;
    }

    /// Return union of kinds of all traps at address.
    #[inline(always)]
    pub fn flags_at(&self, address: u16) -> TrapKind {
        self.flags[address as usize]
    }

    /// Return number of valid traps.
    pub fn len(&self) -> usize {
        MAX_TRAPS - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn watchpoint_count(&self) -> usize {
        self.watchpoint_count
    }

    pub fn get(&self, id: TrapId) -> Option<&TrapEntry> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    /// Iterate over valid traps in id order.
    pub fn iter(&self) -> impl Iterator<Item = (TrapId, &TrapEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|entry| (id, entry)))
    }

    /// Compare every watched byte with live memory. Changed bytes are reported into
    /// `changes` and become the new `last_byte`. Return true if at least one byte changed.
    pub fn scan_watchpoints(
        &mut self,
        read_memory: impl Fn(u16) -> u8,
        changes: &mut Vec<WatchpointChange>,
    ) -> bool {
        if self.watchpoint_count == 0 {
            return false;
        }

        let mut triggered = false;
        for (id, slot) in self.slots.iter_mut().enumerate() {
            let Some(entry) = slot else {
                continue;
            };
            if !entry.kind.contains(TrapKind::WATCHPOINT) {
                continue;
            }

            let byte = read_memory(entry.address);
            if byte != entry.last_byte {
                changes.push(WatchpointChange {
                    trap: id,
                    address: entry.address,
                    old_value: entry.last_byte,
                    new_value: byte,
                });
                entry.last_byte = byte;
                triggered = true;
            }
        }
        triggered
    }

    fn kind_of_valid_at(&self, address: u16) -> TrapKind {
        self.iter()
            .filter(|(_, entry)| entry.address == address)
            .fold(TrapKind::empty(), |acc, (_, entry)| acc | entry.kind)
    }
}

impl Display for TrapTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Traps set: {} (maximum {})", self.len(), MAX_TRAPS)?;
        if self.is_empty() {
            return f.write_str("No traps are set.");
        }
        self.iter()
            .try_for_each(|(id, entry)| writeln!(f, "[{id}] {entry}"))
    }
}
