//! ContextTable: 6LoWPAN compression contexts (IPHC/6CO) with their lifecycle.
//!
//! Grounded on `examples/original_source/.../pgw_nd.c` (`pgw_context_add`,
//! `pgw_context_create`, `pgw_periodic`'s context-advancing half) for the
//! state machine, and on SPEC_FULL.md §4.5 / §9 reconciliations for the two
//! points where this implementation deliberately departs from the original:
//! 6CO advertisement eligibility excludes `Expired` contexts, and the prefix
//! byte count used when copying the prefix into a 6CO is derived from the bit
//! length rather than reusing it directly as a byte count.

use crate::addr::Ipv6Addr;
use crate::clock::GwInstant;
use crate::config::Config;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ContextState {
    NotInUse,
    InUseUncompressOnly,
    InUseCompress,
    Expired,
}

#[derive(Clone, Copy, Debug)]
pub struct ContextEntry {
    pub prefix: Ipv6Addr,
    pub prefix_len_bits: u8,
    pub context_id: u8,
    pub state: ContextState,
    pub vlifetime_deadline: GwInstant,
}

impl ContextEntry {
    /// Bytes of `prefix` that are actually significant, per `prefix_len_bits`.
    /// The original C's `memcpy` uses the bit-length field as if it were a
    /// byte count; this is a deliberate correctness fix, documented in
    /// DESIGN.md.
    pub fn prefix_byte_len(&self) -> usize {
        self.prefix_len_bits.div_ceil(8) as usize
    }

    /// 6CO option length in 8-octet units: 2 normally, 3 iff prefix > 64 bits.
    pub fn option_len_units(&self) -> u8 {
        if self.prefix_len_bits > 64 { 3 } else { 2 }
    }
}

pub struct ContextTable {
    slots: Vec<Option<ContextEntry>>,
    context_changed: bool,
}

pub enum CreateOutcome {
    Created,
    RefreshedNoAnnounce,
    RefreshedAnnounce,
    TableFull,
}

impl ContextTable {
    pub fn new(capacity: usize) -> Self {
        ContextTable {
            slots: vec![None; capacity],
            context_changed: false,
        }
    }

    pub fn changed(&self) -> bool {
        self.context_changed
    }

    pub fn clear_changed(&mut self) {
        self.context_changed = false;
    }

    pub fn lookup_by_id(&self, id: u8) -> Option<&ContextEntry> {
        self.slots
            .get(id as usize)
            .and_then(|s| s.as_ref())
    }

    pub fn lookup_by_prefix(&self, prefix: &Ipv6Addr, prefix_len_bits: u8) -> Option<&ContextEntry> {
        self.slots
            .iter()
            .flatten()
            .find(|e| e.prefix_len_bits == prefix_len_bits && prefix_equal(&e.prefix, prefix, prefix_len_bits))
    }

    /// Every context currently eligible to be advertised in a 6CO: per
    /// SPEC_FULL.md §4.6.4, `InUseUncompressOnly` and `InUseCompress` only —
    /// `Expired` contexts are excluded even though the original source's loop
    /// condition (`state != NOT_IN_USE`) would include them.
    pub fn active_contexts(&self) -> impl Iterator<Item = &ContextEntry> {
        self.slots.iter().flatten().filter(|e| {
            matches!(e.state, ContextState::InUseUncompressOnly | ContextState::InUseCompress)
        })
    }

    /// Handle a PIO observation from an RA: create a fresh context for an
    /// unseen prefix, or refresh/revive an existing one.
    pub fn observe_prefix(&mut self, prefix: Ipv6Addr, prefix_len_bits: u8, now: GwInstant, cfg: &Config) -> CreateOutcome {
        if let Some(idx) = self.slots.iter().position(|s| {
            s.as_ref()
                .is_some_and(|e| e.prefix_len_bits == prefix_len_bits && prefix_equal(&e.prefix, &prefix, prefix_len_bits))
        }) {
            let entry = self.slots[idx].as_mut().unwrap();
            return match entry.state {
                ContextState::InUseCompress => {
                    entry.vlifetime_deadline = now.checked_add(cfg.context_lifetime());
                    CreateOutcome::RefreshedNoAnnounce
                }
                ContextState::Expired => {
                    entry.state = ContextState::InUseCompress;
                    entry.vlifetime_deadline = now.checked_add(cfg.context_lifetime());
                    self.context_changed = true;
                    CreateOutcome::RefreshedAnnounce
                }
                ContextState::InUseUncompressOnly | ContextState::NotInUse => CreateOutcome::RefreshedNoAnnounce,
            };
        }

        let free = self.slots.iter().position(|s| s.is_none());
        match free {
            Some(idx) => {
                self.slots[idx] = Some(ContextEntry {
                    prefix,
                    prefix_len_bits,
                    context_id: idx as u8,
                    state: ContextState::InUseUncompressOnly,
                    vlifetime_deadline: now.checked_add(cfg.initial_context_lifetime()),
                });
                self.context_changed = true;
                tracing::debug!(context_id = idx, prefix_len_bits, "context: created");
                CreateOutcome::Created
            }
            None => {
                tracing::warn!("context table full; dropping PIO");
                CreateOutcome::TableFull
            }
        }
    }

    /// Advance every context's lifecycle timer. Called once per periodic tick.
    pub fn periodic(&mut self, now: GwInstant, cfg: &Config) {
        for slot in self.slots.iter_mut() {
            let Some(entry) = slot else { continue };
            if !now.has_elapsed(entry.vlifetime_deadline) {
                continue;
            }
            match entry.state {
                ContextState::InUseUncompressOnly => {
                    entry.state = ContextState::InUseCompress;
                    entry.vlifetime_deadline = now.checked_add(cfg.context_lifetime());
                    self.context_changed = true;
                    tracing::debug!(context_id = entry.context_id, "context: promoted to compress");
                }
                ContextState::InUseCompress => {
                    entry.state = ContextState::Expired;
                    let reuse_delay = cfg.context_lifetime().max(cfg.min_context_change_delay());
                    entry.vlifetime_deadline = now.checked_add(reuse_delay);
                    self.context_changed = true;
                    tracing::debug!(context_id = entry.context_id, "context: expired");
                }
                ContextState::Expired => {
                    tracing::debug!(context_id = entry.context_id, "context: reclaimed");
                    *slot = None;
                }
                ContextState::NotInUse => {}
            }
        }
    }
}

fn prefix_equal(a: &Ipv6Addr, b: &Ipv6Addr, prefix_len_bits: u8) -> bool {
    let full_bytes = (prefix_len_bits / 8) as usize;
    let rem_bits = prefix_len_bits % 8;
    let ab = a.as_bytes();
    let bb = b.as_bytes();
    if ab[..full_bytes] != bb[..full_bytes] {
        return false;
    }
    if rem_bits == 0 {
        return true;
    }
    let mask = 0xffu8 << (8 - rem_bits);
    (ab[full_bytes] & mask) == (bb[full_bytes] & mask)
}
