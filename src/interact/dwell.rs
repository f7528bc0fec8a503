//! Dwell Interaction Protocol
//!
//! Negotiates a one-to-one timed interaction between a detecting session and
//! a target: sustained focus on a target accumulates dwell time; reaching
//! the required duration completes the interaction and surfaces a discrete
//! event. The session re-evaluates its candidate once per control step and
//! resets timing whenever the candidate changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::interact::detect::{Ray, RayHit, TargetDetector, TargetId};

/// Stable handle to a dwell session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u32);

/// Notifications surfaced by dwell evaluation. The caller dispatches.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum DwellEvent {
    /// Session stopped focusing a target (always succeeds).
    Exited {
        /// Session that exited.
        session: SessionId,
        /// Target that was exited.
        target: TargetId,
    },
    /// Session took ownership of a target.
    Entered {
        /// Session that entered.
        session: SessionId,
        /// Target that was entered.
        target: TargetId,
    },
    /// Sustained focus reached the required duration.
    Completed {
        /// Owning session.
        session: SessionId,
        /// Completed target.
        target: TargetId,
    },
}

/// Per-target dwell state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DwellTarget {
    /// Handle of this target.
    pub id: TargetId,
    /// Session currently owning this target, if any.
    owner: Option<SessionId>,
    /// Accumulated dwell time in seconds. Resets whenever ownership lapses.
    elapsed: f32,
    /// Required dwell duration in seconds.
    required: f32,
}

impl DwellTarget {
    /// Completion percentage, 0–100.
    pub fn completion_percent(&self) -> f32 {
        if self.required <= 0.0 {
            return 100.0;
        }
        (self.elapsed / self.required * 100.0).clamp(0.0, 100.0)
    }

    /// Owning session, if any.
    #[inline]
    pub fn owner(&self) -> Option<SessionId> {
        self.owner
    }
}

/// Registry of all interactive targets.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TargetRegistry {
    targets: BTreeMap<TargetId, DwellTarget>,
    next_id: u32,
}

impl TargetRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target with the given required dwell duration.
    pub fn insert(&mut self, required: f32) -> TargetId {
        let id = TargetId(self.next_id);
        self.next_id += 1;
        self.targets.insert(
            id,
            DwellTarget {
                id,
                owner: None,
                elapsed: 0.0,
                required,
            },
        );
        id
    }

    /// Deregister a target. Sessions holding it observe the removal on
    /// their next step and drop it.
    pub fn remove(&mut self, id: TargetId) {
        self.targets.remove(&id);
    }

    /// Look up a target.
    pub fn get(&self, id: TargetId) -> Option<&DwellTarget> {
        self.targets.get(&id)
    }

    /// Session owning a target, if any.
    pub fn owner_of(&self, id: TargetId) -> Option<SessionId> {
        self.targets.get(&id).and_then(|t| t.owner)
    }

    fn release(&mut self, id: TargetId, session: SessionId) {
        if let Some(target) = self.targets.get_mut(&id) {
            if target.owner == Some(session) {
                target.owner = None;
                target.elapsed = 0.0;
            }
        }
    }

    fn try_acquire(&mut self, id: TargetId, session: SessionId) -> bool {
        match self.targets.get_mut(&id) {
            Some(target) if target.owner.is_none() => {
                target.owner = Some(session);
                target.elapsed = 0.0;
                true
            }
            _ => false,
        }
    }
}

/// A dwell session: one detector owner negotiating with the registry.
pub struct DwellSession {
    /// Handle of this session.
    pub id: SessionId,
    detector: Box<dyn TargetDetector>,
    current: Option<TargetId>,
    previous: Option<TargetId>,
    can_interact: bool,
    last_distance: Option<f32>,
}

impl DwellSession {
    /// Create a session with its detection strategy.
    pub fn new(id: SessionId, detector: Box<dyn TargetDetector>) -> Self {
        Self {
            id,
            detector,
            current: None,
            previous: None,
            can_interact: true,
            last_distance: None,
        }
    }

    /// Currently entered target, if any.
    #[inline]
    pub fn current(&self) -> Option<TargetId> {
        self.current
    }

    /// Target entered before the current one, if any.
    #[inline]
    pub fn previous(&self) -> Option<TargetId> {
        self.previous
    }

    /// Distance of the last detected hit, for visual feedback only.
    #[inline]
    pub fn last_distance(&self) -> Option<f32> {
        self.last_distance
    }

    /// Completion percentage of the current target, 0–100.
    pub fn completion_percent(&self, registry: &TargetRegistry) -> f32 {
        self.current
            .and_then(|t| registry.get(t))
            .map(|t| t.completion_percent())
            .unwrap_or(0.0)
    }

    /// Enable or disable interaction.
    ///
    /// Disabling must exit any entered target, otherwise the target would
    /// stay "entered, never exited" and deadlock against other sessions.
    pub fn set_can_interact(
        &mut self,
        registry: &mut TargetRegistry,
        enabled: bool,
    ) -> Vec<DwellEvent> {
        self.can_interact = enabled;
        if enabled {
            Vec::new()
        } else {
            self.force_exit(registry)
        }
    }

    /// Exit the current target unconditionally. Called on disable and on
    /// session teardown.
    pub fn force_exit(&mut self, registry: &mut TargetRegistry) -> Vec<DwellEvent> {
        let Some(target) = self.current.take() else {
            return Vec::new();
        };
        registry.release(target, self.id);
        self.previous = Some(target);
        vec![DwellEvent::Exited {
            session: self.id,
            target,
        }]
    }

    /// Complete a target out-of-band (e.g. a trigger press), bypassing the
    /// timer. Gated by identity equality with the current target, never by
    /// proximity: completing a target this session does not own is a silent
    /// stale-state no-op.
    pub fn force_complete(
        &mut self,
        registry: &mut TargetRegistry,
        target: TargetId,
    ) -> Option<DwellEvent> {
        if self.current != Some(target) {
            debug!(session = ?self.id, ?target, "stale manual completion ignored");
            return None;
        }
        if let Some(t) = registry.targets.get_mut(&target) {
            t.elapsed = 0.0;
        }
        Some(DwellEvent::Completed {
            session: self.id,
            target,
        })
    }

    /// Evaluate one control step: re-detect the candidate, renegotiate
    /// enter/exit, accumulate dwell time, and surface completion.
    pub fn step(
        &mut self,
        registry: &mut TargetRegistry,
        ray: Ray,
        dt: f32,
    ) -> Vec<DwellEvent> {
        if !self.can_interact {
            return self.force_exit(registry);
        }

        let mut events = Vec::new();

        // Re-detect; a hit on a deregistered target counts as no candidate.
        let hit: Option<RayHit> = self
            .detector
            .detect(ray)
            .filter(|h| registry.targets.contains_key(&h.target));
        self.last_distance = hit.map(|h| h.distance);
        let candidate = hit.map(|h| h.target);

        // The current target may have been deregistered under us.
        if let Some(current) = self.current {
            if !registry.targets.contains_key(&current) {
                self.current = None;
                self.previous = Some(current);
                events.push(DwellEvent::Exited {
                    session: self.id,
                    target: current,
                });
            }
        }

        // Candidate change: exit the old target, then attempt to enter the
        // new one. Entering fails silently if another session owns it; this
        // session then holds no target and retries on later steps.
        if candidate != self.current {
            events.extend(self.force_exit(registry));
            if let Some(target) = candidate {
                if registry.try_acquire(target, self.id) {
                    self.current = Some(target);
                    events.push(DwellEvent::Entered {
                        session: self.id,
                        target,
                    });
                }
            }
        }

        // Accumulate dwell on the owned target; completion is only signaled
        // while the completing target is still current, which it is here by
        // construction.
        if let Some(current) = self.current {
            if let Some(target) = registry.targets.get_mut(&current) {
                target.elapsed += dt;
                if target.elapsed >= target.required {
                    target.elapsed = 0.0;
                    events.push(DwellEvent::Completed {
                        session: self.id,
                        target: current,
                    });
                }
            }
        }

        events
    }
}

impl std::fmt::Debug for DwellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DwellSession")
            .field("id", &self.id)
            .field("current", &self.current)
            .field("previous", &self.previous)
            .field("can_interact", &self.can_interact)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================
