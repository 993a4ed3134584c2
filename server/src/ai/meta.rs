//! Per-NPC AI bookkeeping.

use arena_shared::{AiState, Cell, ServerEvent};

/// A swing that has been announced but not yet resolved
#[derive(Debug, Clone, PartialEq)]
pub struct Windup {
    pub attack_id: String,
    pub target: String,
    /// The hit resolves at this time unless a client asks first
    pub resolves_at: f64,
}

/// State-specific data for each FSM state
#[derive(Debug, Clone, PartialEq)]
pub enum Behavior {
    Idle,
    Patrol,
    Chase,
    Attack { windup: Option<Windup> },
    Retreat,
    Search,
}

impl Behavior {
    pub fn state(&self) -> AiState {
        match self {
            Behavior::Idle => AiState::Idle,
            Behavior::Patrol => AiState::Patrol,
            Behavior::Chase => AiState::Chase,
            Behavior::Attack { .. } => AiState::Attack,
            Behavior::Retreat => AiState::Retreat,
            Behavior::Search => AiState::Search,
        }
    }
}

/// Where a lost target was last seen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Memory {
    pub cell: Cell,
    pub seen_at: f64,
}

/// Progress along the patrol route
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PatrolProgress {
    pub index: usize,
    /// Dwelling at the current waypoint until this time
    pub wait_until: Option<f64>,
    /// A one-shot route has been walked to the end
    pub done: bool,
}

/// AI header shared by every FSM state
#[derive(Debug, Clone, PartialEq)]
pub struct NpcMeta {
    pub behavior: Behavior,
    pub state_entered_at: f64,
    pub target: Option<String>,
    pub last_attack_at: Option<f64>,
    pub last_move_at: Option<f64>,
    pub memory: Option<Memory>,
    /// The retreat roll for the current low-health episode has been made
    pub retreat_spent: bool,
    pub patrol: PatrolProgress,
    /// Last `npc_state` sent, for delta suppression
    pub last_broadcast: Option<ServerEvent>,
    attack_seq: u64,
}

impl NpcMeta {
    /// Fresh AI state for a newly spawned NPC
    pub fn spawned(now: f64) -> Self {
        Self {
            behavior: Behavior::Idle,
            state_entered_at: now,
            target: None,
            last_attack_at: None,
            last_move_at: None,
            memory: None,
            retreat_spent: false,
            patrol: PatrolProgress::default(),
            last_broadcast: None,
            attack_seq: 0,
        }
    }

    pub fn state(&self) -> AiState {
        self.behavior.state()
    }

    /// Switch FSM state. Re-entering the current state keeps its entry time.
    pub fn enter(&mut self, behavior: Behavior, now: f64) {
        if self.behavior.state() != behavior.state() {
            self.state_entered_at = now;
        }
        self.behavior = behavior;
    }

    pub fn time_in_state(&self, now: f64) -> f64 {
        now - self.state_entered_at
    }

    /// Time since the last step, or infinity if the NPC never moved
    pub fn since_move(&self, now: f64) -> f64 {
        self.last_move_at.map_or(f64::INFINITY, |t| now - t)
    }

    pub fn since_attack(&self, now: f64) -> f64 {
        self.last_attack_at.map_or(f64::INFINITY, |t| now - t)
    }

    /// Whether the last sighting is still worth searching
    pub fn memory_is_fresh(&self, now: f64, memory_secs: f64) -> bool {
        self.memory.map_or(false, |m| now - m.seen_at <= memory_secs)
    }

    pub fn pending_windup(&self) -> Option<&Windup> {
        match &self.behavior {
            Behavior::Attack { windup } => windup.as_ref(),
            _ => None,
        }
    }

    /// Open a wind-up against `target` and return its attack id
    pub fn begin_windup(&mut self, npc_id: &str, target: &str, now: f64, windup_secs: f64) -> String {
        self.attack_seq += 1;
        let attack_id = format!("{}-swing-{}", npc_id, self.attack_seq);
        self.enter(
            Behavior::Attack {
                windup: Some(Windup {
                    attack_id: attack_id.clone(),
                    target: target.to_string(),
                    resolves_at: now + windup_secs,
                }),
            },
            now,
        );
        self.last_attack_at = Some(now);
        attack_id
    }

    /// Take the wind-up if its window has closed
    pub fn take_due_windup(&mut self, now: f64) -> Option<Windup> {
        match &mut self.behavior {
            Behavior::Attack { windup } if windup.as_ref().map_or(false, |w| now >= w.resolves_at) => {
                windup.take()
            }
            _ => None,
        }
    }

    /// Take the wind-up early on a client's request, if it is still open and
    /// aimed at `target`
    pub fn take_requested_windup(&mut self, target: &str, now: f64) -> Option<Windup> {
        match &mut self.behavior {
            Behavior::Attack { windup }
                if windup.as_ref().map_or(false, |w| w.target == target && now <= w.resolves_at) =>
            {
                windup.take()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawned_defaults() {
        let meta = NpcMeta::spawned(3.0);
        assert_eq!(meta.state(), AiState::Idle);
        assert_eq!(meta.state_entered_at, 3.0);
        assert_eq!(meta.since_move(10.0), f64::INFINITY);
        assert!(meta.pending_windup().is_none());
    }

    #[test]
    fn test_enter_tracks_entry_time() {
        let mut meta = NpcMeta::spawned(0.0);
        meta.enter(Behavior::Chase, 2.0);
        meta.enter(Behavior::Chase, 5.0);
        assert_eq!(meta.state_entered_at, 2.0);
        assert_eq!(meta.time_in_state(6.0), 4.0);
    }

    #[test]
    fn test_windup_is_consumed_once() {
        let mut meta = NpcMeta::spawned(0.0);
        let id = meta.begin_windup("goblin-1", "p1", 1.0, 0.35);
        assert_eq!(id, "goblin-1-swing-1");
        assert_eq!(meta.last_attack_at, Some(1.0));

        assert!(meta.take_due_windup(1.2).is_none());
        assert!(meta.take_requested_windup("p2", 1.2).is_none());
        let w = meta.take_requested_windup("p1", 1.2).unwrap();
        assert_eq!(w.attack_id, id);
        assert!(meta.take_due_windup(2.0).is_none());
        assert_eq!(meta.state(), AiState::Attack);
    }

    #[test]
    fn test_due_windup_after_window() {
        let mut meta = NpcMeta::spawned(0.0);
        meta.begin_windup("wolf-1", "p1", 0.0, 0.35);
        assert!(meta.take_requested_windup("p1", 0.5).is_none());
        assert!(meta.take_due_windup(0.5).is_some());
    }
}
