//! HP and energy records.
//!
//! Records are keyed by entity id and outlive the entity itself for players:
//! a reconnecting player picks up the HP and energy it left with. Only a world
//! reset (or an NPC dying) removes a record.

use std::collections::BTreeMap;

use rand::Rng;

use arena_shared::ServerEvent;

/// HP and energy of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct Vitals {
    pub hp: f64,
    pub max_hp: f64,
    pub energy: f64,
    pub max_energy: f64,
    /// Regeneration is suspended until this time
    pub blocked_until: Option<f64>,
    pub last_regen_time: f64,
}

/// Bounds of the lockout installed when energy runs dry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyLockout {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl EnergyLockout {
    /// Pick a lockout end in `[now + min, now + max)`
    pub fn sample<R: Rng + ?Sized>(&self, now: f64, rng: &mut R) -> f64 {
        now + rng.gen_range(self.min_secs..self.max_secs)
    }
}

impl Vitals {
    pub fn new(max_hp: f64, max_energy: f64, now: f64) -> Self {
        Self {
            hp: max_hp,
            max_hp,
            energy: max_energy,
            max_energy,
            blocked_until: None,
            last_regen_time: now,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0.0
    }

    pub fn health_fraction(&self) -> f64 {
        if self.max_hp > 0.0 { self.hp / self.max_hp } else { 0.0 }
    }

    /// Subtract `amount` (negative heals) and clamp to `[0, max_hp]`.
    /// Returns the HP actually removed.
    pub fn apply_damage(&mut self, amount: f64) -> f64 {
        let before = self.hp;
        self.hp = (self.hp - amount).clamp(0.0, self.max_hp);
        before - self.hp
    }

    /// Spend energy. Emptying a non-empty pool installs a lockout.
    /// Returns true when the pool was emptied by this call.
    pub fn spend_energy<R: Rng + ?Sized>(
        &mut self,
        amount: f64,
        now: f64,
        lockout: EnergyLockout,
        rng: &mut R,
    ) -> bool {
        let before = self.energy;
        self.energy = (self.energy - amount).clamp(0.0, self.max_energy);
        self.last_regen_time = now;
        if before > 0.0 && self.energy <= 0.0 {
            self.blocked_until = Some(lockout.sample(now, rng));
            true
        } else {
            false
        }
    }

    /// Whether regeneration is currently suspended
    pub fn is_locked_out(&self, now: f64) -> bool {
        self.blocked_until.map_or(false, |until| now < until)
    }

    /// Add one segment if the lockout is over and a full period has passed
    /// since the last one. Returns true when energy changed.
    pub fn regen_step(&mut self, now: f64, period: f64, segment: f64) -> bool {
        if self.energy >= self.max_energy {
            return false;
        }
        if self.is_locked_out(now) {
            return false;
        }
        if let Some(until) = self.blocked_until.take() {
            // The first segment after a lockout comes one period after it ends
            self.last_regen_time = until;
        }
        if now - self.last_regen_time < period {
            return false;
        }
        self.energy = (self.energy + segment).min(self.max_energy);
        self.last_regen_time = now;
        true
    }
}

/// All HP/energy records, keyed by entity id
#[derive(Debug, Clone, Default)]
pub struct VitalsStore {
    records: BTreeMap<String, Vitals>,
}

impl VitalsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Vitals> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Vitals> {
        self.records.get_mut(id)
    }

    /// Fetch a record, creating it with the given maxima if it does not exist
    pub fn ensure(&mut self, id: &str, max_hp: f64, max_energy: f64, now: f64) -> &mut Vitals {
        self.records
            .entry(id.to_string())
            .or_insert_with(|| Vitals::new(max_hp, max_energy, now))
    }

    pub fn insert(&mut self, id: String, vitals: Vitals) {
        self.records.insert(id, vitals);
    }

    pub fn remove(&mut self, id: &str) -> Option<Vitals> {
        self.records.remove(id)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vitals)> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Vitals)> {
        self.records.iter_mut()
    }

    /// `hp_sync` for one record
    pub fn hp_sync(&self, id: &str) -> Option<ServerEvent> {
        self.records.get(id).map(|v| ServerEvent::HpSync {
            id: id.to_string(),
            hp: v.hp,
            max_hp: v.max_hp,
        })
    }

    /// `energy_sync` for one record
    pub fn energy_sync(&self, id: &str) -> Option<ServerEvent> {
        self.records.get(id).map(|v| ServerEvent::EnergySync {
            id: id.to_string(),
            energy: v.energy,
            max_energy: v.max_energy,
            blocked_until: v.blocked_until,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const LOCKOUT: EnergyLockout = EnergyLockout { min_secs: 5.0, max_secs: 30.0 };

    #[test]
    fn test_damage_clamps_to_range() {
        let mut v = Vitals::new(100.0, 100.0, 0.0);
        assert_eq!(v.apply_damage(30.0), 30.0);
        assert_eq!(v.hp, 70.0);
        assert_eq!(v.apply_damage(500.0), 70.0);
        assert_eq!(v.hp, 0.0);
        assert!(!v.is_alive());
        // Healing past max is clamped too
        assert_eq!(v.apply_damage(-250.0), -100.0);
        assert_eq!(v.hp, 100.0);
    }

    #[test]
    fn test_emptying_energy_installs_lockout_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for i in 0..200 {
            let now = i as f64 * 3.25;
            let mut v = Vitals::new(100.0, 100.0, 0.0);
            assert!(v.spend_energy(100.0, now, LOCKOUT, &mut rng));
            let until = v.blocked_until.unwrap();
            assert!(until >= now + 5.0 && until < now + 30.0, "lockout {} at {}", until, now);
        }
    }

    #[test]
    fn test_spending_from_empty_does_not_reroll() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut v = Vitals::new(100.0, 100.0, 0.0);
        assert!(v.spend_energy(150.0, 1.0, LOCKOUT, &mut rng));
        let until = v.blocked_until;
        assert!(!v.spend_energy(10.0, 2.0, LOCKOUT, &mut rng));
        assert_eq!(v.blocked_until, until);
    }

    #[test]
    fn test_partial_spend_has_no_lockout() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut v = Vitals::new(100.0, 100.0, 0.0);
        assert!(!v.spend_energy(40.0, 1.0, LOCKOUT, &mut rng));
        assert_eq!(v.energy, 60.0);
        assert_eq!(v.blocked_until, None);
    }

    #[test]
    fn test_no_regen_during_lockout() {
        let mut v = Vitals::new(100.0, 100.0, 0.0);
        v.energy = 0.0;
        v.blocked_until = Some(12.0);
        let mut t = 0.0;
        while t < 12.0 {
            assert!(!v.regen_step(t, 1.0, 10.0));
            assert_eq!(v.energy, 0.0);
            t += 0.25;
        }
        // Lockout over, but a full period must pass after it
        assert!(!v.regen_step(12.5, 1.0, 10.0));
        assert_eq!(v.blocked_until, None);
        assert!(v.regen_step(13.0, 1.0, 10.0));
        assert_eq!(v.energy, 10.0);
    }

    #[test]
    fn test_regen_segments_and_cap() {
        let mut v = Vitals::new(100.0, 100.0, 0.0);
        v.energy = 85.0;
        assert!(!v.regen_step(0.5, 1.0, 10.0));
        assert!(v.regen_step(1.0, 1.0, 10.0));
        assert_eq!(v.energy, 95.0);
        assert!(!v.regen_step(1.5, 1.0, 10.0));
        assert!(v.regen_step(2.0, 1.0, 10.0));
        assert_eq!(v.energy, 100.0);
        assert!(!v.regen_step(5.0, 1.0, 10.0));
    }

    #[test]
    fn test_store_ensure_keeps_existing_record() {
        let mut store = VitalsStore::new();
        store.ensure("p1", 100.0, 100.0, 0.0).hp = 40.0;
        assert_eq!(store.ensure("p1", 100.0, 100.0, 5.0).hp, 40.0);
        assert_eq!(
            store.hp_sync("p1"),
            Some(ServerEvent::HpSync { id: "p1".into(), hp: 40.0, max_hp: 100.0 })
        );
        assert!(store.energy_sync("nobody").is_none());
    }
}
