//! Combat engine.
//!
//! One episode runs from an encounter notice to the `You continue` line that
//! ends it: the roster is parsed (following trailing-comma continuations),
//! a first target is picked, and then every attack, movement and spell line is
//! folded into the [`Roster`] until the episode concludes.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use shadowbot_core::{BotEvent, Flow, Interrupt, TieBreak, Tunables};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::bot::Bot;
use crate::grammar::{self, Attack, AttackOutcome, Combatant, Enemy, Movement};

/// What to cast on a wounded party member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Care {
    Heal,
    Calm,
    Nothing,
}

/// Healing policy for a party member at `health` (fraction of max HP).
///
/// Below 30% always heals. Up to 50% always calms. Up to 80% calms, but at
/// most once per `cooldown`. Above that nothing is cast.
pub fn choose_care(health: f64, since_last_calm: Option<Duration>, cooldown: Duration) -> Care {
    if health < 0.3 {
        Care::Heal
    } else if health < 0.5 {
        Care::Calm
    } else if health < 0.8 {
        match since_last_calm {
            Some(elapsed) if elapsed < cooldown => Care::Nothing,
            _ => Care::Calm,
        }
    } else {
        Care::Nothing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetPolicy {
    /// Highest level first instead of lowest.
    pub inverse_priority: bool,
    pub tie_break: TieBreak,
}

impl From<&Tunables> for TargetPolicy {
    fn from(t: &Tunables) -> Self {
        Self {
            inverse_priority: t.inverse_priority,
            tie_break: t.tie_break,
        }
    }
}

/// The enemies of one combat episode and who we are shooting at.
#[derive(Debug, Clone)]
pub struct Roster {
    enemies: BTreeMap<u32, Enemy>,
    target: Option<u32>,
    own_position: f64,
    policy: TargetPolicy,
    kills: u32,
}

impl Roster {
    pub fn new(enemies: Vec<Enemy>, policy: TargetPolicy) -> Self {
        Self {
            enemies: enemies.into_iter().map(|e| (e.slot, e)).collect(),
            target: None,
            own_position: 0.0,
            policy,
            kills: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.enemies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enemies.is_empty()
    }

    pub fn target(&self) -> Option<u32> {
        self.target
    }

    pub fn get(&self, slot: u32) -> Option<&Enemy> {
        self.enemies.get(&slot)
    }

    /// Enemies removed by death notices so far.
    pub fn kills(&self) -> u32 {
        self.kills
    }

    fn distance(&self, enemy: &Enemy) -> f64 {
        match self.policy.tie_break {
            TieBreak::Absolute => enemy.position.abs(),
            TieBreak::Raw => enemy.position,
            TieBreak::FromSelf => (enemy.position - self.own_position).abs(),
        }
    }

    /// The preferred target among the current enemies.
    pub fn select(&self) -> Option<u32> {
        let by_distance = |a: &&Enemy, b: &&Enemy| {
            self.distance(a)
                .total_cmp(&self.distance(b))
                .then(a.slot.cmp(&b.slot))
        };

        if let Some(drone) = self
            .enemies
            .values()
            .filter(|e| e.is_drone())
            .min_by(by_distance)
        {
            return Some(drone.slot);
        }

        self.enemies
            .values()
            .min_by(|a, b| {
                let level = if self.policy.inverse_priority {
                    b.level.cmp(&a.level)
                } else {
                    a.level.cmp(&b.level)
                };
                level.then_with(|| by_distance(a, b))
            })
            .map(|e| e.slot)
    }

    /// Pick the first target. Returns the slot to name in an attack command,
    /// or `None` when the game targets the only enemy by itself.
    pub fn engage(&mut self) -> Option<u32> {
        self.target = self.select();
        self.target.filter(|_| self.enemies.len() > 1)
    }

    /// Pick a new target after a death. Returns the slot to attack when at
    /// least two enemies are left.
    pub fn retarget(&mut self) -> Option<u32> {
        self.target = self.select();
        self.target.filter(|_| self.enemies.len() >= 2)
    }

    /// Remove a dead enemy. Unknown slots are ignored.
    pub fn remove(&mut self, slot: u32) -> Option<Enemy> {
        let dead = self.enemies.remove(&slot)?;
        self.kills += 1;
        if self.target == Some(slot) {
            self.target = None;
        }
        Some(dead)
    }

    /// Track an enemy's new position, adding it if it was missed earlier.
    pub fn moved(&mut self, who: &Combatant, position: f64) {
        if let Some(enemy) = self.enemies.get_mut(&who.slot) {
            enemy.position = position;
            return;
        }
        let (name, id) = match who.name.split_once('[') {
            Some((name, rest)) => (name, rest.trim_end_matches(']').parse().unwrap_or(0)),
            None => (who.name.as_str(), 0),
        };
        self.enemies.insert(
            who.slot,
            Enemy {
                slot: who.slot,
                name: name.to_string(),
                id,
                position,
                level: 0,
            },
        );
    }

    pub fn set_own_position(&mut self, position: f64) {
        self.own_position = position;
    }
}

impl Bot {
    /// Run one combat episode triggered by `trigger` and return the line that
    /// concluded it.
    pub async fn fight(&mut self, trigger: &str) -> Flow<String> {
        let started = Instant::now();
        self.session.escort.in_combat = true;
        let result = self.engaged(trigger).await;
        self.session.escort.in_combat = false;

        let (line, kills) = result?;
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(kills, duration_ms, "Combat concluded");
        self.publish(BotEvent::CombatConcluded {
            kills,
            duration_ms,
            timestamp: Utc::now(),
        });

        if std::mem::take(&mut self.session.escort.deferred_stop) {
            return Err(Interrupt::EscortStop.into());
        }
        Ok(line)
    }

    async fn engaged(&mut self, trigger: &str) -> Flow<(String, u32)> {
        let timeout = self.settings.combat_timeout;

        // A roster ending in ',' continues on the next line; anything else
        // arriving there is a combat line and is handled once we engage.
        let mut roster_text = trigger.to_string();
        let mut early = None;
        while roster_text.trim_end().ends_with(',') {
            let Some(raw) = self.receive(timeout).await? else {
                break;
            };
            let Some(more) = self.intake(&raw).await? else {
                continue;
            };
            if grammar::parse_roster(more).is_empty() {
                early = Some(more.to_string());
                break;
            }
            roster_text.push(' ');
            roster_text.push_str(more);
        }

        let mut roster = Roster::new(
            grammar::parse_roster(&roster_text),
            TargetPolicy::from(&self.session.tunables),
        );
        info!(enemies = roster.len(), "Combat started");
        if let Some(slot) = roster.engage() {
            self.attack(slot).await?;
        }

        if let Some(line) = early {
            if let Some(end) = self.react(&mut roster, &line).await? {
                return Ok((end, roster.kills()));
            }
        }

        loop {
            let Some(raw) = self.receive(timeout).await? else {
                debug!("Combat quiet, probing");
                self.command("#party").await?;
                continue;
            };
            let Some(payload) = self.intake(&raw).await? else {
                continue;
            };
            if let Some(end) = self.react(&mut roster, payload).await? {
                return Ok((end, roster.kills()));
            }
        }
    }

    /// Handle one intermediary line while engaged. Returns the concluding
    /// line once combat is over.
    async fn react(&mut self, roster: &mut Roster, payload: &str) -> Flow<Option<String>> {
        if payload.contains("You continue") {
            self.note_timing(payload);
            return Ok(Some(payload.to_string()));
        }
        if payload.contains("You were killed") {
            return Err(Interrupt::PlayerDied.into());
        }
        self.combat_line(roster, payload).await?;
        Ok(None)
    }

    async fn combat_line(&mut self, roster: &mut Roster, payload: &str) -> Flow<()> {
        if let Some(movement) = grammar::parse_movement(payload) {
            match movement {
                Movement::Own { position } => roster.set_own_position(position),
                Movement::Other { who, position } if who.is_enemy() => {
                    roster.moved(&who, position)
                }
                Movement::Other { .. } => {}
            }
            return Ok(());
        }

        if let Some(attack) = grammar::parse_attack(payload) {
            return self.on_attack(roster, attack).await;
        }

        if let Some(spell) = grammar::parse_spell(payload) {
            if spell.is_ineffective_calm() && self.session.is_self(&spell.caster.name) {
                debug!(target = %spell.target.name, "Calm did nothing, healing instead");
                self.cast("heal", spell.target.slot).await?;
            }
            return Ok(());
        }

        if !self.note_timing(payload) {
            debug!(line = payload, "Combat line");
        }
        Ok(())
    }

    async fn on_attack(&mut self, roster: &mut Roster, attack: Attack) -> Flow<()> {
        match attack.outcome {
            AttackOutcome::Killed { nuyen, xp } => {
                if self.session.is_self(&attack.victim.name) {
                    return Err(Interrupt::PlayerDied.into());
                }
                if !attack.victim.is_enemy() {
                    info!(member = %attack.victim.name, "Party member down");
                    return Ok(());
                }

                let was_target = roster.target() == Some(attack.victim.slot);
                let Some(dead) = roster.remove(attack.victim.slot) else {
                    debug!(slot = attack.victim.slot, "Death of an enemy not in the roster");
                    return Ok(());
                };

                if self.session.is_self(&attack.attacker.name) {
                    self.credit_kill(nuyen, xp);
                } else if was_target {
                    debug!(by = %attack.attacker.name, "Our target was taken");
                }

                let quota = self.session.tunables.quest_quota;
                if quota > 0 && dead.name.contains(self.settings.quest_target.as_str()) {
                    self.session.tunables.quest_quota = quota - 1;
                    info!(left = quota - 1, "Quest kill");
                    self.publish(BotEvent::QuestKill {
                        target: dead.name.clone(),
                        remaining: quota - 1,
                        timestamp: Utc::now(),
                    });
                }

                if let Some(slot) = roster.retarget() {
                    self.attack(slot).await?;
                }
                Ok(())
            }
            AttackOutcome::Damaged { .. } => {
                let wounded_friend =
                    attack.victim.is_party() || self.session.is_self(&attack.victim.name);
                if !attack.attacker.is_enemy() || !wounded_friend {
                    return Ok(());
                }
                match attack.health_fraction() {
                    Some(health) => self.care_for(&attack.victim, health).await,
                    None => Ok(()),
                }
            }
            AttackOutcome::Missed => Ok(()),
        }
    }

    fn credit_kill(&mut self, nuyen: f64, xp: f64) {
        let loot = &mut self.session.loot;
        loot.kills += 1;
        loot.nuyen += nuyen;
        loot.xp += xp;
        if nuyen > 0.0 || xp > 0.0 {
            self.publish(BotEvent::LootGained {
                description: format!("{nuyen:.2} nuyen, {xp:.2} XP"),
                timestamp: Utc::now(),
            });
        }
    }

    async fn care_for(&mut self, member: &Combatant, health: f64) -> Flow<()> {
        if !self.session.tunables.can_cast {
            return Ok(());
        }
        let since = self.last_calm.map(|at| at.elapsed());
        match choose_care(health, since, self.settings.calm_cooldown) {
            Care::Heal => self.cast("heal", member.slot).await,
            Care::Calm => {
                self.last_calm = Some(Instant::now());
                self.cast("calm", member.slot).await
            }
            Care::Nothing => Ok(()),
        }
    }

    async fn attack(&mut self, slot: u32) -> Flow<()> {
        self.command(&format!("#attack {slot}")).await
    }

    async fn cast(&mut self, spell: &str, slot: u32) -> Flow<()> {
        self.command(&format!("#cast {spell} {slot}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    fn enemy(slot: u32, name: &str, position: f64, level: u32) -> Enemy {
        Enemy {
            slot,
            name: name.into(),
            id: 1000 + slot as u64,
            position,
            level,
        }
    }

    #[test]
    fn drone_preferred_regardless_of_level() {
        let roster = Roster::new(
            grammar::parse_roster("1-Killer[8023221](-8.0m)(L17(34)), 2-Drone[8023222](2.0m)(L5(6))"),
            TargetPolicy::default(),
        );
        assert_eq!(roster.select(), Some(2));

        let roster = Roster::new(
            vec![enemy(1, "Cop", 1.0, 1), enemy(2, "SecDrone", 9.0, 40)],
            TargetPolicy::default(),
        );
        assert_eq!(roster.select(), Some(2));
    }

    #[test]
    fn closest_drone_wins() {
        let roster = Roster::new(
            vec![enemy(1, "Drone", -6.0, 1), enemy(2, "Drone", 3.0, 1)],
            TargetPolicy::default(),
        );
        assert_eq!(roster.select(), Some(2));
    }

    #[test]
    fn lowest_level_then_distance() {
        let mut roster = Roster::new(
            vec![
                enemy(1, "Orc", 2.0, 10),
                enemy(2, "Troll", 1.0, 12),
                enemy(3, "Orc", -1.0, 10),
            ],
            TargetPolicy::default(),
        );
        assert_eq!(roster.select(), Some(3));

        roster.policy.inverse_priority = true;
        assert_eq!(roster.select(), Some(2));
    }

    #[test]
    fn tie_break_modes() {
        let enemies = vec![enemy(1, "Orc", -4.0, 5), enemy(2, "Orc", 3.0, 5)];
        let mut roster = Roster::new(enemies, TargetPolicy::default());
        assert_eq!(roster.select(), Some(2));

        roster.policy.tie_break = TieBreak::Raw;
        assert_eq!(roster.select(), Some(1));

        roster.policy.tie_break = TieBreak::FromSelf;
        roster.set_own_position(-5.0);
        assert_eq!(roster.select(), Some(1));
    }

    #[test]
    fn single_enemy_needs_no_command() {
        let mut roster = Roster::new(vec![enemy(1, "FatOrk", 4.0, 9)], TargetPolicy::default());
        assert_eq!(roster.engage(), None);
        assert_eq!(roster.target(), Some(1));
    }

    #[test]
    fn death_removes_exactly_one() {
        let mut roster = Roster::new(
            vec![enemy(1, "A", 1.0, 1), enemy(2, "B", 2.0, 2), enemy(3, "C", 3.0, 3)],
            TargetPolicy::default(),
        );
        roster.engage();
        assert!(roster.remove(1).is_some());
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.target(), None);
        assert_eq!(roster.retarget(), Some(2));

        assert!(roster.remove(9).is_none());
        assert_eq!(roster.len(), 2);

        roster.remove(2);
        assert_eq!(roster.retarget(), None);
        assert_eq!(roster.target(), Some(3));
    }

    #[test]
    fn movement_adds_missed_enemies() {
        let mut roster = Roster::new(vec![], TargetPolicy::default());
        roster.moved(
            &Combatant {
                slot: 4,
                name: "Lamer[555]".into(),
            },
            -2.0,
        );
        let e = roster.get(4).unwrap();
        assert_eq!(e.name, "Lamer");
        assert_eq!(e.id, 555);
        assert_eq!(e.position, -2.0);
    }

    #[test]
    fn healing_policy_is_monotonic() {
        let cooldown = Duration::from_secs(90);
        for h in [0.0, 0.1, 0.29] {
            assert_eq!(choose_care(h, None, cooldown), Care::Heal);
            assert_eq!(choose_care(h, Some(Duration::ZERO), cooldown), Care::Heal);
        }
        for h in [0.3, 0.4, 0.49] {
            assert_eq!(choose_care(h, Some(Duration::ZERO), cooldown), Care::Calm);
        }
        assert_eq!(choose_care(0.6, None, cooldown), Care::Calm);
        assert_eq!(choose_care(0.6, Some(Duration::from_secs(30)), cooldown), Care::Nothing);
        assert_eq!(choose_care(0.6, Some(Duration::from_secs(90)), cooldown), Care::Calm);
        assert_eq!(choose_care(0.8, None, cooldown), Care::Nothing);
    }

    #[tokio::test(start_paused = true)]
    async fn targeting_and_retargeting_commands() {
        let (mut bot, log) = bot_with(
            lamb_script()
                .says(LAMB, "3-Lamer[13](4.0m)(L2(3))")
                .says(LAMB, "1-shadowbot{2} attacks 2-Drone[12] with Pistol and killed them. Loot: 4$, 1.5XP")
                .says(LAMB, "2-friend{2} attacks 3-Lamer[13] with Fists and killed them")
                .says(LAMB, "You continue your journey. 2m 5s remaining."),
        );

        let line = bot
            .fight("You ENCOUNTER 1-Killer[11](-8.0m)(L17(34)), 2-Drone[12](2.0m)(L5(6)),")
            .await
            .unwrap();

        assert_eq!(line, "You continue your journey. 2m 5s remaining");
        // drone first, then the lowest level of the two survivors, then none
        assert_eq!(log.privmsgs_to(LAMB), vec!["#attack 2", "#attack 3"]);
        assert_eq!(bot.session.loot.kills, 1);
        assert_eq!(bot.session.loot.nuyen, 4.0);
        assert_eq!(bot.session.pending.as_ref().unwrap().remaining_secs(), 125);
        assert!(!bot.session.escort.in_combat);
    }

    #[tokio::test(start_paused = true)]
    async fn kill_after_an_open_roster_is_not_swallowed() {
        let (mut bot, log) = bot_with(
            lamb_script()
                .says(LAMB, "1-shadowbot{2} attacks 2-Drone[12] with Pistol and killed them. Loot: 4$")
                .says(LAMB, "You continue"),
        );

        bot.fight("You ENCOUNTER 1-Killer[11](-8.0m)(L17(34)), 2-Drone[12](2.0m)(L5(6)),")
            .await
            .unwrap();

        assert_eq!(log.privmsgs_to(LAMB), vec!["#attack 2"]);
        assert_eq!(bot.session.loot.kills, 1);
        assert_eq!(bot.session.loot.nuyen, 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_death_is_ignored() {
        let (mut bot, log) = bot_with(
            lamb_script()
                .says(LAMB, "1-shadowbot{2} attacks 7-Ghost[99] with Pistol and killed them")
                .says(LAMB, "You continue"),
        );
        bot.fight("You ENCOUNTER 1-Orc[1](1.0m)(L1), 2-Orc[2](2.0m)(L1)")
            .await
            .unwrap();
        assert_eq!(log.privmsgs_to(LAMB), vec!["#attack 1"]);
        assert_eq!(bot.session.loot.kills, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn heals_and_calms_wounded_members() {
        let (mut bot, log) = bot_with(
            lamb_script()
                .says(LAMB, "1-Orc[1] attacks 2-friend{2} with Axe and caused 5 damage, 2/10HP left")
                .says(LAMB, "1-Orc[1] attacks 1-shadowbot{2} with Axe and caused 2 damage, 6/10HP left")
                .says(LAMB, "1-shadowbot{2} casts a level 2 calm on 1-shadowbot{2}, +0HP")
                .says(LAMB, "1-Orc[1] attacks 1-shadowbot{2} with Axe and caused 0 damage, 6/10HP left")
                .says(LAMB, "You continue"),
        );
        bot.session.tunables.can_cast = true;
        bot.fight("You ENCOUNTER 1-Orc[1](1.0m)(L1)").await.unwrap();
        assert_eq!(
            log.privmsgs_to(LAMB),
            vec!["#cast heal 2", "#cast calm 1", "#cast heal 1"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_casting_without_ability() {
        let (mut bot, log) = bot_with(
            lamb_script()
                .says(LAMB, "1-Orc[1] attacks 2-friend{2} with Axe and caused 5 damage, 1/10HP left")
                .says(LAMB, "You continue"),
        );
        bot.fight("You ENCOUNTER 1-Orc[1](1.0m)(L1)").await.unwrap();
        assert!(log.privmsgs_to(LAMB).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn silence_probes_party_status() {
        let (mut bot, log) = bot_with(
            lamb_script()
                .step(Step::Silence)
                .says(LAMB, "You continue"),
        );
        bot.fight("You ENCOUNTER 1-Orc[1](1.0m)(L1)").await.unwrap();
        assert_eq!(log.privmsgs_to(LAMB), vec!["#party"]);
    }

    #[tokio::test(start_paused = true)]
    async fn own_death_is_fatal() {
        let (mut bot, _log) = bot_with(
            lamb_script().says(LAMB, "1-Orc[1] attacks 1-shadowbot{2} with Axe and killed them"),
        );
        let halt = bot
            .fight("You ENCOUNTER 1-Orc[1](1.0m)(L1)")
            .await
            .unwrap_err();
        assert_eq!(halt.interrupt(), Some(Interrupt::PlayerDied));
    }

    #[tokio::test(start_paused = true)]
    async fn quest_kills_count_down() {
        let (mut bot, _log) = bot_with(
            lamb_script()
                .says(LAMB, "1-shadowbot{2} attacks 1-Bum[1] with Fists and killed them")
                .says(LAMB, "You continue"),
        );
        bot.session.tunables.quest_quota = 2;
        bot.fight("You ENCOUNTER 1-Bum[1](1.0m)(L1)").await.unwrap();
        assert_eq!(bot.session.tunables.quest_quota, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn escort_stop_waits_for_combat_to_end() {
        let (mut bot, log) = escort_bot_with(
            lamb_script()
                .says(COMPANION, "stop")
                .says(LAMB, "You continue"),
        );
        let halt = bot
            .fight("You ENCOUNTER 1-Orc[1](1.0m)(L1)")
            .await
            .unwrap_err();
        assert_eq!(halt.interrupt(), Some(Interrupt::EscortStop));
        assert_eq!(log.privmsgs_to(COMPANION).len(), 1);
        assert!(!bot.session.escort.deferred_stop);
    }
}
