//! Grammar of the intermediary's game text.
//!
//! Each message class the bot reacts to has one pattern here with named
//! captures, and one function that turns a payload into a typed value. The
//! rest of the crate never matches game text with ad hoc string slicing
//! beyond plain `contains` dispatch.
//!
//! ```text
//! roster entry   = slot "-" name "[" id "]" "(" pos "m)" "(L" level ["(" n ")"] ")"
//! combatant      = slot "-" name                 ; enemies carry [id], party members {shard}
//! attack line    = combatant " attacks " combatant ... ("killed them" | cur "/" max "HP left")
//! movement       = (combatant " moves" | "You move") ... "position " pos "m"
//! spell          = combatant " casts a " ["level " n " "] spell " on " combatant ["," ... "+" gain "HP"]
//! remaining      = [m "m"] [s "s"] " remaining"
//! eta            = "ETA: " [m "m"] [s "s"]
//! reading        = "You are " ("inside" | "outside") " " location
//! inventory page = "Your Inventory page " n "/" m ": " entry {", " entry}
//! entry          = idx "-" item ["(" qty ")"]
//! ```

use std::sync::LazyLock;

use regex_lite::{Captures, Regex};

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("grammar patterns are valid")
}

const NUM: &str = r"-?\d+(?:\.\d+)?";

static ROSTER_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"(?P<slot>\d+)-(?P<name>[^\s,\[\]]+)\[(?P<id>\d+)\]\((?P<pos>{NUM})m\)\(L(?P<level>\d+)(?:\((?P<effective>\d+)\))?\)"
    ))
});

static ATTACK: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"^(?P<aslot>\d+)-(?P<aname>[^\s,]+) attacks (?P<vslot>\d+)-(?P<vname>[^\s,]+)(?P<rest>.*)$")
});

static HP_LEFT: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"(?P<hp>{NUM})/(?P<max>{NUM})HP left")));

static NUYEN: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"(?P<nuyen>{NUM})\s*(?:\$|nuyen)")));

static XP: LazyLock<Regex> = LazyLock::new(|| compile(&format!(r"(?P<xp>{NUM})\s*XP")));

static ENEMY_MOVE: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"^(?P<slot>\d+)-(?P<name>[^\s,]+) moves .*?position (?P<pos>{NUM})\s*m"
    ))
});

static SELF_MOVE: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"^You move .*?position (?P<pos>{NUM})\s*m")));

static SPELL: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"^(?P<cslot>\d+)-(?P<caster>[^\s,]+) casts a (?:level \d+ )?(?P<spell>[A-Za-z_]+) on (?P<tslot>\d+)-(?P<target>[^\s,]+),?(?:.*?\+(?P<gain>{NUM})HP)?"
    ))
});

static REMAINING: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?:(?P<m>\d+)m\s*)?(?:(?P<s>\d+)s\s*)?remaining"));

static ETA: LazyLock<Regex> =
    LazyLock::new(|| compile(r"ETA:\s*(?:(?P<m>\d+)m)?\s*(?:(?P<s>\d+)s)?"));

static PAGE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| compile(r"page (?P<page>\d+)/(?P<pages>\d+)"));

static INVENTORY_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?P<idx>\d+)-(?P<name>[^,(]+?)(?:\((?P<qty>\d+)\))?\s*(?:,|$)")
});

static ITEM_GAIN: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"^You (?:received|looted|found) (?:(?P<count>\d+)x\s*)?(?P<item>[A-Za-z][\w']*)")
});

fn num<T: std::str::FromStr>(caps: &Captures<'_>, name: &str) -> Option<T> {
    caps.name(name).and_then(|m| m.as_str().parse().ok())
}

fn text(caps: &Captures<'_>, name: &str) -> String {
    caps.name(name).map(|m| m.as_str().to_string()).unwrap_or_default()
}

// --- Roster ---

/// One enemy in a combat episode.
#[derive(Debug, Clone, PartialEq)]
pub struct Enemy {
    pub slot: u32,
    /// Name without the `[id]` suffix.
    pub name: String,
    pub id: u64,
    /// Signed distance from the centre of the battlefield, in metres.
    pub position: f64,
    pub level: u32,
}

impl Enemy {
    pub fn is_drone(&self) -> bool {
        self.name.contains("Drone")
    }
}

/// Parse every roster entry in `text`, in order.
pub fn parse_roster(line: &str) -> Vec<Enemy> {
    ROSTER_ENTRY
        .captures_iter(line)
        .filter_map(|caps| {
            Some(Enemy {
                slot: num(&caps, "slot")?,
                name: text(&caps, "name"),
                id: num(&caps, "id")?,
                position: num(&caps, "pos")?,
                level: num(&caps, "level")?,
            })
        })
        .collect()
}

/// The comma-separated crowd of a `You meet ...` greeting.
pub fn meet_entries(payload: &str) -> Vec<&str> {
    let Some(start) = payload.find("You meet ") else {
        return Vec::new();
    };
    payload[start + "You meet ".len()..]
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect()
}

// --- Attacks ---

/// A participant named in an attack line, e.g. `2-Killer[8023221]` or
/// `1-shadowbot{2}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combatant {
    pub slot: u32,
    /// The name as printed, tag included.
    pub name: String,
}

impl Combatant {
    /// Enemies carry a numeric `[id]`.
    pub fn is_enemy(&self) -> bool {
        self.name.contains('[')
    }

    /// Party members carry a `{shard}` tag.
    pub fn is_party(&self) -> bool {
        self.name.contains('{')
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttackOutcome {
    Killed { nuyen: f64, xp: f64 },
    Damaged { hp: f64, max_hp: f64 },
    Missed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attack {
    pub attacker: Combatant,
    pub victim: Combatant,
    pub outcome: AttackOutcome,
}

impl Attack {
    /// Remaining health of the victim as a fraction of maximum.
    pub fn health_fraction(&self) -> Option<f64> {
        match self.outcome {
            AttackOutcome::Damaged { hp, max_hp } if max_hp > 0.0 => Some(hp / max_hp),
            _ => None,
        }
    }
}

pub fn parse_attack(payload: &str) -> Option<Attack> {
    let caps = ATTACK.captures(payload)?;
    let rest = caps.name("rest").map_or("", |m| m.as_str());

    let outcome = if rest.contains("killed them") {
        AttackOutcome::Killed {
            nuyen: NUYEN
                .captures(rest)
                .and_then(|c| num(&c, "nuyen"))
                .unwrap_or(0.0),
            xp: XP.captures(rest).and_then(|c| num(&c, "xp")).unwrap_or(0.0),
        }
    } else if let Some(hp) = HP_LEFT.captures(rest) {
        AttackOutcome::Damaged {
            hp: num(&hp, "hp")?,
            max_hp: num(&hp, "max")?,
        }
    } else {
        AttackOutcome::Missed
    };

    Some(Attack {
        attacker: Combatant {
            slot: num(&caps, "aslot")?,
            name: text(&caps, "aname"),
        },
        victim: Combatant {
            slot: num(&caps, "vslot")?,
            name: text(&caps, "vname"),
        },
        outcome,
    })
}

// --- Movement ---

#[derive(Debug, Clone, PartialEq)]
pub enum Movement {
    /// We moved.
    Own { position: f64 },
    /// Someone else moved.
    Other {
        who: Combatant,
        position: f64,
    },
}

pub fn parse_movement(payload: &str) -> Option<Movement> {
    if let Some(caps) = SELF_MOVE.captures(payload) {
        return Some(Movement::Own {
            position: num(&caps, "pos")?,
        });
    }
    let caps = ENEMY_MOVE.captures(payload)?;
    Some(Movement::Other {
        who: Combatant {
            slot: num(&caps, "slot")?,
            name: text(&caps, "name"),
        },
        position: num(&caps, "pos")?,
    })
}

// --- Spells ---

#[derive(Debug, Clone, PartialEq)]
pub struct SpellCast {
    pub caster: Combatant,
    pub spell: String,
    pub target: Combatant,
    /// Health restored, when the line reports it.
    pub gain: Option<f64>,
}

impl SpellCast {
    /// A calm that healed nothing.
    pub fn is_ineffective_calm(&self) -> bool {
        self.spell == "calm" && self.gain.is_some_and(|g| g <= 0.0)
    }
}

pub fn parse_spell(payload: &str) -> Option<SpellCast> {
    let caps = SPELL.captures(payload)?;
    Some(SpellCast {
        caster: Combatant {
            slot: num(&caps, "cslot")?,
            name: text(&caps, "caster"),
        },
        spell: text(&caps, "spell"),
        target: Combatant {
            slot: num(&caps, "tslot")?,
            name: text(&caps, "target"),
        },
        gain: num(&caps, "gain"),
    })
}

// --- Timing ---

fn minutes_seconds(caps: &Captures<'_>) -> Option<u64> {
    let m: Option<u64> = num(caps, "m");
    let s: Option<u64> = num(caps, "s");
    if m.is_none() && s.is_none() {
        return None;
    }
    Some(m.unwrap_or(0) * 60 + s.unwrap_or(0))
}

/// Seconds from an `Xm Ys remaining` suffix.
pub fn parse_remaining(payload: &str) -> Option<u64> {
    REMAINING
        .captures_iter(payload)
        .find_map(|caps| minutes_seconds(&caps))
}

/// Seconds from an `ETA: Xm Ys` announcement.
pub fn parse_eta(payload: &str) -> Option<u64> {
    ETA.captures(payload).and_then(|caps| minutes_seconds(&caps))
}

// --- Location readings ---

/// What a `#party` status reply says about where we are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    Inside(String),
    Outside(String),
    Fighting,
    /// Going, exploring or travelling somewhere.
    Moving { remaining: Option<u64> },
}

pub fn parse_reading(payload: &str) -> Option<Reading> {
    let rest = payload.strip_prefix("You are ")?;
    let last_token = || {
        rest.split_whitespace()
            .last()
            .map(|t| t.trim_end_matches(['.', ',']).to_string())
    };

    if rest.starts_with("inside ") {
        return last_token().map(Reading::Inside);
    }
    if rest.starts_with("outside ") {
        return last_token().map(Reading::Outside);
    }
    if rest.starts_with("fighting") {
        return Some(Reading::Fighting);
    }
    Some(Reading::Moving {
        remaining: parse_remaining(payload),
    })
}

// --- Inventory ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    pub idx: u32,
    pub name: String,
    pub quantity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryPage {
    pub page: u32,
    pub pages: u32,
    pub items: Vec<InventoryItem>,
}

pub fn parse_inventory_page(payload: &str) -> Option<InventoryPage> {
    let header = PAGE_HEADER.captures(payload)?;
    let listing = payload
        .split_once(':')
        .map_or("", |(_, listing)| listing);

    let items = INVENTORY_ENTRY
        .captures_iter(listing)
        .filter_map(|caps| {
            Some(InventoryItem {
                idx: num(&caps, "idx")?,
                name: text(&caps, "name").trim().to_string(),
                quantity: num(&caps, "qty"),
            })
        })
        .collect();

    Some(InventoryPage {
        page: num(&header, "page")?,
        pages: num(&header, "pages")?,
        items,
    })
}

/// `(item, count)` from a loot notice such as `You received 2x Bacon`.
pub fn parse_item_gain(payload: &str) -> Option<(String, u32)> {
    let caps = ITEM_GAIN.captures(payload)?;
    Some((text(&caps, "item"), num(&caps, "count").unwrap_or(1)))
}
