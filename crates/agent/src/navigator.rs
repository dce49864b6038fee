//! Navigator — get from wherever we are to a named location.
//!
//! Locations are `City_Place` tokens. Within a city we walk; between cities
//! we take the subway, whose lines run Chicago - Delaware - Seattle - Redmond.

use chrono::Utc;
use shadowbot_core::{BotEvent, Flow, ProtocolError};
use tracing::{debug, info, warn};

use crate::bot::Bot;
use crate::grammar::{self, Reading};

/// Arrival markers for places whose arrival text is not `You arrive at <place>`.
const ARRIVALS: &[(&str, &str)] = &[
    ("Redmond", "You arrive at Redmond"),
    ("Redmond_Hotel", "You enter the Redmond Hotel"),
    ("Redmond_OrkHQ", "You enter the ork headquarters"),
    ("OrkHQ_StorageRoom", "You continue inside OrkHQ_StorageRoom"),
    ("Exit", "You can return to this location"),
    ("Subway", "You enter the Subway"),
];

/// The line the game prints when we reach `point`.
pub fn arrival_marker(point: &str) -> String {
    let lookup = |key: &str| {
        ARRIVALS
            .iter()
            .find(|(place, _)| *place == key)
            .map(|(_, marker)| marker.to_string())
    };
    lookup(point)
        .or_else(|| point.split_once('_').and_then(|(_, place)| lookup(place)))
        .unwrap_or_else(|| format!("You arrive at {point}"))
}

/// The city part of a `City_Place` token.
pub fn city_of(location: &str) -> Result<&str, ProtocolError> {
    match location.split_once('_') {
        Some((city, _)) if !city.is_empty() => Ok(city),
        _ => Err(ProtocolError::MissingCity(location.to_string())),
    }
}

/// Position of a city along the subway line.
pub fn city_rank(city: &str) -> u8 {
    match city {
        "Chicago" => 4,
        "Delaware" => 3,
        "Seattle" => 2,
        _ => 1,
    }
}

/// Which `#travel` line to take from `src` towards `dst`.
///
/// Redmond is the end of the line, so from there it is always line 1.
pub fn travel_line(src: &str, dst: &str) -> u8 {
    if src == "Redmond" || city_rank(src) > city_rank(dst) {
        1
    } else {
        2
    }
}

/// How travel to a target ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// We are at the target.
    Reached,
    /// We were outside the target and sent `#enter`; its reply is still
    /// pending.
    Entered,
}

/// Where a location poll left us.
enum Whereabouts {
    There(Arrival),
    At(String),
}

impl Bot {
    /// Travel to `target`, polling our location first.
    pub async fn goto_location(&mut self, target: &str) -> Flow<Arrival> {
        let attempts = self.settings.max_travel_attempts;
        for attempt in 1..=attempts {
            let here = match self.locate(target).await? {
                Whereabouts::There(arrival) => {
                    self.arrived(target);
                    return Ok(arrival);
                }
                Whereabouts::At(here) => here,
            };
            info!(%here, target, attempt, "Travelling");

            let src_city = city_of(&here)?.to_string();
            let dst_city = city_of(target)?.to_string();
            if src_city == dst_city {
                self.walk_path(&[target]).await?;
                self.arrived(target);
                return Ok(Arrival::Reached);
            }

            self.subway_hop(&here, &src_city, &dst_city).await?;
        }

        Err(ProtocolError::TravelGaveUp {
            target: target.to_string(),
            attempts,
        }
        .into())
    }

    /// Walk through `points` one after another, waiting for each arrival.
    pub async fn walk_path(&mut self, points: &[&str]) -> Flow<()> {
        debug!(?points, "Walking");
        for point in points {
            self.command(&format!("#goto {point}")).await?;
            self.await_response(&arrival_marker(point)).await?;
        }
        Ok(())
    }

    /// Poll `#party` until it tells us where we are.
    async fn locate(&mut self, target: &str) -> Flow<Whereabouts> {
        let mut stop_sent = false;
        let polls = self.settings.max_travel_attempts;

        for _ in 0..polls {
            self.command("#party").await?;
            let timeout = self.settings.response_timeout;

            loop {
                let Some(raw) = self.receive(timeout).await? else {
                    break;
                };
                let Some(payload) = self.intake(&raw).await? else {
                    continue;
                };

                match grammar::parse_reading(payload) {
                    Some(Reading::Inside(place)) if place == target => {
                        return Ok(Whereabouts::There(Arrival::Reached));
                    }
                    Some(Reading::Outside(place)) if place == target => {
                        self.command("#enter").await?;
                        return Ok(Whereabouts::There(Arrival::Entered));
                    }
                    Some(Reading::Inside(place)) | Some(Reading::Outside(place)) => {
                        return Ok(Whereabouts::At(place));
                    }
                    Some(Reading::Fighting) => {
                        self.fight(payload).await?;
                        stop_sent = false;
                        break;
                    }
                    Some(Reading::Moving { remaining }) if stop_sent => {
                        let wait = std::time::Duration::from_secs(remaining.unwrap_or(0))
                            + self.settings.subway_margin;
                        info!(secs = wait.as_secs(), "Could not stop, probably on the subway");
                        self.idle_for(wait).await?;
                        stop_sent = false;
                        break;
                    }
                    Some(Reading::Moving { .. }) => {
                        self.command("#stop").await?;
                        stop_sent = true;
                        break;
                    }
                    None => {
                        self.interleaved(payload).await?;
                    }
                }
            }
        }

        Err(ProtocolError::TravelGaveUp {
            target: target.to_string(),
            attempts: polls,
        }
        .into())
    }

    /// Ride the subway one hop towards `dst_city`.
    async fn subway_hop(&mut self, here: &str, src_city: &str, dst_city: &str) -> Flow<()> {
        if !here.contains("Subway") {
            let station = format!("{src_city}_Subway");
            self.walk_path(&[station.as_str()]).await?;
        }
        self.command("#enter").await?;

        let line = travel_line(src_city, dst_city);
        info!(from = src_city, to = dst_city, line, "Taking the subway");
        self.command(&format!("#travel {line}")).await?;

        let announcement = self.await_response("ETA").await?;
        let Some(secs) = grammar::parse_eta(&announcement) else {
            return Err(ProtocolError::Unparsable {
                kind: "subway ETA",
                line: announcement,
            }
            .into());
        };
        self.session.set_deadline(secs, format!("subway to {dst_city}"));
        let at = self.session.pending.as_ref().map(|d| d.at);

        let arrival = self.await_until("You arrive", at).await?;
        if arrival.is_empty() {
            warn!(to = dst_city, "No arrival announcement, polling location again");
        }
        Ok(())
    }

    fn arrived(&self, location: &str) {
        info!(location, "Arrived");
        self.publish(BotEvent::Arrived {
            location: location.to_string(),
            timestamp: Utc::now(),
        });
    }
}
