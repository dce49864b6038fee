//! Behaviors — what one loop iteration does.

use shadowbot_core::{Behavior, Flow, ProtocolError};
use tracing::info;

use crate::bot::Bot;
use crate::grammar;
use crate::navigator::{Arrival, arrival_marker};

/// Where bacon is farmed.
const ORK_HQ: &str = "Redmond_OrkHQ";

/// Inside the OrkHQ: the FatOrk waits in the storage room.
const ORK_HQ_PATH: [&str; 2] = ["OrkHQ_StorageRoom", "Exit"];

/// What the game says when an exploration is over.
pub const EXPLORE_DONE: &str = "You explored";

impl Bot {
    /// Run one iteration of `behavior`. `iteration` starts at zero.
    pub async fn run_behavior(&mut self, behavior: Behavior, iteration: u64) -> Flow<()> {
        match behavior {
            Behavior::GetBacon => self.get_bacon(iteration).await,
            Behavior::Explore => self.explore(iteration).await,
            Behavior::Escort => self.escort_step(iteration).await,
        }
    }

    /// Kill the FatOrk in the OrkHQ storage room, which sometimes drops bacon.
    /// The OrkHQ has to be left and re-entered for the FatOrk to respawn.
    pub async fn get_bacon(&mut self, iteration: u64) -> Flow<()> {
        let mut entered = false;
        if iteration == 0 {
            entered = self.goto_location(ORK_HQ).await? == Arrival::Entered;
            if !self.still_selected(Behavior::GetBacon) {
                return Ok(());
            }
        }

        if !entered {
            self.command("#enter").await?;
        }
        self.await_response(&arrival_marker(ORK_HQ)).await?;
        self.walk_path(&ORK_HQ_PATH).await?;
        self.command("#leave").await?;
        self.await_response(&arrival_marker("Redmond")).await?;
        Ok(())
    }

    /// Explore the current city, flushing the inventory every so often.
    pub async fn explore(&mut self, iteration: u64) -> Flow<()> {
        if iteration == 0 {
            let start = self.settings.explore_start.clone();
            self.goto_location(&start).await?;
            if !self.still_selected(Behavior::Explore) {
                return Ok(());
            }
        }

        self.command("#explore").await?;
        let announcement = self.await_response("ETA").await?;
        let Some(secs) = grammar::parse_eta(&announcement) else {
            return Err(ProtocolError::Unparsable {
                kind: "explore ETA",
                line: announcement,
            }
            .into());
        };
        self.session.set_deadline(secs, "explore");
        let at = self.session.pending.as_ref().map(|d| d.at);
        let found = self.await_until(EXPLORE_DONE, at).await?;
        if !found.is_empty() {
            info!(result = %found, "Explored");
        }

        let every = u64::from(self.settings.flush_every);
        if every > 0 && (iteration + 1) % every == 0 {
            self.flush(self.settings.disposal).await?;
        }
        Ok(())
    }

    /// Whether the operator still wants `behavior` running.
    fn still_selected(&self, behavior: Behavior) -> bool {
        let current = self.control.signals.borrow().behavior;
        if current != Some(behavior) {
            info!(%behavior, "Selection changed during travel");
            return false;
        }
        true
    }
}
