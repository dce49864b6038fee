//! Inventory flusher — dispose of items until fewer than the retention
//! threshold are left.
//!
//! Pages are scanned from last to first and items from last to first, so the
//! indexes still to be visited never shift under a disposal.

use shadowbot_config::Disposal;
use shadowbot_core::{Flow, ProtocolError};
use tracing::{debug, info};

use crate::bot::Bot;
use crate::grammar::{self, InventoryItem, InventoryPage};

/// The line the game answers a disposal with.
pub fn confirmation(disposal: Disposal) -> &'static str {
    match disposal {
        Disposal::Sell => "You sold",
        Disposal::Push => "You pushed",
        Disposal::Drop => "You dropped",
    }
}

/// The command disposing of `item`.
pub fn disposal_command(disposal: Disposal, item: &InventoryItem) -> String {
    match item.quantity {
        Some(qty) => format!("#{} {} {qty}", disposal.verb(), item.idx),
        None => format!("#{} {}", disposal.verb(), item.idx),
    }
}

fn protected(name: &str, denylist: &[String]) -> bool {
    let name = name.to_ascii_lowercase();
    denylist
        .iter()
        .any(|d| name.contains(d.to_ascii_lowercase().as_str()))
}

impl Bot {
    /// Dispose of surplus items. Returns how many disposal commands were sent.
    pub async fn flush(&mut self, disposal: Disposal) -> Flow<u32> {
        let threshold = self.session.tunables.retention_threshold;
        if threshold <= 0 {
            return Ok(0);
        }

        self.command("#inventory").await?;
        let first = self.inventory_page("Your Inventory").await?;
        info!(pages = first.pages, threshold, verb = disposal.verb(), "Flushing inventory");

        let mut disposed = 0;
        for page in (1..=first.pages).rev() {
            let listing = if page == first.page {
                first.clone()
            } else {
                self.command(&format!("#inventory {page}")).await?;
                self.inventory_page(&format!("page {page}/")).await?
            };

            let Some(last) = listing.items.last() else {
                continue;
            };
            let mut count = last.idx as i32;

            for item in listing.items.iter().rev() {
                if count < threshold {
                    break;
                }
                if self.session.escorting() && self.session.escort.companion_ready {
                    info!(disposed, "Companion is ready, cutting the flush short");
                    self.session.escort.companion_ready = false;
                    return Ok(disposed);
                }
                if disposal == Disposal::Sell && protected(&item.name, &self.settings.sell_denylist)
                {
                    debug!(item = %item.name, "Not selling protected item");
                    continue;
                }

                self.command(&disposal_command(disposal, item)).await?;
                self.await_response(confirmation(disposal)).await?;
                count -= 1;
                disposed += 1;
            }

            if count < threshold {
                break;
            }
        }

        info!(disposed, "Inventory flushed");
        Ok(disposed)
    }

    async fn inventory_page(&mut self, expected: &str) -> Flow<InventoryPage> {
        let line = self.await_response(expected).await?;
        grammar::parse_inventory_page(&line).ok_or_else(|| {
            ProtocolError::Unparsable {
                kind: "inventory page",
                line,
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[test]
    fn command_carries_quantity() {
        let item = InventoryItem {
            idx: 12,
            name: "Bacon".into(),
            quantity: Some(3),
        };
        assert_eq!(disposal_command(Disposal::Push, &item), "#push 12 3");
        let item = InventoryItem {
            quantity: None,
            ..item
        };
        assert_eq!(disposal_command(Disposal::Drop, &item), "#drop 12");
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_threshold_is_a_no_op() {
        let (mut bot, log) = bot_with(lamb_script());
        assert_eq!(bot.flush(Disposal::Push).await.unwrap(), 0);
        assert!(log.lines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stops_below_threshold() {
        let (mut bot, log) = bot_with(
            lamb_script()
                .respond_to(
                    "#inventory",
                    LAMB,
                    &["Your Inventory page 1/2: 1-Knife, 2-Credstick, 3-Vest, 4-Cap, 5-Boots"],
                )
                .respond_to(
                    "#inventory 2",
                    LAMB,
                    &["Your Inventory page 2/2: 6-Pants, 7-Bacon(3), 8-Shirt"],
                )
                .always_respond_to("#push", LAMB, &["You pushed it into your bank."]),
        );
        bot.session.tunables.retention_threshold = 6;

        let disposed = bot.flush(Disposal::Push).await.unwrap();
        // 8 items, keep fewer than 6: dispose of 8, 7 and 6
        assert_eq!(disposed, 3);
        assert_eq!(
            log.privmsgs_to(LAMB),
            vec!["#inventory", "#inventory 2", "#push 8", "#push 7 3", "#push 6"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn protected_items_are_not_sold() {
        let (mut bot, log) = bot_with(
            lamb_script()
                .respond_to(
                    "#inventory",
                    LAMB,
                    &["Your Inventory page 1/1: 1-Knife, 2-Vest, 3-Stimpatch(2), 4-Bacon"],
                )
                .always_respond_to("#sell", LAMB, &["You sold it for 20$."]),
        );
        bot.session.tunables.retention_threshold = 3;

        let disposed = bot.flush(Disposal::Sell).await.unwrap();
        assert_eq!(disposed, 2);
        assert_eq!(
            log.privmsgs_to(LAMB),
            vec!["#inventory", "#sell 2", "#sell 1"]
        );
    }
}
