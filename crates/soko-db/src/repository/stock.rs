//! # Local Stock Mirror
//!
//! `product_id → remaining stock`, kept under [`STOCK_LEVELS_KEY`] so the
//! product grid shows correct levels between backend refreshes, including
//! after sales that are still waiting in the offline queue.

use std::collections::BTreeMap;

use soko_core::LineItem;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::kv::KvRepository;
use crate::STOCK_LEVELS_KEY;

type StockLevels = BTreeMap<String, i64>;

#[derive(Debug, Clone)]
pub struct StockRepository {
    kv: KvRepository,
}

impl StockRepository {
    pub(crate) fn new(kv: KvRepository) -> Self {
        StockRepository { kv }
    }

    /// Current mirrored level, if the product is tracked.
    pub async fn level(&self, product_id: &str) -> DbResult<Option<i64>> {
        Ok(self.all().await?.get(product_id).copied())
    }

    pub async fn all(&self) -> DbResult<StockLevels> {
        Ok(self.kv.get::<StockLevels>(STOCK_LEVELS_KEY).await?.unwrap_or_default())
    }

    /// Sets levels from a fresh product listing.
    pub async fn set_levels<I>(&self, levels: I) -> DbResult<()>
    where
        I: IntoIterator<Item = (String, i64)>,
    {
        let levels: Vec<(String, i64)> = levels.into_iter().collect();
        self.kv
            .update(STOCK_LEVELS_KEY, |stored: &mut StockLevels| {
                stored.extend(levels);
                Ok(())
            })
            .await
    }

    /// Decrements every sold line, flooring at zero.
    ///
    /// Products that were never mirrored start from the line's stock
    /// snapshot. Returns the new levels of the affected products.
    pub async fn decrement_for_sale(&self, items: &[LineItem]) -> DbResult<Vec<(String, i64)>> {
        let updated = self
            .kv
            .update(STOCK_LEVELS_KEY, |stored: &mut StockLevels| {
                let mut updated = Vec::with_capacity(items.len());
                for item in items {
                    let level = stored
                        .entry(item.product_id.clone())
                        .or_insert(item.stock_snapshot);
                    *level = (*level - item.quantity).max(0);
                    updated.push((item.product_id.clone(), *level));
                }
                Ok(updated)
            })
            .await?;

        debug!(lines = updated.len(), "Local stock decremented");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use soko_core::{Currency, Money};

    fn line(id: &str, qty: i64, snapshot: i64) -> LineItem {
        LineItem {
            product_id: id.into(),
            name: id.into(),
            unit_price: Money::from_minor(100),
            currency: Currency::new("RWF").unwrap(),
            quantity: qty,
            stock_snapshot: snapshot,
            category: None,
        }
    }

    async fn repo() -> StockRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().stock()
    }

    #[tokio::test]
    async fn test_decrement_tracked_product() {
        let repo = repo().await;
        repo.set_levels([("rice".to_string(), 20)]).await.unwrap();

        repo.decrement_for_sale(&[line("rice", 3, 20)]).await.unwrap();
        assert_eq!(repo.level("rice").await.unwrap(), Some(17));
    }

    #[tokio::test]
    async fn test_untracked_product_starts_from_snapshot() {
        let repo = repo().await;
        let updated = repo.decrement_for_sale(&[line("beans", 2, 5)]).await.unwrap();
        assert_eq!(updated, vec![("beans".to_string(), 3)]);
    }

    #[tokio::test]
    async fn test_level_never_negative() {
        let repo = repo().await;
        repo.set_levels([("salt".to_string(), 1)]).await.unwrap();
        repo.decrement_for_sale(&[line("salt", 4, 4)]).await.unwrap();
        assert_eq!(repo.level("salt").await.unwrap(), Some(0));
        assert_eq!(repo.level("sugar").await.unwrap(), None);
    }
}
