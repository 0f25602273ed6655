//! Catalog cache manager.
//!
//! Bulk listings are reconciled into the store as one transaction, and the
//! name-ordered listing is kept in memory for fast snapshot reads. Variant
//! lookups are served from the store and only fall back to the remote
//! source on a miss.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::CatalogError;
use crate::source::CatalogSource;
use crate::store::{CatalogStore, InsertOutcome, UpsertOutcome};
use crate::types::{Category, Item, RawItem, Variant};

/// Outcome counts of one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Reconciles remote listings into the store and serves cached reads.
pub struct CatalogCache {
    store: Arc<dyn CatalogStore>,
    source: Arc<dyn CatalogSource>,
    listing: RwLock<Arc<Vec<Item>>>,
}

impl CatalogCache {
    /// Creates the cache and loads the current listing from the store.
    pub fn new(
        store: Arc<dyn CatalogStore>,
        source: Arc<dyn CatalogSource>,
    ) -> Result<Self, CatalogError> {
        let listing = store.list_all()?;
        debug!(items = listing.len(), "loaded catalog listing");
        Ok(Self {
            store,
            source,
            listing: RwLock::new(Arc::new(listing)),
        })
    }

    /// Returns the in-memory listing, ordered by name.
    pub fn items(&self) -> Arc<Vec<Item>> {
        self.listing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Looks up a single item in the store.
    pub fn item(&self, id: &str) -> Result<Option<Item>, CatalogError> {
        self.store.get(id)
    }

    /// Re-reads the listing from the store.
    pub fn reload(&self) -> Result<(), CatalogError> {
        let listing = Arc::new(self.store.list_all()?);
        *self.listing.write().unwrap_or_else(PoisonError::into_inner) = listing;
        Ok(())
    }

    /// Applies a remote listing to the store.
    ///
    /// Records without an id, name or icon are skipped. Valid records are
    /// committed as one unit; on failure nothing is written and the
    /// in-memory listing is left as it was.
    pub fn reconcile(&self, raw: &[RawItem]) -> Result<ReconcileReport, CatalogError> {
        let now = Utc::now();
        let items: Vec<Item> = raw.iter().filter_map(|r| r.to_item(now)).collect();
        let skipped = raw.len() - items.len();

        let (added, updated) = self.store.upsert_batch(&items)?;
        self.reload()?;

        let report = ReconcileReport {
            added,
            updated,
            skipped,
        };
        info!(
            added = report.added,
            updated = report.updated,
            skipped = report.skipped,
            "catalog reconciled"
        );
        Ok(report)
    }

    /// Fetches the full remote listing and reconciles it.
    pub async fn refresh(&self) -> Result<ReconcileReport, CatalogError> {
        let raw = self.source.list_all().await?;
        debug!(records = raw.len(), "fetched remote listing");
        self.reconcile(&raw)
    }

    /// Returns the variants of an item, fetching and caching them on a miss.
    ///
    /// Remote failures yield an empty list.
    pub async fn resolve_variants(&self, item_id: &str) -> Vec<Variant> {
        match self.store.get_variants(item_id) {
            Ok(cached) if !cached.is_empty() => {
                debug!(item_id, count = cached.len(), "variant cache hit");
                return cached;
            }
            Ok(_) => {}
            Err(e) => warn!(item_id, error = %e, "failed to read cached variants"),
        }

        let channels = match self.source.variants(item_id).await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(item_id, error = %e, "variant lookup failed");
                return Vec::new();
            }
        };

        let fetched: Vec<Variant> = channels
            .into_iter()
            .flat_map(|channel| {
                let name = channel.channel;
                channel.options.into_iter().map(move |option| Variant {
                    item_id: item_id.to_string(),
                    channel: name.clone(),
                    tag: option.tag,
                    name: option.name,
                    image: option.image,
                })
            })
            .collect();

        let mut inserted = 0;
        for variant in &fetched {
            match self.store.insert_variant(variant) {
                Ok(InsertOutcome::Inserted) => inserted += 1,
                Ok(InsertOutcome::AlreadyPresent) => {}
                Err(e) => warn!(item_id, tag = %variant.tag, error = %e, "failed to cache variant"),
            }
        }
        debug!(item_id, fetched = fetched.len(), inserted, "variants fetched");

        fetched
    }

    /// Returns the stored item, creating a placeholder for an unknown id.
    pub fn ensure_item(&self, id: &str, category: Category) -> Result<Item, CatalogError> {
        if let Some(item) = self.store.get(id)? {
            return Ok(item);
        }

        let item = Item::placeholder(id, category);
        if self.store.upsert(&item)? == UpsertOutcome::Created {
            info!(id, %category, "created placeholder item");
            self.reload()?;
        }
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::SourceError;
    use crate::source::SourceFuture;
    use crate::store::SqliteCatalogStore;
    use crate::types::{DEFAULT_ICON, RawVariantChannel, RawVariantOption};

    #[derive(Default)]
    struct MockSource {
        listing: Vec<RawItem>,
        channels: Vec<RawVariantChannel>,
        fail: bool,
        variant_calls: AtomicUsize,
    }

    impl CatalogSource for MockSource {
        fn list_all(&self) -> SourceFuture<'_, Vec<RawItem>> {
            Box::pin(async move {
                if self.fail {
                    return Err(SourceError::InvalidResponse("down".into()));
                }
                Ok(self.listing.clone())
            })
        }

        fn variants<'a>(&'a self, _item_id: &'a str) -> SourceFuture<'a, Vec<RawVariantChannel>> {
            Box::pin(async move {
                self.variant_calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                if self.fail {
                    return Err(SourceError::Api {
                        status: 503,
                        body: "unavailable".into(),
                    });
                }
                Ok(self.channels.clone())
            })
        }
    }

    fn raw(json: &str) -> RawItem {
        serde_json::from_str(json).unwrap()
    }

    fn material_channel() -> RawVariantChannel {
        RawVariantChannel {
            channel: "Material".into(),
            options: vec![
                RawVariantOption {
                    tag: "Mat1".into(),
                    name: "Gold".into(),
                    image: Some("g".into()),
                },
                RawVariantOption {
                    tag: "Mat2".into(),
                    name: "Silver".into(),
                    image: None,
                },
            ],
        }
    }

    fn cache_with(source: MockSource) -> (CatalogCache, Arc<SqliteCatalogStore>, Arc<MockSource>) {
        let store = Arc::new(SqliteCatalogStore::in_memory().unwrap());
        let source = Arc::new(source);
        let cache = CatalogCache::new(store.clone(), source.clone()).unwrap();
        (cache, store, source)
    }

    #[test]
    fn reconcile_skips_malformed_records() {
        let (cache, store, _) = cache_with(MockSource::default());

        let report = cache
            .reconcile(&[
                raw(r#"{"id":"A","name":"Foo","type":{"value":"outfit"},"images":{"icon":"u"}}"#),
                raw(r#"{"id":"B"}"#),
            ])
            .unwrap();

        assert_eq!(
            report,
            ReconcileReport {
                added: 1,
                updated: 0,
                skipped: 1
            }
        );
        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "A");
        assert_eq!(all[0].category, Category::Outfit);
        assert_eq!(cache.items().len(), 1);
    }

    #[test]
    fn reconcile_again_counts_updates() {
        let (cache, _, _) = cache_with(MockSource::default());
        let listing = [raw(r#"{"id":"A","name":"Foo","images":{"icon":"u"}}"#)];

        cache.reconcile(&listing).unwrap();
        let report = cache.reconcile(&listing).unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.updated, 1);
    }

    #[test]
    fn listing_kept_in_name_order() {
        let (cache, _, _) = cache_with(MockSource::default());
        cache
            .reconcile(&[
                raw(r#"{"id":"2","name":"Zulu","images":{"icon":"u"}}"#),
                raw(r#"{"id":"1","name":"Alpha","images":{"icon":"u"}}"#),
            ])
            .unwrap();

        let names: Vec<_> = cache.items().iter().map(|i| i.name.clone()).collect();
        assert_eq!(names, ["Alpha", "Zulu"]);
    }

    #[test]
    fn failed_reconcile_preserves_previous_state() {
        let (cache, store, _) = cache_with(MockSource::default());
        cache
            .reconcile(&[raw(r#"{"id":"A","name":"Foo","images":{"icon":"u"}}"#)])
            .unwrap();
        store
            .execute_raw(
                "CREATE TRIGGER reject_c BEFORE INSERT ON items WHEN NEW.id = 'C'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let result = cache.reconcile(&[
            raw(r#"{"id":"A","name":"Renamed","images":{"icon":"u"}}"#),
            raw(r#"{"id":"B","name":"Bar","images":{"icon":"u"}}"#),
            raw(r#"{"id":"C","name":"Baz","images":{"icon":"u"}}"#),
        ]);
        assert!(result.is_err());

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Foo");
        assert_eq!(cache.items()[0].name, "Foo");
    }

    #[tokio::test]
    async fn refresh_fetches_and_reconciles() {
        let (cache, _, _) = cache_with(MockSource {
            listing: vec![raw(
                r#"{"id":"A","name":"Foo","type":{"value":"backpack"},"images":{"icon":"u"}}"#,
            )],
            ..MockSource::default()
        });

        let report = cache.refresh().await.unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(cache.items()[0].category, Category::Backpack);
    }

    #[tokio::test]
    async fn refresh_surfaces_source_failure() {
        let (cache, _, _) = cache_with(MockSource {
            fail: true,
            ..MockSource::default()
        });

        let err = cache.refresh().await.unwrap_err();
        assert!(matches!(err, CatalogError::Source(_)));
        assert!(cache.items().is_empty());
    }

    #[tokio::test]
    async fn variants_fetched_once_then_cached() {
        let (cache, store, source) = cache_with(MockSource {
            channels: vec![material_channel()],
            ..MockSource::default()
        });

        let first = cache.resolve_variants("A").await;
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].channel, "Material");
        assert_eq!(store.get_variants("A").unwrap().len(), 2);

        let second = cache.resolve_variants("A").await;
        assert_eq!(second, first);
        assert_eq!(source.variant_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn variant_source_failure_yields_empty() {
        let (cache, store, _) = cache_with(MockSource {
            fail: true,
            ..MockSource::default()
        });

        assert!(cache.resolve_variants("A").await.is_empty());
        assert!(store.get_variants("A").unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_store_one_copy() {
        let (cache, store, _) = cache_with(MockSource {
            channels: vec![material_channel()],
            ..MockSource::default()
        });
        let cache = Arc::new(cache);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let cache = cache.clone();
            tasks.spawn(async move { cache.resolve_variants("A").await });
        }
        while let Some(result) = tasks.join_next().await {
            assert_eq!(result.unwrap().len(), 2);
        }

        let tags: Vec<_> = store
            .get_variants("A")
            .unwrap()
            .into_iter()
            .map(|v| v.tag)
            .collect();
        assert_eq!(tags, ["Mat1", "Mat2"]);
    }

    #[test]
    fn unknown_item_gets_single_placeholder() {
        let (cache, store, _) = cache_with(MockSource::default());

        let item = cache.ensure_item("X", Category::Outfit).unwrap();
        assert_eq!(item.name, "X");
        assert_eq!(item.rarity, "common");
        assert_eq!(item.icon, DEFAULT_ICON);

        cache.ensure_item("X", Category::Outfit).unwrap();
        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].category, Category::Outfit);
        assert_eq!(cache.items().len(), 1);
    }

    #[test]
    fn known_item_returned_as_stored() {
        let (cache, _, _) = cache_with(MockSource::default());
        cache
            .reconcile(&[raw(
                r#"{"id":"A","name":"Foo","type":{"value":"emote"},"images":{"icon":"u"}}"#,
            )])
            .unwrap();

        let item = cache.ensure_item("A", Category::Outfit).unwrap();
        assert_eq!(item.name, "Foo");
        assert_eq!(item.category, Category::Emote);
    }
}
