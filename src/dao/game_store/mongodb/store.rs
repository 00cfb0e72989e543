use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chrono::{NaiveDate, Utc};
use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Bson, Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        CHALLENGE_COLLECTION, COMPLETION_COLLECTION, ENTITLEMENT_COLLECTION,
        MongoChallengeDocument, MongoCompletionDocument, MongoEntitlementDocument,
        MongoStatsDocument, STATS_COLLECTION, bson_date, doc_id,
    },
};
use crate::{
    config::RetryPolicy,
    dao::{
        game_store::GameStore,
        models::{
            ChallengeEntity, ChallengeStatus, CompletionEntity, EntitlementEntity,
            StatsApplication, StatsDelta, UserStatsEntity,
        },
        storage::StorageResult,
    },
};

const COMPLETION_KEY_INDEX: &str = "completion_user_challenge_uniq";
const CHALLENGE_STATUS_INDEX: &str = "challenge_live_status_uniq";

#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
    connect_policy: RetryPolicy,
    /// Cleared while legacy duplicate completions block the unique index.
    completion_index_ready: AtomicBool,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn database(&self) -> Database {
        let guard = self.state.read().await;
        guard.database.clone()
    }

    async fn ping(&self) -> MongoResult<()> {
        self.database()
            .await
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(
            &self.config.options,
            &self.config.database_name,
            self.connect_policy,
        )
        .await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoGameStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig, connect_policy: RetryPolicy) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name, connect_policy).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
            connect_policy,
            completion_index_ready: AtomicBool::new(false),
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let status_index = IndexModel::builder()
            .keys(doc! { "status": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some(CHALLENGE_STATUS_INDEX.to_owned()))
                    .unique(Some(true))
                    .partial_filter_expression(Some(doc! {
                        "status": { "$in": [ChallengeStatus::Next.as_str(), ChallengeStatus::Active.as_str()] }
                    }))
                    .build(),
            )
            .build();

        self.challenges()
            .await
            .create_index(status_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: CHALLENGE_COLLECTION,
                index: CHALLENGE_STATUS_INDEX,
                source,
            })?;

        self.ensure_completion_index().await
    }

    /// Create the `(user_id, challenge_id)` unique index.
    ///
    /// Legacy duplicates make the build fail with a duplicate-key error; the store then
    /// keeps serving and retries on every health check until the admin dedup ran.
    async fn ensure_completion_index(&self) -> MongoResult<()> {
        if self.inner.completion_index_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "challenge_id": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some(COMPLETION_KEY_INDEX.to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();

        match self.completions().await.create_index(index).await {
            Ok(_) => {
                self.inner
                    .completion_index_ready
                    .store(true, Ordering::Release);
                info!(index = COMPLETION_KEY_INDEX, "completion unique index ready");
                Ok(())
            }
            Err(err) if is_duplicate_key(&err) => {
                warn!(
                    index = COMPLETION_KEY_INDEX,
                    "duplicate completions block the unique index; run the admin dedup"
                );
                Ok(())
            }
            Err(source) => Err(MongoDaoError::EnsureIndex {
                collection: COMPLETION_COLLECTION,
                index: COMPLETION_KEY_INDEX,
                source,
            }),
        }
    }

    async fn health(&self) -> MongoResult<()> {
        self.inner.ping().await?;
        self.ensure_completion_index().await
    }

    async fn challenges(&self) -> Collection<MongoChallengeDocument> {
        self.inner.database().await.collection(CHALLENGE_COLLECTION)
    }

    async fn completions(&self) -> Collection<MongoCompletionDocument> {
        self.inner.database().await.collection(COMPLETION_COLLECTION)
    }

    async fn stats(&self) -> Collection<MongoStatsDocument> {
        self.inner.database().await.collection(STATS_COLLECTION)
    }

    async fn entitlements(&self) -> Collection<MongoEntitlementDocument> {
        self.inner.database().await.collection(ENTITLEMENT_COLLECTION)
    }

    async fn insert_challenge(&self, challenge: ChallengeEntity) -> MongoResult<()> {
        let key = format!("{}:{}", challenge.id, challenge.status);
        let document = MongoChallengeDocument::try_from(challenge)?;
        self.challenges()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| {
                MongoDaoError::from_write(CHALLENGE_COLLECTION, "insert challenge", key, source)
            })?;
        Ok(())
    }

    async fn find_challenge(&self, filter: Document) -> MongoResult<Option<ChallengeEntity>> {
        let document = self
            .challenges()
            .await
            .find_one(filter)
            .sort(doc! { "date": -1 })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: CHALLENGE_COLLECTION,
                operation: "find challenge",
                source,
            })?;
        document.map(ChallengeEntity::try_from).transpose()
    }

    async fn transition_challenge(
        &self,
        id: Uuid,
        from: ChallengeStatus,
        to: ChallengeStatus,
        date: Option<NaiveDate>,
    ) -> MongoResult<bool> {
        let mut set = doc! { "status": to.as_str() };
        if let Some(date) = date {
            set.insert("date", date.to_string());
        }

        let result = self
            .challenges()
            .await
            .update_one(
                doc! { "_id": id.to_string(), "status": from.as_str() },
                doc! { "$set": set },
            )
            .await
            .map_err(|source| {
                MongoDaoError::from_write(
                    CHALLENGE_COLLECTION,
                    "transition challenge",
                    format!("status {to}"),
                    source,
                )
            })?;
        Ok(result.matched_count > 0)
    }

    async fn increment_hints(&self, id: Uuid) -> MongoResult<Option<ChallengeEntity>> {
        let document = self
            .challenges()
            .await
            .find_one_and_update(doc_id(id), doc! { "$inc": { "hints_used": 1_i64 } })
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: CHALLENGE_COLLECTION,
                operation: "increment hints",
                source,
            })?;
        document.map(ChallengeEntity::try_from).transpose()
    }

    async fn insert_completion(&self, record: CompletionEntity) -> MongoResult<()> {
        let key = format!("{}:{}", record.user_id, record.challenge_id);
        let document = MongoCompletionDocument::from(record);
        self.completions()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| {
                MongoDaoError::from_write(COMPLETION_COLLECTION, "insert completion", key, source)
            })?;
        Ok(())
    }

    async fn find_completion(
        &self,
        user_id: String,
        challenge_id: Uuid,
    ) -> MongoResult<Option<CompletionEntity>> {
        let document = self
            .completions()
            .await
            .find_one(doc! { "user_id": user_id, "challenge_id": challenge_id.to_string() })
            .sort(doc! { "completed_at": 1, "_id": 1 })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: COMPLETION_COLLECTION,
                operation: "find completion",
                source,
            })?;
        document.map(CompletionEntity::try_from).transpose()
    }

    async fn list_completions(&self) -> MongoResult<Vec<CompletionEntity>> {
        let query_error = |source: mongodb::error::Error| MongoDaoError::Query {
            collection: COMPLETION_COLLECTION,
            operation: "list completions",
            source,
        };
        let documents: Vec<MongoCompletionDocument> = self
            .completions()
            .await
            .find(doc! {})
            .await
            .map_err(query_error)?
            .try_collect()
            .await
            .map_err(query_error)?;

        documents
            .into_iter()
            .map(CompletionEntity::try_from)
            .collect()
    }

    async fn delete_completion(&self, id: Uuid) -> MongoResult<bool> {
        let result = self
            .completions()
            .await
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: COMPLETION_COLLECTION,
                operation: "delete completion",
                source,
            })?;
        Ok(result.deleted_count > 0)
    }

    async fn find_stats(&self, user_id: &str) -> MongoResult<Option<UserStatsEntity>> {
        let document = self
            .stats()
            .await
            .find_one(doc_id(user_id))
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: STATS_COLLECTION,
                operation: "find stats",
                source,
            })?;
        document.map(UserStatsEntity::try_from).transpose()
    }

    async fn ensure_stats(&self, user_id: String) -> MongoResult<UserStatsEntity> {
        let outcome = self
            .stats()
            .await
            .find_one_and_update(
                doc_id(&user_id),
                doc! { "$setOnInsert": {
                    "applied_challenges": [],
                    "updated_at": bson_date(Utc::now()),
                } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await;

        let document = match outcome {
            Ok(document) => document,
            // Two concurrent upserts of the same `_id`; the other one created the row.
            Err(err) if is_duplicate_key(&err) => None,
            Err(source) => {
                return Err(MongoDaoError::Query {
                    collection: STATS_COLLECTION,
                    operation: "ensure stats",
                    source,
                });
            }
        };

        match document {
            Some(document) => UserStatsEntity::try_from(document),
            None => self
                .find_stats(&user_id)
                .await?
                .ok_or_else(|| MongoDaoError::Decode {
                    collection: STATS_COLLECTION,
                    reason: format!("stats row for `{user_id}` missing after upsert"),
                }),
        }
    }

    /// `$inc` guarded by `applied_challenges: { $ne: challenge }`.
    ///
    /// When the challenge was already applied the filter misses, the upsert collides
    /// with the existing `_id`, and the duplicate-key error means "already applied".
    async fn apply_completion(
        &self,
        user_id: String,
        delta: StatsDelta,
    ) -> MongoResult<StatsApplication> {
        let challenge = delta.challenge_id.to_string();
        let trophy_field = format!("trophies.{}", delta.tier.as_str());

        let mut increments = doc! {
            "total_completions": 1_i64,
            "total_moves": i64::from(delta.moves),
        };
        increments.insert(trophy_field, 1_i64);

        let outcome = self
            .stats()
            .await
            .find_one_and_update(
                doc! { "_id": user_id.as_str(), "applied_challenges": { "$ne": challenge.as_str() } },
                doc! {
                    "$inc": increments,
                    "$push": { "applied_challenges": challenge.as_str() },
                    "$set": { "updated_at": bson_date(Utc::now()) },
                },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await;

        match outcome {
            Ok(Some(document)) => Ok(StatsApplication::Applied(UserStatsEntity::try_from(
                document,
            )?)),
            Ok(None) => Err(MongoDaoError::Decode {
                collection: STATS_COLLECTION,
                reason: format!("upsert for `{user_id}` returned no document"),
            }),
            Err(err) if is_duplicate_key(&err) => {
                let stats = self
                    .find_stats(&user_id)
                    .await?
                    .unwrap_or_else(|| UserStatsEntity::empty(user_id.clone()));
                Ok(StatsApplication::AlreadyApplied(stats))
            }
            Err(source) => Err(MongoDaoError::Query {
                collection: STATS_COLLECTION,
                operation: "apply completion",
                source,
            }),
        }
    }

    async fn replace_stats_if_unchanged(
        &self,
        expected: UserStatsEntity,
        stats: UserStatsEntity,
    ) -> MongoResult<bool> {
        let filter = doc! {
            "_id": stats.user_id.as_str(),
            "total_completions": i64::try_from(expected.total_completions).unwrap_or(i64::MAX),
            "updated_at": bson_date(expected.updated_at),
        };
        let document = MongoStatsDocument::from(stats);
        let result = self
            .stats()
            .await
            .replace_one(filter, &document)
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: STATS_COLLECTION,
                operation: "replace stats",
                source,
            })?;
        Ok(result.matched_count == 1)
    }

    async fn find_entitlement(&self, subscriber_id: String) -> MongoResult<Option<EntitlementEntity>> {
        let document = self
            .entitlements()
            .await
            .find_one(doc_id(subscriber_id))
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: ENTITLEMENT_COLLECTION,
                operation: "find entitlement",
                source,
            })?;
        document.map(EntitlementEntity::try_from).transpose()
    }

    /// Conditional replace: the filter only matches rows whose period end is not newer.
    /// A miss on an existing row turns the upsert into a duplicate-key error.
    async fn save_entitlement_if_newer(&self, entitlement: EntitlementEntity) -> MongoResult<bool> {
        let mut filter = doc_id(&entitlement.subscriber_id);
        match entitlement.current_period_ends_at {
            Some(incoming) => {
                filter.insert(
                    "$or",
                    vec![
                        Bson::Document(doc! { "current_period_ends_at": Bson::Null }),
                        Bson::Document(doc! { "current_period_ends_at": { "$lte": bson_date(incoming) } }),
                    ],
                );
            }
            None => {
                filter.insert("current_period_ends_at", Bson::Null);
            }
        }

        let mut entitlement = entitlement;
        entitlement.updated_at = Utc::now();
        let document = MongoEntitlementDocument::from(entitlement);

        match self
            .entitlements()
            .await
            .replace_one(filter, &document)
            .upsert(true)
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::Query {
                collection: ENTITLEMENT_COLLECTION,
                operation: "save entitlement",
                source,
            }),
        }
    }
}

impl GameStore for MongoGameStore {
    fn insert_challenge(&self, challenge: ChallengeEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_challenge(challenge).await.map_err(Into::into) })
    }

    fn find_challenge(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_challenge(doc_id(id)).await.map_err(Into::into) })
    }

    fn find_challenge_by_status(
        &self,
        status: ChallengeStatus,
    ) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_challenge(doc! { "status": status.as_str() })
                .await
                .map_err(Into::into)
        })
    }

    fn transition_challenge(
        &self,
        id: Uuid,
        from: ChallengeStatus,
        to: ChallengeStatus,
        date: Option<NaiveDate>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .transition_challenge(id, from, to, date)
                .await
                .map_err(Into::into)
        })
    }

    fn increment_hints(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.increment_hints(id).await.map_err(Into::into) })
    }

    fn insert_completion(&self, record: CompletionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_completion(record).await.map_err(Into::into) })
    }

    fn find_completion(
        &self,
        user_id: String,
        challenge_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<CompletionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_completion(user_id, challenge_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_completions(&self) -> BoxFuture<'static, StorageResult<Vec<CompletionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_completions().await.map_err(Into::into) })
    }

    fn delete_completion(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_completion(id).await.map_err(Into::into) })
    }

    fn ensure_stats(&self, user_id: String) -> BoxFuture<'static, StorageResult<UserStatsEntity>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_stats(user_id).await.map_err(Into::into) })
    }

    fn apply_completion(
        &self,
        user_id: String,
        delta: StatsDelta,
    ) -> BoxFuture<'static, StorageResult<StatsApplication>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .apply_completion(user_id, delta)
                .await
                .map_err(Into::into)
        })
    }

    fn replace_stats_if_unchanged(
        &self,
        expected: UserStatsEntity,
        stats: UserStatsEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_stats_if_unchanged(expected, stats)
                .await
                .map_err(Into::into)
        })
    }

    fn find_entitlement(
        &self,
        subscriber_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<EntitlementEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_entitlement(subscriber_id).await.map_err(Into::into) })
    }

    fn save_entitlement_if_newer(
        &self,
        entitlement: EntitlementEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .save_entitlement_if_newer(entitlement)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.health().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
