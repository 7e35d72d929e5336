//! User service end to end against in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use koala_user::broker::memory::{CommitFault, InMemoryBroker};
use koala_user::broker::{EventPublisher, PublisherConfig};
use koala_user::cache::{Cache, InMemoryCache};
use koala_user::db::InMemoryUserRepository;
use koala_user::error::Error;
use koala_user::model::{UserEvent, UserInput, UserSnapshot};
use koala_user::pipeline::{Pipeline, PipelineConfig};
use koala_user::service::password::digest;
use koala_user::service::{UserService, UserTaskRunner};
use uuid::Uuid;

struct Harness {
    repo: Arc<InMemoryUserRepository>,
    cache: Arc<InMemoryCache>,
    broker: InMemoryBroker,
    pipeline: Pipeline,
    service: UserService,
}

impl Harness {
    fn new() -> Self {
        let repo = Arc::new(InMemoryUserRepository::new());
        let cache = Arc::new(InMemoryCache::new());
        let broker = InMemoryBroker::new();
        let publisher = Arc::new(EventPublisher::new(
            Arc::new(broker.clone()),
            PublisherConfig::default(),
        ));
        let runner = UserTaskRunner::new(repo.clone(), cache.clone(), publisher);
        let mut pipeline = Pipeline::new(
            PipelineConfig {
                workers: 4,
                retry_interval: Duration::from_millis(50),
            },
            Arc::new(runner),
        );
        pipeline.start();
        let service = UserService::new(repo.clone(), cache.clone(), pipeline.submitter());
        Self {
            repo,
            cache,
            broker,
            pipeline,
            service,
        }
    }

    fn events(&self) -> Vec<UserEvent> {
        self.broker
            .committed()
            .iter()
            .map(|r| serde_json::from_str(&r.payload).unwrap())
            .collect()
    }

    /// Wait until `check` holds, polling; sweeps run in the background.
    async fn eventually(&self, check: impl Fn(&Self) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check(self) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn register_ada(&self) -> Uuid {
        let uuid = self
            .service
            .register(ada())
            .await
            .expect("registration accepted");
        self.pipeline.drain().await;
        uuid
    }
}

fn ada() -> UserInput {
    UserInput::new("ada", "Ada Lovelace", "ada@example.com", "engine")
}

#[tokio::test]
async fn register_saves_hashes_caches_and_publishes() {
    let h = Harness::new();
    let uuid = h.register_ada().await;

    let stored = h.repo.get(uuid).expect("user stored");
    assert_eq!(stored.username, "ada");
    assert_eq!(stored.password, digest(&uuid, "engine"));

    assert!(h.cache.get(&uuid.to_string()).await.unwrap().is_some());

    let committed = h.broker.committed();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].key.as_deref(), Some(uuid.to_string().as_str()));
    assert!(!committed[0].payload.contains("engine"));
    assert!(!committed[0].payload.contains("password"));

    let events = h.events();
    let event = &events[0];
    assert_eq!(event.method.to_string(), "register");
    assert_eq!(event.user.uuid, uuid);
    assert_eq!(event.user.email, "ada@example.com");

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn register_rejects_bad_input_before_submitting() {
    let h = Harness::new();

    let err = h.service.register(UserInput::default()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "username cannot be empty;password cannot be empty;email cannot be empty;name cannot be empty"
    );

    let shouting = UserInput {
        email: "ADA@EXAMPLE.COM".to_string(),
        ..ada()
    };
    let err = h.service.register(shouting).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    assert_eq!(h.pipeline.pending(), 0);
    h.pipeline.drain().await;
    assert!(h.repo.is_empty());
    assert!(h.broker.committed().is_empty());

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn register_rejects_taken_username_or_email() {
    let h = Harness::new();
    h.register_ada().await;

    let same_name = UserInput {
        email: "other@example.com".to_string(),
        ..ada()
    };
    let err = h.service.register(same_name).await.unwrap_err();
    assert_eq!(err.to_string(), "user already registered");

    let same_email = UserInput {
        username: "lovelace".to_string(),
        ..ada()
    };
    assert!(matches!(
        h.service.register(same_email).await,
        Err(Error::AlreadyExists(_))
    ));

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn unknown_or_malformed_uuid_is_not_found() {
    let h = Harness::new();

    let err = h
        .service
        .update(&Uuid::new_v4().to_string(), ada())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "uuid not found");

    let err = h.service.delete("not-a-uuid").await.unwrap_err();
    assert_eq!(err.to_string(), "uuid not found");

    let err = h.service.delete("").await.unwrap_err();
    assert_eq!(err.to_string(), "uuid cannot be empty");

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn update_replaces_every_field() {
    let h = Harness::new();
    let uuid = h.register_ada().await;

    let changes = UserInput::new("countess", "Augusta Ada", "augusta@example.com", "analytical");
    h.service.update(&uuid.to_string(), changes).await.unwrap();
    h.pipeline.drain().await;

    let stored = h.repo.get(uuid).unwrap();
    assert_eq!(stored.username, "countess");
    assert_eq!(stored.name, "Augusta Ada");
    assert_eq!(stored.email, "augusta@example.com");
    assert_eq!(stored.password, digest(&uuid, "analytical"));

    let events = h.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].method.to_string(), "update");
    assert_eq!(events[1].user.username, "countess");

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn patch_requires_a_change_and_touches_only_given_fields() {
    let h = Harness::new();
    let uuid = h.register_ada().await;

    let err = h
        .service
        .patch(&uuid.to_string(), UserInput::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "at least one data must be changed");

    let bad_email = UserInput {
        email: "nope".to_string(),
        ..UserInput::default()
    };
    assert!(matches!(
        h.service.patch(&uuid.to_string(), bad_email).await,
        Err(Error::Validation(_))
    ));

    let rename = UserInput {
        name: "Countess of Lovelace".to_string(),
        ..UserInput::default()
    };
    h.service.patch(&uuid.to_string(), rename).await.unwrap();
    h.pipeline.drain().await;

    let stored = h.repo.get(uuid).unwrap();
    assert_eq!(stored.name, "Countess of Lovelace");
    assert_eq!(stored.username, "ada");
    assert_eq!(stored.email, "ada@example.com");
    assert_eq!(stored.password, digest(&uuid, "engine"));

    let events = h.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].method.to_string(), "patch");
    assert_eq!(events[1].user.name, "Countess of Lovelace");
    assert!(events[1].user.username.is_empty());

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn lookup_falls_back_to_the_store_and_caches() {
    let h = Harness::new();
    let uuid = h.register_ada().await;

    // Simulate the registration entry having expired.
    h.cache.delete(&uuid.to_string()).await.unwrap();

    let rename = UserInput {
        name: "A. A. Lovelace".to_string(),
        ..UserInput::default()
    };
    h.service.patch(&uuid.to_string(), rename).await.unwrap();

    let cached = h.cache.get(&uuid.to_string()).await.unwrap().expect("entry cached");
    let snapshot: UserSnapshot = serde_json::from_str(&cached).unwrap();
    assert_eq!(snapshot.uuid, uuid);
    assert_eq!(snapshot.name, "A. A. Lovelace");
    assert!(!cached.contains("password"));

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn update_caches_the_new_fields_without_the_password() {
    let h = Harness::new();
    let uuid = h.register_ada().await;
    h.cache.delete(&uuid.to_string()).await.unwrap();

    let changes = UserInput::new("countess", "Augusta Ada", "augusta@example.com", "analytical");
    h.service.update(&uuid.to_string(), changes).await.unwrap();

    let cached = h.cache.get(&uuid.to_string()).await.unwrap().expect("entry cached");
    let snapshot: UserSnapshot = serde_json::from_str(&cached).unwrap();
    assert_eq!(snapshot.username, "countess");
    assert_eq!(snapshot.email, "augusta@example.com");
    assert!(!cached.contains("analytical"));

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn delete_removes_evicts_and_publishes() {
    let h = Harness::new();
    let uuid = h.register_ada().await;

    h.service.delete(&uuid.to_string()).await.unwrap();
    assert!(h.cache.get(&uuid.to_string()).await.unwrap().is_none());
    h.pipeline.drain().await;

    assert!(h.repo.get(uuid).is_none());
    let events = h.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].method.to_string(), "delete");
    assert_eq!(events[1].user.uuid, uuid);

    let err = h.service.delete(&uuid.to_string()).await.unwrap_err();
    assert_eq!(err.to_string(), "uuid not found");

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn store_outage_is_retried_until_the_save_lands() {
    let h = Harness::new();
    h.repo.fail_next(2);

    let uuid = h.service.register(ada()).await.unwrap();
    h.eventually(|h| h.repo.get(uuid).is_some()).await;

    assert_eq!(h.repo.mutations(), 3);
    assert_eq!(h.repo.get(uuid).unwrap().password, digest(&uuid, "engine"));
    // The event went out independently of the store failures.
    assert_eq!(h.broker.committed().len(), 1);

    h.pipeline.shutdown().await;
}

#[tokio::test]
async fn poisoned_connection_is_replaced_and_the_event_retried() {
    let h = Harness::new();
    h.broker.fail_commits([CommitFault::Fatal]);

    let uuid = h.service.register(ada()).await.unwrap();
    h.eventually(|h| !h.broker.committed().is_empty()).await;

    assert_eq!(h.broker.committed().len(), 1);
    assert_eq!(h.broker.connections(), 2);
    assert_eq!(h.broker.closes(), 1);
    assert_eq!(h.events()[0].user.uuid, uuid);

    h.pipeline.shutdown().await;
}
