//! Each mutation queues its store task before its event task.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use koala_user::cache::InMemoryCache;
use koala_user::db::InMemoryUserRepository;
use koala_user::model::UserInput;
use koala_user::pipeline::{Pipeline, PipelineConfig, Task, TaskOutcome, TaskRunner};
use koala_user::service::UserService;

/// Records task kinds in execution order and applies nothing.
#[derive(Default)]
struct RecordingRunner {
    kinds: Mutex<Vec<&'static str>>,
}

impl RecordingRunner {
    fn take(&self) -> Vec<&'static str> {
        std::mem::take(&mut *self.kinds.lock().unwrap())
    }
}

#[async_trait]
impl TaskRunner for RecordingRunner {
    async fn run(&self, task: &Task) -> TaskOutcome {
        self.kinds.lock().unwrap().push(task.kind());
        Ok(())
    }
}

#[tokio::test]
async fn store_task_is_queued_before_event_task() {
    let repo = Arc::new(InMemoryUserRepository::new());
    let cache = Arc::new(InMemoryCache::new());
    let runner = Arc::new(RecordingRunner::default());

    // One worker executes tasks in queue order.
    let mut pipeline = Pipeline::new(
        PipelineConfig {
            workers: 1,
            retry_interval: Duration::from_secs(3600),
        },
        runner.clone(),
    );
    pipeline.start();
    let service = UserService::new(repo.clone(), cache.clone(), pipeline.submitter());

    let uuid = service
        .register(UserInput::new("ada", "Ada", "ada@example.com", "engine"))
        .await
        .unwrap();
    pipeline.drain().await;
    assert_eq!(runner.take(), ["save_user", "publish_event"]);

    // The recording runner stores nothing, so seed the row lookups need.
    repo.insert(UserInput::new("ada", "Ada", "ada@example.com", "digest").into_user(uuid));
    let id = uuid.to_string();

    service
        .update(&id, UserInput::new("ada2", "Ada", "ada2@example.com", "engine2"))
        .await
        .unwrap();
    pipeline.drain().await;
    assert_eq!(runner.take(), ["update_user", "publish_event"]);

    let rename = UserInput {
        name: "Countess".to_string(),
        ..UserInput::default()
    };
    service.patch(&id, rename).await.unwrap();
    pipeline.drain().await;
    assert_eq!(runner.take(), ["patch_user", "publish_event"]);

    service.delete(&id).await.unwrap();
    pipeline.drain().await;
    assert_eq!(runner.take(), ["delete_user", "publish_event"]);

    pipeline.shutdown().await;
}
