//! koala-user CLI: operator interface to the user pipeline.

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use koala_user::broker::memory::InMemoryBroker;
use koala_user::broker::{EventPublisher, ProducerFactory, PublisherConfig};
use koala_user::cache::{Cache, InMemoryCache};
use koala_user::config::Config;
use koala_user::db::{Db, InMemoryUserRepository, UserRepository};
use koala_user::model::UserInput;
use koala_user::pipeline::{Pipeline, PipelineConfig};
use koala_user::service::{UserService, UserTaskRunner};
use koala_user::telemetry::{TelemetryConfig, init_telemetry};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "koala-user", about = "User account write-behind pipeline")]
struct Cli {
    /// Use the in-process store, cache and broker instead of Postgres,
    /// Redis and Kafka
    #[arg(long, global = true)]
    dry_run: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline, reading JSON commands from stdin until EOF
    Serve,
    /// One-shot user operations
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Register a new account
    Register(Fields),
    /// Replace every field of an account
    Update {
        uuid: String,
        #[command(flatten)]
        fields: Fields,
    },
    /// Replace the given fields of an account
    Patch {
        uuid: String,
        #[command(flatten)]
        fields: Fields,
    },
    /// Remove an account
    Delete { uuid: String },
}

#[derive(Args)]
struct Fields {
    #[arg(long, default_value = "")]
    username: String,
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, default_value = "")]
    email: String,
    #[arg(long, default_value = "")]
    password: String,
}

impl From<Fields> for UserInput {
    fn from(f: Fields) -> Self {
        UserInput::new(f.username, f.name, f.email, f.password)
    }
}

/// One line of `serve` input.
#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    Register {
        user: UserInput,
    },
    Update {
        uuid: String,
        user: UserInput,
    },
    Patch {
        uuid: String,
        user: UserInput,
    },
    Delete {
        uuid: String,
    },
}

/// Collaborators the pipeline runs against.
struct Backends {
    repo: Arc<dyn UserRepository>,
    cache: Arc<dyn Cache>,
    factory: Arc<dyn ProducerFactory>,
    pipeline: PipelineConfig,
    publisher: PublisherConfig,
    /// Set in dry runs so committed events can be shown at exit.
    broker: Option<InMemoryBroker>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = if cli.dry_run {
        None
    } else {
        Some(Config::from_env()?)
    };

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.as_ref().and_then(|c| c.otel_endpoint.clone()),
        service_name: "koala-user".to_string(),
        log_level: config
            .as_ref()
            .map(|c| c.log_level.clone())
            .unwrap_or_else(|| "info".to_string()),
    })?;

    let backends = match &config {
        Some(config) => connect(config).await?,
        None => in_memory(),
    };

    let runner = UserTaskRunner::new(
        backends.repo.clone(),
        backends.cache.clone(),
        Arc::new(EventPublisher::new(backends.factory.clone(), backends.publisher.clone())),
    );
    let mut pipeline = Pipeline::new(backends.pipeline.clone(), Arc::new(runner));
    pipeline.start();
    let service = UserService::new(
        backends.repo.clone(),
        backends.cache.clone(),
        pipeline.submitter(),
    );

    let result = match cli.command {
        Command::Serve => cmd_serve(&service).await,
        Command::User { action } => cmd_user(&service, action).await,
    };

    pipeline.shutdown().await;

    if let Some(broker) = backends.broker {
        for record in broker.committed() {
            println!(
                "committed [{}] {}: {}",
                record.topic,
                record.key.as_deref().unwrap_or("-"),
                record.payload
            );
        }
    }

    result
}

async fn connect(config: &Config) -> anyhow::Result<Backends> {
    let factory = producer_factory(config)?;

    let db = Db::connect(&config.database_url).await?;
    db.migrate().await?;

    Ok(Backends {
        repo: Arc::new(db),
        cache: cache(config).await?,
        factory,
        pipeline: config.pipeline(),
        publisher: config.publisher(),
        broker: None,
    })
}

fn in_memory() -> Backends {
    let broker = InMemoryBroker::new();
    Backends {
        repo: Arc::new(InMemoryUserRepository::new()),
        cache: Arc::new(InMemoryCache::new()),
        factory: Arc::new(broker.clone()),
        pipeline: PipelineConfig::default(),
        publisher: PublisherConfig::default(),
        broker: Some(broker),
    }
}

#[cfg(feature = "kafka")]
fn producer_factory(config: &Config) -> anyhow::Result<Arc<dyn ProducerFactory>> {
    use koala_user::broker::kafka::KafkaConnector;

    Ok(Arc::new(KafkaConnector::new(
        config.kafka_brokers.clone(),
        config.kafka_transactional_id.clone(),
    )))
}

#[cfg(not(feature = "kafka"))]
fn producer_factory(_config: &Config) -> anyhow::Result<Arc<dyn ProducerFactory>> {
    anyhow::bail!("built without the `kafka` feature; rerun with --dry-run")
}

#[cfg(feature = "redis")]
async fn cache(config: &Config) -> anyhow::Result<Arc<dyn Cache>> {
    use koala_user::cache::redis_cache::RedisCache;
    use secrecy::ExposeSecret;

    match &config.redis_url {
        Some(url) => Ok(Arc::new(RedisCache::connect(url.expose_secret()).await?)),
        None => Ok(Arc::new(InMemoryCache::new())),
    }
}

#[cfg(not(feature = "redis"))]
async fn cache(config: &Config) -> anyhow::Result<Arc<dyn Cache>> {
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL is set but the `redis` feature is off, using the in-process cache");
    }
    Ok(Arc::new(InMemoryCache::new()))
}

async fn cmd_serve(service: &UserService) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, draining");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Request>(&line) {
            Ok(request) => match handle(service, request).await {
                Ok(Some(uuid)) => json!({ "ok": true, "uuid": uuid }),
                Ok(None) => json!({ "ok": true }),
                Err(e) => json!({ "ok": false, "error": e.to_string() }),
            },
            Err(e) => json!({ "ok": false, "error": format!("bad request: {e}") }),
        };
        println!("{reply}");
    }

    Ok(())
}

async fn handle(
    service: &UserService,
    request: Request,
) -> koala_user::error::Result<Option<uuid::Uuid>> {
    match request {
        Request::Register { user } => service.register(user).await.map(Some),
        Request::Update { uuid, user } => service.update(&uuid, user).await.map(|()| None),
        Request::Patch { uuid, user } => service.patch(&uuid, user).await.map(|()| None),
        Request::Delete { uuid } => service.delete(&uuid).await.map(|()| None),
    }
}

async fn cmd_user(service: &UserService, action: UserAction) -> anyhow::Result<()> {
    match action {
        UserAction::Register(fields) => {
            let uuid = service.register(fields.into()).await?;
            println!("Registered: {uuid}");
        }
        UserAction::Update { uuid, fields } => {
            service.update(&uuid, fields.into()).await?;
            println!("Update queued: {uuid}");
        }
        UserAction::Patch { uuid, fields } => {
            service.patch(&uuid, fields.into()).await?;
            println!("Patch queued: {uuid}");
        }
        UserAction::Delete { uuid } => {
            service.delete(&uuid).await?;
            println!("Delete queued: {uuid}");
        }
    }
    Ok(())
}
