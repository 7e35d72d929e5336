//! Kafka producer lifecycle that needs no running broker.
#![cfg(feature = "kafka")]

use std::time::Duration;

use koala_user::broker::TransactionalProducer;
use koala_user::broker::kafka::KafkaProducer;
use rdkafka::config::ClientConfig;
use rdkafka::producer::FutureProducer;

fn unconnected() -> KafkaProducer {
    // Client creation is lazy, nothing dials the address until a send.
    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", "127.0.0.1:9")
        .create()
        .expect("client created");
    KafkaProducer::new(producer, Duration::from_secs(1))
}

#[tokio::test]
async fn close_releases_the_client() {
    let producer = unconnected();
    producer.close().await.expect("empty queue flushes");

    let err = producer.begin().await.expect_err("closed producer refuses work");
    assert!(err.message.contains("producer closed"), "{err}");
    let err = producer.commit().await.expect_err("closed producer refuses work");
    assert!(err.message.contains("producer closed"), "{err}");
}

#[tokio::test]
async fn close_twice_is_a_no_op() {
    let producer = unconnected();
    producer.close().await.unwrap();
    producer.close().await.unwrap();
}
