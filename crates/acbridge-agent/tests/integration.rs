use acbridge_core::{DeviceIdentity, PropertyRegistry, PropertyValue};
use acbridge_proto::{ClimateDiscovery, CommandTarget, TopicScheme};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use uuid::Uuid;

fn parse_mqtt_url(url: &str) -> (String, u16) {
    let url = url
        .strip_prefix("tcp://")
        .or_else(|| url.strip_prefix("mqtt://"))
        .unwrap_or(url);

    let parts: Vec<&str> = url.split(':').collect();

    let host = parts.first().copied().unwrap_or("localhost").to_string();
    let port = parts.get(1).and_then(|p| p.parse().ok()).unwrap_or(1883);

    (host, port)
}

fn broker() -> Option<(String, u16)> {
    if std::env::var("ACBRIDGE_INTEGRATION").is_err() {
        eprintln!("Skipping integration test; set ACBRIDGE_INTEGRATION=1 to run");
        return None;
    }
    let broker = std::env::var("ACBRIDGE_MQTT_BROKER")
        .unwrap_or_else(|_| "tcp://localhost:1883".to_string());
    Some(parse_mqtt_url(&broker))
}

async fn spawn_eventloop(mut eventloop: EventLoop) {
    loop {
        if eventloop.poll().await.is_err() {
            break;
        }
    }
}

/// Subscribe to `topic` and resolve with the first payload received on it.
async fn first_message(host: &str, port: u16, topic: &str) -> oneshot::Receiver<(String, Vec<u8>)> {
    let mut opts = MqttOptions::new(format!("sub-{}", Uuid::new_v4()), host, port);
    opts.set_keep_alive(Duration::from_secs(5));
    let (client, mut eventloop) = AsyncClient::new(opts, 10);
    client.subscribe(topic, QoS::AtLeastOnce).await.unwrap();

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let _client = client;
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let _ = tx.send((publish.topic.clone(), publish.payload.to_vec()));
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
    rx
}

fn publisher(host: String, port: u16) -> AsyncClient {
    let mut opts = MqttOptions::new(format!("pub-{}", Uuid::new_v4()), host, port);
    opts.set_keep_alive(Duration::from_secs(5));
    let (client, eventloop) = AsyncClient::new(opts, 10);
    tokio::spawn(spawn_eventloop(eventloop));
    client
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mqtt_state_roundtrip() {
    let Some((host, port)) = broker() else {
        return;
    };

    let scheme = TopicScheme::new(format!("acbridge-it-{}", Uuid::new_v4().simple()));
    let topic = scheme.state("fan_speed");
    let rx = first_message(&host, port, &topic).await;

    let client = publisher(host, port);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let value = PropertyValue::label("l3");
    client
        .publish(&topic, QoS::AtLeastOnce, false, value.to_string())
        .await
        .unwrap();

    let (received_topic, payload) = timeout(Duration::from_secs(5), rx)
        .await
        .expect("timeout waiting for MQTT message")
        .expect("subscriber dropped");

    assert_eq!(received_topic, topic);
    assert_eq!(payload, b"l3");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mqtt_command_topics_route_back() {
    let Some((host, port)) = broker() else {
        return;
    };

    let scheme = TopicScheme::new(format!("acbridge-it-{}", Uuid::new_v4().simple()));
    let rx = first_message(&host, port, &scheme.command_wildcard()).await;

    let client = publisher(host, port);
    tokio::time::sleep(Duration::from_millis(200)).await;

    client
        .publish(scheme.command("swing_vert"), QoS::AtLeastOnce, false, "full")
        .await
        .unwrap();

    let (topic, payload) = timeout(Duration::from_secs(5), rx)
        .await
        .expect("timeout waiting for MQTT message")
        .expect("subscriber dropped");

    assert_eq!(
        scheme.parse_command(&topic),
        Some(CommandTarget::Property("swing_vert".to_string()))
    );
    assert_eq!(payload, b"full");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mqtt_discovery_payload_is_retained() {
    let Some((host, port)) = broker() else {
        return;
    };

    let scheme = TopicScheme::new(format!("acbridge-it-{}", Uuid::new_v4().simple()));
    let identity = DeviceIdentity {
        id: "f0fe6b123456".to_string(),
        name: "C&H1".to_string(),
    };
    let discovery = ClimateDiscovery::new(
        &scheme,
        &PropertyRegistry::standard(),
        &identity,
        "Integration AC",
    );

    let client = publisher(host.clone(), port);
    client
        .publish(scheme.config(), QoS::AtLeastOnce, true, discovery.to_json().unwrap())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Subscribing after the publish still sees the retained payload.
    let rx = first_message(&host, port, &scheme.config()).await;
    let (_, payload) = timeout(Duration::from_secs(5), rx)
        .await
        .expect("timeout waiting for retained message")
        .expect("subscriber dropped");

    let decoded: ClimateDiscovery = serde_json::from_slice(&payload).unwrap();
    assert_eq!(decoded, discovery);

    // Clear the retained message.
    client
        .publish(scheme.config(), QoS::AtLeastOnce, true, Vec::<u8>::new())
        .await
        .unwrap();
}
