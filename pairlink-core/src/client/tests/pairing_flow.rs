//! Full pairing flow between two devices
//!
//! The golden path: exchange long-term keys under the out-of-band secret,
//! exchange signed ephemeral keys, derive the same shared secret on both
//! sides, then distribute a group key over it. Plus the failure and
//! isolation properties that make the flow trustworthy.

use crate::client::Client;
use crate::config::Config;
use crate::crypto::{generate_signing_keypair, StandardCrypto, AEAD_KEY_LEN};
use crate::events::ClientEvent;
use crate::identity::{LocalDevice, MemoryDeviceStore, PeerId};
use crate::transport::{MemoryRelay, MemoryTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

const EVENT_WAIT: Duration = Duration::from_secs(5);

fn new_device() -> LocalDevice {
    let (public, private) = generate_signing_keypair();
    LocalDevice {
        long_term_public: public,
        long_term_private: private,
    }
}

fn exchange_key_hex(fill: u8) -> String {
    hex::encode([fill; AEAD_KEY_LEN])
}

async fn started_client(relay: &Arc<MemoryRelay>, id: &str) -> (Client, LocalDevice) {
    let device = new_device();
    let client = Client::new(
        Some(PeerId::new(id)),
        Config::default(),
        Arc::new(MemoryTransport::new(relay.clone())),
        Arc::new(MemoryDeviceStore::new(device.clone())),
        Arc::new(StandardCrypto::new()),
    )
    .unwrap();
    client.start().await.unwrap();
    (client, device)
}

/// Subscribe both clients to each other's topics.
async fn link(a: &Client, b: &Client) {
    a.subscribe_peer(b.id(), false).await.unwrap();
    b.subscribe_peer(a.id(), false).await.unwrap();
}

/// Wait for the first event matching `pred`, skipping unrelated events
/// (channel lifecycle notifications interleave freely with pairing events).
async fn wait_for(
    rx: &mut broadcast::Receiver<ClientEvent>,
    pred: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    timeout(EVENT_WAIT, async {
        loop {
            let event = rx.recv().await.expect("event stream closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn is_long_term_key(event: &ClientEvent) -> bool {
    matches!(event, ClientEvent::LongTermKeyReceived { .. })
}

fn is_shared_secret(event: &ClientEvent) -> bool {
    matches!(event, ClientEvent::SharedSecretEstablished { .. })
}

/// Run stage 1 in both directions and assert both key events.
async fn exchange_long_term_keys(
    p1: &Client,
    p1_device: &LocalDevice,
    p2: &Client,
    p2_device: &LocalDevice,
    key_hex: &str,
) {
    let mut p1_events = p1.subscribe_events();
    let mut p2_events = p2.subscribe_events();

    // The device that renders the QR code saves the key; the scanner
    // passes it explicitly with the initiating message.
    p2.save_exchange_key(key_hex).await.unwrap();
    p1.send_public_key_exchange(p2.id(), false, Some(key_hex))
        .await
        .unwrap();

    let event = wait_for(&mut p2_events, is_long_term_key).await;
    assert_eq!(
        event,
        ClientEvent::LongTermKeyReceived {
            peer: p1.id().clone(),
            key: p1_device.long_term_public.clone(),
        }
    );

    let event = wait_for(&mut p1_events, is_long_term_key).await;
    assert_eq!(
        event,
        ClientEvent::LongTermKeyReceived {
            peer: p2.id().clone(),
            key: p2_device.long_term_public.clone(),
        }
    );
}

/// Run stage 2/3 initiated by `p1` and assert both sides converge.
async fn establish_shared_secret(p1: &Client, p2: &Client) -> Vec<u8> {
    let mut p1_events = p1.subscribe_events();
    let mut p2_events = p2.subscribe_events();

    p1.send_ephemeral_key_exchange(p2.id(), false).await.unwrap();

    let p1_secret = match wait_for(&mut p1_events, is_shared_secret).await {
        ClientEvent::SharedSecretEstablished { peer, key } => {
            assert_eq!(peer, *p2.id());
            key
        }
        other => panic!("unexpected event: {:?}", other),
    };
    let p2_secret = match wait_for(&mut p2_events, is_shared_secret).await {
        ClientEvent::SharedSecretEstablished { peer, key } => {
            assert_eq!(peer, *p1.id());
            key
        }
        other => panic!("unexpected event: {:?}", other),
    };

    assert_eq!(p1_secret, p2_secret, "both sides must derive the same secret");
    assert_eq!(p1.shared_secret(p2.id()).await, Some(p1_secret.clone()));
    assert_eq!(p2.shared_secret(p1.id()).await, Some(p2_secret));
    p1_secret
}

#[tokio::test]
async fn test_public_key_exchange_without_exchange_key_fails() {
    let relay = MemoryRelay::new();
    let (p1, _) = started_client(&relay, "device-x").await;

    let err = p1
        .send_public_key_exchange(&PeerId::new("somebody"), false, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no exchange key"));
}

#[tokio::test]
async fn test_mutual_long_term_key_exchange() {
    let relay = MemoryRelay::new();
    let (p1, p1_device) = started_client(&relay, "device-p1").await;
    let (p2, p2_device) = started_client(&relay, "device-p2").await;
    link(&p1, &p2).await;

    exchange_long_term_keys(&p1, &p1_device, &p2, &p2_device, &exchange_key_hex(0x11)).await;
}

#[tokio::test]
async fn test_shared_secret_established_on_both_sides() {
    let relay = MemoryRelay::new();
    let (p1, p1_device) = started_client(&relay, "device-p1").await;
    let (p2, p2_device) = started_client(&relay, "device-p2").await;
    link(&p1, &p2).await;

    exchange_long_term_keys(&p1, &p1_device, &p2, &p2_device, &exchange_key_hex(0x22)).await;
    establish_shared_secret(&p1, &p2).await;
}

#[tokio::test]
async fn test_group_key_round_trip() {
    let relay = MemoryRelay::new();
    let (p1, p1_device) = started_client(&relay, "device-p1").await;
    let (p2, p2_device) = started_client(&relay, "device-p2").await;
    link(&p1, &p2).await;

    exchange_long_term_keys(&p1, &p1_device, &p2, &p2_device, &exchange_key_hex(0x33)).await;
    establish_shared_secret(&p1, &p2).await;

    let mut p2_events = p2.subscribe_events();
    let group_key = b"sixteen byte key".to_vec();
    p1.send_group_key(p2.id(), &group_key).await.unwrap();

    let event = wait_for(&mut p2_events, |e| {
        matches!(e, ClientEvent::GroupKeyReceived { .. })
    })
    .await;
    assert_eq!(
        event,
        ClientEvent::GroupKeyReceived {
            peer: p1.id().clone(),
            key: group_key.clone(),
        }
    );
    assert_eq!(p2.group_key(p1.id()).await, Some(group_key));
}

#[tokio::test]
async fn test_concurrent_pairings_stay_isolated() {
    let relay = MemoryRelay::new();
    let (p1, p1_device) = started_client(&relay, "device-p1").await;
    let (p2, p2_device) = started_client(&relay, "device-p2").await;
    let (p3, p3_device) = started_client(&relay, "device-p3").await;
    link(&p1, &p2).await;
    link(&p1, &p3).await;

    exchange_long_term_keys(&p1, &p1_device, &p2, &p2_device, &exchange_key_hex(0x44)).await;
    exchange_long_term_keys(&p1, &p1_device, &p3, &p3_device, &exchange_key_hex(0x55)).await;

    // Kick off both handshakes before either completes; each peer's
    // session must keep its own ephemeral material.
    let mut p1_events = p1.subscribe_events();
    p1.send_ephemeral_key_exchange(p2.id(), false).await.unwrap();
    p1.send_ephemeral_key_exchange(p3.id(), false).await.unwrap();

    let mut established = 0;
    while established < 2 {
        if let ClientEvent::SharedSecretEstablished { .. } =
            wait_for(&mut p1_events, is_shared_secret).await
        {
            established += 1;
        }
    }

    let with_p2 = p1.shared_secret(p2.id()).await.unwrap();
    let with_p3 = p1.shared_secret(p3.id()).await.unwrap();

    assert_eq!(Some(with_p2.clone()), p2.shared_secret(p1.id()).await);
    assert_eq!(Some(with_p3.clone()), p3.shared_secret(p1.id()).await);
    assert_ne!(
        with_p2, with_p3,
        "each pairing must derive from its own ephemeral keys"
    );
}

#[tokio::test]
async fn test_start_fails_when_relay_refuses() {
    let relay = MemoryRelay::new();
    relay.refuse_connections(true);

    let device = new_device();
    let client = Client::new(
        Some(PeerId::new("lonely")),
        Config::default(),
        Arc::new(MemoryTransport::new(relay)),
        Arc::new(MemoryDeviceStore::new(device)),
        Arc::new(StandardCrypto::new()),
    )
    .unwrap();

    let err = client.start().await.unwrap_err();
    assert!(err.to_string().contains("connection failed"));
}

#[tokio::test]
async fn test_generated_id_when_none_supplied() {
    let relay = MemoryRelay::new();
    let client = Client::new(
        None,
        Config::default(),
        Arc::new(MemoryTransport::new(relay)),
        Arc::new(MemoryDeviceStore::new(new_device())),
        Arc::new(StandardCrypto::new()),
    )
    .unwrap();
    assert!(!client.id().is_empty());
}

#[tokio::test]
async fn test_elect_master_through_client() {
    let relay = MemoryRelay::new();
    let (p1, _) = started_client(&relay, "bbb").await;

    let master = p1.elect_master(&[PeerId::new("ccc"), PeerId::new("aaa")]);
    assert_eq!(master, PeerId::new("aaa"));
    assert_eq!(p1.elect_master(&[]), *p1.id());
}
