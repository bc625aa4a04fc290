use std::collections::VecDeque;

use embassy_futures::block_on;
use embassy_sync::channel::Channel;
use mqtts_node::inventory::{ACK_TOPIC, DATA_TOPIC, InventoryModule};
use mqtts_node::packet::{EncodePacket, Publish};
use mqtts_node::runtime::{MqttRuntime, PublishRequestChannel};
use mqtts_node::transport::{MqttTransport, TransportError};
use mqtts_node::{MqttClient, MqttError, MqttOptions, QoS};

#[derive(Debug, PartialEq)]
struct BrokerGone;

impl TransportError for BrokerGone {}

/// Plays back a scripted broker and records what the node sends.
struct ScriptedBroker {
    script: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
}

impl ScriptedBroker {
    fn new(script: Vec<Vec<u8>>) -> Self {
        Self {
            script: script.into(),
            sent: Vec::new(),
        }
    }
}

impl MqttTransport for ScriptedBroker {
    type Error = BrokerGone;

    async fn send(&mut self, buf: &[u8]) -> Result<(), BrokerGone> {
        self.sent.push(buf.to_vec());
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, BrokerGone> {
        let chunk = self.script.pop_front().ok_or(BrokerGone)?;
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

fn publish_frame(topic: &str, payload: &[u8], qos: QoS, packet_id: Option<u16>) -> Vec<u8> {
    let mut buf = vec![0u8; 256];
    let len = Publish {
        topic,
        qos,
        retain: false,
        payload,
        packet_id,
    }
    .encode(&mut buf)
    .unwrap();
    buf.truncate(len);
    buf
}

/// Reads the topic out of an outbound SUBSCRIBE/UNSUBSCRIBE/PUBLISH frame.
fn topic_of(frame: &[u8], after_header: usize) -> &str {
    let start = 2 + after_header;
    let len = u16::from_be_bytes([frame[start], frame[start + 1]]) as usize;
    std::str::from_utf8(&frame[start + 2..start + 2 + len]).unwrap()
}

#[test]
fn node_runs_its_topic_plan_and_decodes_records() {
    static REQUESTS: PublishRequestChannel<'static, 2> = Channel::new();

    let record = br#"{"Item":"Bolt","Qty":5,"Type":"Hardware"}"#;
    let broker = ScriptedBroker::new(vec![
        vec![0x20, 0x02, 0x00, 0x00],
        vec![0x90, 0x03, 0x00, 0x01, 0x00],
        vec![0x90, 0x03, 0x00, 0x02, 0x01],
        vec![0xB0, 0x02, 0x00, 0x03],
        publish_frame(DATA_TOPIC, b"not json", QoS::AtMostOnce, None),
        publish_frame(ACK_TOPIC, record, QoS::AtLeastOnce, Some(9)),
    ]);

    let options = MqttOptions::new("node-1").with_credentials("user", Some("secret"));
    let client = MqttClient::<_, 4, 512>::new(broker, options);
    let mut runtime = MqttRuntime::new(client, InventoryModule::new("node-1"), REQUESTS.receiver());

    let err = block_on(runtime.run()).unwrap_err();
    assert!(matches!(err, MqttError::Transport(BrokerGone)));

    let (client, module) = runtime.into_parts();
    let sent = &client.transport().sent;
    let kinds: Vec<u8> = sent.iter().map(|f| f[0]).collect();
    assert_eq!(kinds, [0x10, 0x82, 0x82, 0xA2, 0x30, 0x30, 0x40]);

    // SUBSCRIBE carries its packet id before the topic.
    assert_eq!(topic_of(&sent[1], 2), DATA_TOPIC);
    assert_eq!(*sent[1].last().unwrap(), 0);
    assert_eq!(topic_of(&sent[2], 2), ACK_TOPIC);
    assert_eq!(*sent[2].last().unwrap(), 1);
    assert_eq!(topic_of(&sent[3], 2), ACK_TOPIC);

    for publish in &sent[4..6] {
        assert_eq!(topic_of(publish, 0), DATA_TOPIC);
        assert!(publish.ends_with(b"data"));
    }
    assert_eq!(sent[6], [0x40, 0x02, 0x00, 0x09]);

    assert_eq!(module.received(), 2);
    assert_eq!(module.decode_failures(), 1);
    let last = module.last_record().unwrap();
    assert_eq!(last.item.as_str(), "Bolt");
    assert_eq!(last.qty, 5);
    assert_eq!(last.kind.as_str(), "Hardware");

    let active: Vec<_> = client.subscriptions().collect();
    assert_eq!(active, [(DATA_TOPIC, QoS::AtMostOnce)]);
}
