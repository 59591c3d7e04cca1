//! End-to-end scenarios driving a real `Server` over loopback TCP through
//! the public `Client` API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ribcage::client::{Client, Event};
use ribcage::server::Server;

const POLL: Duration = Duration::from_secs(2);

fn start_server(grace: Duration) -> (String, Arc<AtomicBool>, std::thread::JoinHandle<()>) {
    let running = Arc::new(AtomicBool::new(true));
    let server = Server::bind_with_grace("127.0.0.1:0", grace, Arc::clone(&running)).unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let handle = std::thread::spawn(move || server.run());
    (addr, running, handle)
}

fn stop_server(running: Arc<AtomicBool>, handle: std::thread::JoinHandle<()>) {
    running.store(false, Ordering::Relaxed);
    handle.join().unwrap();
}

fn expect_queue_list(client: &Client, want: &[&str]) {
    loop {
        match client.poll_event(POLL) {
            Some(Event::QueueList(names)) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                if names == want {
                    return;
                }
            }
            Some(_) => continue,
            None => panic!("timed out waiting for QueueList {want:?}"),
        }
    }
}

#[test]
fn create_and_list() {
    let (addr, running, handle) = start_server(Duration::from_secs(30));

    let alice = Client::connect(&addr, "alice").unwrap();
    expect_queue_list(&alice, &[]);

    alice.create_queue("jobs").unwrap();
    assert!(matches!(
        alice.poll_event(POLL),
        Some(Event::StatusUpdate(s)) if s == "OK"
    ));
    expect_queue_list(&alice, &["jobs"]);

    stop_server(running, handle);
}

#[test]
fn publish_before_subscribe_retains() {
    let (addr, running, handle) = start_server(Duration::from_secs(30));

    let alice = Client::connect(&addr, "alice").unwrap();
    expect_queue_list(&alice, &[]);
    alice.create_queue("q").unwrap();
    let _ = alice.poll_event(POLL); // PC OK
    expect_queue_list(&alice, &["q"]);

    alice.publish("q", 60, b"hello").unwrap();
    assert!(matches!(
        alice.poll_event(POLL),
        Some(Event::StatusUpdate(s)) if s == "OK"
    ));

    let bob = Client::connect(&addr, "bob").unwrap();
    expect_queue_list(&bob, &["q"]);
    bob.subscribe("q").unwrap();
    assert!(matches!(
        bob.poll_event(POLL),
        Some(Event::StatusUpdate(s)) if s == "OK"
    ));
    match bob.poll_event(POLL) {
        Some(Event::BatchMessages { source, items }) => {
            assert_eq!(source, "q");
            assert_eq!(items, vec![b"hello".to_vec()]);
        }
        other => panic!("expected BatchMessages, got {other:?}"),
    }

    stop_server(running, handle);
}

#[test]
fn publish_with_subscribers_multicasts() {
    let (addr, running, handle) = start_server(Duration::from_secs(30));

    let alice = Client::connect(&addr, "alice").unwrap();
    expect_queue_list(&alice, &[]);
    alice.create_queue("q").unwrap();
    let _ = alice.poll_event(POLL);
    expect_queue_list(&alice, &["q"]);

    let bob = Client::connect(&addr, "bob").unwrap();
    expect_queue_list(&bob, &["q"]);
    bob.subscribe("q").unwrap();
    let _ = bob.poll_event(POLL); // SS OK

    alice.publish("q", 60, b"msg2").unwrap();
    assert!(matches!(
        alice.poll_event(POLL),
        Some(Event::StatusUpdate(s)) if s == "OK"
    ));
    match bob.poll_event(POLL) {
        Some(Event::Message { source, text }) => {
            assert_eq!(source, "q");
            assert_eq!(text, b"msg2");
        }
        other => panic!("expected Message, got {other:?}"),
    }

    stop_server(running, handle);
}

#[test]
fn delete_notifies_subscribers() {
    let (addr, running, handle) = start_server(Duration::from_secs(30));

    let alice = Client::connect(&addr, "alice").unwrap();
    expect_queue_list(&alice, &[]);
    alice.create_queue("q").unwrap();
    let _ = alice.poll_event(POLL);
    expect_queue_list(&alice, &["q"]);

    let bob = Client::connect(&addr, "bob").unwrap();
    expect_queue_list(&bob, &["q"]);
    bob.subscribe("q").unwrap();
    let _ = bob.poll_event(POLL);

    let carol = Client::connect(&addr, "carol").unwrap();
    expect_queue_list(&carol, &["q"]);
    carol.subscribe("q").unwrap();
    let _ = carol.poll_event(POLL);

    alice.delete_queue("q").unwrap();
    assert!(matches!(
        alice.poll_event(POLL),
        Some(Event::StatusUpdate(s)) if s == "OK"
    ));

    assert_eq!(
        bob.poll_event(POLL),
        Some(Event::QueueDeleted("q".to_string()))
    );
    assert_eq!(
        carol.poll_event(POLL),
        Some(Event::QueueDeleted("q".to_string()))
    );
    expect_queue_list(&bob, &[]);
    expect_queue_list(&carol, &[]);

    stop_server(running, handle);
}

#[test]
fn ttl_eviction_suppresses_empty_replay() {
    let (addr, running, handle) = start_server(Duration::from_secs(30));

    let alice = Client::connect(&addr, "alice").unwrap();
    expect_queue_list(&alice, &[]);
    alice.create_queue("q").unwrap();
    let _ = alice.poll_event(POLL);
    expect_queue_list(&alice, &["q"]);

    alice.publish("q", 1, b"short-lived").unwrap();
    let _ = alice.poll_event(POLL);

    std::thread::sleep(Duration::from_secs(2));

    let dana = Client::connect(&addr, "dana").unwrap();
    expect_queue_list(&dana, &["q"]);
    dana.subscribe("q").unwrap();
    assert!(matches!(
        dana.poll_event(POLL),
        Some(Event::StatusUpdate(s)) if s == "OK"
    ));
    // No retained message survives: the next event must not be a replay.
    assert_eq!(dana.poll_event(Duration::from_millis(500)), None);

    stop_server(running, handle);
}

#[test]
fn reconnect_within_grace_preserves_subscription() {
    let (addr, running, handle) = start_server(Duration::from_secs(30));

    {
        let alice = Client::connect(&addr, "alice").unwrap();
        expect_queue_list(&alice, &[]);
        alice.create_queue("q").unwrap();
        let _ = alice.poll_event(POLL);
        expect_queue_list(&alice, &["q"]);
        alice.subscribe("q").unwrap();
        let _ = alice.poll_event(POLL);
        // Drop the connection without logging out.
    }

    std::thread::sleep(Duration::from_millis(200));

    let alice2 = Client::connect(&addr, "alice").unwrap();
    loop {
        match alice2.poll_event(POLL) {
            Some(Event::StatusUpdate(s)) if s == "OK:RECONNECTED" => break,
            Some(_) => continue,
            None => panic!("timed out waiting for reconnect ack"),
        }
    }

    let bob = Client::connect(&addr, "bob").unwrap();
    expect_queue_list(&bob, &["q"]);
    bob.publish("q", 60, b"after-reconnect").unwrap();
    let _ = bob.poll_event(POLL);

    loop {
        match alice2.poll_event(POLL) {
            Some(Event::Message { source, text }) => {
                assert_eq!(source, "q");
                assert_eq!(text, b"after-reconnect");
                break;
            }
            Some(_) => continue,
            None => panic!("alice never received post-reconnect publish"),
        }
    }

    stop_server(running, handle);
}

#[test]
fn duplicate_login_is_refused() {
    let (addr, running, handle) = start_server(Duration::from_secs(30));

    let alice = Client::connect(&addr, "alice").unwrap();
    expect_queue_list(&alice, &[]);

    let second = std::net::TcpStream::connect(&addr).unwrap();
    let mut second = second;
    ribcage::protocol::write_frame(&mut second, ribcage::protocol::message_type::LOGIN, b"alice")
        .unwrap();
    let reply = ribcage::protocol::read_frame(&mut second).unwrap();
    assert_eq!(reply.kind, ribcage::protocol::message_type::LOGIN);
    assert_eq!(reply.payload, b"ER:ID_TAKEN");

    // Alice's own connection is unaffected: she can still act.
    alice.create_queue("still-alive").unwrap();
    assert!(matches!(
        alice.poll_event(POLL),
        Some(Event::StatusUpdate(s)) if s == "OK"
    ));

    stop_server(running, handle);
}

#[test]
fn oversized_payload_is_rejected_and_tears_down() {
    let (addr, running, handle) = start_server(Duration::from_secs(30));

    let mut stream = std::net::TcpStream::connect(&addr).unwrap();
    ribcage::protocol::write_frame(&mut stream, ribcage::protocol::message_type::LOGIN, b"eve")
        .unwrap();
    let reply = ribcage::protocol::read_frame(&mut stream).unwrap();
    assert_eq!(reply.payload, b"OK:LOGGED");
    let _initial_catalog = ribcage::protocol::read_frame(&mut stream).unwrap();

    // Hand-craft an oversized header without sending the declared payload.
    use std::io::Write;
    let mut header = Vec::new();
    header.push(b'P');
    header.push(b'B');
    header.extend_from_slice(&(ribcage::protocol::MAX_PAYLOAD + 1).to_be_bytes());
    stream.write_all(&header).unwrap();

    let reply = ribcage::protocol::read_frame(&mut stream).unwrap();
    assert_eq!(reply.kind, ribcage::protocol::message_type::PUBLISH);
    assert_eq!(reply.payload, b"ER:MSG_TOO_BIG");

    stop_server(running, handle);
}
