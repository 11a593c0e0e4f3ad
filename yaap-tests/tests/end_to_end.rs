use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use yaap_client::{ClientError, YaapClient};
use yaap_protocol::{Code, MethodCall, payload::PayloadReader, payload::PayloadWriter};
use yaap_server::hal::LockChange;
use yaap_server::server::{Builder, Shutdown};
use yaap_tests::TestServer;

/// Whether the server closed `stream` instead of answering.
fn closed_by_server(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    match stream.read(&mut buf) {
        Ok(0) => true,
        Ok(_) => false,
        Err(err) => !matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn second_client_sees_lock_holder() {
    let server = TestServer::with_defaults().await.unwrap();
    let addr = server.addr;
    let system = server.system.clone();
    tokio::task::spawn_blocking(move || {
        let mut alice = YaapClient::new(addr).unwrap();
        let mut bob = YaapClient::new(addr).unwrap();

        let lock_id = alice.lock("alice", "s3cr3t").unwrap();
        assert_ne!(lock_id, 0);
        assert_eq!(alice.lock("alice", "s3cr3t").unwrap(), lock_id);

        match bob.lock("bob", "x") {
            Err(ClientError::Rejected(entry)) => {
                assert_eq!(entry.code, Code::DEVICE_LOCKED);
                assert_eq!(entry.message, "alice");
            }
            other => panic!("expected DEVICE_LOCKED, got {:?}", other),
        }

        let jtag = alice.find("jtag").unwrap().unwrap();
        let reply = alice
            .call_by_name(jtag, "shiftIR", |args| {
                args.u32(8).bytes(&[0xAA]);
            })
            .unwrap();
        let mut out = PayloadReader::new(&reply.data);
        assert_eq!(out.bytes().unwrap(), &[0xAA]);
        assert!(out.is_empty());

        alice.unlock("alice", "s3cr3t").unwrap();
        let bob_id = bob.lock("bob", "x").unwrap();
        assert_ne!(bob_id, 0);
        assert_ne!(bob_id, lock_id);

        assert_eq!(
            system.changes(),
            vec![LockChange::Locked, LockChange::Unlocked, LockChange::Locked]
        );
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_call_aborts_rest_of_batch() {
    let server = TestServer::with_defaults().await.unwrap();
    let addr = server.addr;
    tokio::task::spawn_blocking(move || {
        let mut client = YaapClient::new(addr).unwrap();
        client.lock("carol", "pw").unwrap();
        let relay = client.find("relay0").unwrap().unwrap();
        let jtag = client.find("jtag").unwrap().unwrap();
        let set = client.method_id(relay, "set").unwrap();
        let get = client.method_id(relay, "get").unwrap();
        let shift_ir = client.method_id(jtag, "shiftIR").unwrap();

        let mut close = PayloadWriter::new();
        close.bool(true);
        let mut short_shift = PayloadWriter::new();
        short_shift.u32(16).bytes(&[0x01]);
        let mut open = PayloadWriter::new();
        open.bool(false);

        let response = client
            .execute(vec![
                MethodCall::new(relay, set, close.into_inner()),
                MethodCall::new(jtag, shift_ir, short_shift.into_inner()),
                MethodCall::new(relay, set, open.into_inner()),
            ])
            .unwrap();
        assert!(response.status.is_empty());
        assert_eq!(response.replies.len(), 2);
        assert_eq!(response.replies[0].code, Code::SUCCESS);
        assert_ne!(response.replies[1].code, Code::SUCCESS);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].code, Code::METHOD_ERROR);

        let reply = client.call(relay, get, |_| {}).unwrap();
        assert!(PayloadReader::new(&reply.data).bool().unwrap());
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_instance_keeps_connection_open() {
    let server = TestServer::with_defaults().await.unwrap();
    let addr = server.addr;
    tokio::task::spawn_blocking(move || {
        let mut client = YaapClient::new(addr).unwrap();
        let response = client
            .execute(vec![MethodCall::new(99, 0, Vec::<u8>::new())])
            .unwrap();
        assert!(response.replies.is_empty());
        assert_eq!(response.errors[0].code, Code::INVALID_INSTANCE_ID);
        assert_eq!(
            response.errors[0].message,
            "Bad instance ID (99) in method call 0"
        );

        let roots = client.root_members().unwrap();
        let names: Vec<_> = roots.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["device", "system", "jtag", "relay0"]);
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn idle_connection_is_evicted_once() {
    let builder = Builder::new().idle_timeout(Duration::from_millis(200));
    let server = TestServer::start(builder).await.unwrap();
    let addr = server.addr;
    let mut client = tokio::task::spawn_blocking(move || {
        let mut client = YaapClient::new(addr).unwrap();
        client.lock("dave", "pw").unwrap();
        client
    })
    .await
    .unwrap();

    let changes = server
        .wait_for_changes(2, Duration::from_secs(5))
        .await;
    assert_eq!(changes, vec![LockChange::Locked, LockChange::LockTimedOut]);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(server.system.changes().len(), 2);
    assert_eq!(server.system.mux().last(), Some(&false));

    tokio::task::spawn_blocking(move || {
        client.set_timeout(Some(Duration::from_secs(2))).unwrap();
        assert!(client.lock("dave", "pw").is_err());
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_request_closes_only_its_connection() {
    let builder = Builder::new().max_message_size(1024);
    let server = TestServer::start(builder).await.unwrap();
    let addr = server.addr;
    tokio::task::spawn_blocking(move || {
        let mut healthy = YaapClient::new(addr).unwrap();
        healthy.root_members().unwrap();

        let mut rogue = TcpStream::connect(addr).unwrap();
        rogue
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut header = Vec::new();
        for field in [0u32, 1, 0, 0, 4096] {
            header.extend_from_slice(&field.to_be_bytes());
        }
        rogue.write_all(&header).unwrap();
        assert!(closed_by_server(&mut rogue));

        assert_eq!(healthy.root_members().unwrap().len(), 4);
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn stalled_message_hits_deadline() {
    let builder = Builder::new().message_timeout(Duration::from_millis(200));
    let server = TestServer::start(builder).await.unwrap();
    let addr = server.addr;
    tokio::task::spawn_blocking(move || {
        let mut stalled = TcpStream::connect(addr).unwrap();
        stalled
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stalled.write_all(&[0, 0, 0, 0, 0, 0]).unwrap();
        assert!(closed_by_server(&mut stalled));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn device_reset_stops_server_after_reply() {
    let mut server = TestServer::resettable(Builder::new()).await.unwrap();
    let addr = server.addr;
    tokio::task::spawn_blocking(move || {
        let mut client = YaapClient::new(addr).unwrap();
        client.lock("erin", "pw").unwrap();
        let system = client.find("system").unwrap().unwrap();
        let reply = client.call_by_name(system, "deviceReset", |_| {}).unwrap();
        assert_eq!(reply.code, Code::SUCCESS);
    })
    .await
    .unwrap();

    let shutdown = tokio::time::timeout(Duration::from_secs(5), &mut server.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(shutdown, Shutdown::Reset);
    assert_eq!(server.system.resets(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn device_reset_without_capability_keeps_serving() {
    let server = TestServer::with_defaults().await.unwrap();
    let addr = server.addr;
    tokio::task::spawn_blocking(move || {
        let mut client = YaapClient::new(addr).unwrap();
        let lock_id = client.lock("erin", "pw").unwrap();
        let system = client.find("system").unwrap().unwrap();
        let reset = client.method_id(system, "deviceReset").unwrap();
        let response = client
            .execute(vec![MethodCall::new(system, reset, Vec::<u8>::new())])
            .unwrap();
        assert_eq!(response.replies.len(), 1);
        assert_eq!(response.replies[0].code, Code::NOT_IMPLEMENTED);
        assert_eq!(response.errors[0].code, Code::METHOD_ERROR);

        assert_eq!(client.root_members().unwrap().len(), 4);
        assert_eq!(client.lock("erin", "pw").unwrap(), lock_id);
    })
    .await
    .unwrap();
    assert!(!server.handle.is_finished());
    assert_eq!(server.system.resets(), 0);
}
