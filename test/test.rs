// Copyright 2016 Benoît Labaere (benoit.labaere@gmail.com)
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

#[macro_use]
extern crate log;
extern crate env_logger;
extern crate gridmq;

use std::io;
use std::time;
use std::thread;

use gridmq::*;

fn sleep_ms(ms: u64) {
    thread::sleep(time::Duration::from_millis(ms));
}

#[test]
fn test_pipeline_connected_to_bound() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut pull = session.create_socket(SocketType::Pull).unwrap();
    let mut push = session.create_socket(SocketType::Push).unwrap();

    pull.set_recv_timeout(time::Duration::from_millis(2000)).unwrap();
    push.set_send_timeout(time::Duration::from_millis(2000)).unwrap();
    pull.bind("tcp://127.0.0.1:5454").unwrap();
    push.connect("tcp://127.0.0.1:5454").unwrap();

    let sent = vec![65, 66, 67];
    push.send(sent).unwrap();
    let received = pull.recv().unwrap();

    assert_eq!(vec![65, 66, 67], received)
}

#[test]
fn test_pipeline_bound_to_connected() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut pull = session.create_socket(SocketType::Pull).unwrap();
    let mut push = session.create_socket(SocketType::Push).unwrap();

    pull.set_recv_timeout(time::Duration::from_millis(2000)).unwrap();
    push.set_send_timeout(time::Duration::from_millis(2000)).unwrap();
    push.bind("tcp://127.0.0.1:5455").unwrap();
    pull.connect("tcp://127.0.0.1:5455").unwrap();

    let sent = vec![65, 66, 67];
    push.send(sent).unwrap();
    let received = pull.recv().unwrap();

    assert_eq!(vec![65, 66, 67], received)
}

#[test]
fn test_send_while_not_connected() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut push = session.create_socket(SocketType::Push).unwrap();
    let mut pull = session.create_socket(SocketType::Pull).unwrap();
    let timeout = time::Duration::from_millis(2000);

    let recver = thread::spawn(move || {
        sleep_ms(50);
        pull.set_recv_timeout(time::Duration::from_millis(2000)).unwrap();
        pull.connect("tcp://127.0.0.1:5456").unwrap();
        let received = pull.recv().unwrap();
        assert_eq!(vec![65, 66, 67], received)
    });

    push.set_send_timeout(timeout).unwrap();
    push.bind("tcp://127.0.0.1:5456").unwrap();
    push.send(vec![65, 66, 67]).unwrap();
    info!("test_send_while_not_connected: msg sent");

    recver.join().unwrap();
}

#[test]
fn test_send_timeout() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut push = session.create_socket(SocketType::Push).unwrap();
    let timeout = time::Duration::from_millis(50);

    push.bind("tcp://127.0.0.1:5457").unwrap();
    push.set_send_timeout(timeout).unwrap();

    let err = push.send(vec![65, 66, 67]).unwrap_err();

    assert_eq!(io::ErrorKind::TimedOut, err.kind());
}

#[test]
fn test_recv_timeout() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut pull = session.create_socket(SocketType::Pull).unwrap();
    let mut push = session.create_socket(SocketType::Push).unwrap();
    let timeout = time::Duration::from_millis(50);

    pull.set_recv_timeout(timeout).unwrap();
    pull.bind("tcp://127.0.0.1:5459").unwrap();
    push.connect("tcp://127.0.0.1:5459").unwrap();

    let err = pull.recv().unwrap_err();

    assert_eq!(io::ErrorKind::TimedOut, err.kind());
}

#[test]
fn test_pair_connected_to_bound() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();

    bound.set_recv_timeout(time::Duration::from_millis(2000)).unwrap();
    bound.bind("tcp://127.0.0.1:5460").unwrap();

    connected.set_send_timeout(time::Duration::from_millis(2000)).unwrap();
    connected.connect("tcp://127.0.0.1:5460").unwrap();

    let sent = vec![65, 66, 67];
    connected.send(sent).unwrap();
    let received = bound.recv().unwrap();

    assert_eq!(vec![65, 66, 67], received)
}

#[test]
fn test_pair_both_directions() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();
    let timeout = time::Duration::from_millis(2000);

    bound.set_recv_timeout(timeout).unwrap();
    bound.set_send_timeout(timeout).unwrap();
    bound.bind("tcp://127.0.0.1:5461").unwrap();

    connected.set_recv_timeout(timeout).unwrap();
    connected.set_send_timeout(timeout).unwrap();
    connected.connect("tcp://127.0.0.1:5461").unwrap();

    connected.send(vec![1]).unwrap();
    assert_eq!(vec![1], bound.recv().unwrap());

    bound.send(vec![2]).unwrap();
    assert_eq!(vec![2], connected.recv().unwrap());
}

#[test]
fn test_pair_over_inproc() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();
    let timeout = time::Duration::from_millis(2000);

    bound.set_recv_timeout(timeout).unwrap();
    bound.bind("inproc://pair-test").unwrap();

    connected.set_send_timeout(timeout).unwrap();
    connected.connect("inproc://pair-test").unwrap();

    connected.send(b"hello".to_vec()).unwrap();
    assert_eq!(b"hello".to_vec(), bound.recv().unwrap());
}

#[test]
fn test_pair_over_ipc() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();
    let timeout = time::Duration::from_millis(2000);
    let path = format!("/tmp/gridmq-test-{}.ipc", ::std::process::id());

    let _ = ::std::fs::remove_file(&path);

    bound.set_recv_timeout(timeout).unwrap();
    bound.bind(&format!("ipc://{}", path)).unwrap();

    connected.set_send_timeout(timeout).unwrap();
    connected.connect(&format!("ipc://{}", path)).unwrap();

    connected.send(vec![6, 7, 8]).unwrap();
    assert_eq!(vec![6, 7, 8], bound.recv().unwrap());

    drop(bound);
    drop(connected);
    let _ = ::std::fs::remove_file(&path);
}

#[test]
fn test_pair_over_websocket() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();
    let timeout = time::Duration::from_millis(3000);

    bound.set_recv_timeout(timeout).unwrap();
    bound.set_send_timeout(timeout).unwrap();
    bound.bind("ws://127.0.0.1:5462/echo").unwrap();

    connected.set_recv_timeout(timeout).unwrap();
    connected.set_send_timeout(timeout).unwrap();
    connected.connect("ws://127.0.0.1:5462/echo").unwrap();

    // Five UTF-8 bytes, four characters.
    connected.send("café".as_bytes().to_vec()).unwrap();
    assert_eq!("café".as_bytes().to_vec(), bound.recv().unwrap());

    bound.send(vec![1, 2, 3]).unwrap();
    assert_eq!(vec![1, 2, 3], connected.recv().unwrap());
}

#[test]
fn test_req_rep() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut rep = session.create_socket(SocketType::Rep).unwrap();
    let mut req = session.create_socket(SocketType::Req).unwrap();
    let timeout = time::Duration::from_millis(2000);

    rep.set_recv_timeout(timeout).unwrap();
    rep.set_send_timeout(timeout).unwrap();
    rep.bind("tcp://127.0.0.1:5463").unwrap();

    req.set_recv_timeout(timeout).unwrap();
    req.set_send_timeout(timeout).unwrap();
    req.connect("tcp://127.0.0.1:5463").unwrap();

    req.send(b"ping".to_vec()).unwrap();
    let request = rep.recv().unwrap();
    assert_eq!(b"ping".to_vec(), request);

    rep.send(b"pong".to_vec()).unwrap();
    let reply = req.recv().unwrap();
    assert_eq!(b"pong".to_vec(), reply);
}

#[test]
fn test_req_resends_when_the_peer_disappears() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut req = session.create_socket(SocketType::Req).unwrap();
    let timeout = time::Duration::from_millis(5000);

    req.set_recv_timeout(timeout).unwrap();
    req.set_send_timeout(timeout).unwrap();
    req.set_option(SocketOption::ResendInterval(time::Duration::from_millis(100))).unwrap();
    req.connect("tcp://127.0.0.1:5464").unwrap();

    // The request is accepted while no peer exists yet and dispatched
    // once the replier shows up.
    req.send(b"late ping".to_vec()).unwrap();

    let replier = thread::spawn(move || {
        let session = Session::new().unwrap();
        let mut rep = session.create_socket(SocketType::Rep).unwrap();
        rep.set_recv_timeout(time::Duration::from_millis(5000)).unwrap();
        rep.bind("tcp://127.0.0.1:5464").unwrap();
        let request = rep.recv().unwrap();
        assert_eq!(b"late ping".to_vec(), request);
        rep.send(b"late pong".to_vec()).unwrap();
        // Give the reply a chance to reach the wire before closing.
        sleep_ms(200);
    });

    assert_eq!(b"late pong".to_vec(), req.recv().unwrap());
    replier.join().unwrap();
}

#[test]
fn test_req_recv_before_send_is_a_state_error() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut req = session.create_socket(SocketType::Req).unwrap();

    let err = req.try_recv().unwrap_err();
    assert_eq!(io::ErrorKind::Other, err.kind());
}

#[test]
fn test_rep_send_before_recv_is_a_state_error() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut rep = session.create_socket(SocketType::Rep).unwrap();

    let err = rep.try_send(vec![1]).unwrap_err();
    assert_eq!(io::ErrorKind::Other, err.kind());
}

#[test]
fn test_sub_filters_by_topic() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut publisher = session.create_socket(SocketType::Pub).unwrap();
    let mut subscriber = session.create_socket(SocketType::Sub).unwrap();
    let timeout = time::Duration::from_millis(2000);

    publisher.bind("tcp://127.0.0.1:5465").unwrap();

    subscriber.set_recv_timeout(timeout).unwrap();
    subscriber.subscribe("AB").unwrap();
    subscriber.connect("tcp://127.0.0.1:5465").unwrap();

    // Let the subscription land before publishing.
    sleep_ms(250);

    publisher.send(b"A".to_vec()).unwrap();
    publisher.send(b"AB".to_vec()).unwrap();
    publisher.send(b"C".to_vec()).unwrap();
    publisher.send(b"ABCDE".to_vec()).unwrap();

    assert_eq!(b"AB".to_vec(), subscriber.recv().unwrap());
    assert_eq!(b"ABCDE".to_vec(), subscriber.recv().unwrap());
    assert_eq!(io::ErrorKind::TimedOut, subscriber.recv().unwrap_err().kind());
}

#[test]
fn test_empty_subscription_matches_everything() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut publisher = session.create_socket(SocketType::Pub).unwrap();
    let mut subscriber = session.create_socket(SocketType::Sub).unwrap();
    let timeout = time::Duration::from_millis(2000);

    publisher.bind("inproc://all-topics").unwrap();

    subscriber.set_recv_timeout(timeout).unwrap();
    subscriber.subscribe("AB").unwrap();
    subscriber.subscribe("").unwrap();
    subscriber.connect("inproc://all-topics").unwrap();

    publisher.send(b"A".to_vec()).unwrap();
    publisher.send(b"AB".to_vec()).unwrap();
    publisher.send(b"C".to_vec()).unwrap();
    publisher.send(b"ABCDE".to_vec()).unwrap();

    assert_eq!(b"A".to_vec(), subscriber.recv().unwrap());
    assert_eq!(b"AB".to_vec(), subscriber.recv().unwrap());
    assert_eq!(b"C".to_vec(), subscriber.recv().unwrap());
    assert_eq!(b"ABCDE".to_vec(), subscriber.recv().unwrap());
}

#[test]
fn test_survey_roundtrip() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut surveyor = session.create_socket(SocketType::Surveyor).unwrap();
    let mut respondent = session.create_socket(SocketType::Respondent).unwrap();
    let timeout = time::Duration::from_millis(2000);

    surveyor.set_recv_timeout(timeout).unwrap();
    surveyor.set_send_timeout(timeout).unwrap();
    surveyor.set_option(SocketOption::SurveyDeadline(time::Duration::from_millis(1000))).unwrap();
    surveyor.bind("tcp://127.0.0.1:5466").unwrap();

    respondent.set_recv_timeout(timeout).unwrap();
    respondent.set_send_timeout(timeout).unwrap();
    respondent.connect("tcp://127.0.0.1:5466").unwrap();

    // The survey is fanned out to connected respondents only.
    sleep_ms(250);

    surveyor.send(b"are you there".to_vec()).unwrap();
    assert_eq!(b"are you there".to_vec(), respondent.recv().unwrap());

    respondent.send(b"i am".to_vec()).unwrap();
    assert_eq!(b"i am".to_vec(), surveyor.recv().unwrap());
}

#[test]
fn test_survey_deadline_expires() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut surveyor = session.create_socket(SocketType::Surveyor).unwrap();
    let mut respondent = session.create_socket(SocketType::Respondent).unwrap();
    let timeout = time::Duration::from_millis(3000);

    surveyor.set_recv_timeout(timeout).unwrap();
    surveyor.set_send_timeout(timeout).unwrap();
    surveyor.set_option(SocketOption::SurveyDeadline(time::Duration::from_millis(100))).unwrap();
    surveyor.bind("tcp://127.0.0.1:5467").unwrap();

    respondent.set_recv_timeout(timeout).unwrap();
    respondent.connect("tcp://127.0.0.1:5467").unwrap();

    sleep_ms(250);

    surveyor.send(b"anyone".to_vec()).unwrap();
    // Nobody answers: the deadline fires and the receive reports it.
    let err = surveyor.recv().unwrap_err();
    assert_eq!(io::ErrorKind::TimedOut, err.kind());
}

#[test]
fn test_inproc_admission_control() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();

    // A buffer this small admits one message at a time, whatever its
    // size.
    bound.set_option(SocketOption::RecvBuffer(1)).unwrap();
    bound.set_recv_timeout(time::Duration::from_millis(2000)).unwrap();
    bound.bind("inproc://tiny-buffer").unwrap();
    connected.connect("inproc://tiny-buffer").unwrap();

    connected.try_send(vec![1]).unwrap();

    let err = connected.try_send(vec![2]).unwrap_err();
    assert_eq!(io::ErrorKind::WouldBlock, err.kind());

    assert_eq!(vec![1], bound.recv().unwrap());
    connected.try_send(vec![2]).unwrap();
    assert_eq!(vec![2], bound.recv().unwrap());
}

#[test]
fn test_zero_length_message() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();
    let timeout = time::Duration::from_millis(2000);

    bound.set_recv_timeout(timeout).unwrap();
    bound.bind("tcp://127.0.0.1:5468").unwrap();

    connected.set_send_timeout(timeout).unwrap();
    connected.connect("tcp://127.0.0.1:5468").unwrap();

    connected.send(Vec::new()).unwrap();
    assert_eq!(0, bound.recv().unwrap().len());
}

#[test]
fn test_recv_max_size_boundary() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();
    let timeout = time::Duration::from_millis(2000);

    bound.set_option(SocketOption::RecvMaxSize(Some(64))).unwrap();
    bound.set_recv_timeout(timeout).unwrap();
    bound.bind("tcp://127.0.0.1:5469").unwrap();

    connected.set_send_timeout(timeout).unwrap();
    connected.connect("tcp://127.0.0.1:5469").unwrap();

    // Exactly at the limit: accepted.
    connected.send(vec![7; 64]).unwrap();
    assert_eq!(64, bound.recv().unwrap().len());

    // One byte over: the session fails and the message never arrives.
    connected.send(vec![7; 65]).unwrap();
    let err = bound.recv().unwrap_err();
    assert_eq!(io::ErrorKind::TimedOut, err.kind());
}

#[test]
fn test_inproc_name_already_in_use() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut first = session.create_socket(SocketType::Pair).unwrap();
    let mut second = session.create_socket(SocketType::Pair).unwrap();

    first.bind("inproc://taken").unwrap();
    let err = second.bind("inproc://taken").unwrap_err();

    assert_eq!(io::ErrorKind::AddrInUse, err.kind());
}

#[test]
fn test_unknown_scheme_is_rejected() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut socket = session.create_socket(SocketType::Pair).unwrap();

    assert!(socket.bind("carrier-pigeon://loft").is_err());
    assert!(socket.connect("carrier-pigeon://loft").is_err());
}

#[test]
fn test_endpoint_shutdown() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();
    let timeout = time::Duration::from_millis(2000);

    bound.set_recv_timeout(timeout).unwrap();
    bound.bind("tcp://127.0.0.1:5470").unwrap();

    connected.set_send_timeout(timeout).unwrap();
    let endpoint = connected.connect("tcp://127.0.0.1:5470").unwrap();

    connected.send(vec![1]).unwrap();
    assert_eq!(vec![1], bound.recv().unwrap());

    endpoint.shutdown().unwrap();
    sleep_ms(100);

    // With the only endpoint gone, sending blocks until it times out.
    connected.set_send_timeout(time::Duration::from_millis(100)).unwrap();
    let err = connected.send(vec![2]).unwrap_err();
    assert_eq!(io::ErrorKind::TimedOut, err.kind());
}

#[test]
fn test_terminate_wakes_blocked_recv() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut pull = session.create_socket(SocketType::Pull).unwrap();

    pull.bind("tcp://127.0.0.1:5471").unwrap();

    let blocked = thread::spawn(move || {
        pull.recv().unwrap_err()
    });

    sleep_ms(100);
    session.terminate();

    let err = blocked.join().unwrap();
    assert_eq!(io::ErrorKind::Other, err.kind());
}

#[test]
fn test_reconnect_after_the_listener_appears() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();
    let timeout = time::Duration::from_millis(5000);

    connected.set_send_timeout(timeout).unwrap();
    connected.set_option(SocketOption::ReconnectInterval(time::Duration::from_millis(50))).unwrap();
    connected.set_option(SocketOption::ReconnectIntervalMax(time::Duration::from_millis(200))).unwrap();

    // Nobody listens yet; the endpoint keeps retrying with backoff.
    connected.connect("tcp://127.0.0.1:5472").unwrap();
    sleep_ms(300);

    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    bound.set_recv_timeout(timeout).unwrap();
    bound.bind("tcp://127.0.0.1:5472").unwrap();

    connected.send(b"finally".to_vec()).unwrap();
    assert_eq!(b"finally".to_vec(), bound.recv().unwrap());
}

#[test]
fn test_socket_table_saturation() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut sockets = Vec::new();

    for _ in 0..512 {
        sockets.push(session.create_socket(SocketType::Pair).unwrap());
    }
    assert!(session.create_socket(SocketType::Pair).is_err());

    sockets.pop();
    assert!(session.create_socket(SocketType::Pair).is_ok());
}

#[test]
fn test_pub_does_not_block_on_slow_subscriber() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut publisher = session.create_socket(SocketType::Pub).unwrap();
    let mut subscriber = session.create_socket(SocketType::Sub).unwrap();

    subscriber.set_option(SocketOption::RecvBuffer(16)).unwrap();
    subscriber.subscribe("").unwrap();
    subscriber.set_recv_timeout(time::Duration::from_millis(2000)).unwrap();

    publisher.bind("inproc://firehose").unwrap();
    subscriber.connect("inproc://firehose").unwrap();

    // Far more than the subscriber buffer admits; the publisher must
    // never block, the excess is dropped.
    for i in 0..100 {
        publisher.try_send(vec![i as u8; 32]).unwrap();
    }

    // At least the first message got through.
    assert_eq!(32, subscriber.recv().unwrap().len());
}
