//! Unit tests for wf-channel.

use wf_core::{Coordinate, Millis, PositionFix, RoutePlan, SessionId, Step};
use wf_guidance::ProximityEngine;

use crate::{
    ChannelError, GuidanceChannel, GuidanceResponder, Inbound, LocationBook, LocationRelay,
    MemoryTransport, NavigationUpdate, ReconnectPolicy, Transport, UpdateStatus, to_line,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

const A: Coordinate = Coordinate { latitude: 39.9800, longitude: -75.1550 };
const B: Coordinate = Coordinate { latitude: 39.9810, longitude: -75.1550 };
const C: Coordinate = Coordinate { latitude: 39.9810, longitude: -75.1535 };
const D: Coordinate = Coordinate { latitude: 39.9820, longitude: -75.1535 };

fn step(instruction: &str, distance_m: f64, start: Coordinate, end: Coordinate) -> Step {
    Step { index: 0, instruction: instruction.into(), distance_m, duration_s: 60.0, start, end }
}

fn plan() -> RoutePlan {
    RoutePlan::new(
        vec![
            step("Head north on Broad St", 111.0, A, B),
            step("Turn right onto Main St.", 130.0, B, C),
            step("Turn left onto 5th Ave", 111.0, C, D),
        ],
        "City Hall",
        "0.2 mi",
        300.0,
    )
}

fn update(status: UpdateStatus, current_step: usize) -> NavigationUpdate {
    NavigationUpdate {
        status,
        current_step,
        total_steps:      3,
        instruction:      "Turn left onto 5th Ave".into(),
        distance_to_next: 111.0,
        should_announce:  true,
        announcement:     Some("Turn left onto 5th Ave".into()),
        message:          None,
    }
}

fn location(c: Coordinate) -> String {
    format!(r#"{{"latitude":{},"longitude":{}}}"#, c.latitude, c.longitude)
}

fn sid() -> SessionId {
    SessionId::new("a1b2c3d4-e5f6")
}

// ── Protocol ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod protocol {
    use super::*;

    #[test]
    fn parses_server_update() {
        let line = r#"{"status":"step_completed","current_step":2,"total_steps":3,
            "instruction":"Turn right onto Main St.","distance_to_next":130.0,
            "should_announce":true,"announcement":"Turn right onto Main St."}"#;
        let u = NavigationUpdate::parse(line).unwrap();
        assert_eq!(u.status, UpdateStatus::StepCompleted);
        assert_eq!(u.step_index(), 1);
        assert!(u.validate(3).is_ok());
    }

    #[test]
    fn unknown_status_is_malformed() {
        let line = r#"{"status":"teleported","current_step":1,"total_steps":3}"#;
        assert!(matches!(NavigationUpdate::parse(line), Err(ChannelError::MalformedUpdate(_))));
    }

    #[test]
    fn validation_rules() {
        assert!(update(UpdateStatus::Navigating, 0).validate(3).is_err());
        assert!(update(UpdateStatus::Navigating, 4).validate(3).is_err());
        assert!(update(UpdateStatus::Navigating, 3).validate(5).is_err());

        let mut silent = update(UpdateStatus::Navigating, 2);
        silent.announcement = Some("  ".into());
        assert!(silent.validate(3).is_err());
        silent.should_announce = false;
        assert!(silent.validate(3).is_ok());

        assert!(NavigationUpdate::error("boom").validate(3).is_ok());
    }

    #[test]
    fn location_message_is_one_line() {
        let fix = PositionFix::new(A, 5.0, 1_700);
        let line = to_line(&crate::LocationMessage::from(&fix)).unwrap();
        assert!(line.contains(r#""timestamp":1700"#));
        assert!(!line.contains('\n'));
    }
}

// ── GuidanceChannel ───────────────────────────────────────────────────────────

#[cfg(test)]
mod channel {
    use super::*;

    fn open_channel() -> (GuidanceChannel, crate::MemoryHandle) {
        let (t, h) = MemoryTransport::new();
        let mut ch = GuidanceChannel::new(Box::new(t), sid());
        ch.open().unwrap();
        (ch, h)
    }

    #[test]
    fn session_id_is_first_message() {
        let (mut ch, h) = open_channel();
        ch.send_fix(&PositionFix::new(A, 5.0, 10)).unwrap();
        let sent = h.sent();
        assert_eq!(sent[0], r#"{"session_id":"a1b2c3d4-e5f6"}"#);
        assert!(sent[1].contains(r#""latitude":39.98"#));
    }

    #[test]
    fn duplicate_update_is_reported_once() {
        let (mut ch, h) = open_channel();
        let line = to_line(&update(UpdateStatus::StepCompleted, 3)).unwrap();
        h.push(line.clone());
        h.push(line);

        assert!(matches!(ch.poll(3).unwrap(), Some(Inbound::Apply(_))));
        assert_eq!(ch.poll(3).unwrap(), Some(Inbound::Duplicate));
        assert_eq!(ch.poll(3).unwrap(), None);
    }

    #[test]
    fn older_update_after_newer_still_applies() {
        let (mut ch, h) = open_channel();
        h.push(to_line(&update(UpdateStatus::StepCompleted, 3)).unwrap());
        h.push(to_line(&update(UpdateStatus::StepCompleted, 2)).unwrap());
        let Some(Inbound::Apply(u)) = ch.poll(3).unwrap() else { panic!() };
        assert_eq!(u.current_step, 3);
        let Some(Inbound::Apply(u)) = ch.poll(3).unwrap() else { panic!() };
        assert_eq!(u.current_step, 2);
    }

    #[test]
    fn retransmitted_announcement_is_delivered_once() {
        let (mut ch, h) = open_channel();
        let completed = to_line(&update(UpdateStatus::StepCompleted, 2)).unwrap();
        let quiet = NavigationUpdate {
            should_announce: false,
            announcement:    None,
            ..update(UpdateStatus::Navigating, 2)
        };
        h.push(completed.clone());
        h.push(to_line(&quiet).unwrap());
        h.push(completed);

        let Some(Inbound::Apply(first)) = ch.poll(3).unwrap() else { panic!() };
        assert!(first.should_announce);
        assert!(matches!(ch.poll(3).unwrap(), Some(Inbound::Apply(_))));
        let Some(Inbound::Apply(again)) = ch.poll(3).unwrap() else { panic!() };
        assert_eq!(again.current_step, 2);
        assert!(!again.should_announce);

        ch.reset();
        h.push(to_line(&update(UpdateStatus::StepCompleted, 2)).unwrap());
        let Some(Inbound::Apply(fresh)) = ch.poll(3).unwrap() else { panic!() };
        assert!(fresh.should_announce);
    }

    #[test]
    fn malformed_and_error_updates_do_not_end_the_loop() {
        let (mut ch, h) = open_channel();
        h.push("not json");
        h.push(r#"{"status":"error","message":"no active navigation"}"#);
        h.push(to_line(&update(UpdateStatus::Navigating, 1)).unwrap());

        assert!(matches!(ch.poll(3).unwrap(), Some(Inbound::Malformed(_))));
        assert_eq!(
            ch.poll(3).unwrap(),
            Some(Inbound::RemoteError("no active navigation".into()))
        );
        assert!(matches!(ch.poll(3).unwrap(), Some(Inbound::Apply(_))));
    }

    #[test]
    fn peer_close_surfaces_as_closed() {
        let (mut ch, h) = open_channel();
        h.close_from_peer();
        assert!(matches!(ch.poll(3), Err(ChannelError::Closed)));
        assert!(!ch.is_open());
    }

    #[test]
    fn reset_forgets_last_update() {
        let (mut ch, h) = open_channel();
        let line = to_line(&update(UpdateStatus::Navigating, 1)).unwrap();
        h.push(line.clone());
        ch.poll(3).unwrap();
        ch.reset();
        h.push(line);
        assert!(matches!(ch.poll(3).unwrap(), Some(Inbound::Apply(_))));
    }

    #[test]
    fn failed_connect_is_an_error() {
        let (t, h) = MemoryTransport::new();
        h.fail_next_connects(1);
        let mut ch = GuidanceChannel::new(Box::new(t), sid());
        assert!(matches!(ch.open(), Err(ChannelError::Connect { .. })));
        assert!(ch.open().is_ok());
        assert_eq!(h.connects(), 2);
    }
}

// ── ReconnectPolicy ───────────────────────────────────────────────────────────

#[cfg(test)]
mod reconnect {
    use super::*;

    #[test]
    fn one_pending_attempt_at_a_time() {
        let mut p = ReconnectPolicy::new(5_000);
        assert_eq!(p.on_close(Millis(1_000)), Some(Millis(6_000)));
        assert_eq!(p.on_close(Millis(2_000)), None);
        assert!(p.begin_attempt());
        assert_eq!(p.on_close(Millis(6_000)), Some(Millis(11_000)));
    }

    #[test]
    fn cancel_suppresses_until_reset() {
        let mut p = ReconnectPolicy::new(5_000);
        p.on_close(Millis(0));
        p.cancel();
        assert!(!p.begin_attempt());
        assert_eq!(p.on_close(Millis(10)), None);
        p.reset();
        assert!(p.on_close(Millis(20)).is_some());
    }
}

// ── Relay ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod relay {
    use super::*;

    #[test]
    fn sends_session_and_counts_acks() {
        let (t, h) = MemoryTransport::new();
        let mut relay = LocationRelay::new(Box::new(t), sid());
        relay.open().unwrap();

        h.push(r#"{"status":"received","session_id":"a1b2c3d4-e5f6"}"#);
        relay.send_fix(&PositionFix::new(A, 4.0, 99)).unwrap();

        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains(r#""session_id":"a1b2c3d4-e5f6""#));
        assert!(sent[0].contains(r#""timestamp":99"#));
        assert_eq!((relay.sent(), relay.acked()), (1, 1));
    }

    #[test]
    fn book_records_latest_fix() {
        let mut book = LocationBook::new();
        let ack = book.on_message(
            r#"{"session_id":"s1","latitude":39.98,"longitude":-75.15,"timestamp":5}"#,
        );
        assert!(ack.is_received());
        book.on_message(r#"{"session_id":"s1","latitude":39.99,"longitude":-75.15,"timestamp":6}"#);

        let fix = book.latest(&SessionId::new("s1")).unwrap();
        assert_eq!(fix.coordinate.latitude, 39.99);
        assert_eq!(fix.timestamp_ms, 6);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn book_rejects_incomplete_messages() {
        let mut book = LocationBook::new();
        assert!(!book.on_message(r#"{"latitude":1.0,"longitude":2.0}"#).is_received());
        assert!(!book.on_message(r#"{"session_id":"s1","latitude":1.0}"#).is_received());
        assert!(!book.on_message("garbage").is_received());
        assert!(book.is_empty());
    }
}

// ── Responder ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod responder {
    use super::*;

    fn responder() -> GuidanceResponder {
        let mut r = GuidanceResponder::new(ProximityEngine::default());
        r.start(sid(), plan()).unwrap();
        r
    }

    #[test]
    fn handshake_requires_known_session() {
        let r = responder();
        let (s, reply) = r.handshake("{}");
        assert!(s.is_none() && reply.close);
        assert_eq!(reply.updates[0].status, UpdateStatus::Error);

        let (s, reply) = r.handshake(r#"{"session_id":"nobody"}"#);
        assert!(s.is_none() && reply.close);
    }

    #[test]
    fn handshake_announces_first_step() {
        let r = responder();
        let (s, reply) = r.handshake(r#"{"session_id":"a1b2c3d4-e5f6"}"#);
        assert_eq!(s, Some(sid()));
        let u = &reply.updates[0];
        assert_eq!(u.status, UpdateStatus::NavigationStarted);
        assert_eq!((u.current_step, u.total_steps), (1, 3));
        assert_eq!(u.announcement.as_deref(), Some("Starting navigation. Head north on Broad St"));
        assert!(u.validate(3).is_ok());
    }

    #[test]
    fn missing_coordinates_keep_the_loop_going() {
        let mut r = responder();
        let reply = r.on_location(&sid(), r#"{"latitude":39.98}"#);
        assert!(!reply.close);
        assert_eq!(reply.updates[0].status, UpdateStatus::Error);
        assert!(r.is_active(&sid()));
    }

    #[test]
    fn walks_the_route_to_arrival() {
        let mut r = responder();

        let reply = r.on_location(&sid(), &location(A));
        assert_eq!(reply.updates[0].status, UpdateStatus::Navigating);
        assert!(!reply.updates[0].should_announce);

        let reply = r.on_location(&sid(), &location(B));
        let u = &reply.updates[0];
        assert_eq!(u.status, UpdateStatus::StepCompleted);
        assert_eq!(u.current_step, 2);
        assert_eq!(u.announcement.as_deref(), Some("Turn right onto Main St."));

        r.on_location(&sid(), &location(C));
        let reply = r.on_location(&sid(), &location(D));
        assert!(reply.close);
        let u = &reply.updates[0];
        assert_eq!(u.status, UpdateStatus::Arrived);
        assert_eq!(u.current_step, 3);
        assert_eq!(u.announcement.as_deref(), Some("You have arrived at your destination"));
        assert!(!r.is_active(&sid()));
    }

    #[test]
    fn approach_uses_provider_distance() {
        let mut r = responder();
        // ~17 m south of B.
        let near = Coordinate::new(B.latitude - 17.0 / 111_195.0, B.longitude);
        let reply = r.on_location(&sid(), &location(near));
        let u = &reply.updates[0];
        assert_eq!(u.status, UpdateStatus::Navigating);
        assert_eq!(u.announcement.as_deref(), Some("In 130 meters, Turn right onto Main St."));

        let again = r.on_location(&sid(), &location(near));
        assert!(!again.updates[0].should_announce);
    }

    #[test]
    fn empty_route_cannot_start() {
        let mut r = GuidanceResponder::new(ProximityEngine::default());
        let empty = RoutePlan::new(Vec::new(), "x", "0 mi", 0.0);
        assert!(matches!(r.start(sid(), empty), Err(ChannelError::Guidance(_))));
    }
}

// ── TcpTransport ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tcp {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::TcpTransport;

    fn recv_within(t: &mut TcpTransport, limit: Duration) -> Option<String> {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if let Some(line) = t.try_recv().unwrap() {
                return Some(line);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn loopback_line_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let mut out = stream;
            out.write_all(b"{\"echo\":1}\n").unwrap();
            line
        });

        let mut t = TcpTransport::new(addr, Duration::from_secs(2));
        t.connect().unwrap();
        t.send(r#"{"session_id":"x"}"#).unwrap();

        let got = recv_within(&mut t, Duration::from_secs(2));
        assert_eq!(got.as_deref(), Some(r#"{"echo":1}"#));
        assert_eq!(server.join().unwrap(), "{\"session_id\":\"x\"}\n");

        // Server thread is gone and its socket dropped.
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut closed = false;
        while Instant::now() < deadline {
            match t.try_recv() {
                Err(ChannelError::Closed) => {
                    closed = true;
                    break;
                }
                _ => std::thread::sleep(Duration::from_millis(5)),
            }
        }
        assert!(closed);
        assert!(!t.is_open());
    }

    #[test]
    fn connect_to_nothing_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        let mut t = TcpTransport::new(addr, Duration::from_millis(500));
        assert!(matches!(t.connect(), Err(ChannelError::Connect { .. })));
        assert!(matches!(t.send("x"), Err(ChannelError::Closed)));
    }
}
