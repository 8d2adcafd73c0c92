//! Integration tests for wf-session.

use wf_channel::{MemoryHandle, MemoryTransport, NavigationUpdate, UpdateStatus, to_line};
use wf_core::{Coordinate, GuidanceConfig, Millis, PositionFix, RoutePlan, SessionId, Step};
use wf_guidance::{DisplayState, ManualStep, RecordingSpeech, SessionState};
use wf_position::{FeedSource, FixFeed, PositionError, PositionSource};

use crate::{
    ChannelEvent, GuidanceObserver, NoopObserver, RouteSession, RouteSessionBuilder, SessionError,
    Timer, TimerKind, TimerQueue,
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

fn fix(c: Coordinate, t: u64) -> PositionFix {
    PositionFix::new(c, 5.0, t)
}

type Session = RouteSession<FeedSource, RecordingSpeech>;

fn local() -> (Session, FixFeed) {
    let feed = FixFeed::new();
    let session = RouteSessionBuilder::new(
        GuidanceConfig::default(),
        FeedSource::new(feed.clone(), 10_000),
    )
    .speech(RecordingSpeech::new())
    .build()
    .unwrap();
    (session, feed)
}

fn remote() -> (Session, FixFeed, MemoryHandle) {
    let feed = FixFeed::new();
    let (transport, handle) = MemoryTransport::new();
    let session = RouteSessionBuilder::new(
        GuidanceConfig::default(),
        FeedSource::new(feed.clone(), 10_000),
    )
    .speech(RecordingSpeech::new())
    .session_id(SessionId::new("a1b2c3d4"))
    .channel(Box::new(transport))
    .build()
    .unwrap();
    (session, feed, handle)
}

fn spoken(session: &Session) -> Vec<String> {
    session
        .voice()
        .engine()
        .map(|e| e.texts().into_iter().map(str::to_string).collect())
        .unwrap_or_default()
}

fn update(status: UpdateStatus, current_step: usize, announcement: Option<&str>) -> String {
    let instruction = plan().steps()[current_step - 1].instruction.clone();
    to_line(&NavigationUpdate {
        status,
        current_step,
        total_steps:      3,
        instruction,
        distance_to_next: 111.0,
        should_announce:  announcement.is_some(),
        announcement:     announcement.map(str::to_string),
        message:          None,
    })
    .unwrap()
}

#[derive(Default)]
struct Recorder {
    states:          Vec<(SessionState, SessionState)>,
    displays:        Vec<DisplayState>,
    announcements:   Vec<String>,
    position_errors: Vec<String>,
    channel:         Vec<ChannelEvent>,
    remote_errors:   Vec<String>,
    discarded:       Vec<String>,
}

impl GuidanceObserver for Recorder {
    fn on_state_change(&mut self, from: SessionState, to: SessionState) {
        self.states.push((from, to));
    }
    fn on_display(&mut self, display: &DisplayState) {
        self.displays.push(display.clone());
    }
    fn on_announcement(&mut self, text: &str) {
        self.announcements.push(text.to_string());
    }
    fn on_position_error(&mut self, error: &PositionError) {
        self.position_errors.push(error.to_string());
    }
    fn on_channel_event(&mut self, event: ChannelEvent) {
        self.channel.push(event);
    }
    fn on_remote_error(&mut self, message: &str) {
        self.remote_errors.push(message.to_string());
    }
    fn on_discarded_update(&mut self, reason: &str) {
        self.discarded.push(reason.to_string());
    }
}

// ── TimerQueue ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod timers {
    use super::*;

    fn t(kind: TimerKind) -> Timer {
        Timer { kind, epoch: 0 }
    }

    #[test]
    fn drains_due_timers_in_order() {
        let mut q = TimerQueue::new();
        q.push(Millis(300), t(TimerKind::Reconnect));
        q.push(Millis(100), t(TimerKind::SendFix));
        q.push(Millis(100), t(TimerKind::RelayFix));
        q.push(Millis(900), t(TimerKind::ArrivalTeardown));

        let kinds: Vec<_> = q.drain_due(Millis(300)).into_iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TimerKind::SendFix, TimerKind::RelayFix, TimerKind::Reconnect]);
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_due(), Some(Millis(900)));
        assert!(q.drain_due(Millis(899)).is_empty());
    }

    #[test]
    fn cancel_session_keeps_relay() {
        let mut q = TimerQueue::new();
        q.push(Millis(1), t(TimerKind::SendFix));
        q.push(Millis(2), t(TimerKind::Reconnect));
        q.push(Millis(2), t(TimerKind::RelayFix));
        q.cancel_session();
        assert_eq!(q.len(), 1);
        assert!(q.contains(TimerKind::RelayFix));
        assert_eq!(q.next_due_of(TimerKind::Reconnect), None);
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod builder {
    use super::*;

    #[test]
    fn channel_requires_session_id() {
        let (transport, _) = MemoryTransport::new();
        let result = RouteSessionBuilder::<_, RecordingSpeech>::new(
            GuidanceConfig::default(),
            FeedSource::new(FixFeed::new(), 10_000),
        )
        .channel(Box::new(transport))
        .build();
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = GuidanceConfig { update_interval_ms: 500, ..Default::default() };
        let result = RouteSessionBuilder::<_, RecordingSpeech>::new(
            config,
            FeedSource::new(FixFeed::new(), 10_000),
        )
        .build();
        assert!(matches!(result, Err(SessionError::Nav(_))));
    }

    #[test]
    fn starts_idle() {
        let (s, _) = local();
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.is_remote());
        assert!(s.display().is_none());
    }
}

// ── Local guidance ────────────────────────────────────────────────────────────

#[cfg(test)]
mod local_mode {
    use super::*;

    #[test]
    fn empty_route_fails_fast() {
        let (mut s, _) = local();
        let mut obs = Recorder::default();
        let empty = RoutePlan::new(Vec::new(), "Nowhere", "0 mi", 0.0);
        assert!(matches!(s.start_navigation(empty, Millis(0), &mut obs), Err(SessionError::NoSteps)));
        assert_eq!(s.state(), SessionState::Idle);
        assert!(obs.states.is_empty());
        assert!(!s.source().is_running());
    }

    #[test]
    fn start_announces_destination_and_first_step() {
        let (mut s, _) = local();
        let mut obs = Recorder::default();
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();

        assert_eq!(s.state(), SessionState::Active);
        assert_eq!(s.current_index(), Some(0));
        assert_eq!(spoken(&s), vec!["Starting navigation to City Hall. Head north on Broad St"]);
        assert_eq!(obs.displays[0].step_number, 1);
        assert_eq!(obs.states, vec![(SessionState::Idle, SessionState::Active)]);
    }

    #[test]
    fn walks_to_arrival_then_tears_down_after_grace() {
        let (mut s, feed) = local();
        let mut obs = Recorder::default();
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();

        feed.push(fix(B, 1_000));
        s.tick(Millis(1_000), &mut obs);
        assert_eq!(s.current_index(), Some(1));

        feed.push(fix(C, 2_000));
        s.tick(Millis(2_000), &mut obs);
        assert_eq!(s.current_index(), Some(2));

        feed.push(fix(D, 3_000));
        s.tick(Millis(3_000), &mut obs);
        assert_eq!(s.state(), SessionState::Arrived);

        // Further fixes change nothing.
        feed.push(fix(D, 3_500));
        s.tick(Millis(3_500), &mut obs);

        assert_eq!(
            spoken(&s)[1..],
            [
                "Turn right onto Main St.",
                "Turn left onto 5th Ave",
                "You have arrived at your destination",
            ]
        );

        s.tick(Millis(5_999), &mut obs);
        assert_eq!(s.state(), SessionState::Arrived);
        s.tick(Millis(6_000), &mut obs);
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.source().is_running());
        assert_eq!(
            obs.states,
            vec![
                (SessionState::Idle, SessionState::Active),
                (SessionState::Active, SessionState::Arrived),
                (SessionState::Arrived, SessionState::Idle),
            ]
        );
    }

    #[test]
    fn repeated_fix_advances_once() {
        let (mut s, feed) = local();
        let mut obs = NoopObserver;
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();
        for t in 1..=5 {
            feed.push(fix(B, t * 100));
            s.tick(Millis(t * 100), &mut obs);
        }
        assert_eq!(s.current_index(), Some(1));
        assert_eq!(spoken(&s).len(), 2);
    }

    #[test]
    fn stop_then_start_resets_progress() {
        let (mut s, feed) = local();
        let mut obs = Recorder::default();
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();
        feed.push(fix(B, 500));
        s.tick(Millis(500), &mut obs);
        assert_eq!(s.current_index(), Some(1));

        s.stop(&mut obs);
        s.stop(&mut obs);
        assert_eq!(s.state(), SessionState::Idle);
        assert!(!s.source().is_running());

        s.start_navigation(plan(), Millis(1_000), &mut obs).unwrap();
        assert_eq!(s.current_index(), Some(0));
        assert!(s.progress().unwrap().announced().is_empty());
        assert!(s.source().is_running());
    }

    #[test]
    fn new_start_discards_active_session() {
        let (mut s, feed) = local();
        let mut obs = Recorder::default();
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();
        feed.push(fix(B, 100));
        s.tick(Millis(100), &mut obs);

        s.start_navigation(plan(), Millis(200), &mut obs).unwrap();
        assert_eq!(s.current_index(), Some(0));
        assert_eq!(
            obs.states[1..],
            [(SessionState::Active, SessionState::Idle), (SessionState::Idle, SessionState::Active)]
        );
    }

    #[test]
    fn arrival_teardown_from_old_session_is_ignored() {
        let (mut s, feed) = local();
        let mut obs = NoopObserver;
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();
        s.next_step(Millis(0), &mut obs);
        s.next_step(Millis(0), &mut obs);
        s.next_step(Millis(100), &mut obs);
        assert_eq!(s.state(), SessionState::Arrived);

        // Restart before the grace delay runs out.
        s.start_navigation(plan(), Millis(1_000), &mut obs).unwrap();
        feed.push(fix(A, 3_100));
        s.tick(Millis(3_100), &mut obs);
        assert_eq!(s.state(), SessionState::Active);
    }
}

// ── Manual navigation ─────────────────────────────────────────────────────────

#[cfg(test)]
mod manual {
    use super::*;

    #[test]
    fn previous_on_first_step_respeaks_it() {
        let (mut s, _) = local();
        let mut obs = Recorder::default();
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();

        assert_eq!(s.previous_step(Millis(10), &mut obs), ManualStep::Current(0));
        assert_eq!(spoken(&s).last().map(String::as_str), Some("Head north on Broad St"));
        assert_eq!(obs.displays.len(), 2);
    }

    #[test]
    fn next_through_to_arrival() {
        let (mut s, _) = local();
        let mut obs = Recorder::default();
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();

        assert_eq!(s.next_step(Millis(1), &mut obs), ManualStep::Current(1));
        assert_eq!(s.next_step(Millis(2), &mut obs), ManualStep::Current(2));
        assert_eq!(s.next_step(Millis(3), &mut obs), ManualStep::Arrived);
        assert_eq!(s.state(), SessionState::Arrived);
        assert_eq!(s.previous_step(Millis(4), &mut obs), ManualStep::Ignored);

        assert_eq!(
            spoken(&s)[1..],
            ["Turn right onto Main St.", "Turn left onto 5th Ave", "You have arrived at your destination"]
        );
        assert!(s.progress().unwrap().announced().is_empty());

        s.tick(Millis(3_003), &mut obs);
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn manual_calls_while_idle_are_ignored() {
        let (mut s, _) = local();
        assert_eq!(s.next_step(Millis(0), &mut NoopObserver), ManualStep::Ignored);
        assert_eq!(s.previous_step(Millis(0), &mut NoopObserver), ManualStep::Ignored);
    }
}

// ── Position errors ───────────────────────────────────────────────────────────

#[cfg(test)]
mod position {
    use super::*;

    #[test]
    fn permission_denied_keeps_session_without_fixes() {
        let mut source = FeedSource::new(FixFeed::new(), 10_000);
        source.set_permission(false);
        let mut s = RouteSessionBuilder::new(GuidanceConfig::default(), source)
            .speech(RecordingSpeech::new())
            .build()
            .unwrap();
        let mut obs = Recorder::default();

        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();
        assert_eq!(s.state(), SessionState::Active);
        assert!(!s.position_enabled());
        assert_eq!(obs.position_errors.len(), 1);
        assert_eq!(s.next_step(Millis(5), &mut obs), ManualStep::Current(1));
    }

    #[test]
    fn acquisition_timeout_is_reported_and_retryable() {
        let (mut s, feed) = local();
        let mut obs = Recorder::default();
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();

        s.tick(Millis(10_001), &mut obs);
        assert_eq!(obs.position_errors.len(), 1);
        assert!(!s.source().is_running());
        assert_eq!(s.state(), SessionState::Active);

        s.retry_position(Millis(11_000), &mut obs);
        feed.push(fix(B, 11_500));
        s.tick(Millis(11_500), &mut obs);
        assert_eq!(s.current_index(), Some(1));
    }
}

// ── Remote guidance ───────────────────────────────────────────────────────────

#[cfg(test)]
mod remote_mode {
    use super::*;

    #[test]
    fn sends_session_id_then_latest_fix_on_cadence() {
        let (mut s, feed, h) = remote();
        let mut obs = Recorder::default();
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();
        assert_eq!(obs.channel, vec![ChannelEvent::Connected]);

        feed.push(fix(A, 0));
        s.tick(Millis(0), &mut obs);
        // Fixes never move the route locally in remote mode.
        feed.push(fix(B, 1_000));
        s.tick(Millis(1_000), &mut obs);
        assert_eq!(s.current_index(), Some(0));

        s.tick(Millis(2_000), &mut obs);
        s.tick(Millis(3_000), &mut obs);
        s.tick(Millis(4_000), &mut obs);

        let sent = h.sent();
        assert_eq!(sent[0], r#"{"session_id":"a1b2c3d4"}"#);
        assert_eq!(sent.len(), 3);
        assert!(sent[1].contains(r#""latitude":39.981"#));
        assert!(sent[1].contains(r#""timestamp":1000"#));
    }

    #[test]
    fn duplicate_update_is_idempotent() {
        let (mut s, _, h) = remote();
        let mut obs = Recorder::default();
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();

        let line = update(UpdateStatus::StepCompleted, 3, Some("Turn left onto 5th Ave"));
        h.push(line.clone());
        s.tick(Millis(100), &mut obs);
        let shown = s.display().cloned();
        let said = spoken(&s);

        h.push(line);
        s.tick(Millis(200), &mut obs);
        assert_eq!(s.display().cloned(), shown);
        assert_eq!(spoken(&s), said);
        assert_eq!(s.current_index(), Some(2));
        assert_eq!(shown.map(|d| d.step_number), Some(3));
    }

    #[test]
    fn out_of_order_retransmission_is_not_spoken_twice() {
        let (mut s, _, h) = remote();
        let mut obs = Recorder::default();
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();

        let completed = update(UpdateStatus::StepCompleted, 2, Some("Turn right onto Main St."));
        h.push(completed.clone());
        h.push(update(UpdateStatus::Navigating, 2, None));
        h.push(completed);
        s.tick(Millis(100), &mut obs);

        assert_eq!(s.current_index(), Some(1));
        assert_eq!(
            spoken(&s),
            vec!["Starting navigation to City Hall. Head north on Broad St", "Turn right onto Main St."]
        );
        assert_eq!(obs.announcements.len(), 2);
    }

    #[test]
    fn announcement_is_spoken_verbatim() {
        let (mut s, _, h) = remote();
        let mut obs = NoopObserver;
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();
        h.push(update(UpdateStatus::Navigating, 1, Some("In 50 feet, turn right onto Main St")));
        s.tick(Millis(100), &mut obs);
        assert_eq!(spoken(&s).last().map(String::as_str), Some("In 50 feet, turn right onto Main St"));
    }

    #[test]
    fn malformed_update_is_dropped_and_stream_continues() {
        let (mut s, _, h) = remote();
        let mut obs = Recorder::default();
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();
        let before = s.display().cloned();

        h.push(r#"{"status":"navigating","current_step":9,"total_steps":3}"#);
        h.push(r#"{"status":"error","message":"no active navigation"}"#);
        h.push(update(UpdateStatus::Navigating, 2, None));
        s.tick(Millis(100), &mut obs);

        assert_eq!(obs.discarded.len(), 1);
        assert_eq!(obs.remote_errors, vec!["no active navigation"]);
        assert_ne!(s.display().cloned(), before);
        assert_eq!(s.current_index(), Some(1));
    }

    #[test]
    fn reconnects_once_after_backoff() {
        let (mut s, _, h) = remote();
        let mut obs = Recorder::default();
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();

        h.close_from_peer();
        s.tick(Millis(1_000), &mut obs);
        assert_eq!(s.reconnect_due(), Some(Millis(6_000)));
        assert!(!s.channel_open());

        s.tick(Millis(5_999), &mut obs);
        assert_eq!(h.connects(), 1);
        s.tick(Millis(6_000), &mut obs);
        assert_eq!(h.connects(), 2);
        assert!(s.channel_open());
        assert_eq!(
            obs.channel,
            vec![
                ChannelEvent::Connected,
                ChannelEvent::ReconnectScheduled { retry_at: Millis(6_000) },
                ChannelEvent::Connected,
            ]
        );
        // The hello goes out again on the new connection.
        assert_eq!(h.sent().iter().filter(|l| l.contains("session_id")).count(), 2);
    }

    #[test]
    fn failed_reconnect_schedules_the_next_attempt() {
        let (mut s, _, h) = remote();
        let mut obs = NoopObserver;
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();

        h.close_from_peer();
        s.tick(Millis(1_000), &mut obs);
        h.fail_next_connects(1);
        s.tick(Millis(6_000), &mut obs);
        assert!(!s.channel_open());
        assert_eq!(s.reconnect_due(), Some(Millis(11_000)));

        s.tick(Millis(11_000), &mut obs);
        assert!(s.channel_open());
        assert_eq!(h.connects(), 3);
    }

    #[test]
    fn no_reconnect_after_user_stop() {
        let (mut s, _, h) = remote();
        let mut obs = NoopObserver;
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();

        h.close_from_peer();
        s.tick(Millis(1_000), &mut obs);
        assert!(s.reconnect_due().is_some());

        s.stop(&mut obs);
        assert_eq!(s.reconnect_due(), None);
        s.run_until(Millis(1_500), Millis(30_000), 500, &mut obs);
        assert_eq!(h.connects(), 1);
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn stop_closes_channel() {
        let (mut s, _, h) = remote();
        let mut obs = Recorder::default();
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();
        assert!(h.is_open());
        s.stop(&mut obs);
        assert!(!h.is_open());
        assert_eq!(obs.channel.last(), Some(&ChannelEvent::Closed));
    }

    #[test]
    fn remote_arrival_then_server_close_does_not_reconnect() {
        let (mut s, _, h) = remote();
        let mut obs = Recorder::default();
        s.start_navigation(plan(), Millis(0), &mut obs).unwrap();

        h.push(update(UpdateStatus::Arrived, 3, Some("You have arrived at your destination")));
        h.close_from_peer();
        s.tick(Millis(500), &mut obs);

        assert_eq!(s.state(), SessionState::Arrived);
        assert_eq!(s.reconnect_due(), None);
        assert_eq!(spoken(&s).last().map(String::as_str), Some("You have arrived at your destination"));

        s.tick(Millis(3_499), &mut obs);
        assert_eq!(s.state(), SessionState::Arrived);
        s.tick(Millis(3_500), &mut obs);
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(h.connects(), 1);
    }
}

// ── Background tracking ───────────────────────────────────────────────────────

#[cfg(test)]
mod tracking {
    use super::*;

    fn tracked() -> (Session, FixFeed, MemoryHandle) {
        let feed = FixFeed::new();
        let (transport, handle) = MemoryTransport::new();
        let session = RouteSessionBuilder::new(
            GuidanceConfig::default(),
            FeedSource::new(feed.clone(), 10_000),
        )
        .speech(RecordingSpeech::new())
        .session_id(SessionId::new("a1b2c3d4"))
        .relay(Box::new(transport))
        .build()
        .unwrap();
        (session, feed, handle)
    }

    #[test]
    fn relays_latest_fix_on_cadence() {
        let (mut s, feed, h) = tracked();
        let mut obs = NoopObserver;
        s.start_tracking(Millis(0), &mut obs);
        assert!(s.source().is_running());

        feed.push(fix(A, 100));
        s.tick(Millis(100), &mut obs);
        assert!(h.sent().is_empty());

        s.tick(Millis(3_000), &mut obs);
        s.tick(Millis(6_000), &mut obs);
        let sent = h.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].contains(r#""session_id":"a1b2c3d4""#));
        assert!(sent[0].contains(r#""timestamp":100"#));
    }

    #[test]
    fn navigation_stop_keeps_tracking_alive() {
        let (mut s, _, _) = tracked();
        let mut obs = NoopObserver;
        s.start_tracking(Millis(0), &mut obs);
        s.start_navigation(plan(), Millis(10), &mut obs).unwrap();
        s.stop(&mut obs);
        assert!(s.source().is_running());

        s.stop_tracking();
        assert!(!s.source().is_running());
    }

    #[test]
    fn stop_tracking_cancels_relay() {
        let (mut s, feed, h) = tracked();
        let mut obs = NoopObserver;
        s.start_tracking(Millis(0), &mut obs);
        feed.push(fix(A, 100));
        s.tick(Millis(100), &mut obs);
        s.stop_tracking();
        s.tick(Millis(3_000), &mut obs);
        assert!(h.sent().is_empty());
        assert!(!h.is_open());
    }
}
