//! The `RouteSession` struct and its tick loop.

use tracing::{debug, error, info, warn};

use wf_channel::{ChannelError, GuidanceChannel, Inbound, LocationRelay, NavigationUpdate, ReconnectPolicy, UpdateStatus};
use wf_core::{GuidanceConfig, Millis, PositionFix, RoutePlan};
use wf_guidance::{
    ARRIVAL_ANNOUNCEMENT, DisplayState, GuidanceEvent, InstructionPresenter, ManualStep,
    ProximityEngine, RouteProgress, SessionState, SpeechEngine, VoiceOutput, start_announcement,
};
use wf_position::{PositionError, PositionSource};

use crate::timer::{Timer, TimerKind, TimerQueue};
use crate::{ChannelEvent, GuidanceObserver, SessionError, SessionResult};

/// One client's guidance engine.
///
/// `RouteSession<S, E>` owns the position source, the speech engine, the
/// optional guidance channel and relay, and at most one active route.  All
/// entry points take the host's current time and run to completion without
/// blocking; nothing here reads a clock or sleeps.
///
/// # Modes
///
/// - **Local** (no channel): each fix is evaluated in-process by the
///   [`ProximityEngine`].
/// - **Remote** (channel configured): the latest fix is sent every
///   `update_interval_ms` and the server's [`NavigationUpdate`]s are applied
///   as absolute state.
///
/// Create via [`RouteSessionBuilder`][crate::RouteSessionBuilder].
pub struct RouteSession<S: PositionSource, E: SpeechEngine> {
    pub(crate) config:           GuidanceConfig,
    pub(crate) engine:           ProximityEngine,
    pub(crate) presenter:        InstructionPresenter,
    pub(crate) voice:            VoiceOutput<E>,
    pub(crate) source:           S,
    pub(crate) channel:          Option<GuidanceChannel>,
    pub(crate) relay:            Option<LocationRelay>,
    pub(crate) reconnect:        ReconnectPolicy,
    pub(crate) timers:           TimerQueue,
    pub(crate) progress:         Option<RouteProgress>,
    pub(crate) display:          Option<DisplayState>,
    pub(crate) latest_fix:       Option<PositionFix>,
    /// Bumped on every teardown; session timers from older epochs are dead.
    pub(crate) epoch:            u64,
    pub(crate) position_enabled: bool,
    pub(crate) tracking:         bool,
}

impl<S: PositionSource, E: SpeechEngine> RouteSession<S, E> {
    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.progress.as_ref().map_or(SessionState::Idle, |p| p.state())
    }

    pub fn current_index(&self) -> Option<usize> {
        self.progress.as_ref().map(|p| p.current_index())
    }

    pub fn progress(&self) -> Option<&RouteProgress> {
        self.progress.as_ref()
    }

    pub fn display(&self) -> Option<&DisplayState> {
        self.display.as_ref()
    }

    pub fn voice(&self) -> &VoiceOutput<E> {
        &self.voice
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn config(&self) -> &GuidanceConfig {
        &self.config
    }

    pub fn latest_fix(&self) -> Option<&PositionFix> {
        self.latest_fix.as_ref()
    }

    pub fn is_remote(&self) -> bool {
        self.channel.is_some()
    }

    pub fn channel_open(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.is_open())
    }

    /// `false` after the position source refused permission.
    pub fn position_enabled(&self) -> bool {
        self.position_enabled
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// When the pending reconnect attempt is due, if one is pending.
    pub fn reconnect_due(&self) -> Option<Millis> {
        self.timers.next_due_of(TimerKind::Reconnect)
    }

    /// The earliest pending timer; a host loop may sleep until then.
    pub fn next_timer_due(&self) -> Option<Millis> {
        self.timers.next_due()
    }

    // ── Session lifecycle ─────────────────────────────────────────────────

    /// Begin guidance on `plan`, discarding any previous session.
    ///
    /// Fails only with [`SessionError::NoSteps`], in which case nothing
    /// changes.  A refused position permission does not fail the start: it
    /// is reported through the observer and guidance continues without fixes
    /// (manual navigation still works).
    pub fn start_navigation<O: GuidanceObserver>(
        &mut self,
        plan:     RoutePlan,
        now:      Millis,
        observer: &mut O,
    ) -> SessionResult<()> {
        if plan.is_empty() {
            warn!(destination = %plan.destination, "refusing to start a route with no steps");
            return Err(SessionError::NoSteps);
        }
        self.end_session(observer);

        let progress = RouteProgress::new(plan)?;
        let announcement = start_announcement(progress.plan());
        let display = self.presenter.display(progress.current_step(), progress.plan().len());
        info!(
            destination = %progress.plan().destination,
            steps       = progress.plan().len(),
            remote      = self.is_remote(),
            "navigation started"
        );

        self.progress = Some(progress);
        self.reconnect.reset();
        if let Some(channel) = self.channel.as_mut() {
            channel.reset();
        }
        observer.on_state_change(SessionState::Idle, SessionState::Active);

        self.show(display, observer);
        self.say(&announcement, observer);
        self.start_position(now, observer);
        if self.channel.is_some() {
            self.open_channel(now, observer);
        }
        Ok(())
    }

    /// End the session: stop position updates (unless tracking), close the
    /// channel, cancel every pending session timer, clear state.  Idempotent.
    pub fn stop<O: GuidanceObserver>(&mut self, observer: &mut O) {
        if self.progress.is_some() {
            info!("navigation stopped");
        }
        self.end_session(observer);
    }

    /// Manually advance.  On the last step this arrives.
    pub fn next_step<O: GuidanceObserver>(&mut self, now: Millis, observer: &mut O) -> ManualStep {
        let outcome = match self.progress.as_mut() {
            Some(p) => p.next_step(),
            None => ManualStep::Ignored,
        };
        self.after_manual(outcome, now, observer);
        outcome
    }

    /// Manually go back one step, clamped at the first.
    pub fn previous_step<O: GuidanceObserver>(&mut self, now: Millis, observer: &mut O) -> ManualStep {
        let outcome = match self.progress.as_mut() {
            Some(p) => p.previous_step(),
            None => ManualStep::Ignored,
        };
        self.after_manual(outcome, now, observer);
        outcome
    }

    /// Retry position acquisition after a timeout.
    pub fn retry_position<O: GuidanceObserver>(&mut self, now: Millis, observer: &mut O) {
        if !self.source.is_running() {
            self.start_position(now, observer);
        }
    }

    // ── Background tracking ───────────────────────────────────────────────

    /// Keep the position source running and relay raw fixes every
    /// `relay_interval_ms`, independent of any route session.
    pub fn start_tracking<O: GuidanceObserver>(&mut self, now: Millis, observer: &mut O) {
        if self.tracking {
            return;
        }
        self.tracking = true;
        self.start_position(now, observer);
        if let Some(relay) = self.relay.as_mut() {
            if let Err(e) = relay.open() {
                warn!(error = %e, "location relay unavailable; will retry");
            }
            self.arm(now.offset(self.config.relay_interval_ms), TimerKind::RelayFix);
        }
    }

    pub fn stop_tracking(&mut self) {
        if !self.tracking {
            return;
        }
        self.tracking = false;
        self.timers.cancel(TimerKind::RelayFix);
        if let Some(relay) = self.relay.as_mut() {
            relay.close();
        }
        if self.progress.is_none() {
            self.source.stop();
        }
    }

    // ── Tick ──────────────────────────────────────────────────────────────

    /// Process everything that is ready at `now`:
    ///
    /// 1. poll the position source (at most one fix);
    /// 2. drain inbound guidance updates;
    /// 3. fire due timers.
    ///
    /// Never fails: bad input is logged and reported through `observer`.
    pub fn tick<O: GuidanceObserver>(&mut self, now: Millis, observer: &mut O) {
        self.poll_position(now, observer);
        self.poll_channel(now, observer);
        self.fire_timers(now, observer);
    }

    /// Tick every `step_ms` from `start` through `end` inclusive.  Returns
    /// the time after the last tick.
    pub fn run_until<O: GuidanceObserver>(
        &mut self,
        start:    Millis,
        end:      Millis,
        step_ms:  u64,
        observer: &mut O,
    ) -> Millis {
        let step_ms = step_ms.max(1);
        let mut now = start;
        while now <= end {
            self.tick(now, observer);
            now = now.offset(step_ms);
        }
        now
    }

    // ── Position ──────────────────────────────────────────────────────────

    fn start_position<O: GuidanceObserver>(&mut self, now: Millis, observer: &mut O) {
        if self.source.is_running() {
            self.position_enabled = true;
            return;
        }
        match self.source.start(now) {
            Ok(()) => self.position_enabled = true,
            Err(e @ PositionError::PermissionDenied) => {
                error!("location permission denied; position updates disabled");
                self.position_enabled = false;
                observer.on_position_error(&e);
            }
            Err(e) => {
                warn!(error = %e, "position source failed to start");
                observer.on_position_error(&e);
            }
        }
    }

    fn poll_position<O: GuidanceObserver>(&mut self, now: Millis, observer: &mut O) {
        if !self.source.is_running() {
            return;
        }
        match self.source.poll(now) {
            Ok(Some(fix)) => self.on_fix(fix, now, observer),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "position acquisition failed");
                observer.on_position_error(&e);
            }
        }
    }

    fn on_fix<O: GuidanceObserver>(&mut self, fix: PositionFix, now: Millis, observer: &mut O) {
        debug!(at = %fix.coordinate, accuracy_m = fix.accuracy_m, "fix");
        self.latest_fix = Some(fix);
        observer.on_fix(&fix);

        // Remote mode: fixes leave on the send cadence; the server decides.
        if self.channel.is_some() {
            return;
        }
        let Some(progress) = self.progress.as_mut() else {
            return;
        };
        let events = self.engine.evaluate(progress, &fix);
        for event in events {
            self.apply_event(event, now, observer);
        }
    }

    fn apply_event<O: GuidanceObserver>(&mut self, event: GuidanceEvent, now: Millis, observer: &mut O) {
        match event {
            GuidanceEvent::Advanced { from, to } => {
                info!(from = from + 1, to = to + 1, "step completed");
                self.show_step(to, observer);
                if let Some(text) = self.instruction(to) {
                    self.say(&text, observer);
                }
            }
            GuidanceEvent::Approaching { step, announcement } => {
                debug!(step = step + 1, "approaching step");
                self.say(&announcement, observer);
            }
            GuidanceEvent::Arrived { announcement } => {
                self.arrive(now, Some(&announcement), observer);
            }
        }
    }

    // ── Guidance channel ──────────────────────────────────────────────────

    fn open_channel<O: GuidanceObserver>(&mut self, now: Millis, observer: &mut O) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        match channel.open() {
            Ok(()) => {
                observer.on_channel_event(ChannelEvent::Connected);
                self.timers.cancel(TimerKind::SendFix);
                self.arm(now.offset(self.config.update_interval_ms), TimerKind::SendFix);
            }
            Err(e) => {
                warn!(error = %e, "guidance channel failed to open");
                self.channel_lost(now, observer);
            }
        }
    }

    fn poll_channel<O: GuidanceObserver>(&mut self, now: Millis, observer: &mut O) {
        let Some(total) = self.progress.as_ref().map(|p| p.plan().len()) else {
            return;
        };
        loop {
            let Some(channel) = self.channel.as_mut() else {
                return;
            };
            if !channel.is_open() {
                return;
            }
            match channel.poll(total) {
                Ok(None) => return,
                Ok(Some(Inbound::Apply(update))) => self.apply_update(update, now, observer),
                Ok(Some(Inbound::Duplicate)) => {}
                Ok(Some(Inbound::RemoteError(message))) => observer.on_remote_error(&message),
                Ok(Some(Inbound::Malformed(reason))) => observer.on_discarded_update(&reason),
                Err(e) => {
                    if !matches!(e, ChannelError::Closed) {
                        warn!(error = %e, "guidance channel failed");
                    }
                    self.channel_lost(now, observer);
                    return;
                }
            }
        }
    }

    /// Overwrite local state with an authoritative update.
    fn apply_update<O: GuidanceObserver>(&mut self, update: NavigationUpdate, now: Millis, observer: &mut O) {
        let Some(progress) = self.progress.as_mut() else {
            return;
        };
        if progress.state() != SessionState::Active {
            debug!(status = ?update.status, "ignoring update after arrival");
            return;
        }
        progress.set_current(update.step_index());

        let display = self.presenter.display_remote(
            update.current_step,
            update.total_steps,
            &update.instruction,
            update.distance_to_next,
        );
        self.show(display, observer);

        let text = if update.should_announce { update.announcement() } else { None };
        if update.status == UpdateStatus::Arrived {
            self.arrive(now, text, observer);
        } else if let Some(text) = text {
            self.say(text, observer);
        }
    }

    /// The channel dropped.  Schedule the single reconnect while active.
    fn channel_lost<O: GuidanceObserver>(&mut self, now: Millis, observer: &mut O) {
        if let Some(channel) = self.channel.as_mut() {
            channel.close();
        }
        self.timers.cancel(TimerKind::SendFix);

        if self.state() != SessionState::Active {
            observer.on_channel_event(ChannelEvent::Closed);
            return;
        }
        if let Some(retry_at) = self.reconnect.on_close(now) {
            warn!(%retry_at, "guidance channel lost; reconnect scheduled");
            self.arm(retry_at, TimerKind::Reconnect);
            observer.on_channel_event(ChannelEvent::ReconnectScheduled { retry_at });
        }
    }

    // ── Timers ────────────────────────────────────────────────────────────

    fn arm(&mut self, due: Millis, kind: TimerKind) {
        self.timers.push(due, Timer { kind, epoch: self.epoch });
    }

    fn fire_timers<O: GuidanceObserver>(&mut self, now: Millis, observer: &mut O) {
        for timer in self.timers.drain_due(now) {
            if timer.kind.is_session_scoped() && timer.epoch != self.epoch {
                debug!(kind = ?timer.kind, "dropping timer from an ended session");
                continue;
            }
            match timer.kind {
                TimerKind::SendFix => self.send_fix(now, observer),
                TimerKind::Reconnect => {
                    if self.reconnect.begin_attempt() && self.state() == SessionState::Active {
                        info!("reconnecting guidance channel");
                        self.open_channel(now, observer);
                    }
                }
                TimerKind::ArrivalTeardown => {
                    info!("arrival grace elapsed");
                    self.end_session(observer);
                }
                TimerKind::RelayFix => self.relay_fix(now),
            }
        }
    }

    fn send_fix<O: GuidanceObserver>(&mut self, now: Millis, observer: &mut O) {
        if self.state() != SessionState::Active {
            return;
        }
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        if !channel.is_open() {
            return;
        }
        if let Some(fix) = self.latest_fix {
            if let Err(e) = channel.send_fix(&fix) {
                debug!(error = %e, "fix send failed");
                self.channel_lost(now, observer);
                return;
            }
        }
        self.arm(now.offset(self.config.update_interval_ms), TimerKind::SendFix);
    }

    fn relay_fix(&mut self, now: Millis) {
        if !self.tracking {
            return;
        }
        if let Some(relay) = self.relay.as_mut() {
            if !relay.is_open() {
                if let Err(e) = relay.open() {
                    debug!(error = %e, "location relay still unavailable");
                }
            }
            if let (true, Some(fix)) = (relay.is_open(), self.latest_fix) {
                if let Err(e) = relay.send_fix(&fix) {
                    warn!(error = %e, "location relay dropped");
                    relay.close();
                }
            }
        }
        self.arm(now.offset(self.config.relay_interval_ms), TimerKind::RelayFix);
    }

    // ── Shared helpers ────────────────────────────────────────────────────

    fn arrive<O: GuidanceObserver>(&mut self, now: Millis, announcement: Option<&str>, observer: &mut O) {
        if let Some(progress) = self.progress.as_mut() {
            if progress.state() == SessionState::Active {
                progress.mark_arrived();
            }
        }
        info!("arrived at destination");
        observer.on_state_change(SessionState::Active, SessionState::Arrived);
        if let Some(text) = announcement {
            self.say(text, observer);
        }
        self.timers.cancel(TimerKind::SendFix);
        self.arm(now.offset(self.config.arrival_grace_ms), TimerKind::ArrivalTeardown);
    }

    fn after_manual<O: GuidanceObserver>(&mut self, outcome: ManualStep, now: Millis, observer: &mut O) {
        match outcome {
            ManualStep::Current(index) => {
                debug!(step = index + 1, "manual step change");
                // Re-rendered and re-spoken even if nothing changed.
                self.display = None;
                self.show_step(index, observer);
                if let Some(text) = self.instruction(index) {
                    self.say(&text, observer);
                }
            }
            ManualStep::Arrived => self.arrive(now, Some(ARRIVAL_ANNOUNCEMENT), observer),
            ManualStep::Ignored => {}
        }
    }

    fn end_session<O: GuidanceObserver>(&mut self, observer: &mut O) {
        let from = self.state();
        self.epoch += 1;
        self.reconnect.cancel();
        self.timers.cancel_session();
        if let Some(channel) = self.channel.as_mut() {
            if channel.is_open() {
                channel.close();
                observer.on_channel_event(ChannelEvent::Closed);
            }
        }
        if !self.tracking {
            self.source.stop();
        }
        self.progress = None;
        self.display = None;
        if from != SessionState::Idle {
            observer.on_state_change(from, SessionState::Idle);
        }
    }

    fn instruction(&self, index: usize) -> Option<String> {
        self.progress
            .as_ref()
            .and_then(|p| p.plan().step(index))
            .map(|s| s.instruction.clone())
    }

    fn show_step<O: GuidanceObserver>(&mut self, index: usize, observer: &mut O) {
        let display = self.progress.as_ref().and_then(|p| {
            p.plan().step(index).map(|s| self.presenter.display(s, p.plan().len()))
        });
        if let Some(display) = display {
            self.show(display, observer);
        }
    }

    /// Publish `display` unless it is what is already shown.
    fn show<O: GuidanceObserver>(&mut self, display: DisplayState, observer: &mut O) {
        if self.display.as_ref() == Some(&display) {
            return;
        }
        observer.on_display(&display);
        self.display = Some(display);
    }

    fn say<O: GuidanceObserver>(&mut self, text: &str, observer: &mut O) {
        debug!(text, "announce");
        observer.on_announcement(text);
        self.voice.speak(text);
    }
}
