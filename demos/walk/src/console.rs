//! Terminal stand-ins for the speech engine and the visual overlay.

use wf_core::PositionFix;
use wf_guidance::{DisplayState, SessionState, SpeechEngine, Utterance, VoiceInfo};
use wf_position::PositionError;
use wf_session::{ChannelEvent, GuidanceObserver};

// ── Speech ────────────────────────────────────────────────────────────────────

/// Prints each utterance instead of synthesizing it.
#[derive(Default)]
pub struct ConsoleSpeech {
    spoken: usize,
}

impl ConsoleSpeech {
    pub fn spoken(&self) -> usize {
        self.spoken
    }
}

impl SpeechEngine for ConsoleSpeech {
    fn voices(&self) -> Vec<VoiceInfo> {
        vec![VoiceInfo::new("Console Female", "en-US")]
    }

    fn speak(&mut self, utterance: Utterance) {
        self.spoken += 1;
        println!("  🔊 \"{}\" (rate {:.1})", utterance.text, utterance.rate);
    }

    fn cancel(&mut self) {}

    fn is_speaking(&self) -> bool {
        false
    }
}

// ── Overlay ───────────────────────────────────────────────────────────────────

/// Renders the overlay and lifecycle events, one line each.
#[derive(Default)]
pub struct ConsoleObserver {
    pub fixes:           usize,
    pub position_errors: usize,
    pub discarded:       usize,
    pub arrived:         bool,
    verbose_fixes:       bool,
}

impl ConsoleObserver {
    pub fn new(verbose_fixes: bool) -> Self {
        Self { verbose_fixes, ..Default::default() }
    }
}

impl GuidanceObserver for ConsoleObserver {
    fn on_state_change(&mut self, from: SessionState, to: SessionState) {
        if to == SessionState::Arrived {
            self.arrived = true;
        }
        println!("[{from} → {to}]");
    }

    fn on_display(&mut self, d: &DisplayState) {
        println!(
            "{} {:<24} step {}/{}  {:>5.0} m  │ {}",
            d.arrow.glyph(),
            d.street,
            d.step_number,
            d.total_steps,
            d.distance_to_next_m,
            d.instruction,
        );
    }

    fn on_fix(&mut self, fix: &PositionFix) {
        self.fixes += 1;
        if self.verbose_fixes {
            println!("  · {} ±{:.0} m", fix.coordinate, fix.accuracy_m);
        }
    }

    fn on_position_error(&mut self, error: &PositionError) {
        self.position_errors += 1;
        eprintln!("position: {error}");
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => println!("[channel connected]"),
            ChannelEvent::ReconnectScheduled { retry_at } => {
                println!("[channel lost, retrying at {retry_at}]");
            }
            ChannelEvent::Closed => println!("[channel closed]"),
        }
    }

    fn on_remote_error(&mut self, message: &str) {
        eprintln!("server: {message}");
    }

    fn on_discarded_update(&mut self, _reason: &str) {
        self.discarded += 1;
    }
}
