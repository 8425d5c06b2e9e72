use super::message::HostMessage;
use crate::editor::Editor;
use std::time::{Duration, Instant};

/// Default cadence for pushing the cursor line to the surface.
///
/// Sync is polling only: the surface has no way to ask for a push and the
/// host cannot see what the surface shows, so the line is simply re-sent on
/// every tick. Anything that drifts corrects itself on the next ping.
pub const SYNC_INTERVAL: Duration = Duration::from_millis(50);

/// Fixed-interval timer owned by an active panel.
#[derive(Debug, Clone)]
pub struct LineSyncTimer {
    interval: Duration,
    next_due: Instant,
}

impl LineSyncTimer {
    pub fn start(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_due: now + interval,
        }
    }

    /// True once per elapsed interval; re-arms itself when it fires.
    pub fn fire(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due = now + self.interval;
        true
    }

    pub fn until_due(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }
}

/// The ping for the editor's current cursor, if it has one.
pub fn ping_for(editor: &dyn Editor) -> Option<HostMessage> {
    editor.cursor_line().map(|line| HostMessage::Ping { line })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::tests::FakeEditor;
    use crate::editor::Position;

    #[test]
    fn fires_once_per_interval() {
        let t0 = Instant::now();
        let mut timer = LineSyncTimer::start(SYNC_INTERVAL, t0);
        assert!(!timer.fire(t0));
        assert!(!timer.fire(t0 + Duration::from_millis(49)));
        assert!(timer.fire(t0 + Duration::from_millis(50)));
        assert!(!timer.fire(t0 + Duration::from_millis(60)));
        assert!(timer.fire(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn until_due_counts_down() {
        let t0 = Instant::now();
        let timer = LineSyncTimer::start(SYNC_INTERVAL, t0);
        assert_eq!(timer.until_due(t0 + Duration::from_millis(20)), Duration::from_millis(30));
        assert_eq!(timer.until_due(t0 + Duration::from_millis(80)), Duration::ZERO);
    }

    #[test]
    fn ping_uses_one_based_line() {
        let editor = FakeEditor {
            cursor: Some(Position::new(9, 0)),
            ..Default::default()
        };
        assert_eq!(ping_for(&editor), Some(HostMessage::Ping { line: 10 }));
        assert_eq!(ping_for(&FakeEditor::default()), None);
    }
}
