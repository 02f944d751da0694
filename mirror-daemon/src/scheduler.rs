//! Daily restart timer.

use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Period between restarts once the first one has fired.
pub const RESTART_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Time until the next `restart_hour:00` on the local wall clock.
///
/// Today's slot is used unless `now` is already past it; exactly on the hour
/// yields zero.
pub fn compute_initial_delay(now: NaiveDateTime, restart_hour: u32) -> Duration {
    let slot = NaiveTime::from_hms_opt(restart_hour.min(23), 0, 0).unwrap_or_default();
    let mut next = now.date().and_time(slot);
    if now > next {
        next += TimeDelta::days(1);
    }
    (next - now).to_std().unwrap_or_default()
}

/// When the armed timer fires first, and how often after that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartSchedule {
    pub restart_hour: u32,
    pub initial_delay: Duration,
    pub interval: Duration,
}

impl RestartSchedule {
    pub fn at(now: NaiveDateTime, restart_hour: u32) -> Self {
        Self {
            restart_hour,
            initial_delay: compute_initial_delay(now, restart_hour),
            interval: RESTART_INTERVAL,
        }
    }

    pub fn from_now(restart_hour: u32) -> Self {
        Self::at(Local::now().naive_local(), restart_hour)
    }

    /// Wall-clock time of the first firing, relative to `now`.
    pub fn next_fire(&self, now: NaiveDateTime) -> NaiveDateTime {
        let delay = TimeDelta::from_std(self.initial_delay).unwrap_or_default();
        now + delay
    }
}

/// Spawn the recurring timer. `on_fire` runs on the timer task; it must not
/// block for long.
///
/// The timer keeps its fixed period: no drift correction and no DST
/// adjustment. Missed ticks are skipped rather than replayed.
pub fn arm<F>(
    schedule: RestartSchedule,
    mut on_fire: F,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    let period = schedule.interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + schedule.initial_delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            restart_hour = schedule.restart_hour,
            in_secs = schedule.initial_delay.as_secs(),
            "daily restart armed",
        );
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    tracing::info!(restart_hour = schedule.restart_hour, "restart timer fired");
                    on_fire();
                }
            }
        }
        tracing::debug!("restart timer disarmed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tokio::sync::mpsc;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn past_the_hour_rolls_to_tomorrow() {
        assert_eq!(
            compute_initial_delay(at(9, 0), 4),
            Duration::from_secs(19 * 3600)
        );
    }

    #[test]
    fn before_the_hour_fires_today() {
        assert_eq!(
            compute_initial_delay(at(2, 0), 4),
            Duration::from_secs(2 * 3600)
        );
    }

    #[test]
    fn exactly_on_the_hour_fires_now() {
        assert_eq!(compute_initial_delay(at(4, 0), 4), Duration::ZERO);
    }

    #[test]
    fn one_minute_past_waits_almost_a_day() {
        assert_eq!(
            compute_initial_delay(at(4, 1), 4),
            Duration::from_secs(24 * 3600 - 60)
        );
    }

    #[test]
    fn next_fire_is_wall_clock_target() {
        let schedule = RestartSchedule::at(at(9, 0), 4);
        let expected = NaiveDate::from_ymd_opt(2024, 3, 16)
            .unwrap()
            .and_hms_opt(4, 0, 0)
            .unwrap();
        assert_eq!(schedule.next_fire(at(9, 0)), expected);
        assert_eq!(schedule.interval, RESTART_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay_then_every_interval() {
        let schedule = RestartSchedule {
            restart_hour: 4,
            initial_delay: Duration::from_secs(7200),
            interval: RESTART_INTERVAL,
        };
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let (fired_tx, mut fired_rx) = mpsc::unbounded_channel::<Instant>();
        let start = Instant::now();

        let handle = arm(
            schedule,
            move || {
                let _ = fired_tx.send(Instant::now());
            },
            shutdown_tx.subscribe(),
        );

        let first = fired_rx.recv().await.expect("first fire");
        let waited = first - start;
        assert!(waited >= Duration::from_secs(7200), "fired early: {waited:?}");
        assert!(waited < Duration::from_secs(7201), "fired late: {waited:?}");

        let second = fired_rx.recv().await.expect("second fire");
        let gap = second - first;
        assert!(gap >= RESTART_INTERVAL - Duration::from_millis(1), "gap: {gap:?}");
        assert!(gap < RESTART_INTERVAL + Duration::from_secs(1), "gap: {gap:?}");

        shutdown_tx.send(()).expect("shutdown");
        handle.await.expect("timer task");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_disarms_before_first_fire() {
        let schedule = RestartSchedule::at(at(9, 0), 4);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let (fired_tx, mut fired_rx) = mpsc::unbounded_channel::<()>();

        let handle = arm(
            schedule,
            move || {
                let _ = fired_tx.send(());
            },
            shutdown_tx.subscribe(),
        );
        shutdown_tx.send(()).expect("shutdown");
        handle.await.expect("timer task");

        assert!(fired_rx.recv().await.is_none(), "timer must not fire after shutdown");
    }
}
