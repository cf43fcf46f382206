use std::{sync::Arc, time::Duration as StdDuration};

use chrono::Duration;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::{
    attendance::{entities::DailyAttendanceRecord, rules::elapsed_since_clock_in},
    utils::clock::Clock,
};

const TICK_INTERVAL: StdDuration = StdDuration::from_secs(1);

/// Handle to a background task publishing the elapsed work time once per second. The task works
/// on a snapshot of the record, so it has to be replaced whenever the record changes. Dropping the
/// handle cancels the task.
pub struct ElapsedTicker {
    cancellation: CancellationToken,
    receiver: watch::Receiver<Duration>,
    task: Option<JoinHandle<()>>,
}

impl ElapsedTicker {
    /// Must be called from within a tokio runtime.
    pub fn start(record: DailyAttendanceRecord, clock: Arc<dyn Clock>) -> Self {
        let initial = elapsed_since_clock_in(&record, clock.now()).unwrap_or_else(Duration::zero);
        let (sender, receiver) = watch::channel(initial);
        let cancellation = CancellationToken::new();

        let span = info_span!("Elapsed ticker", date = %record.date);
        let task = tokio::spawn(
            run_ticker(record, clock, sender, cancellation.clone()).instrument(span),
        );

        Self {
            cancellation,
            receiver,
            task: Some(task),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Duration> {
        self.receiver.clone()
    }

    pub fn elapsed(&self) -> Duration {
        *self.receiver.borrow()
    }

    /// Cancels the task and waits for it to finish.
    pub async fn stop(mut self) {
        self.cancellation.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ElapsedTicker {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

async fn run_ticker(
    record: DailyAttendanceRecord,
    clock: Arc<dyn Clock>,
    sender: watch::Sender<Duration>,
    cancellation: CancellationToken,
) {
    debug!("Starting ticker");
    let mut tick_point = clock.instant();
    loop {
        tick_point += TICK_INTERVAL;
        let now = clock.instant();
        if tick_point < now {
            // Fell behind, for example after the machine was suspended. Skip the missed ticks.
            tick_point = now + TICK_INTERVAL;
        }

        tokio::select! {
            _ = cancellation.cancelled() => {
                debug!("Ticker cancelled");
                return;
            }
            _ = clock.sleep_until(tick_point) => ()
        }

        let Some(elapsed) = elapsed_since_clock_in(&record, clock.now()) else {
            return;
        };
        if sender.send(elapsed).is_err() {
            // Every receiver is gone, nobody is watching anymore.
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration as StdDuration};

    use chrono::{Duration, NaiveDate, NaiveTime};

    use crate::{
        attendance::entities::DailyAttendanceRecord,
        session::tests::TestClock,
        utils::logging::TEST_LOGGING,
    };

    use super::ElapsedTicker;

    fn clocked_in_record() -> DailyAttendanceRecord {
        DailyAttendanceRecord {
            clock_in_time: Some(NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
            ..DailyAttendanceRecord::new(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_counts_seconds() {
        *TEST_LOGGING;
        let clock = TestClock::at(2026, 10, 19, 10, 0, 0);
        let ticker = ElapsedTicker::start(clocked_in_record(), Arc::new(clock));
        assert_eq!(ticker.elapsed(), Duration::hours(1));

        tokio::time::sleep(StdDuration::from_millis(3500)).await;
        assert_eq!(ticker.elapsed(), Duration::seconds(3603));
        ticker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_ticker_stops_it() {
        let clock = TestClock::at(2026, 10, 19, 10, 0, 0);
        let ticker = ElapsedTicker::start(clocked_in_record(), Arc::new(clock));
        let mut receiver = ticker.subscribe();
        drop(ticker);

        // The sender lives in the task, so the channel closes once the task is gone.
        while receiver.changed().await.is_ok() {}
        assert_eq!(*receiver.borrow(), Duration::hours(1));
    }
}
