//! A session is what a user works with while looking at one date: the record, the storage it came
//! from and a live elapsed counter. All changes go through `&mut self`, so there is never more than
//! one change of a record in flight within a session. Between sessions every change locks the date
//! in storage and starts from what is stored there.

pub mod shutdown;
pub mod ticker;

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::{
    attendance::{
        entities::{DailyAttendanceRecord, SessionStatus},
        error::AttendanceError,
        rules::{self, ClockOutOutcome, WorkedDuration},
    },
    storage::{
        key_value::{KeyValueStore, StoreLock},
        record_storage::AttendanceStorage,
    },
    utils::{clock::Clock, settings::Settings, time::truncate_to_seconds},
};

use ticker::ElapsedTicker;

/// Result of an action that has been applied to the in-memory record. `persisted` tells whether
/// storage accepted it. A failed write is not rolled back, the next successful write or a reload
/// brings both sides together again, unless another session changes the date first.
#[derive(Debug)]
#[must_use]
pub struct Applied<T> {
    pub outcome: T,
    pub persisted: Result<(), AttendanceError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockInReport {
    pub time: NaiveTime,
    pub is_late: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOutReport {
    Committed { time: NaiveTime, is_early: bool },
    /// The clock-out needed a confirmation that wasn't given. Nothing changed.
    Cancelled,
}

pub struct AttendanceSession<S> {
    record: DailyAttendanceRecord,
    /// What this session last saw in storage. Anything else found there was written elsewhere.
    stored: DailyAttendanceRecord,
    storage: AttendanceStorage<S>,
    clock: Arc<dyn Clock>,
    settings: Settings,
    ticker: Option<ElapsedTicker>,
}

impl<S: KeyValueStore> AttendanceSession<S> {
    /// Loads the record for `date` and starts the elapsed counter if the day is running.
    pub async fn open(
        storage: AttendanceStorage<S>,
        clock: Arc<dyn Clock>,
        settings: Settings,
        date: NaiveDate,
    ) -> Result<Self, AttendanceError> {
        let record = storage.load(date).await?;
        info!("Opened {date} in state {}", record.status());
        let mut session = Self {
            stored: record.clone(),
            record,
            storage,
            clock,
            settings,
            ticker: None,
        };
        session.sync_ticker();
        Ok(session)
    }

    pub fn record(&self) -> &DailyAttendanceRecord {
        &self.record
    }

    pub fn status(&self) -> SessionStatus {
        self.record.status()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn total_worked(&self) -> Result<Option<WorkedDuration>, AttendanceError> {
        rules::total_worked_duration(&self.record)
    }

    pub fn elapsed(&self) -> Option<Duration> {
        rules::elapsed_since_clock_in(&self.record, self.clock.now())
    }

    pub fn is_today(&self) -> bool {
        self.record.date == self.clock.now().date()
    }

    /// Live elapsed time. Only available while clocked in and not on a break.
    pub fn subscribe_elapsed(&self) -> Option<watch::Receiver<Duration>> {
        self.ticker.as_ref().map(ElapsedTicker::subscribe)
    }

    pub async fn clock_in(&mut self) -> Result<Applied<ClockInReport>, AttendanceError> {
        let _lock = self.claim().await?;
        let now = self.clock.now();
        let outcome = rules::record_clock_in(&self.record, now, self.settings.expected_clock_in)?;
        self.replace_record(outcome.record);

        let time = truncate_to_seconds(now.time());
        let persisted = self.storage.save_clock_in(self.record.date, time).await;
        if persisted.is_ok() {
            self.stored.clock_in_time = Some(time);
        }
        Ok(self.applied(
            ClockInReport {
                time,
                is_late: outcome.is_late,
            },
            persisted,
        ))
    }

    /// `confirm` is asked when the clock-out is early or comes before the clock-in. Declining it
    /// leaves the record untouched. The date stays locked while `confirm` runs.
    pub async fn clock_out(
        &mut self,
        confirm: impl FnOnce(&ClockOutOutcome) -> bool,
    ) -> Result<Applied<ClockOutReport>, AttendanceError> {
        let _lock = self.claim().await?;
        let now = self.clock.now();
        let outcome = rules::record_clock_out(&self.record, now, self.settings.expected_clock_out)?;
        if outcome.needs_confirmation() && !confirm(&outcome) {
            info!("Clock out cancelled");
            return Ok(Applied {
                outcome: ClockOutReport::Cancelled,
                persisted: Ok(()),
            });
        }

        let is_early = outcome.is_early;
        self.replace_record(outcome.record);

        let time = truncate_to_seconds(now.time());
        let persisted = self.storage.save_clock_out(self.record.date, time).await;
        if persisted.is_ok() {
            self.stored.clock_out_time = Some(time);
        }
        Ok(self.applied(ClockOutReport::Committed { time, is_early }, persisted))
    }

    pub async fn start_break(&mut self, note: &str) -> Result<Applied<NaiveTime>, AttendanceError> {
        let _lock = self.claim().await?;
        let now = self.clock.now();
        let record = rules::start_break(&self.record, now, note)?;
        self.replace_record(record);
        Ok(self.persist_breaks(truncate_to_seconds(now.time())).await)
    }

    pub async fn end_break(&mut self) -> Result<Applied<NaiveTime>, AttendanceError> {
        let _lock = self.claim().await?;
        let now = self.clock.now();
        let record = rules::end_break(&self.record, now)?;
        self.replace_record(record);
        Ok(self.persist_breaks(truncate_to_seconds(now.time())).await)
    }

    /// Forgets everything about the date. The in-memory record is reset even if storage fails.
    pub async fn clear(&mut self) -> Result<(), AttendanceError> {
        let _lock = self.storage.lock(self.record.date).await?;
        self.replace_record(DailyAttendanceRecord::new(self.record.date));
        let result = self.storage.clear(self.record.date).await;
        match &result {
            Ok(()) => self.stored = self.record.clone(),
            Err(e) => error!("Failed to clear {}: {e}", self.record.date),
        }
        result
    }

    /// Throws away the in-memory record and reads it again.
    pub async fn reload(&mut self) -> Result<(), AttendanceError> {
        let record = self.storage.load(self.record.date).await?;
        self.stored = record.clone();
        self.replace_record(record);
        Ok(())
    }

    /// Stops the elapsed counter and waits until it's gone.
    pub async fn close(mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.stop().await;
        }
    }

    /// Locks the date and adopts the stored record if another session changed it since this one
    /// last looked. Unsaved local changes are kept otherwise. The lock must be held until the
    /// change is saved.
    async fn claim(&mut self) -> Result<StoreLock, AttendanceError> {
        let lock = self.storage.lock(self.record.date).await?;
        let stored = self.storage.load(self.record.date).await?;
        if stored != self.stored {
            warn!(
                "{} was changed elsewhere, continuing from state {}",
                stored.date,
                stored.status()
            );
            self.stored = stored.clone();
            self.replace_record(stored);
        }
        Ok(lock)
    }

    fn replace_record(&mut self, record: DailyAttendanceRecord) {
        self.record = record;
        self.sync_ticker();
    }

    /// The counter only runs while clocked in. It holds a snapshot of the record, so it's
    /// restarted after every change.
    fn sync_ticker(&mut self) {
        self.ticker = None;
        if self.status() == SessionStatus::ClockedIn {
            self.ticker = Some(ElapsedTicker::start(
                self.record.clone(),
                self.clock.clone(),
            ));
        }
    }

    async fn persist_breaks(&mut self, time: NaiveTime) -> Applied<NaiveTime> {
        let persisted = self
            .storage
            .save_breaks(self.record.date, &self.record.breaks)
            .await;
        if persisted.is_ok() {
            self.stored.breaks = self.record.breaks.clone();
        }
        self.applied(time, persisted)
    }

    fn applied<T>(&self, outcome: T, persisted: Result<(), AttendanceError>) -> Applied<T> {
        match &persisted {
            Ok(()) => info!("Saved {} in state {}", self.record.date, self.status()),
            Err(e) => error!("Failed to save {}: {e}", self.record.date),
        }
        Applied { outcome, persisted }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{sync::Arc, time::Duration as StdDuration};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
    use tokio::time::Instant;

    use crate::{
        attendance::{
            entities::{Action, SessionStatus},
            error::AttendanceError,
        },
        storage::{
            key_value::{KeyValueStore, MemoryKeyValueStore, MockKeyValueStore, StoreLock},
            record_storage::AttendanceStorage,
        },
        utils::{clock::Clock, logging::TEST_LOGGING, settings::Settings},
    };

    use super::{AttendanceSession, ClockOutReport};

    /// Wall clock that follows tokio's (pausable) time, starting from a fixed moment.
    #[derive(Clone)]
    pub(crate) struct TestClock {
        start_time: NaiveDateTime,
        reference: Instant,
    }

    impl TestClock {
        pub(crate) fn at(year: i32, month: u32, day: u32, h: u32, m: u32, s: u32) -> Self {
            Self {
                start_time: NaiveDate::from_ymd_opt(year, month, day)
                    .unwrap()
                    .and_hms_opt(h, m, s)
                    .unwrap(),
                reference: Instant::now(),
            }
        }
    }

    #[async_trait]
    impl Clock for TestClock {
        fn now(&self) -> NaiveDateTime {
            self.start_time + Duration::from_std(self.reference.elapsed()).unwrap()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep_until(&self, instant: tokio::time::Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

    fn time(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    async fn open_session<S: KeyValueStore>(
        store: S,
        clock: &TestClock,
    ) -> Result<AttendanceSession<S>> {
        Ok(AttendanceSession::open(
            AttendanceStorage::new(store),
            Arc::new(clock.clone()),
            Settings::default(),
            TEST_DATE,
        )
        .await?)
    }

    async fn minutes(count: u64) {
        tokio::time::advance(StdDuration::from_secs(count * 60)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_day() -> Result<()> {
        *TEST_LOGGING;
        let store = Arc::new(MemoryKeyValueStore::default());
        let clock = TestClock::at(2026, 10, 19, 9, 5, 0);
        let mut session = open_session(store.clone(), &clock).await?;
        assert_eq!(session.status(), SessionStatus::NotStarted);
        assert!(session.subscribe_elapsed().is_none());

        let clock_in = session.clock_in().await?;
        clock_in.persisted?;
        assert!(clock_in.outcome.is_late);
        assert_eq!(clock_in.outcome.time, time(9, 5, 0));
        assert!(session.subscribe_elapsed().is_some());

        minutes(60).await;
        let started = session.start_break("coffee").await?;
        started.persisted?;
        assert_eq!(started.outcome, time(10, 5, 0));
        assert_eq!(session.status(), SessionStatus::OnBreak);
        assert!(session.subscribe_elapsed().is_none());

        minutes(30).await;
        session.end_break().await?.persisted?;
        assert_eq!(session.elapsed(), Some(Duration::hours(1)));
        assert!(session.subscribe_elapsed().is_some());

        minutes(7 * 60).await;
        let clock_out = session.clock_out(|_| panic!("No confirmation expected")).await?;
        clock_out.persisted?;
        assert_eq!(
            clock_out.outcome,
            ClockOutReport::Committed {
                time: time(17, 35, 0),
                is_early: false
            }
        );
        assert!(session.subscribe_elapsed().is_none());
        assert_eq!(session.total_worked()?.unwrap().to_string(), "8h 0m");
        session.close().await;

        let reopened = open_session(store.clone(), &clock).await?;
        assert_eq!(reopened.status(), SessionStatus::ClockedOut);
        assert_eq!(reopened.record().breaks.len(), 1);
        assert_eq!(reopened.record().breaks[0].note, "coffee");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_clock_out_needs_confirmation() -> Result<()> {
        let store = Arc::new(MemoryKeyValueStore::default());
        let clock = TestClock::at(2026, 10, 19, 8, 55, 0);
        let mut session = open_session(store.clone(), &clock).await?;
        assert!(!session.clock_in().await?.outcome.is_late);

        minutes(60).await;
        let declined = session
            .clock_out(|outcome| {
                assert!(outcome.is_early);
                false
            })
            .await?;
        assert_eq!(declined.outcome, ClockOutReport::Cancelled);
        assert_eq!(session.status(), SessionStatus::ClockedIn);
        assert_eq!(store.get("clockOut_2026-10-19").await?, None);

        let accepted = session.clock_out(|_| true).await?;
        accepted.persisted?;
        assert_eq!(
            accepted.outcome,
            ClockOutReport::Committed {
                time: time(9, 55, 0),
                is_early: true
            }
        );
        assert_eq!(
            store.get("clockOut_2026-10-19").await?.as_deref(),
            Some("09:55:00")
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_keeps_memory_state() -> Result<()> {
        let mut store = MockKeyValueStore::new();
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_try_lock()
            .returning(|_| Ok(Some(StoreLock::new(()))));
        store
            .expect_set()
            .times(1)
            .returning(|_, _| Err(anyhow!("storage is full")));

        let clock = TestClock::at(2026, 10, 19, 9, 0, 0);
        let mut session = open_session(store, &clock).await?;

        let applied = session.clock_in().await?;
        assert!(matches!(
            applied.persisted,
            Err(AttendanceError::StorageWrite { .. })
        ));
        assert_eq!(session.status(), SessionStatus::ClockedIn);

        // Storage never got the clock in, reloading brings the session back in line with it.
        session.reload().await?;
        assert_eq!(session.status(), SessionStatus::NotStarted);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_is_not_rolled_back_by_next_action() -> Result<()> {
        let mut store = MockKeyValueStore::new();
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_try_lock()
            .returning(|_| Ok(Some(StoreLock::new(()))));
        store
            .expect_set()
            .withf(|key, _| key.starts_with("clockIn_"))
            .times(1)
            .returning(|_, _| Err(anyhow!("storage is full")));
        store
            .expect_set()
            .withf(|key, _| key.starts_with("breaks_"))
            .times(1)
            .returning(|_, _| Ok(()));

        let clock = TestClock::at(2026, 10, 19, 9, 0, 0);
        let mut session = open_session(store, &clock).await?;
        assert!(session.clock_in().await?.persisted.is_err());

        minutes(30).await;
        session.start_break("").await?.persisted?;
        assert_eq!(session.status(), SessionStatus::OnBreak);
        assert_eq!(session.record().clock_in_time, Some(time(9, 0, 0)));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_session_cannot_clock_in_again() -> Result<()> {
        let store = Arc::new(MemoryKeyValueStore::default());
        let clock = TestClock::at(2026, 10, 19, 9, 0, 0);
        let mut first = open_session(store.clone(), &clock).await?;
        let mut second = open_session(store.clone(), &clock).await?;

        first.clock_in().await?.persisted?;
        minutes(60).await;

        assert!(matches!(
            second.clock_in().await,
            Err(AttendanceError::InvalidTransition {
                action: Action::ClockIn,
                status: SessionStatus::ClockedIn,
            })
        ));
        assert_eq!(second.record().clock_in_time, Some(time(9, 0, 0)));
        assert_eq!(
            store.get("clockIn_2026-10-19").await?.as_deref(),
            Some("09:00:00")
        );

        // The second session continues from the stored record.
        second.start_break("lunch").await?.persisted?;
        minutes(30).await;
        first.end_break().await?.persisted?;
        assert_eq!(first.status(), SessionStatus::ClockedIn);
        assert_eq!(first.record().breaks.len(), 1);
        assert_eq!(first.record().breaks[0].note, "lunch");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_locked_date_is_busy() -> Result<()> {
        let store = Arc::new(MemoryKeyValueStore::default());
        let clock = TestClock::at(2026, 10, 19, 9, 0, 0);
        let mut session = open_session(store.clone(), &clock).await?;

        let held = AttendanceStorage::new(store.clone()).lock(TEST_DATE).await?;
        assert!(matches!(
            session.clock_in().await,
            Err(AttendanceError::RecordBusy { date }) if date == TEST_DATE
        ));
        assert!(matches!(
            session.clear().await,
            Err(AttendanceError::RecordBusy { .. })
        ));
        assert_eq!(store.get("clockIn_2026-10-19").await?, None);

        drop(held);
        session.clock_in().await?.persisted?;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_resets_everything() -> Result<()> {
        let store = Arc::new(MemoryKeyValueStore::default());
        let clock = TestClock::at(2026, 10, 19, 9, 0, 0);
        let mut session = open_session(store.clone(), &clock).await?;
        session.clock_in().await?.persisted?;
        session.start_break("").await?.persisted?;

        session.clear().await?;
        assert_eq!(session.status(), SessionStatus::NotStarted);
        assert!(session.record().breaks.is_empty());

        session.reload().await?;
        assert_eq!(session.status(), SessionStatus::NotStarted);
        assert!(session.record().breaks.is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_in_only_today() -> Result<()> {
        let clock = TestClock::at(2026, 10, 20, 9, 0, 0);
        let mut session = open_session(MemoryKeyValueStore::default(), &clock).await?;
        assert!(matches!(
            session.clock_in().await,
            Err(AttendanceError::DateMismatch { .. })
        ));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_twice_is_rejected() -> Result<()> {
        let clock = TestClock::at(2026, 10, 19, 9, 0, 0);
        let mut session = open_session(MemoryKeyValueStore::default(), &clock).await?;
        session.clock_in().await?.persisted?;
        session.start_break("").await?.persisted?;
        assert!(matches!(
            session.start_break("").await,
            Err(AttendanceError::InvalidTransition { .. })
        ));
        Ok(())
    }
}
