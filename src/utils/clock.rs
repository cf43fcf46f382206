use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use tokio::time::Instant;

/// Represents an entity responsible for providing wall-clock time across the application. Records
/// are kept in local time, since a work day is a local notion. Swapping it out allows tests to
/// pin "now".
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn now(&self) -> NaiveDateTime;

    fn instant(&self) -> Instant;

    async fn sleep_until(&self, instant: tokio::time::Instant);
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: tokio::time::Instant) {
        tokio::time::sleep_until(instant).await;
    }
}
