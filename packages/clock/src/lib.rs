#![deny(unused_crate_dependencies)]
use services::types::{DateTime, Utc};

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl services::ports::clock::Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
mod test_helpers {
    use std::{
        sync::{atomic::AtomicI64, Arc},
        time::Duration,
    };

    use services::types::{DateTime, Utc};

    #[derive(Default, Clone)]
    pub struct TestClock {
        epoch_millis: Arc<AtomicI64>,
    }

    impl TestClock {
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                epoch_millis: Arc::new(AtomicI64::new(time.timestamp_millis())),
            }
        }

        pub fn now(&self) -> DateTime<Utc> {
            DateTime::<Utc>::from_timestamp_millis(
                self.epoch_millis.load(std::sync::atomic::Ordering::Relaxed),
            )
            .expect("DateTime<Utc> to be in range")
        }

        pub fn advance_time(&self, adv: Duration) {
            let new_time = self.now() + adv;
            self.epoch_millis.store(
                new_time.timestamp_millis(),
                std::sync::atomic::Ordering::Relaxed,
            )
        }

        pub fn set_time(&self, new_time: DateTime<Utc>) {
            self.epoch_millis.store(
                new_time.timestamp_millis(),
                std::sync::atomic::Ordering::Relaxed,
            )
        }
    }

    impl services::ports::clock::Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            self.now()
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub use test_helpers::TestClock;
