//! Periodic follow-up notifications.
//!
//! The scheduler polls the people cache on a fixed interval and hands notices
//! to a `Notifier` sink. Changing the interval or toggling notifications in
//! settings restarts it.

use crate::cache::PeopleCache;
use crate::settings::SettingsStore;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Wait after the initial scan before the startup check
pub const STARTUP_CHECK_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Upcoming(usize),
    Overdue(usize),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Upcoming(1) => write!(f, "You have 1 upcoming follow-up"),
            Notice::Upcoming(n) => write!(f, "You have {} upcoming follow-ups", n),
            Notice::Overdue(1) => write!(f, "You have 1 overdue follow-up!"),
            Notice::Overdue(n) => write!(f, "You have {} overdue follow-ups!", n),
        }
    }
}

/// Sink presenting notices to the user
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Presents notices as log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::Upcoming(_) => info!("{}", notice),
            Notice::Overdue(_) => warn!("{}", notice),
        }
    }
}

/// Counts found by one check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub upcoming: usize,
    pub overdue: usize,
}

struct SchedulerInner {
    cache: Arc<PeopleCache>,
    settings: SettingsStore,
    notifier: Arc<dyn Notifier>,
    indexing_complete: watch::Receiver<bool>,
    startup_delay: Duration,
    startup_done: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    settings_task: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerInner {
    fn start(self: &Arc<Self>) {
        self.watch_settings();

        let settings = self.settings.current();
        if !settings.enable_notifications {
            debug!("Notifications disabled");
            return;
        }

        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if timer.is_some() {
            return;
        }

        let startup_check = settings.show_notification_on_startup
            && !self.startup_done.swap(true, Ordering::SeqCst);
        let period = Duration::from_secs(u64::from(settings.notification_check_interval_minutes) * 60);
        info!(
            "Checking follow-ups every {} minutes",
            settings.notification_check_interval_minutes
        );

        let inner = self.clone();
        *timer = Some(tokio::spawn(async move {
            let first_tick = Instant::now() + period;
            if startup_check {
                let mut ready = inner.indexing_complete.clone();
                if ready.wait_for(|done| *done).await.is_ok() {
                    tokio::time::sleep(inner.startup_delay).await;
                    inner.check(Utc::now());
                }
            }

            let mut interval = tokio::time::interval_at(first_tick, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                inner.check(Utc::now());
            }
        }));
    }

    fn stop(&self) {
        let timer = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(timer) = timer {
            timer.abort();
            debug!("Stopped follow-up checks");
        }
    }

    fn check(&self, now: DateTime<Utc>) -> CheckSummary {
        let settings = self.settings.current();
        if !settings.enable_notifications {
            return CheckSummary::default();
        }

        let summary = CheckSummary {
            upcoming: self
                .cache
                .upcoming(settings.notification_lead_time_hours, now)
                .len(),
            overdue: self.cache.overdue(now).len(),
        };
        debug!(
            "Follow-up check: {} upcoming, {} overdue",
            summary.upcoming, summary.overdue
        );

        if summary.overdue > 0 {
            self.notifier.notify(Notice::Overdue(summary.overdue));
        }
        if summary.upcoming > 0 {
            self.notifier.notify(Notice::Upcoming(summary.upcoming));
        }
        summary
    }

    /// Restart when the interval or the enabled flag changes
    fn watch_settings(self: &Arc<Self>) {
        let mut task = self.settings_task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return;
        }

        let mut rx = self.settings.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        *task = Some(tokio::spawn(async move {
            let key = |s: &crate::settings::Settings| {
                (s.notification_check_interval_minutes, s.enable_notifications)
            };
            let mut last = key(&*rx.borrow_and_update());
            while rx.changed().await.is_ok() {
                let next = key(&*rx.borrow_and_update());
                if next == last {
                    continue;
                }
                last = next;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                debug!("Notification settings changed, restarting");
                inner.stop();
                inner.start();
            }
        }));
    }
}

/// Polls the cache for upcoming and overdue follow-ups.
pub struct NotificationScheduler {
    inner: Arc<SchedulerInner>,
}

impl NotificationScheduler {
    /// `indexing_complete` gates the startup check until the initial scan is done.
    pub fn new(
        cache: Arc<PeopleCache>,
        settings: SettingsStore,
        notifier: Arc<dyn Notifier>,
        indexing_complete: watch::Receiver<bool>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                cache,
                settings,
                notifier,
                indexing_complete,
                startup_delay: STARTUP_CHECK_DELAY,
                startup_done: AtomicBool::new(false),
                timer: Mutex::new(None),
                settings_task: Mutex::new(None),
            }),
        }
    }

    /// Start periodic checks. Does nothing when notifications are disabled
    /// or the scheduler is already running. Must run inside a tokio runtime.
    pub fn start(&self) {
        self.inner.start();
    }

    /// Cancel periodic checks. Settings changes may start them again.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn restart(&self) {
        self.inner.stop();
        self.inner.start();
    }

    /// Stop checks and stop following settings.
    pub fn shutdown(&self) {
        self.inner.stop();
        if let Some(task) = self
            .inner
            .settings_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Run a check now
    pub fn check_now(&self) -> CheckSummary {
        self.inner.check(Utc::now())
    }

    /// Run a check as of `now`
    pub fn check_at(&self, now: DateTime<Utc>) -> CheckSummary {
        self.inner.check(now)
    }
}

impl Drop for NotificationScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
