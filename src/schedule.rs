//! In-process timer: a table of jobs bound to wall-clock times, polled
//! from a single thread. Due jobs run inline, one after the other.

use std::time::Duration as StdDuration;

use crossbeam_channel::{never, select, tick, Receiver};
use miette::Result;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::{debug, error, info};

use crate::types::ClockTime;

/// Source of the current local time
pub trait Clock {
    fn now(&self) -> PrimitiveDateTime;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> PrimitiveDateTime {
        (**self).now()
    }
}

/// System clock seen through a fixed UTC offset.
///
/// The offset is the one read at startup and is never updated: after a
/// daylight saving change the jobs fire one hour early or late in real local
/// time, until the process is restarted.
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    offset: UtcOffset,
}

impl LocalClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl Clock for LocalClock {
    fn now(&self) -> PrimitiveDateTime {
        let now = OffsetDateTime::now_utc().to_offset(self.offset);
        PrimitiveDateTime::new(now.date(), now.time())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    /// Run every day at the same time
    Daily,
    /// Run once, then leave the job table
    Once,
}

/// Work of a job. Receives the time at which the job table was polled.
pub type Task<'a> = Box<dyn FnMut(PrimitiveDateTime) -> Result<()> + 'a>;

struct Job<'a> {
    label: String,
    at: ClockTime,
    recurrence: Recurrence,
    next_run: PrimitiveDateTime,
    task: Task<'a>,
}

/// First time strictly after `now` at which the clock reads `at`
pub fn next_occurrence(now: PrimitiveDateTime, at: ClockTime) -> PrimitiveDateTime {
    let today = now.date().with_time(at.time());
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

pub struct Scheduler<'a, C> {
    clock: C,
    jobs: Vec<Job<'a>>,
    idle_reported: bool,
}

impl<'a, C: Clock> Scheduler<'a, C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            jobs: Vec::new(),
            idle_reported: false,
        }
    }

    fn add<F>(&mut self, at: ClockTime, recurrence: Recurrence, label: String, task: F)
    where
        F: FnMut(PrimitiveDateTime) -> Result<()> + 'a,
    {
        let next_run = next_occurrence(self.clock.now(), at);
        debug!("Job '{label}' registered, next run at {next_run}");

        self.jobs.push(Job {
            label,
            at,
            recurrence,
            next_run,
            task: Box::new(task),
        });
        self.idle_reported = false;
    }

    /// Register a job running every day at the given time
    pub fn every_day_at<F>(&mut self, at: ClockTime, label: impl Into<String>, task: F)
    where
        F: FnMut(PrimitiveDateTime) -> Result<()> + 'a,
    {
        self.add(at, Recurrence::Daily, label.into(), task)
    }

    /// Register a job running once, at the next time the clock reads `at`
    pub fn once_at<F>(&mut self, at: ClockTime, label: impl Into<String>, task: F)
    where
        F: FnMut(PrimitiveDateTime) -> Result<()> + 'a,
    {
        self.add(at, Recurrence::Once, label.into(), task)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Earliest upcoming run among the registered jobs
    pub fn next_run(&self) -> Option<PrimitiveDateTime> {
        self.jobs.iter().map(|job| job.next_run).min()
    }

    /// Run every due job, earliest first, and return how many ran.
    ///
    /// A failing job is logged and does not prevent the others from running.
    pub fn run_pending(&mut self) -> usize {
        let now = self.clock.now();

        let mut due: Vec<usize> = (0..self.jobs.len())
            .filter(|&i| self.jobs[i].next_run <= now)
            .collect();
        due.sort_by_key(|&i| self.jobs[i].next_run);

        for &i in &due {
            let job = &mut self.jobs[i];
            info!("Running job '{}'", job.label);

            match (job.task)(now) {
                Ok(()) => debug!("Job '{}' completed", job.label),
                Err(report) => error!("Job '{}' failed: {report:?}", job.label),
            }

            // Jobs may run for hours, reschedule from the time they ended
            job.next_run = next_occurrence(self.clock.now().max(now), job.at);
        }

        if !due.is_empty() {
            let mut idx = 0;
            self.jobs.retain(|job| {
                let ran = due.contains(&idx);
                idx += 1;
                !(ran && job.recurrence == Recurrence::Once)
            });
        }

        due.len()
    }

    /// Poll the job table every `interval` until something is received on `stop`
    /// (or its sender is dropped).
    pub fn run_until(&mut self, stop: &Receiver<()>, interval: StdDuration) {
        let ticker = tick(interval);

        loop {
            select! {
                recv(ticker) -> _ => {
                    self.run_pending();

                    if self.jobs.is_empty() && !self.idle_reported {
                        info!("No job left to run");
                        self.idle_reported = true;
                    }
                }
                recv(stop) -> _ => {
                    debug!("Scheduler stopped");
                    return;
                }
            }
        }
    }

    /// Poll the job table every `interval`, forever
    pub fn run_forever(&mut self, interval: StdDuration) -> ! {
        self.run_until(&never(), interval);
        unreachable!("the never channel cannot deliver a stop message")
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        time::Duration as StdDuration,
    };

    use crossbeam_channel::bounded;
    use miette::miette;
    use time::macros::datetime;

    use super::*;

    struct ManualClock(Cell<PrimitiveDateTime>);

    impl ManualClock {
        fn at(now: PrimitiveDateTime) -> Self {
            Self(Cell::new(now))
        }

        fn set(&self, now: PrimitiveDateTime) {
            self.0.set(now)
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> PrimitiveDateTime {
            self.0.get()
        }
    }

    fn hm(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    #[test]
    fn local_clock_keeps_the_offset_it_was_given() {
        let offset = UtcOffset::from_hms(5, 30, 0).unwrap();
        let before = OffsetDateTime::now_utc().to_offset(offset);
        let now = LocalClock::new(offset).now();

        let elapsed = now - PrimitiveDateTime::new(before.date(), before.time());
        assert!(elapsed >= Duration::ZERO && elapsed < Duration::minutes(1));
    }

    #[test]
    fn next_occurrence_is_strictly_in_the_future() {
        let now = datetime!(2024-01-01 10:00);
        assert_eq!(next_occurrence(now, hm("13:00")), datetime!(2024-01-01 13:00));
        assert_eq!(next_occurrence(now, hm("03:00")), datetime!(2024-01-02 03:00));
        assert_eq!(next_occurrence(now, hm("10:00")), datetime!(2024-01-02 10:00));
        assert_eq!(
            next_occurrence(datetime!(2024-12-31 23:30), hm("00:00")),
            datetime!(2025-01-01 00:00)
        );
    }

    #[test]
    fn daily_job_runs_once_per_day() {
        let clock = ManualClock::at(datetime!(2024-01-01 23:59:58));
        let runs = RefCell::new(Vec::new());

        let mut scheduler = Scheduler::new(&clock);
        scheduler.every_day_at(hm("00:00"), "download", |now| {
            runs.borrow_mut().push(now.date());
            Ok(())
        });

        assert_eq!(scheduler.run_pending(), 0);

        clock.set(datetime!(2024-01-02 00:00:00));
        assert_eq!(scheduler.run_pending(), 1);

        // Polling again in the same second or later that day does nothing
        clock.set(datetime!(2024-01-02 00:00:01));
        assert_eq!(scheduler.run_pending(), 0);
        clock.set(datetime!(2024-01-02 18:00));
        assert_eq!(scheduler.run_pending(), 0);

        clock.set(datetime!(2024-01-03 00:00:00));
        assert_eq!(scheduler.run_pending(), 1);
        assert_eq!(scheduler.len(), 1);
        drop(scheduler);

        assert_eq!(
            *runs.borrow(),
            [
                datetime!(2024-01-02 00:00).date(),
                datetime!(2024-01-03 00:00).date()
            ]
        );
    }

    #[test]
    fn once_jobs_leave_the_table_after_running() {
        let clock = ManualClock::at(datetime!(2024-01-01 02:00));
        let order = RefCell::new(Vec::new());

        let mut scheduler = Scheduler::new(&clock);
        for (slot, name) in [("09:00", "second"), ("03:00", "first")] {
            let order = &order;
            scheduler.once_at(hm(slot), name, move |_| {
                order.borrow_mut().push(name);
                Ok(())
            });
        }
        assert_eq!(scheduler.next_run(), Some(datetime!(2024-01-01 03:00)));

        // Both due at once: earliest first
        clock.set(datetime!(2024-01-01 12:00));
        assert_eq!(scheduler.run_pending(), 2);
        assert!(scheduler.is_empty());

        clock.set(datetime!(2024-01-02 12:00));
        assert_eq!(scheduler.run_pending(), 0);
        drop(scheduler);

        assert_eq!(*order.borrow(), ["first", "second"]);
    }

    #[test]
    fn past_slots_wait_for_the_next_day() {
        let clock = ManualClock::at(datetime!(2024-01-01 10:00));
        let mut scheduler = Scheduler::new(&clock);
        scheduler.once_at(hm("03:00"), "early", |_| Ok(()));

        assert_eq!(scheduler.next_run(), Some(datetime!(2024-01-02 03:00)));
        clock.set(datetime!(2024-01-01 23:59));
        assert_eq!(scheduler.run_pending(), 0);
    }

    #[test]
    fn failing_job_does_not_stop_the_others() {
        let clock = ManualClock::at(datetime!(2024-01-01 00:30));
        let ran = Cell::new(false);

        let mut scheduler = Scheduler::new(&clock);
        scheduler.once_at(hm("03:00"), "broken upload", |_| Err(miette!("quota exceeded")));
        scheduler.once_at(hm("09:00"), "upload", |_| {
            ran.set(true);
            Ok(())
        });

        clock.set(datetime!(2024-01-01 03:00));
        assert_eq!(scheduler.run_pending(), 1);
        assert_eq!(scheduler.len(), 1);

        clock.set(datetime!(2024-01-01 09:00));
        assert_eq!(scheduler.run_pending(), 1);
        assert!(scheduler.is_empty());
        drop(scheduler);
        assert!(ran.get());
    }

    #[test]
    fn run_until_polls_and_stops_on_request() {
        let clock = ManualClock::at(datetime!(2024-01-01 02:59));
        let (stop_tx, stop_rx) = bounded(1);

        let mut scheduler = Scheduler::new(&clock);
        scheduler.once_at(hm("03:00"), "upload", move |_| {
            stop_tx.send(()).map_err(|err| miette!("{err}"))
        });
        clock.set(datetime!(2024-01-01 03:00));

        scheduler.run_until(&stop_rx, StdDuration::from_millis(5));
        assert!(scheduler.is_empty());
    }
}
