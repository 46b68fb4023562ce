//! Timed actions against the world: source outages, recharges, placements.

use std::fmt;

use tracing::{debug, info};

use super::clock::SimClock;
use super::types::SimConfig;
use super::world::World;
use crate::error::PowerError;
use crate::sources::profile::{MINUTES_PER_DAY, format_time_of_day, parse_time_of_day};

/// Callback run when an event fires.
pub type EventAction = Box<dyn FnMut(&mut EventContext<'_>) -> Result<(), PowerError>>;

/// How often an event recurs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repeat {
    /// Every `k` ticks of the owning event domain.
    Ticks(u64),
    /// Every `HH:MM` of simulated time.
    Every(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interval {
    Ticks(u64),
    Minutes(u64),
}

/// When an event first fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Minutes since midnight of the first day.
    Absolute(u64),
    /// Next occurrence of a time of day, at or after the start.
    TimeOfDay(u64),
}

/// A named, optionally repeating, action at a simulated time.
pub struct Event {
    pub name: String,
    trigger: Trigger,
    interval: Option<Interval>,
    action: EventAction,
}

impl Event {
    /// An event at an absolute time (minutes since midnight of day 0).
    pub fn at<F>(name: impl Into<String>, absolute_min: u64, action: F) -> Self
    where
        F: FnMut(&mut EventContext<'_>) -> Result<(), PowerError> + 'static,
    {
        Self {
            name: name.into(),
            trigger: Trigger::Absolute(absolute_min),
            interval: None,
            action: Box::new(action),
        }
    }

    /// An event at the first `HH:MM` on or after the simulation start.
    ///
    /// # Errors
    ///
    /// Returns `PowerError::InvalidTimeOfDay` for a malformed time.
    pub fn at_time<F>(name: impl Into<String>, time: &str, action: F) -> Result<Self, PowerError>
    where
        F: FnMut(&mut EventContext<'_>) -> Result<(), PowerError> + 'static,
    {
        let minute = parse_time_of_day(time)?;
        let mut event = Self::at(name, 0, action);
        event.trigger = Trigger::TimeOfDay(minute);
        Ok(event)
    }

    /// Makes the event recur.
    ///
    /// `Repeat::Every` is parsed here, once.
    ///
    /// # Errors
    ///
    /// `InvalidTimeOfDay` for a malformed interval, `InvalidRepeat` for a
    /// zero one.
    pub fn repeat(mut self, repeat: Repeat) -> Result<Self, PowerError> {
        let interval = match repeat {
            Repeat::Ticks(0) => return Err(PowerError::InvalidRepeat("0 ticks".to_string())),
            Repeat::Ticks(k) => Interval::Ticks(k),
            Repeat::Every(s) => match parse_time_of_day(&s)? {
                0 => return Err(PowerError::InvalidRepeat(s)),
                minutes => Interval::Minutes(minutes),
            },
        };
        self.interval = Some(interval);
        Ok(self)
    }

    pub fn is_repeating(&self) -> bool {
        self.interval.is_some()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// What an event callback may touch.
pub struct EventContext<'a> {
    pub world: &'a mut World,
    now_min: u64,
    pending: Vec<Event>,
}

impl EventContext<'_> {
    /// Absolute time the event fired at (minutes since midnight of day 0).
    pub fn now(&self) -> u64 {
        self.now_min
    }

    /// Queues a follow-up event on the same event domain.
    ///
    /// Follow-ups due at or before the current instant fire on the next
    /// tick, never re-entrantly.
    pub fn schedule(&mut self, event: Event) {
        self.pending.push(event);
    }
}

/// An event that has fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredEvent {
    pub name: String,
    /// Absolute time it fired at.
    pub time_min: u64,
}

/// Event queue ticking alongside the power domains.
#[derive(Debug)]
pub struct EventDomain {
    pub name: String,
    start_min: u64,
    tick_min: u64,
    queue: Vec<(u64, Option<u64>, Event)>,
    history: Vec<FiredEvent>,
}

impl EventDomain {
    pub fn new(name: impl Into<String>, config: &SimConfig) -> Self {
        Self {
            name: name.into(),
            start_min: config.start_min,
            tick_min: config.update_interval_min,
            queue: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn tick_min(&self) -> u64 {
        self.tick_min
    }

    /// Adds an event, resolving its trigger and repeat interval to absolute
    /// minutes.
    pub fn add(&mut self, event: Event) {
        let trigger = match event.trigger {
            Trigger::Absolute(t) => t,
            Trigger::TimeOfDay(m) if m < self.start_min % MINUTES_PER_DAY => {
                self.start_min - self.start_min % MINUTES_PER_DAY + m + MINUTES_PER_DAY
            }
            Trigger::TimeOfDay(m) => self.start_min - self.start_min % MINUTES_PER_DAY + m,
        };
        let interval = event.interval.map(|i| match i {
            Interval::Ticks(k) => k * self.tick_min,
            Interval::Minutes(m) => m,
        });
        debug!(
            domain = %self.name,
            event = %event.name,
            at = %format_time_of_day(trigger),
            ?interval,
            "event queued"
        );
        self.queue.push((trigger, interval, event));
    }

    /// Events still waiting to fire.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Every event fired so far, in firing order.
    pub fn history(&self) -> &[FiredEvent] {
        &self.history
    }

    /// Fires every event due at the clock's current time.
    ///
    /// Due events run ordered by trigger time, ties in insertion order.
    /// Repeating events are re-queued with their trigger advanced by one
    /// interval; one-shot events are dropped. Returns how many fired.
    ///
    /// # Errors
    ///
    /// The first failing callback aborts with `PowerError::EventFailed`.
    pub fn fire_due(&mut self, clock: &SimClock, world: &mut World) -> Result<usize, PowerError> {
        let now = clock.absolute();
        let (mut due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition(|(trigger, _, _)| *trigger <= now);
        self.queue = waiting;
        due.sort_by_key(|(trigger, _, _)| *trigger);

        let fired = due.len();
        let mut follow_ups = Vec::new();
        let mut due = due.into_iter();
        while let Some((trigger, interval, mut event)) = due.next() {
            let mut ctx = EventContext {
                world: &mut *world,
                now_min: now,
                pending: Vec::new(),
            };
            if let Err(cause) = (event.action)(&mut ctx) {
                // Unfired events stay queued.
                self.queue.extend(due);
                return Err(PowerError::EventFailed {
                    event: event.name,
                    cause: Box::new(cause),
                });
            }
            follow_ups.append(&mut ctx.pending);

            info!(domain = %self.name, event = %event.name, at = %clock.time_of_day(), "event fired");
            self.history.push(FiredEvent {
                name: event.name.clone(),
                time_min: now,
            });
            if let Some(step) = interval {
                self.queue.push((trigger + step, interval, event));
            }
        }

        for event in follow_ups {
            self.add(event);
        }
        Ok(fired)
    }
}
