use crate::units::Tick;

/// A monotonically advancing simulation clock.
///
/// The driver keeps one for the scheduling loop and every cluster keeps one
/// for its physical time, so the two can be checked against each other.
///
/// # Examples
///
/// ```
/// use deferrable_sim::sim::clock::Clock;
///
/// let mut clock = Clock::new();
/// assert_eq!(clock.tick(), 0);
/// assert_eq!(clock.tick(), 1);
/// assert_eq!(clock.now(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Clock {
    /// Current tick of the simulation
    current: Tick,
}

impl Clock {
    /// Creates a clock at tick 0.
    pub fn new() -> Self {
        Self { current: 0 }
    }

    /// Returns the current tick.
    pub fn now(&self) -> Tick {
        self.current
    }

    /// Advances the clock by one tick.
    ///
    /// # Returns
    ///
    /// The tick before advancing.
    pub fn tick(&mut self) -> Tick {
        let step = self.current;
        self.current += 1;
        step
    }
}
