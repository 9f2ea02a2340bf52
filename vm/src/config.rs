use std::time::Duration;

use heap::HeapSettings;

/// Everything needed to create an [`Interpreter`](crate::Interpreter).
#[derive(Debug, Clone)]
pub struct VMCreateInfo {
    pub heap: HeapSettings,
    /// Operand stack slots in each new context, beyond its temporaries.
    pub context_stack_depth: usize,
    /// Initial slot count of a freshly created dictionary.
    pub dictionary_capacity: usize,
    /// Slots added each time a dictionary grows.
    pub dictionary_growth: usize,
    /// Period of the timer semaphore.
    pub timer_interval: Duration,
    /// Sleep between polls while no process is runnable.
    pub idle_sleep: Duration,
    /// Give up with a deadlock error after idling this long. `None` idles
    /// until an external event arrives.
    pub idle_limit: Option<Duration>,
    /// Instructions between housekeeping passes.
    pub housekeeping_period: u32,
}

impl Default for VMCreateInfo {
    fn default() -> Self {
        Self {
            heap: HeapSettings::default(),
            context_stack_depth: 32,
            dictionary_capacity: 32,
            dictionary_growth: 32,
            timer_interval: Duration::from_millis(250),
            idle_sleep: Duration::from_millis(1),
            idle_limit: Some(Duration::from_secs(5)),
            housekeeping_period: 1_000,
        }
    }
}

impl VMCreateInfo {
    pub fn validate(&self) -> Result<(), &'static str> {
        self.heap.validate()?;
        if self.context_stack_depth == 0 {
            return Err("context_stack_depth must be > 0");
        }
        if self.dictionary_capacity == 0 || self.dictionary_growth == 0 {
            return Err("dictionary sizes must be > 0");
        }
        if self.housekeeping_period == 0 {
            return Err("housekeeping_period must be > 0");
        }
        if self.timer_interval.is_zero() {
            return Err("timer_interval must be > 0");
        }
        Ok(())
    }
}
