//! Sensor simulation tasks
//!
//! A main task spawns a chlorophyll detector and an energy monitor, then keeps
//! doing its periodic business. The host drains energy on every tick; the
//! chlorophyll reading follows the energy level. When energy runs low the
//! monitor kills every other task.

use anyhow::Context;
use std::fmt;
use std::time::Duration;
use strand_kernel::{ConditionVariable, Co, Coroutine, Scheduler};

pub const ENERGY: &str = "energy_level";
pub const CHLOROPHYLL: &str = "chlorophyll_level";

/// Energy drained per host tick
const DRAIN_PER_TICK: i64 = 3;

/// Host-side handles on the simulated readings
pub struct Environment {
    energy: ConditionVariable<i64>,
    chlorophyll: ConditionVariable<f64>,
}

impl Environment {
    pub fn register(sched: &Scheduler) -> anyhow::Result<Self> {
        Ok(Self {
            energy: sched.condition_variable(ENERGY, 100)?,
            chlorophyll: sched.condition_variable(CHLOROPHYLL, 0.0)?,
        })
    }

    /// One tick of the outside world
    pub fn drain_energy(&self) {
        self.energy.update(|level| *level -= DRAIN_PER_TICK);
        let level = self.energy.read() as f64;
        self.chlorophyll.write((level / 30.0).sin() * 4.0);
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "energy_level={}, chlorophyll_level={:.3}",
            self.energy.read(),
            self.chlorophyll.read()
        )
    }
}

async fn reading<T: Clone + 'static>(co: &Co, name: &str) -> anyhow::Result<ConditionVariable<T>> {
    co.scheduler()
        .await?
        .condition(name)
        .with_context(|| format!("{} is not registered", name))
}

pub fn main_task() -> Coroutine {
    Coroutine::new("main", |co| async move {
        co.spawn(chlorophyll_detector()).await?;
        co.spawn(energy_monitor()).await?;
        loop {
            co.print("Performing main business").await;
            co.sleep_for(Duration::from_secs(1)).await;
        }
    })
}

fn chlorophyll_detector() -> Coroutine {
    Coroutine::new("chlorophyll-detector", |co| async move {
        let chlorophyll = reading::<f64>(&co, CHLOROPHYLL).await?;
        co.wait_until(chlorophyll.when(|level| *level > 2.0)).await;
        co.print("We found chlorophyll").await;
        co.sleep_for(Duration::from_secs(2)).await;
        co.print("Ok, I'm green enough").await;
        Ok(())
    })
}

fn energy_monitor() -> Coroutine {
    Coroutine::new("energy-monitor", |co| async move {
        let energy = reading::<i64>(&co, ENERGY).await?;
        co.wait_until(energy.when(|level| *level < 10)).await;
        co.print("No more energy, killing all tasks").await;
        let me = co.own_id().await?;
        let killed = co.kill_all_except(vec![me]).await?;
        log::info!("Energy monitor killed {} task(s)", killed.len());
        co.print("Going for lunch").await;
        co.sleep_for(Duration::from_secs(1)).await;
        co.print("Mission done").await;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_kernel::ManualClock;

    #[test]
    fn test_simulation_ends_with_every_task_dead() {
        let clock = ManualClock::new();
        let mut sched = Scheduler::with_clock(clock.clone());
        let env = Environment::register(&sched).unwrap();
        let main = sched.create(main_task());

        let mut ticks = 0;
        while !sched.is_empty() && ticks < 100 {
            env.drain_energy();
            sched.tick_now().unwrap();
            clock.advance(Duration::from_millis(300));
            ticks += 1;
        }

        assert!(sched.is_empty());
        assert!(!sched.contains(main));
        // 100 -> below 10 after 31 ticks, then one simulated second of lunch
        assert!((31..=36).contains(&ticks), "took {} ticks", ticks);
    }

    #[test]
    fn test_environment_display() {
        let sched = Scheduler::with_clock(ManualClock::new());
        let env = Environment::register(&sched).unwrap();
        env.drain_energy();
        assert!(env.to_string().starts_with("energy_level=97, chlorophyll_level="));
    }
}
