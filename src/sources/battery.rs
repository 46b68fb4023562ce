use crate::error::PowerError;

/// One completed recharge and the emissions attributed to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RechargeRecord {
    /// Energy put back into the battery.
    pub power: f64,
    /// Carbon released by the charging source (gCO2).
    pub carbon_released: f64,
    /// Name of the source the battery was charged from.
    pub source_name: String,
}

/// Stored-energy state of a battery power source.
///
/// A battery emits nothing while discharging; its carbon cost is booked when
/// it is recharged, against the source that recharged it.
#[derive(Debug, Clone, PartialEq)]
pub struct Battery {
    /// Energy held when full.
    pub total_power: f64,
    /// Energy still available.
    remaining_power: f64,
    /// Energy restored per tick while recharging.
    pub recharge_rate: f64,
    recharges: Vec<RechargeRecord>,
}

impl Battery {
    /// Creates a battery.
    ///
    /// # Arguments
    ///
    /// * `total_power` - Capacity when full
    /// * `remaining_power` - Initial charge, clamped to `[0, total_power]`
    /// * `recharge_rate` - Energy restored per tick while recharging
    ///
    /// # Panics
    ///
    /// Panics if `total_power` is negative or `recharge_rate` is not positive.
    pub fn new(total_power: f64, remaining_power: f64, recharge_rate: f64) -> Self {
        assert!(total_power >= 0.0, "total_power must be >= 0");
        assert!(recharge_rate > 0.0, "recharge_rate must be > 0");
        Self {
            total_power,
            remaining_power: remaining_power.clamp(0.0, total_power),
            recharge_rate,
            recharges: Vec::new(),
        }
    }

    /// A full battery.
    pub fn full(total_power: f64, recharge_rate: f64) -> Self {
        Self::new(total_power, total_power, recharge_rate)
    }

    pub fn remaining_power(&self) -> f64 {
        self.remaining_power
    }

    /// Every recharge performed so far.
    pub fn recharges(&self) -> &[RechargeRecord] {
        &self.recharges
    }

    /// Draws `amount` from the battery.
    ///
    /// # Errors
    ///
    /// Returns `PowerError::NegativeDraw` for a negative amount and
    /// `PowerError::BatteryOverdraw` when `amount` exceeds the remaining
    /// charge. The charge is left untouched on error.
    pub fn consume_power(&mut self, amount: f64) -> Result<(), PowerError> {
        if amount < 0.0 {
            return Err(PowerError::NegativeDraw(amount));
        }
        if amount > self.remaining_power {
            return Err(PowerError::BatteryOverdraw {
                requested: amount,
                remaining: self.remaining_power,
            });
        }
        self.remaining_power -= amount;
        Ok(())
    }

    /// Number of ticks a recharge to full would take.
    pub fn ticks_to_full(&self) -> u64 {
        let deficit = self.total_power - self.remaining_power;
        if deficit <= 0.0 {
            return 0;
        }
        (deficit / self.recharge_rate).ceil() as u64
    }

    /// Recharges to full from a source whose carbon intensity `k` ticks from
    /// now is `intensity_at(k)`.
    ///
    /// Each tick restores at most `recharge_rate`; the emission of that slice
    /// is `energy * 1e-3 * intensity`. One [`RechargeRecord`] is kept for the
    /// whole recharge. Returns the number of ticks the recharge spans, which
    /// callers use to suspend whatever waits for the battery.
    pub fn recharge_with<F>(&mut self, source_name: &str, intensity_at: F) -> u64
    where
        F: Fn(u64) -> f64,
    {
        let ticks = self.ticks_to_full();
        if ticks == 0 {
            return 0;
        }

        let mut deficit = self.total_power - self.remaining_power;
        let mut carbon = 0.0;
        for k in 0..ticks {
            let slice = deficit.min(self.recharge_rate);
            carbon += slice * 1e-3 * intensity_at(k);
            deficit -= slice;
        }

        self.recharges.push(RechargeRecord {
            power: self.total_power - self.remaining_power,
            carbon_released: carbon,
            source_name: source_name.to_string(),
        });
        self.remaining_power = self.total_power;
        ticks
    }
}
