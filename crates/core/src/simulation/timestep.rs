/// Accumulator that turns variable frame deltas into whole fixed steps.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    rate_hz: f32,
    dt: f32,
    accumulator: f32,
}

impl FixedTimestep {
    pub fn new(rate_hz: f32) -> Self {
        let rate_hz = rate_hz.max(f32::EPSILON);
        Self {
            rate_hz,
            dt: 1.0 / rate_hz,
            accumulator: 0.0,
        }
    }

    pub fn rate_hz(&self) -> f32 {
        self.rate_hz
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn accumulate(&mut self, delta: f32) {
        self.accumulator += delta.clamp(0.0, 0.25);
    }

    pub fn should_tick(&self) -> bool {
        self.accumulator >= self.dt
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    /// Consumes every pending step at once and reports whether there was at
    /// least one. Used where only the latest state matters, so a long frame
    /// does not produce a burst of identical sends.
    pub fn consume_latest(&mut self) -> bool {
        let mut any = false;
        while self.consume_tick() {
            any = true;
        }
        any
    }

    pub fn alpha(&self) -> f32 {
        self.accumulator / self.dt
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_timestep_accumulation() {
        let mut ts = FixedTimestep::new(60.0);

        ts.accumulate(1.0 / 30.0 + 1e-4);
        assert!(ts.should_tick());
        assert!(ts.consume_tick());
        assert!(ts.consume_tick());
        assert!(!ts.consume_tick());
    }

    #[test]
    fn consume_latest_collapses_backlog() {
        let mut ts = FixedTimestep::new(20.0);
        ts.accumulate(0.2);
        assert!(ts.consume_latest());
        assert!(!ts.should_tick());
        assert!(!ts.consume_latest());
    }

    #[test]
    fn large_deltas_are_clamped() {
        let mut ts = FixedTimestep::new(10.0);
        ts.accumulate(5.0);
        let mut steps = 0;
        while ts.consume_tick() {
            steps += 1;
        }
        assert!(steps <= 3);
    }
}
